#![doc = include_str!("../README.md")]

mod array_refinement;
mod baseline_refinement;
mod block_partition;
mod labelling;
mod partition;
mod quotient;
mod reduce;
mod signature;
mod signature_refinement;
mod splitter_tree;
mod tolerance;
mod tree_refinement;
mod weight_sort;
mod worklist;

pub use array_refinement::*;
pub use baseline_refinement::*;
pub use block_partition::*;
pub use labelling::*;
pub use partition::*;
pub use quotient::*;
pub use reduce::*;
pub use signature::*;
pub use signature_refinement::*;
pub use splitter_tree::*;
pub use tolerance::*;
pub use tree_refinement::*;
pub use weight_sort::*;
pub use worklist::*;
