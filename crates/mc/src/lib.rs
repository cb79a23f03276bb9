#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod incoming_transitions;
mod markov_chain;
mod model;
mod random_mc;
mod sparse_markov_chain;

pub use incoming_transitions::*;
pub use markov_chain::*;
pub use model::*;
pub use random_mc::*;
pub use sparse_markov_chain::*;
