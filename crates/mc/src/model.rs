#![forbid(unsafe_code)]

use std::fmt;

use crate::SparseMarkovChain;

/// The model classes that can be constructed. The reduction algorithms only
/// accept discrete-time chains; continuous-time chains can be represented but
/// are rejected by every reduction entry point.
#[derive(Clone, Debug)]
pub enum Model<V> {
    /// A discrete-time Markov chain with transition probabilities.
    DiscreteTime(SparseMarkovChain<V>),

    /// A continuous-time Markov chain with transition rates.
    ContinuousTime(SparseMarkovChain<V>),
}

impl<V> Model<V> {
    /// Returns the kind of this model, used for error reporting.
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::DiscreteTime(_) => ModelKind::DiscreteTime,
            Model::ContinuousTime(_) => ModelKind::ContinuousTime,
        }
    }
}

/// The kind of a [Model], without its contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    DiscreteTime,
    ContinuousTime,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::DiscreteTime => write!(f, "discrete-time Markov chain"),
            ModelKind::ContinuousTime => write!(f, "continuous-time Markov chain"),
        }
    }
}
