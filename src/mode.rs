//! Execution modes threaded through the forward pass.

use std::fmt;

/// Whether stochastic regularization (dropout) is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Whether a forward pass records what `Classifier::backward` needs.
///
/// `NoGrad` skips mask bookkeeping; a `Scratch` filled by a `NoGrad` pass cannot
/// be used for backprop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradMode {
    Track,
    NoGrad,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => f.write_str("train"),
            Mode::Eval => f.write_str("eval"),
        }
    }
}
