//! Error kinds raised by the scattering engine.
//!
//! Every failure is raised at the point of detection and aborts the current
//! computation; there are no partial results.

use thiserror::Error;

/// Errors that can occur while computing scattering by a stratified sphere.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MieError {
    /// Invalid physical input (negative width, zero argument, mismatched
    /// width/index lists, misplaced PEC layer, ...).
    #[error("Invalid input: {0}")]
    Domain(String),

    /// A continued fraction or series did not converge within its budget.
    #[error(
        "Continued fraction for order {order} at z = {argument} did not converge after {iterations} iterations"
    )]
    Convergence {
        order: usize,
        iterations: usize,
        argument: String,
    },

    /// The requested or estimated number of multipole terms is too large.
    #[error("Multipole order {requested} exceeds the internal ceiling of {ceiling} terms")]
    ResourceLimit { requested: usize, ceiling: usize },
}

impl MieError {
    /// Shorthand for a [`MieError::Domain`] with a formatted message.
    pub fn domain(msg: impl Into<String>) -> Self {
        MieError::Domain(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type MieResult<T> = Result<T, MieError>;
