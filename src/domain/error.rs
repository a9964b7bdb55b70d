//! Pricing errors for live odds computation.
//!
//! Every variant means "odds currently unavailable" to a caller. None of them
//! are fatal: the next feed update or stake change simply retries.

use thiserror::Error;

/// Errors raised while deriving live odds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    /// The inputs violate a precondition of the solver or calculator.
    #[error("invalid pricing input: {reason}")]
    InvalidInput {
        /// What was wrong with the input.
        reason: String,
    },

    /// The observed spread reached the requested margin before convergence.
    #[error("margin {margin} is infeasible (observed spread {observed})")]
    Infeasible {
        /// Requested margin.
        margin: f64,
        /// Spread observed at the failing iteration.
        observed: f64,
    },

    /// The residual stopped moving without meeting the convergence test.
    #[error("solver stalled after {iterations} iterations (observed spread {observed})")]
    Stalled {
        /// Iterations performed.
        iterations: usize,
        /// Spread observed at the final iteration.
        observed: f64,
    },

    /// The iteration budget ran out.
    #[error("solver did not converge within {iterations} iterations")]
    NotConverged {
        /// Iterations performed.
        iterations: usize,
    },

    /// The snapshot carries no quote for the requested outcome.
    #[error("no quote for outcome {outcome_id} in condition {condition_id}")]
    UnknownOutcome {
        /// Condition that was priced.
        condition_id: String,
        /// Outcome that was missing.
        outcome_id: String,
    },
}

impl PricingError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}
