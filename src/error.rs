//! Error types for the auction core.

use std::fmt;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Errors surfaced to callers of the auction core.
///
/// Inadmissible bids and non-convergence are not errors: the first is a `false`
/// from `AuctionObject::register_bid`, the second is `MatchingStatus::IterationLimitReached`.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A caller supplied parameter is outside its valid range.
    InvalidParameter(String),
    /// Valuation model selector string is not one of the known models.
    UnknownValuationModel(String),
    /// Covariance matrix could not be factorised for sampling.
    DegenerateCovariance(String),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            SimulationError::UnknownValuationModel(name) => write!(
                f,
                "unknown valuation model '{}' (expected independent, common_value or correlated_private)",
                name
            ),
            SimulationError::DegenerateCovariance(msg) => write!(f, "degenerate covariance matrix: {}", msg),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Shorthand for building an `InvalidParameter` error
pub fn invalid(msg: impl Into<String>) -> SimulationError {
    SimulationError::InvalidParameter(msg.into())
}
