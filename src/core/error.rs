//! Error taxonomy of the valuation engine.

use thiserror::Error;

/// Errors raised by the valuation engine.
///
/// Only [`NotFound`](ValuationError::NotFound) and
/// [`Conflict`](ValuationError::Conflict) ever reach callers of the ledger and
/// the aggregator. The two pricing variants are produced by the price source
/// and absorbed by the resolver's fallback chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValuationError {
    /// A referenced stakeholder, asset or share does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An ownership change would break a ledger invariant.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The live price lookup failed (transport error, timeout, bad status).
    #[error("Price source unavailable: {0}")]
    ExternalUnavailable(String),

    /// The price source answered with data that could not be understood.
    #[error("Malformed price data: {0}")]
    MalformedPriceData(String),
}

impl ValuationError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

pub type ValuationResult<T> = Result<T, ValuationError>;
