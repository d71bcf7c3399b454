//! Error types for sigmalok
//!
//! All errors are terminal for the current query or selection call; no
//! retries or partial-result recovery happen below the caller.

use thiserror::Error;

use crate::types::{BoxId, NanoErg, TokenId};

/// Top-level error for sigmalok operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Query failure: {0}")]
    Query(#[from] QueryError),

    #[error("Selection error: {0}")]
    Select(#[from] SelectError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Node query failures (network, transport, or malformed responses).
///
/// Propagated without modification and never retried: a partially trusted
/// page would leave downstream selection state undefined.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Node unreachable at {url}")]
    Unreachable { url: String },

    #[error("Node returned error: {message}")]
    Api { message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Box not found: {box_id}")]
    BoxNotFound { box_id: BoxId },
}

/// Input selection failures
#[derive(Debug, Error)]
pub enum SelectError {
    /// Empty candidate address list; surfaced before any query is made.
    #[error("Input addresses must contain at least one address")]
    NoAddresses,

    /// All candidate addresses were exhausted without meeting the
    /// requested nanoERG and/or token amounts.
    #[error("Insufficient inputs to meet the required tokens and/or ERGs (missing {missing_value} nanoERG, {} unmet tokens)", .missing_tokens.len())]
    Insufficient {
        /// Residual nanoERG shortfall (0 when only tokens are unmet)
        missing_value: NanoErg,
        /// Remaining unmet amount per requested token
        missing_tokens: Vec<(TokenId, u64)>,
    },

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result type alias for sigmalok operations
pub type Result<T> = std::result::Result<T, Error>;
