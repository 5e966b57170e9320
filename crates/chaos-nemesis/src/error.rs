//! Error types for generator construction.

use thiserror::Error;

/// Errors raised while building generators.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NemesisError {
    /// The name is not `<policy>_<family>` with known parts.
    #[error("unknown nemesis generator: {0}")]
    UnknownGenerator(String),
}

/// Result type for generator construction.
pub type Result<T> = std::result::Result<T, NemesisError>;
