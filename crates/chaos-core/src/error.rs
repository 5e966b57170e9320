//! Error types for agent-side capabilities.

use thiserror::Error;

/// Errors raised by databases, fault primitives and registries.
#[derive(Debug, Error)]
pub enum Error {
    /// No database registered under this name.
    #[error("database {0} is not registered")]
    UnknownDatabase(String),

    /// No fault primitive registered under this name.
    #[error("nemesis {0} is not registered")]
    UnknownNemesis(String),

    /// A service name that does not parse.
    #[error("unknown service kind: {0}")]
    UnknownService(String),

    /// Malformed arguments for a fault primitive.
    #[error("invalid arguments for {nemesis}: {reason}")]
    InvalidArgs { nemesis: String, reason: String },

    /// An external command failed.
    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    /// Workload client setup or teardown failed. Raised by [`Client`](crate::Client)
    /// implementations.
    #[error("client error on node {node}: {message}")]
    Client { node: String, message: String },
}

impl Error {
    /// Returns true when the error means "name not found" rather than an
    /// execution failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownDatabase(_) | Self::UnknownNemesis(_))
    }

    /// Returns true when the caller sent arguments that can never succeed.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::UnknownService(_) | Self::InvalidArgs { .. })
    }
}

/// Result type for agent-side operations.
pub type Result<T> = std::result::Result<T, Error>;
