//! Errors seen by callers of a remote agent.

use thiserror::Error;

/// Error returned by every [`NodeClient`](crate::NodeClient) call.
#[derive(Error, Debug)]
pub enum NodeError {
    /// The agent could not be reached, timed out, or sent an unreadable
    /// reply.
    #[error("node {node} unreachable: {source}")]
    Transport {
        node: String,
        #[source]
        source: reqwest::Error,
    },

    /// The agent was reached and the operation failed there.
    #[error("node {node} failed with {status}: {message}")]
    Remote {
        node: String,
        status: u16,
        message: String,
    },
}

impl NodeError {
    /// Returns true when the agent was never reached (or never answered).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// HTTP status reported by the agent, if it answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }
}

/// Result type for node client calls.
pub type Result<T> = std::result::Result<T, NodeError>;
