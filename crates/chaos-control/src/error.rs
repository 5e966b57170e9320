//! Error types for controller operations.

use chaos_history::HistoryError;
use chaos_node::NodeError;
use thiserror::Error;

/// Controller errors. Every variant is fatal to the operation that returned
/// it; non-fatal failures are logged instead.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Configuration error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A node index outside the cluster.
    #[error("node index {index} out of range (cluster has {len} nodes)")]
    InvalidNodeIndex { index: usize, len: usize },

    /// An agent call failed.
    #[error("{operation} on node {node} failed: {source}")]
    Node {
        node: String,
        operation: &'static str,
        #[source]
        source: NodeError,
    },

    /// The workload client failed to set up.
    #[error("workload client on node {node} failed: {source}")]
    Client {
        node: String,
        #[source]
        source: chaos_core::Error,
    },

    /// Writing the history failed.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// The controller was cancelled before the operation finished.
    #[error("cancelled")]
    Cancelled,

    /// A spawned task panicked.
    #[error("task failed: {0}")]
    Task(String),
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControlError>;
