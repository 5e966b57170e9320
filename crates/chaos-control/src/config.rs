//! Controller configuration.

use std::path::PathBuf;
use std::time::Duration;

use chaos_core::Node;

use crate::{ControlError, Result};

pub const DEFAULT_NODE_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_COUNT: usize = 500;
pub const DEFAULT_RUN_TIME: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_HISTORY: &str = "./history.log";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(5);
pub const DEFAULT_NEMESIS_INTERVAL: Duration = Duration::from_secs(10);

/// Parameters of one controller.
///
/// Zero values mean "use the default"; [`Config::adjust`] fills them in. The
/// controller adjusts and validates its copy once, at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the database under test, as registered on the agents.
    pub db: String,

    /// Port every agent listens on.
    pub node_port: u16,

    /// Maximum operations per worker.
    pub request_count: usize,

    /// Wall-clock bound for the workload phase.
    pub run_time: Duration,

    /// History file path.
    pub history: PathBuf,

    /// Bound on a single workload invocation.
    pub request_timeout: Duration,

    /// Bound on a single agent call, including fault hold.
    pub rpc_timeout: Duration,

    /// Delay between workload start and the first fault.
    pub warmup: Duration,

    /// Pause between passes over the nemesis generators.
    pub nemesis_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: String::new(),
            node_port: DEFAULT_NODE_PORT,
            request_count: DEFAULT_REQUEST_COUNT,
            run_time: DEFAULT_RUN_TIME,
            history: PathBuf::from(DEFAULT_HISTORY),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            warmup: DEFAULT_WARMUP,
            nemesis_interval: DEFAULT_NEMESIS_INTERVAL,
        }
    }
}

impl Config {
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            ..Self::default()
        }
    }

    /// Replaces unset (zero) fields with defaults.
    ///
    /// `warmup` may legitimately be zero and is left alone. `request_timeout`
    /// never exceeds `run_time`.
    pub fn adjust(&mut self) {
        if self.node_port == 0 {
            self.node_port = DEFAULT_NODE_PORT;
        }
        if self.request_count == 0 {
            self.request_count = DEFAULT_REQUEST_COUNT;
        }
        if self.run_time.is_zero() {
            self.run_time = DEFAULT_RUN_TIME;
        }
        if self.history.as_os_str().is_empty() {
            self.history = PathBuf::from(DEFAULT_HISTORY);
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = DEFAULT_REQUEST_TIMEOUT;
        }
        if self.rpc_timeout.is_zero() {
            self.rpc_timeout = DEFAULT_RPC_TIMEOUT;
        }
        if self.nemesis_interval.is_zero() {
            self.nemesis_interval = DEFAULT_NEMESIS_INTERVAL;
        }
        self.request_timeout = self.request_timeout.min(self.run_time);
    }

    pub fn validate(&self) -> Result<()> {
        if self.db.trim().is_empty() {
            return Err(ControlError::InvalidConfig("empty database name".to_string()));
        }
        Ok(())
    }

    /// The default cluster: a coordinator node `pd` plus `n1`..`n5`, each
    /// agent on `node_port`.
    pub fn default_nodes(&self) -> Vec<Node> {
        std::iter::once("pd".to_string())
            .chain((1..=5).map(|i| format!("n{i}")))
            .map(|name| Node::with_port(name, self.node_port))
            .collect()
    }
}
