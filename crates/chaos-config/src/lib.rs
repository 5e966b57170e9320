//! Configuration management for the chaos harness
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (`CHAOS_<SECTION>__<KEY>`, e.g.
//!    `CHAOS_CONTROL__REQUEST_COUNT=100`)
//! 3. chaos.local.toml (gitignored, local overrides)
//! 4. chaos.toml (git-tracked, project config)
//! 5. ~/.config/chaos/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chaos_core::Node;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main chaos configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub control: ControlConfig,
    pub cluster: ClusterConfig,
    pub agent: AgentConfig,
    pub nemesis: NemesisConfig,
}

/// Controller settings. Durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub db: String,
    pub case: String,
    pub node_port: u16,
    pub request_count: usize,
    pub run_time_secs: u64,
    pub history: PathBuf,
    pub request_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    pub warmup_secs: u64,
    pub nemesis_interval_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            db: "noop".to_string(),
            case: "noop".to_string(),
            node_port: 8080,
            request_count: 500,
            run_time_secs: 600,
            history: PathBuf::from("history.log"),
            request_timeout_secs: 10,
            rpc_timeout_secs: 60,
            warmup_secs: 5,
            nemesis_interval_secs: 10,
        }
    }
}

/// Cluster membership, in controller order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub nodes: Vec<String>,
    /// Agent address per node name; nodes not listed use `name:node_port`.
    pub addresses: BTreeMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: ["pd", "n1", "n2", "n3", "n4", "n5"]
                .into_iter()
                .map(String::from)
                .collect(),
            addresses: BTreeMap::new(),
        }
    }
}

/// Settings of `chaos agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub listen: String,
    /// Name this agent answers as; the host name when unset.
    pub node_name: Option<String>,
    pub fault_hold_secs: u64,
    /// Use iptables for the drop fault. Off means an in-memory firewall that
    /// blocks nothing.
    pub iptables: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            node_name: None,
            fault_hold_secs: 5,
            iptables: true,
        }
    }
}

/// Fault injection settings of `chaos run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NemesisConfig {
    /// Generator names, e.g. `["random_kill", "minor_drop"]`.
    pub generators: Vec<String>,
    /// Indices of the nodes faults are applied to.
    pub nodes: Vec<usize>,
}

impl ChaosConfig {
    /// The merged configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.control.history.is_relative() {
            self.control.history = base.join(&self.control.history);
        }
    }

    /// Checks what the sources cannot express in their types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.db.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "control.db must not be empty".to_string(),
            ));
        }
        if self.cluster.nodes.is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster.nodes must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.cluster.nodes {
            if name.trim().is_empty() || !seen.insert(name) {
                return Err(ConfigError::ValidationError(format!(
                    "cluster.nodes has an empty or duplicate name: {name:?}"
                )));
            }
        }

        if let Some(&index) = self
            .nemesis
            .nodes
            .iter()
            .find(|&&i| i >= self.cluster.nodes.len())
        {
            return Err(ConfigError::ValidationError(format!(
                "nemesis.nodes index {index} is out of range"
            )));
        }
        Ok(())
    }

    /// The cluster as [`Node`]s, in configured order.
    pub fn cluster_nodes(&self) -> Vec<Node> {
        self.cluster
            .nodes
            .iter()
            .map(|name| match self.cluster.addresses.get(name) {
                Some(addr) => Node::new(name.clone(), addr.clone()),
                None => Node::with_port(name.clone(), self.control.node_port),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChaosConfig::default();
        assert_eq!(config.control.db, "noop");
        assert_eq!(config.control.request_count, 500);
        assert_eq!(config.cluster.nodes.len(), 6);
        assert_eq!(config.agent.fault_hold_secs, 5);
        assert!(config.nemesis.generators.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_resolution() {
        let mut config = ChaosConfig::default();
        config.resolve_paths("/var/chaos");
        assert_eq!(config.control.history, PathBuf::from("/var/chaos/history.log"));

        config.control.history = PathBuf::from("/tmp/h.log");
        config.resolve_paths("/var/chaos");
        assert_eq!(config.control.history, PathBuf::from("/tmp/h.log"));
    }

    #[test]
    fn test_toml_output_reloads() {
        let mut config = ChaosConfig::default();
        config.nemesis.generators = vec!["minor_kill".to_string()];
        config.agent.node_name = Some("n3".to_string());

        let text = config.to_toml().expect("serialize");
        assert!(text.contains("[control]"));

        let back: ChaosConfig = toml::from_str(&text).expect("parse");
        assert_eq!(back.nemesis.generators, vec!["minor_kill"]);
        assert_eq!(back.agent.node_name.as_deref(), Some("n3"));
        assert_eq!(back.cluster.nodes, config.cluster.nodes);
    }

    #[test]
    fn test_cluster_nodes_use_explicit_addresses() {
        let mut config = ChaosConfig::default();
        config.cluster.nodes = vec!["pd".to_string(), "n1".to_string()];
        config
            .cluster
            .addresses
            .insert("n1".to_string(), "10.0.0.7:9000".to_string());

        let nodes = config.cluster_nodes();
        assert_eq!(nodes[0], Node::new("pd", "pd:8080"));
        assert_eq!(nodes[1], Node::new("n1", "10.0.0.7:9000"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ChaosConfig::default();
        config.cluster.nodes.push("n1".to_string());
        assert!(config.validate().is_err());

        let mut config = ChaosConfig::default();
        config.nemesis.nodes = vec![1, 6];
        assert!(config.validate().is_err());

        let mut config = ChaosConfig::default();
        config.control.db = String::new();
        assert!(config.validate().is_err());
    }
}
