//! Configuration loader with multi-source merging

use crate::{ChaosConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "CHAOS".to_string(),
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "CHAOS")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<ChaosConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = ChaosConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/chaos/config.toml)
        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(toml_file(user_config_file));
            }
        }

        // 3. Project config (chaos.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(toml_file(project_config_file));
        }

        // 4. Local config (chaos.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(toml_file(local_config_file));
        }

        // 5. Environment variables (CHAOS_CONTROL__REQUEST_COUNT, ...)
        // Keys contain underscores, so sections are split on a double one.
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut chaos_config: ChaosConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        chaos_config.resolve_paths(&self.project_dir);
        chaos_config.validate()?;

        Ok(chaos_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn toml_file(path: PathBuf) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(false)
        .format(config::FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("CHAOS_TEST_DEFAULTS")
            .load()
            .expect("Failed to load config");

        assert_eq!(config.control.node_port, 8080);
        assert_eq!(config.control.history, temp_dir.path().join("history.log"));
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config_file = temp_dir.path().join("chaos.toml");

        fs::write(
            &config_file,
            r#"
[control]
db = "tidb"
request_count = 100
history = "/tmp/run.log"

[cluster]
nodes = ["a", "b", "c"]

[cluster.addresses]
b = "10.0.0.2:9000"

[nemesis]
generators = ["random_kill", "all_drop"]
nodes = [0, 2]
"#,
        )
        .expect("Failed to write config");

        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("CHAOS_TEST_PROJECT")
            .load()
            .expect("Failed to load config");

        assert_eq!(config.control.db, "tidb");
        assert_eq!(config.control.request_count, 100);
        assert_eq!(config.control.run_time_secs, 600);
        assert_eq!(config.control.history, PathBuf::from("/tmp/run.log"));
        assert_eq!(config.cluster.nodes, vec!["a", "b", "c"]);
        assert_eq!(config.nemesis.generators, vec!["random_kill", "all_drop"]);
        assert_eq!(config.nemesis.nodes, vec![0, 2]);

        let nodes = config.cluster_nodes();
        assert_eq!(nodes[0].addr, "a:8080");
        assert_eq!(nodes[1].addr, "10.0.0.2:9000");
    }

    #[test]
    fn test_local_config_override() {
        let temp_dir = tempdir().expect("Failed to create temp dir");

        fs::write(
            temp_dir.path().join("chaos.toml"),
            r#"
[control]
request_count = 100
warmup_secs = 3
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            temp_dir.path().join("chaos.local.toml"),
            r#"
[control]
request_count = 20

[agent]
fault_hold_secs = 1
iptables = false
"#,
        )
        .expect("Failed to write local config");

        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("CHAOS_TEST_LOCAL")
            .load()
            .expect("Failed to load config");

        assert_eq!(config.control.request_count, 20);
        assert_eq!(config.control.warmup_secs, 3);
        assert_eq!(config.agent.fault_hold_secs, 1);
        assert!(!config.agent.iptables);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");

        fs::write(
            temp_dir.path().join("chaos.toml"),
            r#"
[cluster]
nodes = ["n1", "n1"]
"#,
        )
        .expect("Failed to write config");

        let result = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("CHAOS_TEST_INVALID")
            .load();

        assert!(result.is_err());
    }
}
