//! CLI command implementations.

pub mod agent;
pub mod cases;
pub mod control;
pub mod run;

use std::time::Duration;

use anyhow::{Context, Result};
use chaos_config::{ChaosConfig, ConfigLoader};

use crate::GlobalArgs;

/// Loads the layered configuration and applies the global flags on top.
pub fn load_config(global: &GlobalArgs) -> Result<ChaosConfig> {
    let mut config = ConfigLoader::new()
        .with_project_dir(&global.project)
        .load()
        .with_context(|| format!("Failed to load configuration from {}", global.project))?;

    if let Some(db) = &global.db {
        config.control.db.clone_from(db);
    }
    if let Some(port) = global.node_port {
        config.control.node_port = port;
    }
    Ok(config)
}

/// `chaos config`: prints the merged configuration.
pub fn show_config(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Controller settings from the merged configuration.
pub fn control_config(config: &ChaosConfig) -> chaos_control::Config {
    let control = &config.control;
    chaos_control::Config {
        db: control.db.clone(),
        node_port: control.node_port,
        request_count: control.request_count,
        run_time: Duration::from_secs(control.run_time_secs),
        history: control.history.clone(),
        request_timeout: Duration::from_secs(control.request_timeout_secs),
        rpc_timeout: Duration::from_secs(control.rpc_timeout_secs),
        warmup: Duration::from_secs(control.warmup_secs),
        nemesis_interval: Duration::from_secs(control.nemesis_interval_secs),
    }
}

/// Empty means every node.
pub fn or_all(indices: &[usize], len: usize) -> Vec<usize> {
    if indices.is_empty() {
        (0..len).collect()
    } else {
        indices.to_vec()
    }
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_node_list_means_all() {
        assert_eq!(or_all(&[], 3), vec![0, 1, 2]);
        assert_eq!(or_all(&[2, 0], 3), vec![2, 0]);
    }

    #[test]
    fn control_config_converts_seconds() {
        let mut config = ChaosConfig::default();
        config.control.run_time_secs = 30;
        config.control.warmup_secs = 0;

        let cfg = control_config(&config);
        assert_eq!(cfg.db, "noop");
        assert_eq!(cfg.run_time, Duration::from_secs(30));
        assert_eq!(cfg.warmup, Duration::ZERO);
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    }
}
