//! `chaos agent`: the per-node control agent.

use std::time::Duration;

use anyhow::{Context, Result};
use chaos_core::{DatabaseRegistry, NemesisRegistry, NoopDatabase, Registry};
use chaos_nemesis::{DropNemesis, Iptables, KillNemesis, MemoryFirewall};
use chaos_node::{AgentState, serve};
use tokio::net::TcpListener;
use tracing::info;

use super::{load_config, shutdown_signal};
use crate::GlobalArgs;

/// Flags of `chaos agent`; unset ones fall back to the `[agent]` section.
#[derive(Debug, Default)]
pub struct AgentArgs {
    pub listen: Option<String>,
    pub node_name: Option<String>,
    pub fault_hold_secs: Option<u64>,
    pub no_iptables: bool,
}

/// Serves the agent until SIGINT or SIGTERM.
pub async fn run(global: &GlobalArgs, args: AgentArgs) -> Result<()> {
    let config = load_config(global)?;
    let agent = config.agent;

    let listen = args.listen.unwrap_or(agent.listen);
    let node = args
        .node_name
        .or(agent.node_name)
        .unwrap_or_else(default_node_name);
    let hold = Duration::from_secs(args.fault_hold_secs.unwrap_or(agent.fault_hold_secs));
    let iptables = agent.iptables && !args.no_iptables;

    let registry = build_registry(&node, iptables);
    info!(
        %node,
        databases = ?registry.databases.names(),
        nemeses = ?registry.nemeses.names(),
        fault_hold = ?hold,
        "starting agent"
    );

    let state = AgentState::new(node, registry).with_fault_hold(hold);
    let shutdown = state.shutdown.clone();

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind agent to {listen}"))?;

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutting down agent");
        shutdown.cancel();
    });

    serve(listener, state).await.context("Agent server failed")
}

/// The databases and fault primitives this binary ships with.
pub fn build_registry(node: &str, iptables: bool) -> Registry {
    let databases = DatabaseRegistry::new().register(NoopDatabase::new(node));

    let nemeses = NemesisRegistry::new().register(KillNemesis::new(databases.clone()));
    let nemeses = if iptables {
        nemeses.register(DropNemesis::new(node, Iptables::new()))
    } else {
        nemeses.register(DropNemesis::new(node, MemoryFirewall::new()))
    };

    Registry::new(databases, nemeses)
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_noop_database_and_both_faults() {
        let registry = build_registry("n1", false);
        assert_eq!(registry.databases.names(), vec![NoopDatabase::NAME]);
        assert_eq!(registry.nemeses.names(), vec!["drop", "kill"]);
    }
}
