//! Packet filtering backends for the drop fault.

use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chaos_core::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Blocks and unblocks inbound traffic on the local node.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Drops every inbound packet from `peer`.
    async fn drop_from(&self, peer: &str) -> Result<()>;

    /// Removes every rule added by `drop_from`. Healing a healthy node is a
    /// no-op.
    async fn heal(&self) -> Result<()>;
}

/// `iptables` on the `INPUT` chain.
#[derive(Debug, Clone)]
pub struct Iptables {
    program: String,
}

impl Default for Iptables {
    fn default() -> Self {
        Self::new()
    }
}

impl Iptables {
    pub fn new() -> Self {
        Self::with_program("iptables")
    }

    /// Uses another binary with the same CLI (e.g. `ip6tables`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, "running firewall command");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Command {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Command {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Firewall for Iptables {
    async fn drop_from(&self, peer: &str) -> Result<()> {
        self.run(&["-A", "INPUT", "-s", peer, "-j", "DROP", "-w"]).await
    }

    async fn heal(&self) -> Result<()> {
        self.run(&["-F", "-w"]).await?;
        self.run(&["-X", "-w"]).await
    }
}

/// In-process firewall that only remembers which peers are blocked.
///
/// Clones share state, so a test can keep one handle and give another to
/// the fault primitive.
#[derive(Debug, Clone, Default)]
pub struct MemoryFirewall {
    dropped: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently blocked peers, sorted.
    pub fn dropped(&self) -> Vec<String> {
        self.dropped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Firewall for MemoryFirewall {
    async fn drop_from(&self, peer: &str) -> Result<()> {
        self.dropped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.to_string());
        Ok(())
    }

    async fn heal(&self) -> Result<()> {
        self.dropped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_firewall_shares_state_between_clones() {
        let firewall = MemoryFirewall::new();
        let handle = firewall.clone();

        firewall.drop_from("n2").await.unwrap();
        firewall.drop_from("n1").await.unwrap();
        firewall.drop_from("n2").await.unwrap();
        assert_eq!(handle.dropped(), vec!["n1".to_string(), "n2".to_string()]);

        firewall.heal().await.unwrap();
        assert!(handle.dropped().is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_command_error() {
        let firewall = Iptables::with_program("chaos-no-such-firewall-binary");
        let err = firewall.drop_from("n1").await.unwrap_err();
        match err {
            Error::Command { command, .. } => {
                assert!(command.starts_with("chaos-no-such-firewall-binary -A INPUT -s n1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
