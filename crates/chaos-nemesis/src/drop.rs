//! Network partition fault.

use async_trait::async_trait;
use chaos_core::{Nemesis, NemesisGenerator, Operation, Result};
use tracing::{debug, info};

use crate::{Firewall, Iptables, Policy, Selector};

/// Emits `drop` operations that cut the chosen nodes off from the rest.
///
/// Each chosen node gets the unchosen nodes as args. With [`Policy::All`]
/// there are no unchosen nodes, so every node drops every other node
/// instead.
#[derive(Debug)]
pub struct DropGenerator {
    name: String,
    selector: Selector,
}

impl DropGenerator {
    pub fn new(policy: Policy) -> Self {
        Self::from_selector(Selector::new(policy))
    }

    pub fn with_seed(policy: Policy, seed: u64) -> Self {
        Self::from_selector(Selector::with_seed(policy, seed))
    }

    fn from_selector(selector: Selector) -> Self {
        Self {
            name: format!("{}_drop", selector.policy()),
            selector,
        }
    }
}

impl NemesisGenerator for DropGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, nodes: &[String]) -> Vec<Option<Operation>> {
        let mask = self.selector.select(nodes.len());
        let isolate_all = self.selector.policy() == Policy::All;

        let unchosen: Vec<&str> = nodes
            .iter()
            .zip(&mask)
            .filter(|(_, chosen)| !**chosen)
            .map(|(node, _)| node.as_str())
            .collect();

        nodes
            .iter()
            .zip(&mask)
            .map(|(node, &chosen)| {
                if !chosen {
                    return None;
                }
                let peers: Vec<&str> = if isolate_all {
                    nodes.iter().map(String::as_str).filter(|n| *n != node.as_str()).collect()
                } else {
                    unchosen.clone()
                };
                Some(Operation::new(DropNemesis::<Iptables>::NAME, peers))
            })
            .collect()
    }
}

/// Drops inbound traffic from the given peers; recover heals everything.
///
/// Args naming the local node are skipped. Recovery is idempotent.
#[derive(Debug, Clone)]
pub struct DropNemesis<F = Iptables> {
    node: String,
    firewall: F,
}

impl<F: Firewall> DropNemesis<F> {
    pub const NAME: &'static str = "drop";

    pub fn new(node: impl Into<String>, firewall: F) -> Self {
        Self {
            node: node.into(),
            firewall,
        }
    }
}

#[async_trait]
impl<F: Firewall + 'static> Nemesis for DropNemesis<F> {
    async fn invoke(&self, args: &[String]) -> Result<()> {
        for peer in args {
            if *peer == self.node {
                debug!(node = %self.node, "skipping drop of own node");
                continue;
            }
            info!(node = %self.node, %peer, "dropping traffic from peer");
            self.firewall.drop_from(peer).await?;
        }
        Ok(())
    }

    async fn recover(&self, _args: &[String]) -> Result<()> {
        info!(node = %self.node, "healing network");
        self.firewall.heal().await
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}
