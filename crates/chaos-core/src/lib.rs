//! # chaos-core: shared types for the chaos harness
//!
//! This crate holds everything the controller, the per-node agents and the
//! fault generators agree on:
//! - Identity types ([`Node`], [`ProcessId`], [`ServiceKind`])
//! - Fault operations ([`Operation`])
//! - Capability traits ([`Client`], [`ClientFactory`], [`Database`],
//!   [`Nemesis`], [`NemesisGenerator`], [`Verifier`])
//! - Explicit capability registries ([`Registry`], [`DatabaseRegistry`],
//!   [`NemesisRegistry`])
//! - No-op implementations used by tests and the `noop` workload case

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

mod client;
mod database;
mod error;
mod nemesis;
mod registry;
mod service;
mod verifier;

pub use client::{Client, ClientFactory, InvokeError, NoopClient, NoopClientFactory};
pub use database::{Database, NoopDatabase};
pub use error::{Error, Result};
pub use nemesis::{Nemesis, NemesisGenerator, Operation};
pub use registry::{DatabaseGuard, DatabaseRegistry, NemesisRegistry, Registry};
pub use service::ServiceKind;
pub use verifier::Verifier;

// ============================================================================
// Nodes
// ============================================================================

/// A cluster member: a symbolic name plus the address of its agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Symbolic name (e.g. `pd`, `n1`).
    pub name: String,
    /// `host:port` of the node's remote agent.
    pub addr: String,
}

impl Node {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }

    /// Builds a node whose agent listens on `name:port`.
    pub fn with_port(name: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        let addr = format!("{name}:{port}");
        Self { name, addr }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ============================================================================
// Process IDs
// ============================================================================

/// Identifies one logical client operation across its Invoke/Return pair.
///
/// Allocated from a single shared counter starting at 1, so IDs are unique
/// and strictly increasing in allocation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProcessId(u64);

impl ProcessId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProcessId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ProcessId> for u64 {
    fn from(id: ProcessId) -> Self {
        id.0
    }
}
