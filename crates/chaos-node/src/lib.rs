//! # chaos-node: the node agent and its client
//!
//! [`serve`] runs on every node under test and executes database lifecycle
//! calls and faults locally. [`NodeClient`] is the controller's handle to one
//! such agent. Both sides share the wire types of `chaos-agent-protocol`.

mod agent;
mod client;
mod error;

pub use agent::{AgentError, AgentState, DEFAULT_FAULT_HOLD, router, serve};
pub use client::NodeClient;
pub use error::{NodeError, Result};
