//! Chaos run orchestration.
//!
//! The [`Controller`] composes the other crates into the phases of a run:
//! - Database setup and teardown through the node agents
//! - Service start/kill
//! - The run itself: one workload worker per node recording every operation
//!   into the history, plus a nemesis dispatcher injecting faults
//!
//! All concurrency lives here; agents, clients and generators are called
//! from spawned tasks under one cancellation token per controller.

mod config;
mod controller;
mod dispatch;
mod error;

pub use config::{
    Config, DEFAULT_HISTORY, DEFAULT_NEMESIS_INTERVAL, DEFAULT_NODE_PORT, DEFAULT_REQUEST_COUNT,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_RPC_TIMEOUT, DEFAULT_RUN_TIME, DEFAULT_WARMUP,
};
pub use controller::{Controller, ProcessIds, RunSummary};
pub use dispatch::DispatchStats;
pub use error::{ControlError, Result};
