//! Wire protocol between the chaos controller and the per-node agents.
//!
//! The agent speaks HTTP/JSON. Every route takes and returns one of the
//! types below; failures come back as [`ErrorBody`] with a non-2xx status.
//!
//! # Routes
//!
//! | method | path | request | response |
//! |---|---|---|---|
//! | GET | [`routes::HEALTH`] | – | [`HealthResponse`] |
//! | POST | [`routes::DB_SETUP`] | [`SetupRequest`] | [`Ack`] |
//! | POST | [`routes::DB_TEARDOWN`] | [`SetupRequest`] | [`Ack`] |
//! | POST | [`routes::DB_START`] | [`ServiceRequest`] | [`Ack`] |
//! | POST | [`routes::DB_KILL`] | [`ServiceRequest`] | [`Ack`] |
//! | GET | [`routes::DB_RUNNING`] | [`ServiceRequest`] as query | [`RunningResponse`] |
//! | POST | [`routes::NEMESIS_RUN`] | [`Operation`] | [`FaultReport`] |
//! | POST | [`routes::NEMESIS_RELEASE`] | – | [`Ack`] |
//!
//! A `NEMESIS_RUN` call holds its fault for the agent's hold time. Releasing
//! ends every hold in progress at once; the pending calls then recover and
//! reply as usual.
//!
//! # Example
//!
//! ```rust
//! use chaos_agent_protocol::{ServiceRequest, routes};
//! use chaos_core::ServiceKind;
//!
//! let body = ServiceRequest { service: ServiceKind::Storage };
//! assert_eq!(routes::db_start("tidb"), "/db/tidb/start");
//! assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"service":"storage"}"#);
//! ```

use chaos_core::ServiceKind;
use serde::{Deserialize, Serialize};

pub use chaos_core::Operation;

// ============================================================================
// Requests
// ============================================================================

/// Body of database setup and teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupRequest {
    /// Full cluster membership, in controller order.
    pub nodes: Vec<String>,
}

/// Body of service start/kill, and query of the running check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub service: ServiceKind,
}

// ============================================================================
// Responses
// ============================================================================

/// Successful lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Node that executed the call.
    pub node: String,
}

/// Answer to the running check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningResponse {
    pub running: bool,
}

/// Liveness plus what the agent can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub node: String,
    /// Registered database names, sorted.
    pub databases: Vec<String>,
    /// Registered fault primitive names, sorted.
    pub nemeses: Vec<String>,
}

/// A fault that was applied, held and recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub node: String,
    pub operation: Operation,
    /// How long the fault was held before recovery.
    pub held_ms: u64,
}

/// Error reply for every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ============================================================================
// Routes
// ============================================================================

/// Route templates (axum path syntax) and builders for concrete paths.
pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const DB_SETUP: &str = "/db/{name}/setup";
    pub const DB_TEARDOWN: &str = "/db/{name}/teardown";
    pub const DB_START: &str = "/db/{name}/start";
    pub const DB_KILL: &str = "/db/{name}/kill";
    pub const DB_RUNNING: &str = "/db/{name}/running";
    pub const NEMESIS_RUN: &str = "/nemesis/run";
    pub const NEMESIS_RELEASE: &str = "/nemesis/release";

    pub fn db_setup(name: &str) -> String {
        format!("/db/{name}/setup")
    }

    pub fn db_teardown(name: &str) -> String {
        format!("/db/{name}/teardown")
    }

    pub fn db_start(name: &str) -> String {
        format!("/db/{name}/start")
    }

    pub fn db_kill(name: &str) -> String {
        format!("/db/{name}/kill")
    }

    pub fn db_running(name: &str) -> String {
        format!("/db/{name}/running")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn route_builders_match_templates() {
        let pairs = [
            (routes::DB_SETUP, routes::db_setup("noop")),
            (routes::DB_TEARDOWN, routes::db_teardown("noop")),
            (routes::DB_START, routes::db_start("noop")),
            (routes::DB_KILL, routes::db_kill("noop")),
            (routes::DB_RUNNING, routes::db_running("noop")),
        ];
        for (template, path) in pairs {
            assert_eq!(template.replace("{name}", "noop"), path);
        }
    }

    #[test]
    fn fault_report_roundtrip() {
        let report = FaultReport {
            node: "n3".to_string(),
            operation: Operation::new("drop", ["n1", "n2"]),
            held_ms: 1500,
        };

        let json = serde_json::to_string(&report).unwrap();
        let decoded: FaultReport = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, report);
        assert!(json.contains(r#""operation":{"name":"drop","args":["n1","n2"]}"#));
    }

    #[test]
    fn service_request_accepts_aliases_only_via_from_str() {
        let err = serde_json::from_str::<ServiceRequest>(r#"{"service":"tikv"}"#);
        assert!(err.is_err());

        let ok: ServiceRequest = serde_json::from_str(r#"{"service":"gateway"}"#).unwrap();
        assert_eq!(ok.service, ServiceKind::Gateway);
    }

    #[test]
    fn error_body_shape() {
        let body = ErrorBody {
            error: "database tidb is not registered".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"error": "database tidb is not registered"})
        );
    }

    proptest! {
        #[test]
        fn setup_request_roundtrip(nodes in proptest::collection::vec("[a-z][a-z0-9]{0,8}", 0..8)) {
            let request = SetupRequest { nodes };
            let json = serde_json::to_string(&request).unwrap();
            let decoded: SetupRequest = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(decoded, request);
        }
    }
}
