//! Workload client capability.
//!
//! A workload is the part of a test that knows what requests mean. The
//! controller only needs to ask it for the next request, hand that request to
//! one node, and record whatever comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Result;

/// Why a workload invocation did not produce a response.
///
/// The distinction matters to the verifier: a `Failed` operation is known not
/// to have taken effect, anything else may or may not have.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum InvokeError {
    /// The database rejected the request; it did not take effect.
    #[error("operation failed: {0}")]
    Failed(String),

    /// The request may or may not have taken effect.
    #[error("operation outcome unknown: {0}")]
    Indeterminate(String),

    /// The invocation deadline elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The run was cancelled while the request was in flight.
    #[error("operation cancelled")]
    Cancelled,
}

impl InvokeError {
    /// Returns true when the operation definitely did not take effect.
    pub fn is_definite(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Applies requests to the database through one node.
///
/// One client is created per node and is never shared across nodes, but the
/// controller calls it from several tasks over a run, so methods take `&self`.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Request payload, written into the history as the Invoke value.
    type Request: Serialize + Send + Sync + 'static;

    /// Response payload, written into the history as the Return value.
    type Response: Serialize + Send + 'static;

    /// Prepares the client for `node`, optionally seeding initial data.
    async fn setup(&self, node: &str, init_data: bool) -> Result<()>;

    /// Releases the client. `nodes` is the whole cluster.
    async fn close(&self, nodes: &[String], node: &str) -> Result<()>;

    /// Applies `request` against `node`.
    async fn invoke(
        &self,
        node: &str,
        request: &Self::Request,
    ) -> std::result::Result<Self::Response, InvokeError>;

    /// Generates the next request to invoke.
    fn next_request(&self) -> Self::Request;
}

/// Creates one [`Client`] per node.
pub trait ClientFactory: Send + Sync {
    type Client: Client;

    fn create(&self, node: &str) -> Self::Client;
}

/// Factory for [`NoopClient`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClientFactory;

impl ClientFactory for NoopClientFactory {
    type Client = NoopClient;

    fn create(&self, _node: &str) -> NoopClient {
        NoopClient
    }
}

/// Client that accepts every request and always answers `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClient;

#[async_trait]
impl Client for NoopClient {
    type Request = u64;
    type Response = u64;

    async fn setup(&self, _node: &str, _init_data: bool) -> Result<()> {
        Ok(())
    }

    async fn close(&self, _nodes: &[String], _node: &str) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, _node: &str, _request: &u64) -> std::result::Result<u64, InvokeError> {
        Ok(0)
    }

    fn next_request(&self) -> u64 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_client_answers_zero() {
        let client = NoopClientFactory.create("n1");
        client.setup("n1", true).await.unwrap();

        let request = client.next_request();
        assert_eq!(request, 1);
        assert_eq!(client.invoke("n1", &request).await, Ok(0));

        client.close(&["n1".to_string()], "n1").await.unwrap();
    }

    #[test]
    fn invoke_error_serializes_with_type_tag() {
        let json = serde_json::to_value(InvokeError::Failed("no quorum".into())).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["message"], "no quorum");

        let json = serde_json::to_value(InvokeError::Timeout).unwrap();
        assert_eq!(json["type"], "timeout");
    }

    #[test]
    fn only_failed_is_definite() {
        assert!(InvokeError::Failed(String::new()).is_definite());
        assert!(!InvokeError::Indeterminate(String::new()).is_definite());
        assert!(!InvokeError::Timeout.is_definite());
        assert!(!InvokeError::Cancelled.is_definite());
    }
}
