//! Controller-side handle to one remote agent.

use std::time::Duration;

use chaos_agent_protocol::{
    Ack, ErrorBody, FaultReport, HealthResponse, Operation, RunningResponse, ServiceRequest,
    SetupRequest, routes,
};
use chaos_core::{Node, ServiceKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{NodeError, Result};

/// Talks to the agent of one node.
///
/// Every call is bounded by the timeout given at construction. Clones share
/// the connection pool.
#[derive(Debug, Clone)]
pub struct NodeClient {
    node: String,
    base_url: String,
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(node: &Node, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| NodeError::Transport {
                node: node.name.clone(),
                source,
            })?;

        Ok(Self {
            node: node.name.clone(),
            base_url: format!("http://{}", node.addr),
            http,
        })
    }

    /// Name of the node this client talks to.
    pub fn node(&self) -> &str {
        &self.node
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send(self.http.get(self.url(routes::HEALTH))).await
    }

    /// Installs database `db`; `nodes` is the full cluster membership.
    pub async fn set_up_database(&self, db: &str, nodes: &[String]) -> Result<()> {
        let body = SetupRequest {
            nodes: nodes.to_vec(),
        };
        self.post::<_, Ack>(&routes::db_setup(db), &body).await?;
        Ok(())
    }

    pub async fn tear_down_database(&self, db: &str, nodes: &[String]) -> Result<()> {
        let body = SetupRequest {
            nodes: nodes.to_vec(),
        };
        self.post::<_, Ack>(&routes::db_teardown(db), &body).await?;
        Ok(())
    }

    pub async fn start_service(&self, db: &str, service: ServiceKind) -> Result<()> {
        self.post::<_, Ack>(&routes::db_start(db), &ServiceRequest { service })
            .await?;
        Ok(())
    }

    pub async fn kill_service(&self, db: &str, service: ServiceKind) -> Result<()> {
        self.post::<_, Ack>(&routes::db_kill(db), &ServiceRequest { service })
            .await?;
        Ok(())
    }

    pub async fn is_running(&self, db: &str, service: ServiceKind) -> Result<bool> {
        let request = self
            .http
            .get(self.url(&routes::db_running(db)))
            .query(&ServiceRequest { service });
        let response: RunningResponse = self.send(request).await?;
        Ok(response.running)
    }

    /// Applies `op` on the node and waits until it has been recovered.
    pub async fn run_fault(&self, op: &Operation) -> Result<FaultReport> {
        self.post(routes::NEMESIS_RUN, op).await
    }

    /// Ends every fault hold in progress on the node; pending
    /// [`run_fault`](Self::run_fault) calls then return once recovered.
    pub async fn release_faults(&self) -> Result<()> {
        self.post::<_, Ack>(routes::NEMESIS_RELEASE, &()).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    async fn send<R: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<R> {
        let response = request.send().await.map_err(|e| self.transport(e))?;
        let status = response.status();
        debug!(node = %self.node, url = %response.url(), %status, "agent replied");

        if status.is_success() {
            return response.json().await.map_err(|e| self.transport(e));
        }

        let text = response.text().await.map_err(|e| self.transport(e))?;
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(NodeError::Remote {
            node: self.node.clone(),
            status: status.as_u16(),
            message,
        })
    }

    fn transport(&self, source: reqwest::Error) -> NodeError {
        NodeError::Transport {
            node: self.node.clone(),
            source,
        }
    }
}
