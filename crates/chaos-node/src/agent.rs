//! The remote agent: an HTTP server exposing one node's databases and fault
//! primitives to the controller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chaos_agent_protocol::{
    Ack, ErrorBody, FaultReport, HealthResponse, Operation, RunningResponse, ServiceRequest,
    SetupRequest, routes,
};
use chaos_core::{Error, Nemesis, Registry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default pause between fault invoke and recover.
pub const DEFAULT_FAULT_HOLD: Duration = Duration::from_secs(5);

/// Shared state for all agent handlers.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// Name of the node this agent runs on.
    pub node: String,

    /// Databases and fault primitives, built once at startup.
    pub registry: Registry,

    /// How long a fault stays applied before it is recovered.
    pub fault_hold: Duration,

    /// Cancelled when the agent shuts down; cuts fault holds short.
    pub shutdown: CancellationToken,

    /// Parent of the holds in progress; replaced on every release.
    holds: Arc<Mutex<CancellationToken>>,
}

impl AgentState {
    pub fn new(node: impl Into<String>, registry: Registry) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            node: node.into(),
            registry,
            fault_hold: DEFAULT_FAULT_HOLD,
            holds: Arc::new(Mutex::new(shutdown.child_token())),
            shutdown,
        }
    }

    pub fn with_fault_hold(mut self, hold: Duration) -> Self {
        self.fault_hold = hold;
        self
    }

    /// Ends every fault hold in progress. Later faults hold normally.
    pub fn release_holds(&self) {
        let mut holds = self.holds.lock().unwrap_or_else(PoisonError::into_inner);
        holds.cancel();
        *holds = self.shutdown.child_token();
    }

    /// Token for one new hold, cancelled by a release or by shutdown.
    fn hold_token(&self) -> CancellationToken {
        self.holds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }
}

/// Builds the agent router.
pub fn router(state: AgentState) -> Router {
    Router::new()
        .route(routes::HEALTH, get(health))
        .route(routes::DB_SETUP, post(set_up))
        .route(routes::DB_TEARDOWN, post(tear_down))
        .route(routes::DB_START, post(start))
        .route(routes::DB_KILL, post(kill))
        .route(routes::DB_RUNNING, get(running))
        .route(routes::NEMESIS_RUN, post(run_nemesis))
        .route(routes::NEMESIS_RELEASE, post(release))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not found") })
        .with_state(state)
}

/// Serves the agent on `listener` until `state.shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: AgentState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    info!(node = %state.node, addr = ?listener.local_addr()?, "agent listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

// ============================================================================
// Errors
// ============================================================================

/// Maps capability errors onto HTTP statuses.
#[derive(Debug)]
pub struct AgentError(Error);

impl From<Error> for AgentError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else if self.0.is_bad_request() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type HandlerResult<T> = Result<Json<T>, AgentError>;

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<AgentState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        node: state.node.clone(),
        databases: state.registry.databases.names(),
        nemeses: state.registry.nemeses.names(),
    })
}

async fn set_up(
    State(state): State<AgentState>,
    Path(name): Path<String>,
    Json(req): Json<SetupRequest>,
) -> HandlerResult<Ack> {
    let db = state.registry.databases.lock(&name).await?;
    info!(db = %name, node = %state.node, nodes = ?req.nodes, "setting up database");

    db.set_up(&req.nodes).await.inspect_err(|e| {
        error!(db = %name, node = %state.node, error = %e, "set up database failed");
    })?;
    Ok(ack(&state))
}

async fn tear_down(
    State(state): State<AgentState>,
    Path(name): Path<String>,
    Json(req): Json<SetupRequest>,
) -> HandlerResult<Ack> {
    let db = state.registry.databases.lock(&name).await?;
    info!(db = %name, node = %state.node, "tearing down database");

    db.tear_down(&req.nodes).await.inspect_err(|e| {
        error!(db = %name, node = %state.node, error = %e, "tear down database failed");
    })?;
    Ok(ack(&state))
}

async fn start(
    State(state): State<AgentState>,
    Path(name): Path<String>,
    Json(req): Json<ServiceRequest>,
) -> HandlerResult<Ack> {
    let db = state.registry.databases.lock(&name).await?;
    info!(db = %name, node = %state.node, service = %req.service, "starting service");

    db.start(req.service).await.inspect_err(|e| {
        error!(db = %name, node = %state.node, service = %req.service, error = %e, "start service failed");
    })?;
    Ok(ack(&state))
}

async fn kill(
    State(state): State<AgentState>,
    Path(name): Path<String>,
    Json(req): Json<ServiceRequest>,
) -> HandlerResult<Ack> {
    let db = state.registry.databases.lock(&name).await?;
    info!(db = %name, node = %state.node, service = %req.service, "killing service");

    db.kill(req.service).await.inspect_err(|e| {
        warn!(db = %name, node = %state.node, service = %req.service, error = %e, "kill service failed");
    })?;
    Ok(ack(&state))
}

async fn running(
    State(state): State<AgentState>,
    Path(name): Path<String>,
    Query(req): Query<ServiceRequest>,
) -> HandlerResult<RunningResponse> {
    let db = state.registry.databases.get(&name)?;
    Ok(Json(RunningResponse {
        running: db.is_running(req.service).await,
    }))
}

/// Applies a fault, holds it, then recovers.
///
/// The work runs in its own task so recovery always happens. The hold ends
/// early on release, on shutdown, or when this handler is dropped because
/// the controller went away.
async fn run_nemesis(
    State(state): State<AgentState>,
    Json(op): Json<Operation>,
) -> Result<Json<FaultReport>, AgentError> {
    let nemesis = state.registry.nemeses.get(&op.name)?;

    let hold = state.hold_token();
    let _abandoned = hold.clone().drop_guard();
    let task = tokio::spawn(apply_fault(
        nemesis,
        op.clone(),
        state.node.clone(),
        state.fault_hold,
        hold,
    ));

    let held = match task.await {
        Ok(result) => result?,
        Err(e) => {
            error!(node = %state.node, nemesis = %op.name, error = %e, "fault task panicked");
            return Err(AgentError(Error::Command {
                command: op.name,
                message: e.to_string(),
            }));
        }
    };

    Ok(Json(FaultReport {
        node: state.node,
        operation: op,
        held_ms: u64::try_from(held.as_millis()).unwrap_or(u64::MAX),
    }))
}

async fn apply_fault(
    nemesis: Arc<dyn Nemesis>,
    op: Operation,
    node: String,
    hold: Duration,
    cut: CancellationToken,
) -> chaos_core::Result<Duration> {
    info!(%node, nemesis = %op.name, args = ?op.args, "invoking fault");
    let invoked = nemesis.invoke(&op.args).await;

    let started = Instant::now();
    match &invoked {
        Ok(()) => {
            tokio::select! {
                () = cut.cancelled() => {
                    info!(%node, nemesis = %op.name, "hold cut short, recovering early");
                }
                () = tokio::time::sleep(hold) => {}
            }
        }
        Err(e) => {
            warn!(%node, nemesis = %op.name, args = ?op.args, error = %e, "fault invoke failed, recovering");
        }
    }
    let held = started.elapsed();

    info!(%node, nemesis = %op.name, "recovering fault");
    let recovered = nemesis.recover(&op.args).await;
    if let Err(e) = &recovered {
        error!(%node, nemesis = %op.name, args = ?op.args, error = %e, "fault recover failed");
    }

    invoked?;
    recovered?;
    Ok(held)
}

async fn release(State(state): State<AgentState>) -> Json<Ack> {
    info!(node = %state.node, "releasing fault holds");
    state.release_holds();
    ack(&state)
}

fn ack(state: &AgentState) -> Json<Ack> {
    Json(Ack {
        node: state.node.clone(),
    })
}
