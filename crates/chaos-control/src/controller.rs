//! The controller: owns the cluster handles and sequences the phases of a
//! chaos run.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chaos_core::{Client, ClientFactory, InvokeError, NemesisGenerator, Node, ProcessId, ServiceKind};
use chaos_history::{HistoryError, Recorder};
use chaos_node::NodeClient;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchStats, Dispatcher};
use crate::{Config, ControlError, Result};

/// Hands out process IDs: 1, 2, 3, ... never reused.
#[derive(Debug, Default)]
pub struct ProcessIds {
    last: AtomicU64,
}

impl ProcessIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> ProcessId {
        ProcessId::new(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Number of IDs handed out so far.
    pub fn allocated(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Operations recorded (one Invoke plus one Return each).
    pub operations: u64,
    /// True when the run ended because the controller was cancelled.
    pub cancelled: bool,
    pub nemesis: DispatchStats,
}

/// Controls one cluster for one chaos run.
///
/// The node set is fixed at construction; every operation takes the indices
/// of the nodes it applies to.
pub struct Controller<C: Client> {
    cfg: Config,
    nodes: Vec<Node>,
    names: Arc<[String]>,
    node_clients: Vec<NodeClient>,
    clients: Vec<Arc<C>>,
    generators: Arc<[Box<dyn NemesisGenerator>]>,
    /// Created by the first [`run`](Self::run); lifecycle phases leave an
    /// existing history file alone.
    recorder: OnceCell<Arc<Recorder>>,
    proc_ids: Arc<ProcessIds>,
    cancel: CancellationToken,
}

impl<C: Client> Controller<C> {
    /// Adjusts and validates `cfg`, then creates one node client plus one
    /// workload client per node.
    pub fn new<F>(
        mut cfg: Config,
        nodes: Vec<Node>,
        factory: &F,
        generators: Vec<Box<dyn NemesisGenerator>>,
    ) -> Result<Self>
    where
        F: ClientFactory<Client = C>,
    {
        cfg.adjust();
        cfg.validate()?;
        if nodes.is_empty() {
            return Err(ControlError::InvalidConfig("empty node list".to_string()));
        }

        let node_clients = nodes
            .iter()
            .map(|node| {
                NodeClient::new(node, cfg.rpc_timeout).map_err(|source| ControlError::Node {
                    node: node.name.clone(),
                    operation: "create node client",
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let clients = nodes.iter().map(|n| Arc::new(factory.create(&n.name))).collect();
        let names: Arc<[String]> = nodes.iter().map(|n| n.name.clone()).collect();

        info!(
            db = %cfg.db,
            nodes = ?names,
            history = %cfg.history.display(),
            generators = ?generators.iter().map(|g| g.name()).collect::<Vec<_>>(),
            "controller created"
        );

        Ok(Self {
            cfg,
            nodes,
            names,
            node_clients,
            clients,
            generators: Arc::from(generators),
            recorder: OnceCell::new(),
            proc_ids: Arc::new(ProcessIds::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The history recorder, once a run has created it.
    pub fn history(&self) -> Option<&Recorder> {
        self.recorder.get().map(AsRef::as_ref)
    }

    /// Token that cancels every operation of this controller, e.g. on
    /// SIGINT.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Every node index, in order.
    pub fn all_indices(&self) -> Vec<usize> {
        (0..self.nodes.len()).collect()
    }

    // ========================================================================
    // Lifecycle phases
    // ========================================================================

    /// Installs the database on `subset`. Any failure is returned.
    pub async fn setup_databases(&self, subset: &[usize]) -> Result<()> {
        let db = self.cfg.db.clone();
        let names = self.names.to_vec();
        let results = self
            .for_each_node(subset, "set up database", move |client| {
                let db = db.clone();
                let names = names.clone();
                async move { client.set_up_database(&db, &names).await }
            })
            .await?;
        first_error(results)
    }

    /// Removes the database from `subset`. Failures are logged only.
    pub async fn tear_down_databases(&self, subset: &[usize]) -> Result<()> {
        let db = self.cfg.db.clone();
        let names = self.names.to_vec();
        self.for_each_node(subset, "tear down database", move |client| {
            let db = db.clone();
            let names = names.clone();
            async move { client.tear_down_database(&db, &names).await }
        })
        .await?;
        Ok(())
    }

    /// Starts `service` on `subset`. Any failure is returned.
    pub async fn start_services(&self, subset: &[usize], service: ServiceKind) -> Result<()> {
        let db = self.cfg.db.clone();
        let results = self
            .for_each_node(subset, "start service", move |client| {
                let db = db.clone();
                async move { client.start_service(&db, service).await }
            })
            .await?;
        first_error(results)
    }

    /// Kills `service` on `subset`. Failures are logged only.
    pub async fn kill_services(&self, subset: &[usize], service: ServiceKind) -> Result<()> {
        let db = self.cfg.db.clone();
        self.for_each_node(subset, "kill service", move |client| {
            let db = db.clone();
            async move { client.kill_service(&db, service).await }
        })
        .await?;
        Ok(())
    }

    /// Closes the workload clients of `subset`. Failures are logged only.
    pub async fn close_clients(&self, subset: &[usize]) -> Result<()> {
        let indices = self.resolve(subset)?;
        let mut tasks = JoinSet::new();
        for i in indices {
            let client = Arc::clone(&self.clients[i]);
            let names = self.names.to_vec();
            let node = self.names[i].clone();
            tasks.spawn(async move {
                info!(%node, "closing workload client");
                if let Err(e) = client.close(&names, &node).await {
                    warn!(%node, error = %e, "close workload client failed");
                }
            });
        }
        join_all(tasks).await
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// Creates the history file, runs the workload on `subset` while
    /// faulting `nemesis_subset`, then closes the clients and the history.
    ///
    /// Returns once every worker has stopped (request count, run deadline or
    /// cancellation) and every fault in flight has been recovered. A history
    /// write failure stops the run and is returned.
    pub async fn run(
        &self,
        subset: &[usize],
        init_data: bool,
        nemesis_subset: &[usize],
    ) -> Result<RunSummary> {
        let recorder = self
            .recorder
            .get_or_try_init(|| async { Recorder::create(&self.cfg.history).map(Arc::new) })
            .await?;
        let outcome = self
            .run_inner(recorder, subset, init_data, nemesis_subset)
            .await;

        let closed = match recorder.close() {
            Err(HistoryError::Closed(_)) if outcome.is_err() => Ok(()),
            other => other,
        };
        match (outcome, closed) {
            (Ok(summary), Ok(())) => {
                info!(
                    operations = summary.operations,
                    cancelled = summary.cancelled,
                    rounds = summary.nemesis.rounds,
                    history = %recorder.path().display(),
                    "run finished"
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => {
                error!(error = %e, "closing history failed");
                Err(e.into())
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "closing history after failed run");
                }
                error!(error = %e, "run failed");
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        recorder: &Arc<Recorder>,
        subset: &[usize],
        init_data: bool,
        nemesis_subset: &[usize],
    ) -> Result<RunSummary> {
        let workers = self.resolve(subset)?;
        let targets = self.resolve(nemesis_subset)?;

        self.setup_clients(&workers, init_data).await?;

        let run_token = self.cancel.child_token();
        let deadline = Instant::now() + self.cfg.run_time;

        let mut tasks = JoinSet::new();
        for &i in &workers {
            let worker = Worker {
                node: self.names[i].clone(),
                client: Arc::clone(&self.clients[i]),
                recorder: Arc::clone(recorder),
                proc_ids: Arc::clone(&self.proc_ids),
                request_count: self.cfg.request_count,
                request_timeout: self.cfg.request_timeout,
                deadline,
                token: run_token.clone(),
            };
            tasks.spawn(worker.run());
        }

        let dispatch_token = run_token.child_token();
        let dispatcher = tokio::spawn(
            Dispatcher::new(
                Arc::clone(&self.generators),
                targets.iter().map(|&i| self.node_clients[i].clone()).collect(),
                self.cfg.warmup,
                self.cfg.nemesis_interval,
                dispatch_token.clone(),
            )
            .run(),
        );

        let mut failure = None;
        let mut operations = 0;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| ControlError::Task(e.to_string()))
                .and_then(|r| r.map_err(ControlError::from));
            match result {
                Ok(count) => operations += count,
                Err(e) => {
                    if failure.is_none() {
                        error!(error = %e, "worker failed, stopping run");
                        run_token.cancel();
                        failure = Some(e);
                    }
                }
            }
        }

        dispatch_token.cancel();
        let nemesis = match dispatcher.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "nemesis dispatcher panicked");
                DispatchStats::default()
            }
        };

        self.close_clients(&workers).await?;

        if let Some(e) = failure {
            return Err(e);
        }
        Ok(RunSummary {
            operations,
            cancelled: self.cancel.is_cancelled(),
            nemesis,
        })
    }

    /// Sets up the workload clients of `indices`; the first one seeds the
    /// initial data when `init_data` is set.
    async fn setup_clients(&self, indices: &[usize], init_data: bool) -> Result<()> {
        let mut tasks = JoinSet::new();
        for (position, &i) in indices.iter().enumerate() {
            let client = Arc::clone(&self.clients[i]);
            let node = self.names[i].clone();
            let init = init_data && position == 0;
            tasks.spawn(async move {
                info!(%node, init_data = init, "setting up workload client");
                let result = client.setup(&node, init).await;
                (node, result)
            });
        }

        let mut first = None;
        while let Some(joined) = tasks.join_next().await {
            let (node, result) = joined.map_err(|e| ControlError::Task(e.to_string()))?;
            if let Err(source) = result {
                error!(%node, error = %source, "set up workload client failed");
                first.get_or_insert(ControlError::Client { node, source });
            }
        }
        first.map_or(Ok(()), Err)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn resolve(&self, subset: &[usize]) -> Result<Vec<usize>> {
        let len = self.nodes.len();
        subset
            .iter()
            .map(|&index| {
                if index < len {
                    Ok(index)
                } else {
                    Err(ControlError::InvalidNodeIndex { index, len })
                }
            })
            .collect()
    }

    /// Runs `op` against the agent of every node in `subset` concurrently and
    /// collects every outcome. Failures are logged here.
    async fn for_each_node<Op, Fut>(
        &self,
        subset: &[usize],
        operation: &'static str,
        op: Op,
    ) -> Result<Vec<Result<()>>>
    where
        Op: Fn(NodeClient) -> Fut,
        Fut: Future<Output = chaos_node::Result<()>> + Send + 'static,
    {
        let indices = self.resolve(subset)?;
        let mut tasks = JoinSet::new();
        for i in indices {
            let client = self.node_clients[i].clone();
            let node = self.names[i].clone();
            let call = op(client);
            let token = self.cancel.clone();
            tasks.spawn(async move {
                info!(%node, operation, "calling agent");
                tokio::select! {
                    () = token.cancelled() => Err(ControlError::Cancelled),
                    result = call => result.map_err(|source| {
                        error!(%node, operation, error = %source, "agent call failed");
                        ControlError::Node { node, operation, source }
                    }),
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.map_err(|e| ControlError::Task(e.to_string()))?);
        }
        Ok(results)
    }
}

/// One workload worker: strictly sequential operations against one node.
struct Worker<C: Client> {
    node: String,
    client: Arc<C>,
    recorder: Arc<Recorder>,
    proc_ids: Arc<ProcessIds>,
    request_count: usize,
    request_timeout: std::time::Duration,
    deadline: Instant,
    token: CancellationToken,
}

impl<C: Client> Worker<C> {
    async fn run(self) -> std::result::Result<u64, HistoryError> {
        info!(node = %self.node, "worker running");
        let mut done = 0;

        for _ in 0..self.request_count {
            if self.token.is_cancelled() || Instant::now() >= self.deadline {
                break;
            }

            let proc_id = self.proc_ids.next();
            let request = self.client.next_request();
            self.recorder.record_request(proc_id, &self.node, &request)?;

            let invoke_deadline = self.deadline.min(Instant::now() + self.request_timeout);
            let response = tokio::select! {
                () = self.token.cancelled() => Err(InvokeError::Cancelled),
                result = tokio::time::timeout_at(invoke_deadline, self.client.invoke(&self.node, &request)) => {
                    result.unwrap_or(Err(InvokeError::Timeout))
                }
            };

            if let Err(e) = &response {
                debug!(node = %self.node, %proc_id, error = %e, "invocation failed");
            }
            self.recorder.record_response(proc_id, &response)?;
            done += 1;

            // A client that answers without awaiting never returns Pending.
            tokio::task::yield_now().await;
        }

        info!(node = %self.node, operations = done, "worker stopped");
        Ok(done)
    }
}

fn first_error(results: Vec<Result<()>>) -> Result<()> {
    results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
}

async fn join_all(mut tasks: JoinSet<()>) -> Result<()> {
    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| ControlError::Task(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_ids_start_at_one_and_increase() {
        let ids = ProcessIds::new();
        assert_eq!(ids.next(), ProcessId::new(1));
        assert_eq!(ids.next(), ProcessId::new(2));
        assert_eq!(ids.allocated(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn process_ids_are_unique_across_tasks() {
        let ids = Arc::new(ProcessIds::new());
        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let ids = Arc::clone(&ids);
            tasks.spawn(async move { (0..100).map(|_| ids.next().as_u64()).collect::<Vec<_>>() });
        }

        let mut all = Vec::new();
        while let Some(batch) = tasks.join_next().await {
            all.extend(batch.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=800).collect::<Vec<_>>());
    }
}
