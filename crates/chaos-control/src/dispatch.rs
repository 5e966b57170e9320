//! Nemesis dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use chaos_core::{NemesisGenerator, Operation};
use chaos_node::NodeClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters for one dispatcher lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Generator rounds that ran to completion; skipped rounds are not
    /// counted.
    pub rounds: usize,
    /// Faults that the agents applied and recovered.
    pub faults: usize,
    /// Faults that failed.
    pub failures: usize,
}

/// Result of one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RoundStats {
    pub scheduled: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Drives the generators against a fixed set of target nodes until
/// cancelled.
pub(crate) struct Dispatcher {
    generators: Arc<[Box<dyn NemesisGenerator>]>,
    targets: Vec<NodeClient>,
    names: Vec<String>,
    warmup: Duration,
    interval: Duration,
    token: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        generators: Arc<[Box<dyn NemesisGenerator>]>,
        targets: Vec<NodeClient>,
        warmup: Duration,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        let names = targets.iter().map(|c| c.node().to_string()).collect();
        Self {
            generators,
            targets,
            names,
            warmup,
            interval,
            token,
        }
    }

    /// Runs until the token is cancelled; returns once every in-flight fault
    /// of the current round has been recovered or has failed.
    pub(crate) async fn run(self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        if self.generators.is_empty() || self.targets.is_empty() {
            return stats;
        }

        if !self.pause(self.warmup).await {
            return stats;
        }

        info!(nodes = ?self.names, "nemesis dispatch started");
        'dispatch: loop {
            for generator in self.generators.iter() {
                if self.token.is_cancelled() {
                    break 'dispatch;
                }

                let Some(round) = self.run_round(generator.as_ref()).await else {
                    continue;
                };
                stats.rounds += 1;
                stats.faults += round.succeeded;
                stats.failures += round.failed;
            }

            if !self.pause(self.interval).await {
                break;
            }
        }
        info!(rounds = stats.rounds, faults = stats.faults, "nemesis dispatch stopped");
        stats
    }

    /// Generates one set of operations and waits for all of them.
    ///
    /// Returns `None` when the generator did not produce exactly one slot
    /// per target; such a round is skipped.
    pub(crate) async fn run_round(&self, generator: &dyn NemesisGenerator) -> Option<RoundStats> {
        let ops = generator.generate(&self.names);
        if ops.len() != self.names.len() {
            warn!(
                generator = generator.name(),
                expected = self.names.len(),
                got = ops.len(),
                "generator returned the wrong number of operations, skipping round"
            );
            return None;
        }

        let mut round = RoundStats::default();
        let mut tasks = JoinSet::new();
        for (client, op) in self.targets.iter().zip(ops) {
            let Some(op) = op else { continue };
            round.scheduled += 1;
            tasks.spawn(run_fault(client.clone(), op, self.token.clone()));
        }

        if round.scheduled == 0 {
            debug!(generator = generator.name(), "generator scheduled nothing");
            return Some(round);
        }
        info!(
            generator = generator.name(),
            faults = round.scheduled,
            nodes = ?self.names,
            "running nemesis generator"
        );

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => round.succeeded += 1,
                Ok(false) => round.failed += 1,
                Err(e) => {
                    warn!(error = %e, "fault task panicked");
                    round.failed += 1;
                }
            }
        }
        Some(round)
    }

    /// Sleeps unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.token.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

/// Gap between hold releases sent to an agent after cancellation.
const RELEASE_RETRY: Duration = Duration::from_millis(250);

/// Runs one fault to completion.
///
/// On cancellation the agent is told to end its holds, and the call is
/// still awaited so the fault is recovered before this returns.
async fn run_fault(client: NodeClient, op: Operation, token: CancellationToken) -> bool {
    debug!(node = client.node(), nemesis = %op.name, args = ?op.args, "running nemesis");

    let call = client.run_fault(&op);
    tokio::pin!(call);
    let finished = tokio::select! {
        result = &mut call => Some(result),
        () = token.cancelled() => None,
    };

    let result = match finished {
        Some(result) => result,
        None => {
            info!(node = client.node(), nemesis = %op.name, "run cancelled, releasing fault");
            let done = CancellationToken::new();
            let (result, ()) = tokio::join!(
                async {
                    let result = call.await;
                    done.cancel();
                    result
                },
                keep_releasing(&client, &done),
            );
            result
        }
    };

    match result {
        Ok(report) => {
            debug!(node = client.node(), nemesis = %op.name, held_ms = report.held_ms, "nemesis done");
            true
        }
        Err(e) => {
            warn!(node = client.node(), nemesis = %op.name, args = ?op.args, error = %e, "nemesis failed");
            false
        }
    }
}

/// Asks the agent to end its holds until `done` is cancelled. Repeats so a
/// hold that started after an earlier release is cut as well.
async fn keep_releasing(client: &NodeClient, done: &CancellationToken) {
    loop {
        tokio::select! {
            () = done.cancelled() => return,
            released = client.release_faults() => {
                if let Err(e) = released {
                    debug!(node = client.node(), error = %e, "hold release failed");
                }
            }
        }
        tokio::select! {
            () = done.cancelled() => return,
            () = tokio::time::sleep(RELEASE_RETRY) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chaos_core::{Nemesis, NemesisRegistry, Node, Registry};
    use chaos_nemesis::{KillGenerator, Policy};
    use chaos_core::ServiceKind;
    use chaos_node::{AgentState, serve};
    use tokio::net::TcpListener;

    use super::*;

    /// Fault primitive that appends `invoke:<node>` / `recover:<node>` to a
    /// shared journal.
    struct Journaling {
        node: String,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Nemesis for Journaling {
        async fn invoke(&self, _args: &[String]) -> chaos_core::Result<()> {
            self.journal.lock().unwrap().push(format!("invoke:{}", self.node));
            Ok(())
        }

        async fn recover(&self, _args: &[String]) -> chaos_core::Result<()> {
            self.journal.lock().unwrap().push(format!("recover:{}", self.node));
            Ok(())
        }

        fn name(&self) -> &str {
            "kill"
        }
    }

    /// Generator that always returns a single slot, whatever the node count.
    struct OneSlot;

    impl NemesisGenerator for OneSlot {
        fn name(&self) -> &str {
            "one_slot"
        }

        fn generate(&self, _nodes: &[String]) -> Vec<Option<Operation>> {
            vec![Some(Operation::new("kill", Vec::<String>::new()))]
        }
    }

    async fn spawn_agents(
        n: usize,
        hold: Duration,
        journal: &Arc<Mutex<Vec<String>>>,
    ) -> Vec<NodeClient> {
        let mut clients = Vec::new();
        for i in 1..=n {
            let name = format!("n{i}");
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let nemeses = NemesisRegistry::new().register(Journaling {
                node: name.clone(),
                journal: Arc::clone(journal),
            });
            let registry = Registry::new(chaos_core::DatabaseRegistry::new(), nemeses);
            let state = AgentState::new(&name, registry).with_fault_hold(hold);
            tokio::spawn(serve(listener, state));

            let node = Node::new(name, addr.to_string());
            clients.push(NodeClient::new(&node, Duration::from_secs(5)).unwrap());
        }
        clients
    }

    #[tokio::test]
    async fn all_kill_round_waits_for_every_fault() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let targets = spawn_agents(5, Duration::from_millis(30), &journal).await;

        let generators: Arc<[Box<dyn NemesisGenerator>]> = Arc::from(vec![
            Box::new(KillGenerator::new("noop", Policy::All, ServiceKind::All)) as Box<dyn NemesisGenerator>,
        ]);
        let dispatcher = Dispatcher::new(
            Arc::clone(&generators),
            targets,
            Duration::ZERO,
            Duration::ZERO,
            CancellationToken::new(),
        );

        let round = dispatcher.run_round(generators[0].as_ref()).await.unwrap();
        assert_eq!(
            round,
            RoundStats {
                scheduled: 5,
                succeeded: 5,
                failed: 0
            }
        );

        let journal = journal.lock().unwrap();
        assert_eq!(journal.len(), 10);
        for i in 1..=5 {
            assert!(journal.contains(&format!("invoke:n{i}")));
            assert!(journal.contains(&format!("recover:n{i}")));
        }
    }

    #[tokio::test]
    async fn dispatcher_stops_during_warmup() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let targets = spawn_agents(1, Duration::from_millis(30), &journal).await;
        let token = CancellationToken::new();

        let generators: Arc<[Box<dyn NemesisGenerator>]> = Arc::from(vec![
            Box::new(KillGenerator::new("noop", Policy::All, ServiceKind::All)) as Box<dyn NemesisGenerator>,
        ]);
        let dispatcher = Dispatcher::new(
            generators,
            targets,
            Duration::from_secs(600),
            Duration::ZERO,
            token.clone(),
        );

        let handle = tokio::spawn(dispatcher.run());
        token.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats, DispatchStats::default());
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_target_counts_as_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = NodeClient::new(&Node::new("n1", addr.to_string()), Duration::from_secs(1)).unwrap();
        let generators: Arc<[Box<dyn NemesisGenerator>]> = Arc::from(vec![
            Box::new(KillGenerator::new("noop", Policy::Random, ServiceKind::All)) as Box<dyn NemesisGenerator>,
        ]);
        let dispatcher = Dispatcher::new(
            Arc::clone(&generators),
            vec![client],
            Duration::ZERO,
            Duration::ZERO,
            CancellationToken::new(),
        );

        let round = dispatcher.run_round(generators[0].as_ref()).await.unwrap();
        assert_eq!(round.scheduled, 1);
        assert_eq!(round.failed, 1);
    }

    #[tokio::test]
    async fn wrong_length_round_is_skipped() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let targets = spawn_agents(3, Duration::from_millis(30), &journal).await;

        let generators: Arc<[Box<dyn NemesisGenerator>]> =
            Arc::from(vec![Box::new(OneSlot) as Box<dyn NemesisGenerator>]);
        let dispatcher = Dispatcher::new(
            Arc::clone(&generators),
            targets,
            Duration::ZERO,
            Duration::ZERO,
            CancellationToken::new(),
        );

        assert_eq!(dispatcher.run_round(generators[0].as_ref()).await, None);
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_round_releases_holds_and_waits_for_recovery() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let targets = spawn_agents(2, Duration::from_secs(30), &journal).await;
        let token = CancellationToken::new();

        let generators: Arc<[Box<dyn NemesisGenerator>]> = Arc::from(vec![
            Box::new(KillGenerator::new("noop", Policy::All, ServiceKind::All)) as Box<dyn NemesisGenerator>,
        ]);
        let dispatcher = Dispatcher::new(
            generators,
            targets,
            Duration::ZERO,
            Duration::from_secs(600),
            token.clone(),
        );

        let handle = tokio::spawn(dispatcher.run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatcher should stop well before the hold ends")
            .unwrap();
        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.faults, 2);
        assert_eq!(stats.failures, 0);

        let journal = journal.lock().unwrap();
        assert!(journal.contains(&"recover:n1".to_string()));
        assert!(journal.contains(&"recover:n2".to_string()));
    }
}
