//! `chaos run`: workload under faults, then history verification.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chaos_config::ChaosConfig;
use chaos_core::{ClientFactory, NemesisGenerator, NoopClientFactory, Verifier};
use chaos_control::Controller;
use chaos_history::HistoryVerifier;
use tracing::{error, info, warn};

use super::cases::Case;
use super::{control_config, load_config, or_all, shutdown_signal};
use crate::{GlobalArgs, RunArgs};

/// Everything `run` needs once flags and files are merged.
#[derive(Debug)]
struct RunPlan {
    case: Case,
    nodes: Vec<usize>,
    init_data: bool,
    nemesis_nodes: Vec<usize>,
}

pub async fn run(global: &GlobalArgs, args: RunArgs) -> Result<()> {
    let mut config = load_config(global)?;
    let generator_list = apply_run_args(&mut config, &args);

    let case: Case = config.control.case.parse()?;
    let generators = chaos_nemesis::generators_from_list(&generator_list, &config.control.db)
        .context("Invalid nemesis list")?;

    let len = config.cluster.nodes.len();
    let nemesis_nodes = if generators.is_empty() {
        Vec::new()
    } else {
        or_all(&config.nemesis.nodes, len)
    };
    let plan = RunPlan {
        case,
        nodes: or_all(&args.nodes, len),
        init_data: args.init_data,
        nemesis_nodes,
    };

    match plan.case {
        Case::Noop => execute(&config, &plan, &NoopClientFactory, generators, HistoryVerifier).await,
    }
}

/// Folds the `run` flags into `config`. Returns the generator list.
fn apply_run_args(config: &mut ChaosConfig, args: &RunArgs) -> String {
    let control = &mut config.control;
    if let Some(count) = args.request_count {
        control.request_count = count;
    }
    if let Some(secs) = args.run_time_secs {
        control.run_time_secs = secs;
    }
    if let Some(history) = &args.history {
        control.history = PathBuf::from(history);
    }
    if let Some(case) = &args.case {
        control.case.clone_from(case);
    }
    if !args.nemesis_nodes.is_empty() {
        config.nemesis.nodes.clone_from(&args.nemesis_nodes);
    }

    match &args.nemesis {
        Some(list) => list.clone(),
        None => config.nemesis.generators.join(","),
    }
}

async fn execute<F, V>(
    config: &ChaosConfig,
    plan: &RunPlan,
    factory: &F,
    generators: Vec<Box<dyn NemesisGenerator>>,
    verifier: V,
) -> Result<()>
where
    F: ClientFactory,
    V: Verifier + 'static,
{
    let controller = Controller::new(
        control_config(config),
        config.cluster_nodes(),
        factory,
        generators,
    )
    .context("Failed to create controller")?;

    let cancel = controller.cancel_handle();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("signal received, cancelling run");
        on_signal.cancel();
    });

    println!(
        "run {} client with init data {} on {:?} and nemesis on {:?}",
        plan.case, plan.init_data, plan.nodes, plan.nemesis_nodes
    );

    let summary = controller
        .run(&plan.nodes, plan.init_data, &plan.nemesis_nodes)
        .await
        .inspect_err(|e| error!(error = %e, "run failed"))?;

    println!(
        "{} operations, {} nemesis rounds ({} faults, {} failed)",
        summary.operations, summary.nemesis.rounds, summary.nemesis.faults, summary.nemesis.failures
    );

    if summary.cancelled {
        bail!("run cancelled, history left unverified");
    }

    // Verification may take a long time; a signal aborts it.
    let history = controller.config().history.clone();
    let path = history.clone();
    let verify = tokio::task::spawn_blocking(move || verifier.verify(&path));

    let ok = tokio::select! {
        () = cancel.cancelled() => bail!("verification of {} aborted", history.display()),
        joined = verify => joined
            .context("Verifier panicked")?
            .with_context(|| format!("verify history {} failed", history.display()))?,
    };

    if !ok {
        bail!("{} history {} is not linearizable", plan.case, history.display());
    }
    info!(case = %plan.case, history = %history.display(), "history is linearizable");
    println!("Done");
    Ok(())
}
