//! Cluster lifecycle commands: database setup/teardown, service start/kill.

use anyhow::{Context, Result};
use chaos_core::{NoopClient, NoopClientFactory, ServiceKind};
use chaos_control::Controller;
use tracing::info;

use super::{control_config, load_config, or_all, shutdown_signal};
use crate::GlobalArgs;

/// Builds a controller with no workload and no nemesis; it only talks to the
/// agents. A signal cancels whatever phase is in flight.
fn lifecycle_controller(global: &GlobalArgs) -> Result<Controller<NoopClient>> {
    let config = load_config(global)?;
    let controller = Controller::new(
        control_config(&config),
        config.cluster_nodes(),
        &NoopClientFactory,
        Vec::new(),
    )
    .context("Failed to create controller")?;

    let cancel = controller.cancel_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("signal received, cancelling");
        cancel.cancel();
    });

    Ok(controller)
}

fn parse_service(service: &str) -> Result<ServiceKind> {
    service
        .parse()
        .with_context(|| format!("Invalid service {service:?}"))
}

pub async fn setup_db(global: &GlobalArgs) -> Result<()> {
    let controller = lifecycle_controller(global)?;
    controller
        .setup_databases(&controller.all_indices())
        .await
        .context("Database setup failed")?;
    println!("Database {} set up on {} nodes", controller.config().db, controller.nodes().len());
    Ok(())
}

pub async fn tear_down_db(global: &GlobalArgs, nodes: &[usize]) -> Result<()> {
    let controller = lifecycle_controller(global)?;
    let subset = or_all(nodes, controller.nodes().len());
    controller.tear_down_databases(&subset).await?;
    println!("Database {} torn down on {subset:?}", controller.config().db);
    Ok(())
}

pub async fn start_service(global: &GlobalArgs, service: &str, nodes: &[usize]) -> Result<()> {
    let service = parse_service(service)?;
    let controller = lifecycle_controller(global)?;
    let subset = or_all(nodes, controller.nodes().len());
    controller
        .start_services(&subset, service)
        .await
        .with_context(|| format!("Failed to start {service}"))?;
    println!("Started {service} on {subset:?}");
    Ok(())
}

pub async fn kill_service(global: &GlobalArgs, service: &str, nodes: &[usize]) -> Result<()> {
    let service = parse_service(service)?;
    let controller = lifecycle_controller(global)?;
    let subset = or_all(nodes, controller.nodes().len());
    controller.kill_services(&subset, service).await?;
    println!("Killed {service} on {subset:?}");
    Ok(())
}
