//! chaos: chaos testing for clustered databases.
//!
//! One binary, two roles. On every cluster node run the agent:
//!
//! ```bash
//! chaos agent --listen 0.0.0.0:8080 --node-name n1
//! ```
//!
//! Then drive the cluster from the controller host:
//!
//! ```bash
//! chaos setup-db
//! chaos start-service --service all
//! chaos run --nemesis random_kill,minor_drop --nemesis-nodes 1,2,3,4,5
//! ```
//!
//! Settings come from `chaos.toml` / `chaos.local.toml` in `--project`,
//! `CHAOS_*` environment variables and finally the flags below.

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

/// chaos - inject faults into a database cluster and record what clients saw.
#[derive(Parser)]
#[command(name = "chaos")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding chaos.toml and chaos.local.toml.
    #[arg(long, global = true, default_value = ".")]
    pub project: String,

    /// Database under test, as registered on the agents.
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Port every agent listens on.
    #[arg(long, global = true)]
    pub node_port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node agent.
    Agent {
        /// Address to bind to.
        #[arg(short, long)]
        listen: Option<String>,

        /// Name this agent answers as (defaults to the host name).
        #[arg(long)]
        node_name: Option<String>,

        /// Seconds a fault stays applied before it is recovered.
        #[arg(long)]
        fault_hold_secs: Option<u64>,

        /// Block peers in memory only instead of calling iptables.
        #[arg(long)]
        no_iptables: bool,
    },

    /// Print the effective configuration as TOML.
    Config,

    /// Set up the database on every node.
    SetupDb,

    /// Tear down the database on the given nodes.
    TearDownDb {
        /// Node indices, comma separated (default: all).
        #[arg(short, long, value_delimiter = ',')]
        nodes: Vec<usize>,
    },

    /// Start a service on the given nodes.
    StartService {
        /// Service kind: coordinator, storage, gateway or all.
        #[arg(short, long, default_value = "all")]
        service: String,

        /// Node indices, comma separated (default: all).
        #[arg(short, long, value_delimiter = ',')]
        nodes: Vec<usize>,
    },

    /// Kill a service on the given nodes.
    KillService {
        /// Service kind: coordinator, storage, gateway or all.
        #[arg(short, long, default_value = "all")]
        service: String,

        /// Node indices, comma separated (default: all).
        #[arg(short, long, value_delimiter = ',')]
        nodes: Vec<usize>,
    },

    /// Run the workload under faults, then verify the history.
    Run(RunArgs),
}

/// Options of `chaos run`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Workload node indices, comma separated (default: all).
    #[arg(short, long, value_delimiter = ',')]
    pub nodes: Vec<usize>,

    /// Let each client load its initial data first.
    #[arg(long)]
    pub init_data: bool,

    /// Nemesis generators, e.g. random_kill,all_drop.
    #[arg(long)]
    pub nemesis: Option<String>,

    /// Node indices the nemesis targets, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub nemesis_nodes: Vec<usize>,

    /// Maximum operations per client.
    #[arg(long)]
    pub request_count: Option<usize>,

    /// Wall-clock bound of the workload, in seconds.
    #[arg(long)]
    pub run_time_secs: Option<u64>,

    /// History file.
    #[arg(long)]
    pub history: Option<String>,

    /// Workload case.
    #[arg(long)]
    pub case: Option<String>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let global = cli.global;

    match cli.command {
        Commands::Agent {
            listen,
            node_name,
            fault_hold_secs,
            no_iptables,
        } => {
            commands::agent::run(
                &global,
                commands::agent::AgentArgs {
                    listen,
                    node_name,
                    fault_hold_secs,
                    no_iptables,
                },
            )
            .await
        }
        Commands::Config => commands::show_config(&global),
        Commands::SetupDb => commands::control::setup_db(&global).await,
        Commands::TearDownDb { nodes } => commands::control::tear_down_db(&global, &nodes).await,
        Commands::StartService { service, nodes } => {
            commands::control::start_service(&global, &service, &nodes).await
        }
        Commands::KillService { service, nodes } => {
            commands::control::kill_service(&global, &service, &nodes).await
        }
        Commands::Run(args) => commands::run::run(&global, args).await,
    }
}
