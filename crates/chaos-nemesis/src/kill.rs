//! Process kill fault.

use async_trait::async_trait;
use chaos_core::{
    DatabaseRegistry, Error, Nemesis, NemesisGenerator, Operation, Result, ServiceKind,
};
use tracing::info;

use crate::{Policy, Selector};

/// Emits `kill` operations for the nodes chosen by its policy.
///
/// Operation args are `[db, service]`.
#[derive(Debug)]
pub struct KillGenerator {
    name: String,
    db: String,
    service: ServiceKind,
    selector: Selector,
}

impl KillGenerator {
    pub fn new(db: impl Into<String>, policy: Policy, service: ServiceKind) -> Self {
        Self::from_selector(db, service, Selector::new(policy))
    }

    /// Like [`KillGenerator::new`] with a fixed seed.
    pub fn with_seed(db: impl Into<String>, policy: Policy, service: ServiceKind, seed: u64) -> Self {
        Self::from_selector(db, service, Selector::with_seed(policy, seed))
    }

    fn from_selector(db: impl Into<String>, service: ServiceKind, selector: Selector) -> Self {
        Self {
            name: format!("{}_kill", selector.policy()),
            db: db.into(),
            service,
            selector,
        }
    }
}

impl NemesisGenerator for KillGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, nodes: &[String]) -> Vec<Option<Operation>> {
        self.selector
            .select(nodes.len())
            .into_iter()
            .map(|chosen| {
                chosen.then(|| Operation::new(KillNemesis::NAME, [self.db.as_str(), self.service.as_str()]))
            })
            .collect()
    }
}

/// Kills a service on invoke and starts it again on recover.
///
/// Goes through the agent's database lifecycle lock, so it never races a
/// concurrent setup/start/kill request.
#[derive(Debug, Clone)]
pub struct KillNemesis {
    databases: DatabaseRegistry,
}

impl KillNemesis {
    pub const NAME: &'static str = "kill";

    pub fn new(databases: DatabaseRegistry) -> Self {
        Self { databases }
    }

    fn parse_args(args: &[String]) -> Result<(&str, ServiceKind)> {
        match args {
            [db, service, ..] => Ok((db.as_str(), service.parse()?)),
            _ => Err(Error::InvalidArgs {
                nemesis: Self::NAME.to_string(),
                reason: format!("expected [db, service], got {args:?}"),
            }),
        }
    }
}

#[async_trait]
impl Nemesis for KillNemesis {
    async fn invoke(&self, args: &[String]) -> Result<()> {
        let (name, service) = Self::parse_args(args)?;
        let db = self.databases.lock(name).await?;
        info!(db = name, node = db.node(), %service, "killing service");
        db.kill(service).await
    }

    async fn recover(&self, args: &[String]) -> Result<()> {
        let (name, service) = Self::parse_args(args)?;
        let db = self.databases.lock(name).await?;
        info!(db = name, node = db.node(), %service, "restarting killed service");
        db.start(service).await
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}
