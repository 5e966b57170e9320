//! Database driver capability, executed by the agent on its own node.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Result, ServiceKind};

/// Installs and drives one database on the local node.
///
/// Lifecycle calls are serialized by the agent (see
/// [`DatabaseRegistry::lock`](crate::DatabaseRegistry::lock)), so
/// implementations do not need to guard against concurrent setup/start/kill.
#[async_trait]
pub trait Database: Send + Sync {
    /// Installs the database. `nodes` is the full cluster membership.
    async fn set_up(&self, nodes: &[String]) -> Result<()>;

    /// Stops everything and removes what `set_up` installed.
    async fn tear_down(&self, nodes: &[String]) -> Result<()>;

    /// Starts one class of service.
    async fn start(&self, service: ServiceKind) -> Result<()>;

    /// Kills one class of service (`All` kills everything).
    async fn kill(&self, service: ServiceKind) -> Result<()>;

    /// Checks whether a service is running.
    async fn is_running(&self, service: ServiceKind) -> bool;

    /// Unique name of the database (registry key).
    fn name(&self) -> &str;

    /// Name of the node this driver runs on.
    fn node(&self) -> &str;
}

/// Database that only tracks which services it has been told to run.
#[derive(Debug)]
pub struct NoopDatabase {
    node: String,
    running: Mutex<HashSet<ServiceKind>>,
}

impl NoopDatabase {
    pub const NAME: &'static str = "noop";

    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            running: Mutex::new(HashSet::new()),
        }
    }

    fn running(&self) -> std::sync::MutexGuard<'_, HashSet<ServiceKind>> {
        // The set is always left consistent, so a poisoned lock is still usable.
        self.running
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Database for NoopDatabase {
    async fn set_up(&self, _nodes: &[String]) -> Result<()> {
        self.running().clear();
        Ok(())
    }

    async fn tear_down(&self, _nodes: &[String]) -> Result<()> {
        self.running().clear();
        Ok(())
    }

    async fn start(&self, service: ServiceKind) -> Result<()> {
        self.running().extend(service.expand());
        Ok(())
    }

    async fn kill(&self, service: ServiceKind) -> Result<()> {
        let mut running = self.running();
        for s in service.expand() {
            running.remove(&s);
        }
        Ok(())
    }

    async fn is_running(&self, service: ServiceKind) -> bool {
        let running = self.running();
        service.expand().iter().all(|s| running.contains(s))
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn node(&self) -> &str {
        &self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_database_tracks_services() {
        let db = NoopDatabase::new("n1");
        db.set_up(&["n1".to_string()]).await.unwrap();
        assert!(!db.is_running(ServiceKind::Storage).await);

        db.start(ServiceKind::Storage).await.unwrap();
        assert!(db.is_running(ServiceKind::Storage).await);
        assert!(!db.is_running(ServiceKind::All).await);

        db.start(ServiceKind::All).await.unwrap();
        assert!(db.is_running(ServiceKind::All).await);

        db.kill(ServiceKind::Gateway).await.unwrap();
        assert!(!db.is_running(ServiceKind::Gateway).await);
        assert!(db.is_running(ServiceKind::Coordinator).await);

        db.tear_down(&[]).await.unwrap();
        assert!(!db.is_running(ServiceKind::Coordinator).await);
        assert_eq!(db.name(), "noop");
        assert_eq!(db.node(), "n1");
    }
}
