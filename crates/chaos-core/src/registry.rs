//! Explicit capability registries.
//!
//! An agent builds its registries once at startup and hands them to the
//! request handlers. Lookups are by name; nothing is registered through
//! global state.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Database, Error, Nemesis, Result};

// ============================================================================
// Databases
// ============================================================================

/// Named database drivers plus the agent-wide lifecycle lock.
///
/// Cloning is cheap and every clone shares the same lock, so a fault
/// primitive holding a clone serializes with the HTTP handlers.
#[derive(Clone, Default)]
pub struct DatabaseRegistry {
    databases: Arc<HashMap<String, Arc<dyn Database>>>,
    lock: Arc<Mutex<()>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under its own name, replacing any previous one.
    pub fn register(mut self, db: impl Database + 'static) -> Self {
        let db: Arc<dyn Database> = Arc::new(db);
        Arc::make_mut(&mut self.databases).insert(db.name().to_string(), db);
        self
    }

    /// Looks up a driver without taking the lifecycle lock.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Database>> {
        self.databases
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDatabase(name.to_string()))
    }

    /// Looks up a driver and takes the lifecycle lock.
    ///
    /// The lock is held until the returned guard is dropped. Unknown names
    /// fail before waiting on the lock.
    pub async fn lock(&self, name: &str) -> Result<DatabaseGuard> {
        let db = self.get(name)?;
        let guard = Arc::clone(&self.lock).lock_owned().await;
        Ok(DatabaseGuard { db, _guard: guard })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("databases", &self.names())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to one database for the duration of a lifecycle call.
pub struct DatabaseGuard {
    db: Arc<dyn Database>,
    _guard: OwnedMutexGuard<()>,
}

impl Deref for DatabaseGuard {
    type Target = dyn Database;

    fn deref(&self) -> &Self::Target {
        self.db.as_ref()
    }
}

// ============================================================================
// Fault primitives
// ============================================================================

/// Named fault primitives.
#[derive(Clone, Default)]
pub struct NemesisRegistry {
    nemeses: Arc<HashMap<String, Arc<dyn Nemesis>>>,
}

impl NemesisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a primitive under its own name, replacing any previous one.
    pub fn register(mut self, nemesis: impl Nemesis + 'static) -> Self {
        let nemesis: Arc<dyn Nemesis> = Arc::new(nemesis);
        Arc::make_mut(&mut self.nemeses).insert(nemesis.name().to_string(), nemesis);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Nemesis>> {
        self.nemeses
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownNemesis(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nemeses.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for NemesisRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NemesisRegistry")
            .field("nemeses", &self.names())
            .finish()
    }
}

/// Everything an agent can do, by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub databases: DatabaseRegistry,
    pub nemeses: NemesisRegistry,
}

impl Registry {
    pub fn new(databases: DatabaseRegistry, nemeses: NemesisRegistry) -> Self {
        Self { databases, nemeses }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{NoopDatabase, ServiceKind};

    #[test]
    fn unknown_database_is_not_found() {
        let registry = DatabaseRegistry::new().register(NoopDatabase::new("n1"));
        assert_eq!(registry.names(), vec!["noop".to_string()]);

        let err = registry.get("tidb").err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn unknown_nemesis_is_not_found() {
        let registry = NemesisRegistry::new();
        let err = registry.get("kill").err().unwrap();
        assert!(matches!(err, Error::UnknownNemesis(ref n) if n == "kill"));
    }

    /// Database whose `start` records the peak number of concurrent callers.
    struct Probe {
        active: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Database for Probe {
        async fn set_up(&self, _nodes: &[String]) -> Result<()> {
            Ok(())
        }

        async fn tear_down(&self, _nodes: &[String]) -> Result<()> {
            Ok(())
        }

        async fn start(&self, _service: ServiceKind) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn kill(&self, _service: ServiceKind) -> Result<()> {
            Ok(())
        }

        async fn is_running(&self, _service: ServiceKind) -> bool {
            false
        }

        fn name(&self) -> &str {
            "probe"
        }

        fn node(&self) -> &str {
            "n1"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lifecycle_lock_serializes_callers() {
        let peak = Arc::new(AtomicUsize::new(0));
        let registry = DatabaseRegistry::new().register(Probe {
            active: AtomicUsize::new(0),
            peak: Arc::clone(&peak),
        });

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let db = registry.lock("probe").await.unwrap();
                db.start(ServiceKind::Storage).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lock_on_unknown_database_fails_fast() {
        let registry = DatabaseRegistry::new();
        let err = registry.lock("noop").await.err().unwrap();
        assert!(matches!(err, Error::UnknownDatabase(_)));
    }
}
