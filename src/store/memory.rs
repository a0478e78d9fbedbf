// src/store/memory.rs
use super::{CacheStore, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::health::HealthReport;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoreKey {
    instance: String,
    module: String,
    check: String,
}

#[derive(Clone)]
pub struct MemoryStore {
    instance_id: String,
    entries: Arc<DashMap<StoreKey, HealthReport>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new<S: Into<String>>(instance_id: S) -> Self {
        Self {
            instance_id: instance_id.into(),
            entries: Arc::new(DashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A view of the same backing map for another instance.
    pub fn for_instance<S: Into<String>>(&self, instance_id: S) -> Self {
        Self {
            instance_id: instance_id.into(),
            entries: self.entries.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    // across all instances
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(&self, module: &str, check: &str) -> StoreKey {
        StoreKey {
            instance: self.instance_id.clone(),
            module: module.to_string(),
            check: check.to_string(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, module: &str, check: &str) -> Result<Option<HealthReport>, StoreError> {
        Ok(self
            .entries
            .get(&self.key(module, check))
            .map(|entry| entry.value().clone()))
    }

    async fn write(&self, report: &HealthReport) -> Result<(), StoreError> {
        self.entries
            .insert(self.key(&report.module, &report.check), report.clone());
        Ok(())
    }

    async fn clean(&self, retention: Duration) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, report| {
            let keep = report.age(now) <= retention;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::health::HealthStatus;

    fn report(clock: &ManualClock, module: &str, check: &str, validity_secs: u64) -> HealthReport {
        HealthReport {
            module: module.to_string(),
            check: check.to_string(),
            status: HealthStatus::Ok,
            detail: serde_json::json!({ "check": check }),
            timestamp: clock.now(),
            validity: Duration::from_secs(validity_secs),
        }
    }

    #[tokio::test]
    async fn test_write_replaces_previous_entry() {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::new("i1").with_clock(clock.clone());

        store.write(&report(&clock, "store", "ping", 60)).await.unwrap();
        let mut second = report(&clock, "store", "ping", 60);
        second.status = HealthStatus::Ko;
        store.write(&second).await.unwrap();

        assert_eq!(store.len(), 1);
        let read = store.read("store", "ping").await.unwrap().unwrap();
        assert_eq!(read.status, HealthStatus::Ko);
        assert!(store.read("store", "write").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_instances_are_partitioned() {
        let clock = Arc::new(ManualClock::new());
        let first = MemoryStore::new("i1").with_clock(clock.clone());
        let second = first.for_instance("i2");

        first.write(&report(&clock, "store", "ping", 60)).await.unwrap();

        assert!(first.read("store", "ping").await.unwrap().is_some());
        assert!(second.read("store", "ping").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clean_ignores_validity() {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::new("i1").with_clock(clock.clone());

        // old entry with a long validity, still removed past retention
        store.write(&report(&clock, "store", "ping", 3_600)).await.unwrap();
        clock.advance(chrono::Duration::seconds(120));
        // recent entry with a short, already expired validity, kept
        store.write(&report(&clock, "store", "write", 1)).await.unwrap();
        clock.advance(chrono::Duration::seconds(30));

        let removed = store.clean(Duration::from_secs(100)).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.read("store", "ping").await.unwrap().is_none());
        assert!(store.read("store", "write").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clean_keeps_entry_exactly_at_retention() {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::new("i1").with_clock(clock.clone());

        store.write(&report(&clock, "store", "ping", 60)).await.unwrap();
        clock.advance(chrono::Duration::seconds(100));

        assert_eq!(store.clean(Duration::from_secs(100)).await.unwrap(), 0);
        assert!(!store.is_empty());
    }
}
