//! Result registry: thread-safe store of in-flight and recently finished
//! test records.
//!
//! The registry holds snapshots only. The supervising task mutates its own
//! private copy of a record and republishes the whole thing, so a reader can
//! never observe a partially updated record. All operations are brief map
//! operations under a reader/writer lock; the lock is never held across I/O.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{TestRecord, TestRequest};

/// Snapshot store mapping test id -> record.
#[derive(Default)]
pub struct ResultRegistry {
    tests: RwLock<HashMap<String, TestRecord>>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the initial `Running` snapshot for a request and return it.
    pub async fn create(&self, req: &TestRequest, id: String) -> TestRecord {
        let record = TestRecord::new(
            id.clone(),
            req.source_node_id.clone(),
            req.target_node_id.clone(),
            req.kind,
        );
        self.tests.write().await.insert(id, record.clone());
        record
    }

    /// Snapshot read of a single record.
    pub async fn get(&self, id: &str) -> Option<TestRecord> {
        self.tests.read().await.get(id).cloned()
    }

    /// Snapshot of all current entries. Order is not guaranteed.
    pub async fn list(&self) -> Vec<TestRecord> {
        self.tests.read().await.values().cloned().collect()
    }

    /// Replace the stored snapshot for `record.id` wholesale.
    ///
    /// No-op if the record was already swept; a test that outlives its
    /// retention window does not get resurrected.
    pub async fn publish(&self, record: TestRecord) {
        let mut tests = self.tests.write().await;
        if let std::collections::hash_map::Entry::Occupied(mut e) = tests.entry(record.id.clone()) {
            e.insert(record);
        }
    }

    /// Remove an entry. No-op if absent.
    pub async fn remove(&self, id: &str) {
        self.tests.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::{TestKind, TestStatus};

    fn request(id: &str) -> TestRequest {
        TestRequest {
            id: id.to_string(),
            source_node_id: "src".into(),
            target_node_id: "dst".into(),
            target_url: "http://127.0.0.1:1/".into(),
            kind: TestKind::Ping,
            timeout: 0,
            threads: 0,
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_running_snapshot() {
        let registry = ResultRegistry::new();
        registry.create(&request("a"), "a".into()).await;

        let got = registry.get("a").await.expect("record should exist");
        assert_eq!(got.status, TestStatus::Running);
        assert_eq!(got.source_node_id, "src");
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn get_returns_a_copy_not_the_live_record() {
        let registry = ResultRegistry::new();
        registry.create(&request("a"), "a".into()).await;

        let mut snapshot = registry.get("a").await.unwrap();
        snapshot.status = TestStatus::Failed;
        snapshot.error = Some("local mutation".into());

        // The stored record is untouched until publish().
        let stored = registry.get("a").await.unwrap();
        assert_eq!(stored.status, TestStatus::Running);
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn publish_replaces_the_whole_record() {
        let registry = ResultRegistry::new();
        let mut record = registry.create(&request("a"), "a".into()).await;

        record.status = TestStatus::Completed;
        record.download_speed = 432.1;
        registry.publish(record).await;

        let stored = registry.get("a").await.unwrap();
        assert_eq!(stored.status, TestStatus::Completed);
        assert_eq!(stored.download_speed, 432.1);
    }

    #[tokio::test]
    async fn publish_after_remove_is_a_noop() {
        let registry = ResultRegistry::new();
        let record = registry.create(&request("a"), "a".into()).await;

        registry.remove("a").await;
        registry.publish(record).await;

        assert!(registry.get("a").await.is_none());
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn list_is_idempotent_without_mutation() {
        let registry = ResultRegistry::new();
        registry.create(&request("a"), "a".into()).await;
        registry.create(&request("b"), "b".into()).await;

        let mut first: Vec<String> = registry.list().await.into_iter().map(|r| r.id).collect();
        let mut second: Vec<String> = registry.list().await.into_iter().map(|r| r.id).collect();
        first.sort();
        second.sort();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn remove_missing_is_a_noop() {
        let registry = ResultRegistry::new();
        registry.remove("never-existed").await;
        assert!(registry.list().await.is_empty());
    }
}
