//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use carousel::blacklist::Blacklist;
use carousel::native::{Content, InMemoryNativeStore};
use carousel::scheduler::error::{SchedulerError, SchedulerResult};
use carousel::scheduler::{PreparedPublish, PublishTask};

/// Publish task recording every execution, optionally failing chosen uuids.
pub struct RecordingTask {
    executed: Mutex<Vec<String>>,
    fail_on: HashSet<String>,
}

impl RecordingTask {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            fail_on: HashSet::new(),
        })
    }

    pub fn failing_on(uuids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            fail_on: uuids.iter().map(|u| u.to_string()).collect(),
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishTask for RecordingTask {
    async fn prepare(&self, _collection: &str, uuid: &str) -> SchedulerResult<PreparedPublish> {
        Ok(PreparedPublish {
            content: Content::json(json!({"uuid": uuid})),
            tx_id: format!("tid_{uuid}"),
        })
    }

    async fn execute(
        &self,
        uuid: &str,
        _content: &Content,
        _origin: &str,
        _tx_id: &str,
    ) -> SchedulerResult<()> {
        self.executed.lock().unwrap().push(uuid.to_string());
        if self.fail_on.contains(uuid) {
            return Err(SchedulerError::task("downstream rejected the publish"));
        }
        Ok(())
    }
}

/// Blacklist excluding a fixed set of uuids.
pub struct ListBlacklist {
    excluded: HashSet<String>,
}

impl ListBlacklist {
    pub fn excluding(uuids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            excluded: uuids.iter().map(|u| u.to_string()).collect(),
        })
    }
}

impl Blacklist for ListBlacklist {
    fn valid_for_publish(&self, uuid: &str, _content: &Content) -> SchedulerResult<bool> {
        Ok(!self.excluded.contains(uuid))
    }
}

/// Store seeded with the given uuids in one collection.
pub fn seeded_store(collection: &str, uuids: &[&str]) -> Arc<InMemoryNativeStore> {
    let store = Arc::new(InMemoryNativeStore::new());
    for uuid in uuids {
        store.insert(collection, uuid, Content::json(json!({"uuid": uuid})));
    }
    store
}

/// Poll until the condition holds, panicking after a generous deadline.
pub async fn wait_for<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(600);
    while !cond().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
