//! In-memory document store
//!
//! Backs tests and local runs with the same contract as a real store.
//! Documents are held per collection in a `BTreeMap`, so whole-collection
//! iteration order is the storage-key order the producer relies on.
//! Failure injection knobs cover the error paths of the cycle loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{Content, NativeStore, NativeTx, UuidIter};
use crate::scheduler::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone)]
struct StoredDoc {
    content: Content,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, StoredDoc>>,
    fail_next_open: bool,
    // uuid that poisons any iterator which reaches it
    iter_error_uuid: Option<String>,
}

/// In-memory [`NativeStore`] implementation
#[derive(Debug, Clone, Default)]
pub struct InMemoryNativeStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryNativeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document with the current time as its last-modified stamp.
    pub fn insert(&self, collection: &str, uuid: &str, content: Content) {
        self.insert_at(collection, uuid, content, Utc::now());
    }

    /// Insert a document with an explicit last-modified stamp.
    pub fn insert_at(
        &self,
        collection: &str,
        uuid: &str,
        content: Content,
        last_modified: DateTime<Utc>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.collections.entry(collection.to_string()).or_default().insert(
            uuid.to_string(),
            StoredDoc {
                content,
                last_modified,
            },
        );
    }

    /// Make the next `open` call fail, exercising the producer-open error path.
    pub fn fail_next_open(&self) {
        self.inner.lock().unwrap().fail_next_open = true;
    }

    /// Make any iterator fail when it reaches the given uuid.
    pub fn poison_uuid(&self, uuid: &str) {
        self.inner.lock().unwrap().iter_error_uuid = Some(uuid.to_string());
    }

    fn snapshot(
        &self,
        collection: &str,
        filter: impl Fn(&StoredDoc) -> bool,
    ) -> (Vec<String>, Option<String>) {
        let inner = self.inner.lock().unwrap();
        let uuids = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| filter(doc))
                    .map(|(uuid, _)| uuid.clone())
                    .collect()
            })
            .unwrap_or_default();
        (uuids, inner.iter_error_uuid.clone())
    }
}

#[async_trait]
impl NativeStore for InMemoryNativeStore {
    async fn open(&self) -> SchedulerResult<Box<dyn NativeTx>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_open {
            inner.fail_next_open = false;
            return Err(SchedulerError::producer("store connection refused"));
        }
        drop(inner);
        Ok(Box::new(InMemoryTx {
            store: self.clone(),
        }))
    }
}

struct InMemoryTx {
    store: InMemoryNativeStore,
}

#[async_trait]
impl NativeTx for InMemoryTx {
    async fn read_content(&self, collection: &str, uuid: &str) -> SchedulerResult<Content> {
        let inner = self.store.inner.lock().unwrap();
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(uuid))
            .map(|doc| doc.content.clone())
            .ok_or_else(|| {
                SchedulerError::producer(format!("document not found: {collection}/{uuid}"))
            })
    }

    async fn find_uuids(
        &self,
        collection: &str,
        skip: usize,
        _batch_size: usize,
    ) -> SchedulerResult<(Box<dyn UuidIter>, usize)> {
        let (uuids, poison) = self.store.snapshot(collection, |_| true);
        let total = uuids.len();
        let remaining = uuids.into_iter().skip(skip).collect();
        Ok((Box::new(InMemoryIter::new(remaining, poison)), total))
    }

    async fn find_uuids_in_time_window(
        &self,
        collection: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _batch_size: usize,
    ) -> SchedulerResult<(Box<dyn UuidIter>, usize)> {
        let (uuids, poison) = self
            .store
            .snapshot(collection, |doc| doc.last_modified >= start && doc.last_modified < end);
        let total = uuids.len();
        Ok((Box::new(InMemoryIter::new(uuids, poison)), total))
    }

    async fn ping(&self) -> SchedulerResult<()> {
        Ok(())
    }
}

struct InMemoryIter {
    uuids: std::vec::IntoIter<String>,
    poison: Option<String>,
}

impl InMemoryIter {
    fn new(uuids: Vec<String>, poison: Option<String>) -> Self {
        Self {
            uuids: uuids.into_iter(),
            poison,
        }
    }
}

#[async_trait]
impl UuidIter for InMemoryIter {
    async fn next(&mut self) -> SchedulerResult<Option<String>> {
        match self.uuids.next() {
            Some(uuid) => {
                if self.poison.as_deref() == Some(uuid.as_str()) {
                    return Err(SchedulerError::producer(format!(
                        "cursor failed reading {uuid}"
                    )));
                }
                Ok(Some(uuid))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn store_with(uuids: &[&str]) -> InMemoryNativeStore {
        let store = InMemoryNativeStore::new();
        for uuid in uuids {
            store.insert("methode", uuid, Content::json(json!({"uuid": uuid})));
        }
        store
    }

    #[tokio::test]
    async fn test_find_uuids_stable_order_and_skip() {
        let store = store_with(&["c3", "a1", "b2"]);
        let tx = store.open().await.unwrap();

        let (mut iter, total) = tx.find_uuids("methode", 1, 80).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(iter.next().await.unwrap(), Some("b2".to_string()));
        assert_eq!(iter.next().await.unwrap(), Some("c3".to_string()));
        assert_eq!(iter.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_time_window_filters_by_last_modified() {
        let store = InMemoryNativeStore::new();
        let now = Utc::now();
        store.insert_at("methode", "old", Content::default(), now - Duration::hours(2));
        store.insert_at("methode", "new", Content::default(), now - Duration::minutes(5));

        let tx = store.open().await.unwrap();
        let (mut iter, total) = tx
            .find_uuids_in_time_window("methode", now - Duration::hours(1), now, 80)
            .await
            .unwrap();

        assert_eq!(total, 1);
        assert_eq!(iter.next().await.unwrap(), Some("new".to_string()));
        assert_eq!(iter.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fail_next_open_is_one_shot() {
        let store = store_with(&["a1"]);
        store.fail_next_open();

        assert!(store.open().await.is_err());
        assert!(store.open().await.is_ok());
    }

    #[tokio::test]
    async fn test_poisoned_uuid_errors_mid_iteration() {
        let store = store_with(&["a1", "b2", "c3"]);
        store.poison_uuid("b2");

        let tx = store.open().await.unwrap();
        let (mut iter, _) = tx.find_uuids("methode", 0, 80).await.unwrap();
        assert_eq!(iter.next().await.unwrap(), Some("a1".to_string()));
        assert!(iter.next().await.is_err());
    }

    #[tokio::test]
    async fn test_read_content_missing_uuid() {
        let store = store_with(&["a1"]);
        let tx = store.open().await.unwrap();

        assert!(tx.read_content("methode", "a1").await.is_ok());
        assert!(tx.read_content("methode", "nope").await.is_err());
    }
}
