//! Document store contract
//!
//! The carousel reads native documents by uuid and walks collections either
//! whole (paginated by a skip offset) or by last-modified time window. The
//! traits here are the seam between the cycle engine and whatever backs the
//! store; [`memory::InMemoryNativeStore`] is the bundled implementation used
//! by tests and local runs.

pub mod memory;

pub use memory::InMemoryNativeStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::error::SchedulerResult;

/// A native document as stored in the backing collection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Content {
    /// The raw document body
    pub body: serde_json::Value,

    /// Content type the document was stored with
    #[serde(rename = "content-type")]
    pub content_type: String,
}

impl Content {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            body,
            content_type: "application/json".to_string(),
        }
    }
}

/// Handle to the document store; `open` yields a transaction scoped to one
/// producer pass.
#[async_trait]
pub trait NativeStore: Send + Sync {
    async fn open(&self) -> SchedulerResult<Box<dyn NativeTx>>;
}

/// A single read transaction against the store
#[async_trait]
pub trait NativeTx: Send + Sync {
    /// Read one native document by collection and uuid.
    async fn read_content(&self, collection: &str, uuid: &str) -> SchedulerResult<Content>;

    /// Iterate uuids of a collection in stable storage-key order, starting
    /// at `skip`. Returns the iterator and the collection count at open.
    async fn find_uuids(
        &self,
        collection: &str,
        skip: usize,
        batch_size: usize,
    ) -> SchedulerResult<(Box<dyn UuidIter>, usize)>;

    /// Iterate uuids whose last-modified timestamp falls in `[start, end)`.
    async fn find_uuids_in_time_window(
        &self,
        collection: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batch_size: usize,
    ) -> SchedulerResult<(Box<dyn UuidIter>, usize)>;

    /// Liveness check against the backing store.
    async fn ping(&self) -> SchedulerResult<()>;
}

/// Pull iterator over candidate uuids
#[async_trait]
pub trait UuidIter: Send + Sync {
    /// Next uuid, `Ok(None)` at exhaustion, `Err` on a read failure that
    /// terminates the iteration.
    async fn next(&mut self) -> SchedulerResult<Option<String>>;

    /// Release any resources held by the iterator.
    async fn close(&mut self);
}
