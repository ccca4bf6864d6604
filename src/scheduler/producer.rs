//! UUID producers
//!
//! A producer is a lazy, finite sequence of candidate uuids for one
//! iteration of a cycle. The whole-collection variant walks the backing
//! collection in storage-key order with a skip offset so a restored cycle
//! resumes mid-pass; the windowed variant covers `[now - window, now)` by
//! last-modified timestamp. Both capture the iteration `total` at open.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::error::SchedulerResult;
use crate::native::{NativeStore, NativeTx, UuidIter};

/// Batch size for document store cursors.
pub const BATCH_SIZE: usize = 80;

/// One iteration's worth of candidate uuids
pub struct UuidProducer {
    // the transaction must outlive the iterator it produced
    _tx: Box<dyn NativeTx>,
    iter: Box<dyn UuidIter>,
    total: usize,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl UuidProducer {
    /// Open a whole-collection pass starting at `skip`.
    pub async fn open_whole_collection(
        store: &dyn NativeStore,
        collection: &str,
        skip: usize,
    ) -> SchedulerResult<Self> {
        let tx = store.open().await?;
        let (iter, total) = tx.find_uuids(collection, skip, BATCH_SIZE).await?;
        Ok(Self {
            _tx: tx,
            iter,
            total,
            window: None,
        })
    }

    /// Open a pass over documents modified within the trailing `window`.
    pub async fn open_time_window(
        store: &dyn NativeStore,
        collection: &str,
        window: Duration,
    ) -> SchedulerResult<Self> {
        let end = Utc::now();
        let start = end
            - chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));

        let tx = store.open().await?;
        let (iter, total) = tx
            .find_uuids_in_time_window(collection, start, end, BATCH_SIZE)
            .await?;
        Ok(Self {
            _tx: tx,
            iter,
            total,
            window: Some((start, end)),
        })
    }

    /// Next candidate uuid; `Ok(None)` when the iteration is exhausted.
    pub async fn next(&mut self) -> SchedulerResult<Option<String>> {
        self.iter.next().await
    }

    /// Producer-reported size of this iteration; display only, may be stale.
    pub fn total(&self) -> usize {
        self.total
    }

    /// The `[start, end)` window, present only for windowed iterations.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.window
    }

    /// Release the underlying cursor.
    pub async fn close(mut self) {
        self.iter.close().await;
    }
}
