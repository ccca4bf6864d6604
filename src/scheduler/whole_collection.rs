//! Throttled whole-collection cycle
//!
//! Walks the entire backing collection in storage-key order, paced by a
//! shared throttle. The pass position is carried in `metadata.completed`,
//! so a restored cycle reopens its producer with that skip and continues
//! mid-pass. This is the only variant that participates in checkpoint
//! restore.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::cycle::{self, Cycle, CycleConfig, CycleCore, CycleKind, ProducerOpener, PublishTask};
use super::metadata::{CycleMetadata, CycleState};
use super::throttle::Throttle;
use crate::blacklist::Blacklist;
use crate::cluster::PublishGate;
use crate::config::format_duration;
use crate::native::NativeStore;

pub struct ThrottledWholeCollectionCycle {
    core: Arc<CycleCore>,
    throttle: Throttle,
}

impl ThrottledWholeCollectionCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        collection: &str,
        origin: &str,
        cool_down: Duration,
        throttle: Throttle,
        store: Arc<dyn NativeStore>,
        task: Arc<dyn PublishTask>,
        blacklist: Arc<dyn Blacklist>,
        gate: PublishGate,
    ) -> Self {
        Self {
            core: Arc::new(CycleCore::new(
                name, collection, origin, cool_down, store, task, blacklist, gate,
            )),
            throttle,
        }
    }
}

#[async_trait]
impl Cycle for ThrottledWholeCollectionCycle {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> CycleKind {
        CycleKind::ThrottledWholeCollection
    }

    fn is_resumable(&self) -> bool {
        true
    }

    fn throttle(&self) -> Option<Throttle> {
        Some(self.throttle.clone())
    }

    fn start(&self) {
        let core = self.core.clone();
        let throttle = self.throttle.clone();
        self.core.spawn_worker(move |cancel| {
            cycle::run(core, cancel, Some(throttle), ProducerOpener::WholeCollection)
        });
    }

    async fn stop(&self) {
        self.core.stop_worker().await;
    }

    async fn metadata(&self) -> CycleMetadata {
        self.core.metadata().await
    }

    async fn set_metadata(&self, metadata: CycleMetadata) {
        self.core.set_metadata(metadata).await;
    }

    async fn state(&self) -> BTreeSet<CycleState> {
        self.core.state().await
    }

    fn transform_to_config(&self) -> CycleConfig {
        CycleConfig {
            name: self.core.name.clone(),
            cycle_type: CycleKind::ThrottledWholeCollection.as_str().to_string(),
            collection: self.core.collection.clone(),
            origin: self.core.origin.clone(),
            cool_down: self.core.cool_down,
            throttle: Some(format_duration(self.throttle.interval())),
            time_window: None,
            minimum_throttle: None,
            maximum_throttle: None,
        }
    }
}
