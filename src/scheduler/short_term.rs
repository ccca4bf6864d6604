//! Short-term time-window cycle
//!
//! Re-publishes documents modified within the trailing time window. The
//! window is recomputed at the start of every iteration and the pass
//! position resets with it, so this variant never resumes mid-pass and is
//! excluded from checkpoint restore. Pacing between iterations comes from
//! the cool-down rather than a shared throttle.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::cycle::{self, Cycle, CycleConfig, CycleCore, CycleKind, ProducerOpener, PublishTask};
use super::metadata::{CycleMetadata, CycleState};
use crate::blacklist::Blacklist;
use crate::cluster::PublishGate;
use crate::native::NativeStore;

pub struct ShortTermCycle {
    core: Arc<CycleCore>,
    time_window: Duration,
}

impl ShortTermCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        collection: &str,
        origin: &str,
        cool_down: Duration,
        time_window: Duration,
        store: Arc<dyn NativeStore>,
        task: Arc<dyn PublishTask>,
        blacklist: Arc<dyn Blacklist>,
        gate: PublishGate,
    ) -> Self {
        Self {
            core: Arc::new(CycleCore::new(
                name, collection, origin, cool_down, store, task, blacklist, gate,
            )),
            time_window,
        }
    }
}

#[async_trait]
impl Cycle for ShortTermCycle {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> CycleKind {
        CycleKind::ShortTerm
    }

    fn start(&self) {
        let core = self.core.clone();
        let window = self.time_window;
        self.core.spawn_worker(move |cancel| {
            cycle::run(core, cancel, None, ProducerOpener::TimeWindow(window))
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
            cycle_type: CycleKind::ShortTerm.as_str().to_string(),
            collection: self.core.collection.clone(),
            origin: self.core.origin.clone(),
            cool_down: self.core.cool_down,
            throttle: None,
            time_window: Some(self.time_window),
            minimum_throttle: None,
            maximum_throttle: None,
        }
    }
}
