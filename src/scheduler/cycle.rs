//! Cycle trait, configuration and the common publish loop
//!
//! A cycle is a long-running worker that walks one collection and re-emits
//! each document through the publish task. The two variants (whole
//! collection and time window) share the loop in [`run`]: open a producer,
//! pace items through the throttle and the cluster gate, record progress
//! after every item, cool down between iterations. Everything that can
//! block honors the cycle's cancellation token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{SchedulerError, SchedulerResult};
use super::metadata::{CycleMetadata, CycleState};
use super::producer::UuidProducer;
use super::throttle::{Throttle, ThrottleResult};
use crate::blacklist::Blacklist;
use crate::cluster::PublishGate;
use crate::native::{Content, NativeStore};

/// How long `stop` waits for the worker to acknowledge cancellation.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// The supported cycle variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Whole-collection walk paced by a shared throttle; resumable
    ThrottledWholeCollection,
    /// Periodic walk over a trailing last-modified window
    ShortTerm,
}

impl CycleKind {
    pub fn parse(s: &str) -> SchedulerResult<Self> {
        match s.to_lowercase().as_str() {
            "throttledwholecollection" | "longterm" => Ok(Self::ThrottledWholeCollection),
            "shortterm" => Ok(Self::ShortTerm),
            other => Err(SchedulerError::invalid_config(format!(
                "unknown cycle type: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThrottledWholeCollection => "ThrottledWholeCollection",
            Self::ShortTerm => "ShortTerm",
        }
    }
}

/// Validated definition of one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub cycle_type: String,

    pub collection: String,

    /// Opaque origin identifier forwarded to the publish task
    pub origin: String,

    /// Pause between iterations once a pass completes
    #[serde(default, with = "crate::config::duration_string")]
    pub cool_down: Duration,

    /// Throttle reference: a named throttle, or an interval for a throttle
    /// dedicated to this cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,

    #[serde(
        default,
        with = "crate::config::option_duration_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_window: Option<Duration>,

    #[serde(
        default,
        with = "crate::config::option_duration_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub minimum_throttle: Option<Duration>,

    #[serde(
        default,
        with = "crate::config::option_duration_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub maximum_throttle: Option<Duration>,
}

impl CycleConfig {
    pub fn kind(&self) -> SchedulerResult<CycleKind> {
        CycleKind::parse(&self.cycle_type)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::invalid_config("cycle name is required"));
        }
        if self.collection.trim().is_empty() {
            return Err(SchedulerError::invalid_config(format!(
                "cycle {} requires a collection",
                self.name
            )));
        }
        if self.origin.trim().is_empty() {
            return Err(SchedulerError::invalid_config(format!(
                "cycle {} requires an origin",
                self.name
            )));
        }

        match self.kind()? {
            CycleKind::ThrottledWholeCollection => {
                if self.throttle.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    return Err(SchedulerError::invalid_config(format!(
                        "cycle {} requires a throttle",
                        self.name
                    )));
                }
            }
            CycleKind::ShortTerm => {
                if self.time_window.map_or(true, |w| w.is_zero()) {
                    return Err(SchedulerError::invalid_config(format!(
                        "cycle {} requires a non-zero timeWindow",
                        self.name
                    )));
                }
            }
        }

        if let (Some(min), Some(max)) = (self.minimum_throttle, self.maximum_throttle) {
            if min > max {
                return Err(SchedulerError::invalid_config(format!(
                    "cycle {} has minimumThrottle greater than maximumThrottle",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Deterministic 16-hex-character fingerprint of `(name, collection)`.
///
/// Stable across restarts so persisted metadata can be rejoined to the
/// cycle that wrote it.
pub fn cycle_id(name: &str, collection: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(collection.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// A document resolved and ready for downstream submission
#[derive(Debug, Clone)]
pub struct PreparedPublish {
    pub content: Content,
    pub tx_id: String,
}

/// The opaque per-item publish operation
#[async_trait]
pub trait PublishTask: Send + Sync {
    /// Resolve the uuid to its native document and derive a correlation
    /// token for downstream tracing.
    async fn prepare(&self, collection: &str, uuid: &str) -> SchedulerResult<PreparedPublish>;

    /// Submit the document downstream.
    async fn execute(
        &self,
        uuid: &str,
        content: &Content,
        origin: &str,
        tx_id: &str,
    ) -> SchedulerResult<()>;
}

/// A configured walk over one collection
#[async_trait]
pub trait Cycle: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn kind(&self) -> CycleKind;

    /// Whether this cycle participates in checkpoint restore.
    fn is_resumable(&self) -> bool {
        false
    }

    /// The throttle pacing this cycle, when it has one.
    fn throttle(&self) -> Option<Throttle> {
        None
    }

    /// Launch the worker. A no-op when the worker is already running.
    fn start(&self);

    /// Cancel the worker and wait (bounded) for it to exit. Idempotent.
    async fn stop(&self);

    /// Stop, then wipe the metadata back to its zero value.
    async fn reset(&self) {
        self.stop().await;
        self.set_metadata(CycleMetadata::default()).await;
    }

    async fn metadata(&self) -> CycleMetadata;
    async fn set_metadata(&self, metadata: CycleMetadata);
    async fn state(&self) -> BTreeSet<CycleState>;

    /// The configuration this cycle would be recreated from.
    fn transform_to_config(&self) -> CycleConfig;
}

/// Identity, metadata and worker plumbing shared by both cycle variants
pub(crate) struct CycleCore {
    pub id: String,
    pub name: String,
    pub collection: String,
    pub origin: String,
    pub cool_down: Duration,

    metadata: RwLock<CycleMetadata>,
    cancel: std::sync::Mutex<CancellationToken>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,

    pub store: Arc<dyn NativeStore>,
    pub task: Arc<dyn PublishTask>,
    pub blacklist: Arc<dyn Blacklist>,
    pub gate: PublishGate,
}

impl CycleCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        collection: &str,
        origin: &str,
        cool_down: Duration,
        store: Arc<dyn NativeStore>,
        task: Arc<dyn PublishTask>,
        blacklist: Arc<dyn Blacklist>,
        gate: PublishGate,
    ) -> Self {
        Self {
            id: cycle_id(name, collection),
            name: name.to_string(),
            collection: collection.to_string(),
            origin: origin.to_string(),
            cool_down,
            metadata: RwLock::new(CycleMetadata::default()),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
            worker: std::sync::Mutex::new(None),
            store,
            task,
            blacklist,
            gate,
        }
    }

    pub async fn metadata(&self) -> CycleMetadata {
        self.metadata.read().await.clone()
    }

    pub async fn set_metadata(&self, mut metadata: CycleMetadata) {
        metadata.normalize();
        *self.metadata.write().await = metadata;
    }

    pub async fn state(&self) -> BTreeSet<CycleState> {
        self.metadata.read().await.state.clone()
    }

    async fn update_progress(&self, uuid: &str, tx_ref: &str, error: Option<String>) {
        self.metadata
            .write()
            .await
            .update_progress(uuid, tx_ref, error);
    }

    async fn set_primary_state(&self, state: CycleState) {
        self.metadata.write().await.set_primary_state(state);
    }

    /// Spawn the worker future unless one is already running.
    pub fn spawn_worker<F, Fut>(&self, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut worker = self.worker.lock().unwrap();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!(id = %self.id, name = %self.name, "cycle already running");
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();
        *worker = Some(tokio::spawn(make(token)));
    }

    /// Cancel the worker and join it with a bounded wait.
    pub async fn stop_worker(&self) {
        let (token, handle) = {
            let token = self.cancel.lock().unwrap().clone();
            let handle = self.worker.lock().unwrap().take();
            (token, handle)
        };

        token.cancel();

        if let Some(mut handle) = handle {
            tokio::select! {
                _ = &mut handle => {}
                _ = tokio::time::sleep(STOP_GRACE) => {
                    tracing::warn!(id = %self.id, name = %self.name,
                        "cycle worker did not acknowledge stop within grace period");
                    handle.abort();
                }
            }
        }

        self.set_primary_state(CycleState::Stopped).await;
        tracing::info!(id = %self.id, name = %self.name, collection = %self.collection, "cycle stopped");
    }
}

/// Producer selection for the two cycle variants
pub(crate) enum ProducerOpener {
    WholeCollection,
    TimeWindow(Duration),
}

impl ProducerOpener {
    /// Whole-collection passes resume from the completed offset; windowed
    /// passes always restart against a fresh window.
    fn resumes_mid_pass(&self) -> bool {
        matches!(self, Self::WholeCollection)
    }

    async fn open(
        &self,
        store: &dyn NativeStore,
        collection: &str,
        skip: usize,
    ) -> SchedulerResult<UuidProducer> {
        match self {
            Self::WholeCollection => {
                UuidProducer::open_whole_collection(store, collection, skip).await
            }
            Self::TimeWindow(window) => {
                UuidProducer::open_time_window(store, collection, *window).await
            }
        }
    }
}

enum PassOutcome {
    Completed,
    Cancelled,
    ProducerError(SchedulerError),
}

/// The common cycle loop. Runs iterations until cancelled.
pub(crate) async fn run(
    core: Arc<CycleCore>,
    cancel: CancellationToken,
    throttle: Option<Throttle>,
    opener: ProducerOpener,
) {
    loop {
        core.set_primary_state(CycleState::Starting).await;

        let skip = if opener.resumes_mid_pass() {
            core.metadata().await.completed as usize
        } else {
            0
        };

        let mut producer = match opener.open(&*core.store, &core.collection, skip).await {
            Ok(producer) => producer,
            Err(err) => {
                tracing::warn!(id = %core.id, name = %core.name, collection = %core.collection,
                    error = %err, "failed to open producer");
                {
                    let mut meta = core.metadata.write().await;
                    meta.current_publish_error = err.to_string();
                    meta.add_overlay(CycleState::Unhealthy);
                    meta.set_primary_state(CycleState::Stopped);
                }
                if !sleep_cancellable(core.cool_down, &cancel).await {
                    return;
                }
                continue;
            }
        };

        begin_iteration(&core, &opener, &producer).await;

        let outcome = publish_pass(&core, &cancel, throttle.as_ref(), &mut producer).await;
        producer.close().await;

        match outcome {
            PassOutcome::Cancelled => {
                core.set_primary_state(CycleState::Stopped).await;
                return;
            }
            PassOutcome::Completed => {
                tracing::info!(id = %core.id, name = %core.name, collection = %core.collection,
                    "finished publishing collection");
                let mut meta = core.metadata.write().await;
                meta.completed = 0;
                meta.recompute_progress();
            }
            PassOutcome::ProducerError(err) => {
                tracing::warn!(id = %core.id, name = %core.name, collection = %core.collection,
                    error = %err, "iteration terminated by producer error");
                let mut meta = core.metadata.write().await;
                meta.errors += 1;
                meta.current_publish_error = err.to_string();
                meta.add_overlay(CycleState::Unhealthy);
            }
        }

        if cancel.is_cancelled() {
            core.set_primary_state(CycleState::Stopped).await;
            return;
        }

        core.set_primary_state(CycleState::Cooldown).await;
        if !sleep_cancellable(core.cool_down, &cancel).await {
            core.set_primary_state(CycleState::Stopped).await;
            return;
        }
    }
}

/// Per-iteration bookkeeping once the producer is open: a successful open
/// clears the unhealthy overlay; a fresh pass advances the iteration
/// counter and resets the per-iteration counters, while a resumed
/// whole-collection pass keeps them.
async fn begin_iteration(core: &CycleCore, opener: &ProducerOpener, producer: &UuidProducer) {
    let mut meta = core.metadata.write().await;
    meta.clear_overlay(CycleState::Unhealthy);

    let resuming = opener.resumes_mid_pass() && meta.completed > 0;
    if !resuming {
        meta.iteration += 1;
        meta.completed = 0;
        meta.errors = 0;
        meta.attempts = 0;
        meta.current_publish_uuid.clear();
        meta.current_publish_ref.clear();
        meta.current_publish_error.clear();
    }

    meta.total = producer.total() as u64;
    if let Some((start, end)) = producer.window() {
        meta.window_start = Some(start);
        meta.window_end = Some(end);
    }
    meta.recompute_progress();
    meta.set_primary_state(CycleState::Running);
}

/// Process one producer pass item by item.
async fn publish_pass(
    core: &CycleCore,
    cancel: &CancellationToken,
    throttle: Option<&Throttle>,
    producer: &mut UuidProducer,
) -> PassOutcome {
    loop {
        match throttle {
            Some(throttle) => match throttle.wait(cancel).await {
                ThrottleResult::Ready => {}
                // a deleted throttle reads as cancellation to its cycles
                ThrottleResult::Cancelled | ThrottleResult::Stopped => {
                    return PassOutcome::Cancelled;
                }
            },
            None => {
                if cancel.is_cancelled() {
                    return PassOutcome::Cancelled;
                }
            }
        }

        if !core.gate.is_healthy() {
            core.metadata.write().await.add_overlay(CycleState::Disabled);
            if !core.gate.wait_until_healthy(cancel).await {
                return PassOutcome::Cancelled;
            }
            core.metadata
                .write()
                .await
                .clear_overlay(CycleState::Disabled);
        }

        let uuid = match producer.next().await {
            Err(err) => return PassOutcome::ProducerError(err),
            Ok(None) => return PassOutcome::Completed,
            Ok(Some(uuid)) => uuid,
        };

        if uuid.trim().is_empty() {
            tracing::warn!(id = %core.id, name = %core.name, collection = %core.collection,
                "next uuid is empty, skipping");
            core.update_progress(&uuid, "", Some("empty uuid".to_string()))
                .await;
            continue;
        }

        tracing::debug!(id = %core.id, name = %core.name, collection = %core.collection,
            uuid = %uuid, "running publish task");

        let prepared = match core.task.prepare(&core.collection, &uuid).await {
            Ok(prepared) => prepared,
            Err(err) => {
                core.update_progress(&uuid, "", Some(err.to_string())).await;
                continue;
            }
        };

        match core.blacklist.valid_for_publish(&uuid, &prepared.content) {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(id = %core.id, uuid = %uuid, "uuid excluded by blacklist, skipping publish");
                core.update_progress(&uuid, &prepared.tx_id, None).await;
                continue;
            }
            Err(err) => {
                core.update_progress(&uuid, &prepared.tx_id, Some(err.to_string()))
                    .await;
                continue;
            }
        }

        let result = core
            .task
            .execute(&uuid, &prepared.content, &core.origin, &prepared.tx_id)
            .await;
        if let Err(ref err) = result {
            tracing::warn!(id = %core.id, name = %core.name, uuid = %uuid,
                error = %err, "failed to publish");
        }
        core.update_progress(&uuid, &prepared.tx_id, result.err().map(|e| e.to_string()))
            .await;
    }
}

/// Sleep for `duration` unless cancelled first; returns `false` on cancel.
async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
