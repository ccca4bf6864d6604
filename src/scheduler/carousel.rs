//! The carousel scheduler
//!
//! Owns the directories of cycles and throttles, wires new cycles to the
//! shared collaborators, restores checkpoints on startup, checkpoints
//! periodically while running, and reacts to the manual and automatic
//! enablement toggles. Lifecycle calls on a cycle are issued without
//! holding the directory write lock, because `stop` joins the cycle's
//! worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::cycle::{Cycle, CycleConfig, CycleKind, PublishTask};
use super::error::{SchedulerError, SchedulerResult};
use super::short_term::ShortTermCycle;
use super::throttle::Throttle;
use super::whole_collection::ThrottledWholeCollectionCycle;
use crate::blacklist::Blacklist;
use crate::cluster::PublishGate;
use crate::config::{parse_duration, CarouselConfig};
use crate::native::NativeStore;
use crate::storage::MetadataStore;

#[derive(Debug)]
struct Toggles {
    manual: bool,
    automatic: bool,
    was_automatically_disabled: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            manual: true,
            automatic: true,
            was_automatically_disabled: false,
        }
    }
}

pub struct CarouselScheduler {
    store: Arc<dyn NativeStore>,
    task: Arc<dyn PublishTask>,
    blacklist: Arc<dyn Blacklist>,
    metadata_store: Arc<dyn MetadataStore>,
    gate: PublishGate,

    cycles: RwLock<HashMap<String, Arc<dyn Cycle>>>,
    throttles: RwLock<HashMap<String, Throttle>>,
    toggles: std::sync::Mutex<Toggles>,

    shutdown: CancellationToken,
    saver: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CarouselScheduler {
    pub fn new(
        store: Arc<dyn NativeStore>,
        task: Arc<dyn PublishTask>,
        blacklist: Arc<dyn Blacklist>,
        metadata_store: Arc<dyn MetadataStore>,
        gate: PublishGate,
    ) -> Self {
        Self {
            store,
            task,
            blacklist,
            metadata_store,
            gate,
            cycles: RwLock::new(HashMap::new()),
            throttles: RwLock::new(HashMap::new()),
            toggles: std::sync::Mutex::new(Toggles::default()),
            shutdown: CancellationToken::new(),
            saver: std::sync::Mutex::new(None),
        }
    }

    /// Install every throttle and cycle from the startup configuration.
    pub async fn apply_config(&self, config: &CarouselConfig) -> SchedulerResult<()> {
        for throttle in &config.throttles {
            self.add_throttle(&throttle.name, throttle.interval).await?;
        }
        for cycle in &config.cycles {
            self.add_cycle(cycle.clone()).await?;
        }
        Ok(())
    }

    /// Snapshot of the cycle directory.
    pub async fn cycles(&self) -> HashMap<String, Arc<dyn Cycle>> {
        self.cycles.read().await.clone()
    }

    /// Snapshot of the throttle directory.
    pub async fn throttles(&self) -> HashMap<String, Throttle> {
        self.throttles.read().await.clone()
    }

    pub async fn cycle(&self, id: &str) -> Option<Arc<dyn Cycle>> {
        self.cycles.read().await.get(id).cloned()
    }

    pub async fn add_throttle(&self, name: &str, interval: Duration) -> SchedulerResult<()> {
        if name.trim().is_empty() {
            return Err(SchedulerError::invalid_config("throttle name is required"));
        }

        let mut throttles = self.throttles.write().await;
        if throttles.contains_key(name) {
            return Err(SchedulerError::conflict(format!("throttle name {name}")));
        }

        throttles.insert(name.to_string(), Throttle::new(interval, 1)?);
        Ok(())
    }

    /// Stop and remove a throttle. Cycles still referencing it observe
    /// their next wait returning the terminal signal and stop.
    pub async fn delete_throttle(&self, name: &str) -> SchedulerResult<()> {
        let mut throttles = self.throttles.write().await;
        let throttle = throttles
            .remove(name)
            .ok_or_else(|| SchedulerError::not_found(format!("throttle {name}")))?;
        throttle.stop();
        Ok(())
    }

    /// Materialize a cycle from its configuration without storing it.
    pub async fn new_cycle(&self, config: &CycleConfig) -> SchedulerResult<Arc<dyn Cycle>> {
        config.validate()?;

        let cycle: Arc<dyn Cycle> = match config.kind()? {
            CycleKind::ThrottledWholeCollection => {
                let reference = config.throttle.as_deref().unwrap_or_default();
                let throttle = self.resolve_throttle(&config.name, reference).await?;
                Arc::new(ThrottledWholeCollectionCycle::new(
                    &config.name,
                    &config.collection,
                    &config.origin,
                    config.cool_down,
                    throttle,
                    self.store.clone(),
                    self.task.clone(),
                    self.blacklist.clone(),
                    self.gate.clone(),
                ))
            }
            CycleKind::ShortTerm => Arc::new(ShortTermCycle::new(
                &config.name,
                &config.collection,
                &config.origin,
                config.cool_down,
                config.time_window.unwrap_or_default(),
                self.store.clone(),
                self.task.clone(),
                self.blacklist.clone(),
                self.gate.clone(),
            )),
        };

        Ok(cycle)
    }

    /// A cycle's throttle field is either the name of a shared throttle or
    /// an interval for a throttle dedicated to the cycle.
    async fn resolve_throttle(&self, cycle_name: &str, reference: &str) -> SchedulerResult<Throttle> {
        if let Some(throttle) = self.throttles.read().await.get(reference) {
            return Ok(throttle.clone());
        }

        let interval = parse_duration(reference).map_err(|_| {
            SchedulerError::not_found(format!(
                "throttle {reference} for cycle {cycle_name}"
            ))
        })?;

        let mut throttles = self.throttles.write().await;
        if let Some(existing) = throttles.get(cycle_name) {
            if existing.interval() == interval {
                return Ok(existing.clone());
            }
            existing.stop();
        }

        let throttle = Throttle::new(interval, 1)?;
        throttles.insert(cycle_name.to_string(), throttle.clone());
        Ok(throttle)
    }

    /// Validate, construct and store a cycle. Does not start it.
    pub async fn add_cycle(&self, config: CycleConfig) -> SchedulerResult<String> {
        let cycle = self.new_cycle(&config).await?;
        let id = cycle.id().to_string();

        let mut cycles = self.cycles.write().await;
        if cycles.contains_key(&id) {
            return Err(SchedulerError::conflict(format!(
                "cycle id {id} for cycle {}",
                config.name
            )));
        }
        cycles.insert(id.clone(), cycle);

        tracing::info!(id = %id, name = %config.name, collection = %config.collection, "cycle added");
        Ok(id)
    }

    /// Stop and remove a cycle.
    pub async fn delete_cycle(&self, id: &str) -> SchedulerResult<()> {
        let cycle = self
            .cycle(id)
            .await
            .ok_or_else(|| SchedulerError::not_found(format!("cycle {id}")))?;

        cycle.stop().await;
        self.cycles.write().await.remove(id);
        Ok(())
    }

    /// Rejoin persisted metadata to every resumable cycle. A missing
    /// checkpoint is not an error; failures are logged and skipped.
    pub async fn restore_previous_state(&self) {
        for (id, cycle) in self.cycles().await {
            if !cycle.is_resumable() {
                continue;
            }

            match self.metadata_store.load(&id).await {
                Ok(Some(mut metadata)) => {
                    tracing::info!(id = %id, iteration = metadata.iteration,
                        completed = metadata.completed, "restoring cycle state");
                    metadata.set_primary_state(super::metadata::CycleState::Stopped);
                    cycle.set_metadata(metadata).await;
                }
                Ok(None) => {
                    tracing::debug!(id = %id, "no checkpoint found, starting from initial state");
                }
                Err(err) => {
                    tracing::warn!(id = %id, error = %err,
                        "failed to load checkpoint, starting from initial state");
                }
            }
        }
    }

    /// Start every cycle, unless the toggles currently disable publishing.
    pub async fn start(&self) {
        if !self.is_enabled() {
            tracing::warn!("scheduler is disabled, not starting cycles");
            return;
        }
        for (id, cycle) in self.cycles().await {
            tracing::info!(id = %id, "starting cycle");
            cycle.start();
        }
    }

    async fn stop_all(&self) {
        for (id, cycle) in self.cycles().await {
            tracing::info!(id = %id, "stopping cycle");
            cycle.stop().await;
        }
    }

    /// Follow the cluster gate: drive the automatic toggle on every edge
    /// so a cluster that forbids publishing stops the cycles outright.
    pub fn start_gate_watcher(self: &Arc<Self>) {
        let scheduler = self.clone();
        let cancel = self.shutdown.clone();
        let mut rx = self.gate.subscribe();
        tokio::spawn(async move {
            loop {
                let healthy = *rx.borrow_and_update();
                // repeated same-value edges are absorbed by the toggle
                scheduler
                    .automatic_toggle(if healthy { "true" } else { "false" })
                    .await;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Periodically checkpoint every resumable cycle until shutdown.
    pub fn start_checkpointing(self: &Arc<Self>, interval: Duration) {
        let scheduler = self.clone();
        let cancel = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the immediate first tick would checkpoint pristine metadata
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => scheduler.persist_metadata().await,
                }
            }
        });
        *self.saver.lock().unwrap() = Some(handle);
    }

    /// Write the current metadata of every resumable cycle. Individual
    /// failures are logged; the rest still get written.
    pub async fn persist_metadata(&self) {
        for (id, cycle) in self.cycles().await {
            if !cycle.is_resumable() {
                continue;
            }
            let metadata = cycle.metadata().await;
            if let Err(err) = self.metadata_store.write(&id, &metadata).await {
                tracing::warn!(id = %id, error = %err, "failed to write checkpoint");
            }
        }
    }

    /// Stop everything and persist final checkpoints.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down the carousel scheduler");
        self.shutdown.cancel();
        if let Some(handle) = self.saver.lock().unwrap().take() {
            handle.abort();
        }

        self.stop_all().await;
        self.persist_metadata().await;

        for (name, throttle) in self.throttles().await {
            tracing::debug!(name = %name, "stopping throttle");
            throttle.stop();
        }
    }

    /// Operator-driven enable/disable. `value` is `"true"` or `"false"`.
    pub async fn manual_toggle(&self, value: &str) {
        let Some(value) = parse_toggle(value) else {
            tracing::warn!(value, "ignoring invalid manual toggle value");
            return;
        };
        self.apply_toggle(value, None).await;
    }

    /// Cluster-driven enable/disable. `value` is `"true"` or `"false"`.
    pub async fn automatic_toggle(&self, value: &str) {
        let Some(value) = parse_toggle(value) else {
            tracing::warn!(value, "ignoring invalid automatic toggle value");
            return;
        };
        self.apply_toggle(value, Some(value)).await;
    }

    async fn apply_toggle(&self, value: bool, automatic: Option<bool>) {
        let (was_enabled, now_enabled) = {
            let mut toggles = self.toggles.lock().unwrap();
            let was = toggles.manual && toggles.automatic;
            match automatic {
                Some(auto) => {
                    toggles.automatic = auto;
                    if !auto {
                        toggles.was_automatically_disabled = true;
                    }
                }
                None => toggles.manual = value,
            }
            (was, toggles.manual && toggles.automatic)
        };

        if was_enabled && !now_enabled {
            tracing::info!("publishing disabled, stopping all cycles");
            self.stop_all().await;
        } else if !was_enabled && now_enabled {
            tracing::info!("publishing enabled, starting all cycles");
            for (_, cycle) in self.cycles().await {
                cycle.start();
            }
        }
    }

    /// The effective enabled state: the conjunction of both toggles.
    pub fn is_enabled(&self) -> bool {
        let toggles = self.toggles.lock().unwrap();
        toggles.manual && toggles.automatic
    }

    pub fn is_automatically_disabled(&self) -> bool {
        !self.toggles.lock().unwrap().automatic
    }

    pub fn was_automatically_disabled(&self) -> bool {
        self.toggles.lock().unwrap().was_automatically_disabled
    }

    pub fn gate(&self) -> PublishGate {
        self.gate.clone()
    }
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
