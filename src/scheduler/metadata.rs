//! Cycle progress metadata
//!
//! [`CycleMetadata`] is the per-cycle progress record: it is mutated after
//! every processed item, snapshotted by the control surface, and persisted
//! as a checkpoint so long-term cycles resume mid-pass after a restart. The
//! serialized field names are the wire/payload contract and must not drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// State tags for a cycle.
///
/// A cycle's state is a set: `unhealthy` and `disabled` are transient
/// overlays that coexist with the primary tag. Variants are declared in
/// alphabetical order so the serialized set is the sorted tag list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    /// Between iterations, sleeping
    Cooldown,
    /// The cluster gate forbids publishing (overlay)
    Disabled,
    /// Producer open, items being processed
    Running,
    /// Loop entered, producer not yet open
    Starting,
    /// Not currently executing; may be resumed
    Stopped,
    /// Last producer open or iteration reported an error (overlay)
    Unhealthy,
}

impl CycleState {
    /// Overlays coexist with the primary state instead of replacing it.
    pub fn is_overlay(&self) -> bool {
        matches!(self, Self::Unhealthy | Self::Disabled)
    }
}

/// Progress record for one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleMetadata {
    #[serde(rename = "currentPublishUuid")]
    pub current_publish_uuid: String,

    #[serde(rename = "currentPublishReference")]
    pub current_publish_ref: String,

    /// Error of the most recent item; empty when it succeeded
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_publish_error: String,

    /// Cumulative error count within the current run
    pub errors: u64,

    /// completed / total, 0 when total is unknown
    pub progress: f64,

    /// Sorted state tag set; never empty
    pub state: BTreeSet<CycleState>,

    /// Items processed this iteration
    pub completed: u64,

    /// Producer-reported size of this iteration, 0 when unknown
    pub total: u64,

    /// Monotonically increasing pass counter
    pub iteration: u64,

    /// Retries accumulated for the current item
    pub attempts: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
}

impl Default for CycleMetadata {
    fn default() -> Self {
        Self {
            current_publish_uuid: String::new(),
            current_publish_ref: String::new(),
            current_publish_error: String::new(),
            errors: 0,
            progress: 0.0,
            state: BTreeSet::from([CycleState::Stopped]),
            completed: 0,
            total: 0,
            iteration: 0,
            attempts: 0,
            window_start: None,
            window_end: None,
        }
    }
}

impl CycleMetadata {
    /// Record the outcome of one processed item.
    pub fn update_progress(&mut self, uuid: &str, tx_ref: &str, error: Option<String>) {
        match error {
            Some(err) => {
                self.errors += 1;
                self.current_publish_error = err;
            }
            None => self.current_publish_error.clear(),
        }

        self.completed += 1;
        self.current_publish_uuid = uuid.to_string();
        self.current_publish_ref = tx_ref.to_string();
        self.recompute_progress();
    }

    pub fn recompute_progress(&mut self) {
        if self.total == 0 {
            self.progress = 0.0;
        } else {
            self.progress = self.completed as f64 / self.total as f64;
        }
    }

    /// Replace the primary state tag, preserving overlays.
    pub fn set_primary_state(&mut self, state: CycleState) {
        self.state.retain(|tag| tag.is_overlay());
        self.state.insert(state);
    }

    pub fn add_overlay(&mut self, state: CycleState) {
        debug_assert!(state.is_overlay());
        self.state.insert(state);
    }

    pub fn clear_overlay(&mut self, state: CycleState) {
        self.state.remove(&state);
    }

    /// Ensure the state set is never empty, as the serialized contract requires.
    pub fn normalize(&mut self) {
        if self.state.is_empty() {
            self.state.insert(CycleState::Stopped);
        }
    }
}
