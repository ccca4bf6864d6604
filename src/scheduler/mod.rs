//! The cycle engine
//!
//! This module is the core of the carousel: the data model and state
//! machines for the cycle variants, the shared throttle that paces them,
//! the uuid producers they iterate, and the scheduler that owns and
//! coordinates the whole set.
//!
//! # Overview
//!
//! Scheduler → Cycle → Producer → (uuids) → Throttle.wait → Blacklist →
//! PublishTask.execute → downstream. Progress updates after each item flow
//! back into the cycle's [`CycleMetadata`]; the metadata store checkpoints
//! it so long-term cycles resume mid-pass after a restart.
//!
//! # Modules
//!
//! - [`carousel`] - the scheduler owning the cycle and throttle directories
//! - [`cycle`] - the `Cycle` trait, configuration and the common loop
//! - [`whole_collection`] - throttled whole-collection walks (resumable)
//! - [`short_term`] - time-window walks
//! - [`producer`] - lazy uuid sequences backed by the document store
//! - [`throttle`] - the shared rate-limiting primitive
//! - [`metadata`] - per-cycle progress record and state tags
//! - [`error`] - engine error types

pub mod carousel;
pub mod cycle;
pub mod error;
pub mod metadata;
pub mod producer;
pub mod short_term;
pub mod throttle;
pub mod whole_collection;

pub use carousel::CarouselScheduler;
pub use cycle::{cycle_id, Cycle, CycleConfig, CycleKind, PreparedPublish, PublishTask};
pub use error::{SchedulerError, SchedulerResult};
pub use metadata::{CycleMetadata, CycleState};
pub use producer::UuidProducer;
pub use short_term::ShortTermCycle;
pub use throttle::{Throttle, ThrottleResult};
pub use whole_collection::ThrottledWholeCollectionCycle;
