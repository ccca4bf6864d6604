//! carousel - Continuous Republish Scheduler
//!
//! A service that continuously republishes content from the native store
//! through the downstream notification endpoint, so consumers can rebuild
//! derived state. Cycles walk a backing collection at a controlled rate,
//! checkpoint their progress so they survive restarts, pause when the
//! cluster forbids publishing, and are controlled at runtime over HTTP.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scheduler`] - The cycle engine: cycles, producers, throttles and the
//!   scheduler that coordinates them
//! - [`native`] - Document store contract and the in-memory implementation
//! - [`storage`] - Metadata checkpoint persistence
//! - [`notifications`] - Downstream notification client and publish task
//! - [`blacklist`] - Publish-eligibility filtering
//! - [`cluster`] - Cluster health gate and good-to-go polling
//! - [`api`] - HTTP control surface
//! - [`config`] - YAML startup configuration
//!
//! # Example
//!
//! ```no_run
//! use carousel::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(InMemoryNativeStore::new());
//!     let notifier = Arc::new(HttpNotifier::new("http://localhost:8080/notify")?);
//!     let task = Arc::new(NativeContentPublishTask::new(store.clone(), notifier));
//!     let metadata_store = Arc::new(FileMetadataStore::new("./carousel-state")?);
//!
//!     let scheduler = Arc::new(CarouselScheduler::new(
//!         store,
//!         task,
//!         Arc::new(NoopBlacklist),
//!         metadata_store,
//!         PublishGate::always_open(),
//!     ));
//!     scheduler.restore_previous_state().await;
//!     scheduler.start().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod blacklist;
pub mod cluster;
pub mod config;
pub mod error;
pub mod native;
pub mod notifications;
pub mod scheduler;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::blacklist::{Blacklist, NoopBlacklist};
    pub use crate::cluster::PublishGate;
    pub use crate::config::CarouselConfig;
    pub use crate::error::{Error, Result};
    pub use crate::native::{Content, InMemoryNativeStore, NativeStore};
    pub use crate::notifications::{HttpNotifier, NativeContentPublishTask, Notifier};
    pub use crate::scheduler::{
        CarouselScheduler, Cycle, CycleConfig, CycleMetadata, CycleState, Throttle,
    };
    pub use crate::storage::{FileMetadataStore, MetadataStore};
}

// Direct re-exports for convenience
pub use scheduler::{CarouselScheduler, CycleConfig, CycleMetadata, CycleState};
