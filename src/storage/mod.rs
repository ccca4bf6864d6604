//! Checkpoint persistence for cycle metadata

pub mod metadata;

pub use metadata::{FileMetadataStore, MetadataStore};
