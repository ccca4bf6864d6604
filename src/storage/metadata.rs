//! Metadata checkpoint store
//!
//! Checkpoints let long-term cycles survive process restarts: the scheduler
//! periodically snapshots each resumable cycle's metadata and rejoins the
//! latest snapshot on startup. Snapshots are JSON files under one directory
//! per cycle id, keyed by a UTC timestamp of the form `YYYYMMDDThhmmssNN`
//! (`NN` = centiseconds) so lexicographic order matches chronological order
//! and "latest" is a single list-and-max.

use async_trait::async_trait;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::scheduler::error::{SchedulerError, SchedulerResult};
use crate::scheduler::metadata::CycleMetadata;

/// Checkpoint read/writer keyed by cycle id
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load the most recent checkpoint for the id; `None` when the cycle
    /// has never checkpointed.
    async fn load(&self, id: &str) -> SchedulerResult<Option<CycleMetadata>>;

    /// Persist a new checkpoint for the id.
    async fn write(&self, id: &str, metadata: &CycleMetadata) -> SchedulerResult<()>;
}

/// File-backed [`MetadataStore`]
pub struct FileMetadataStore {
    root: PathBuf,
}

impl FileMetadataStore {
    pub fn new(root: impl AsRef<Path>) -> SchedulerResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|err| {
            SchedulerError::checkpoint(format!(
                "failed to create checkpoint directory {}: {err}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    fn checkpoint_key() -> String {
        let now = Utc::now();
        let centis = now.timestamp_subsec_millis() / 10;
        format!("{}{centis:02}", now.format("%Y%m%dT%H%M%S"))
    }

    fn latest_path(&self, id: &str) -> SchedulerResult<Option<PathBuf>> {
        let dir = self.root.join(id);
        if !dir.exists() {
            return Ok(None);
        }

        let mut latest: Option<(String, PathBuf)> = None;
        let entries = fs::read_dir(&dir).map_err(|err| {
            SchedulerError::checkpoint(format!("failed to list {}: {err}", dir.display()))
        })?;

        for entry in entries {
            let entry = entry.map_err(|err| {
                SchedulerError::checkpoint(format!("failed to list {}: {err}", dir.display()))
            })?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = name.strip_suffix(".json") else {
                continue;
            };
            if latest.as_ref().map_or(true, |(k, _)| key > k.as_str()) {
                latest = Some((key.to_string(), path));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn load(&self, id: &str) -> SchedulerResult<Option<CycleMetadata>> {
        let Some(path) = self.latest_path(id)? else {
            return Ok(None);
        };

        let file = File::open(&path).map_err(|err| {
            SchedulerError::checkpoint(format!("failed to open {}: {err}", path.display()))
        })?;
        let metadata = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            SchedulerError::checkpoint(format!("failed to decode {}: {err}", path.display()))
        })?;

        tracing::debug!(id, path = %path.display(), "checkpoint loaded");
        Ok(Some(metadata))
    }

    async fn write(&self, id: &str, metadata: &CycleMetadata) -> SchedulerResult<()> {
        let dir = self.root.join(id);
        fs::create_dir_all(&dir).map_err(|err| {
            SchedulerError::checkpoint(format!("failed to create {}: {err}", dir.display()))
        })?;

        let key = Self::checkpoint_key();
        let path = dir.join(format!("{key}.json"));
        let temp = dir.join(format!("{key}.json.tmp"));

        let file = File::create(&temp).map_err(|err| {
            SchedulerError::checkpoint(format!("failed to create {}: {err}", temp.display()))
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), metadata).map_err(|err| {
            SchedulerError::checkpoint(format!("failed to encode checkpoint for {id}: {err}"))
        })?;

        // rename keeps readers from ever seeing a partial checkpoint
        fs::rename(&temp, &path).map_err(|err| {
            SchedulerError::checkpoint(format!("failed to rename {}: {err}", temp.display()))
        })?;

        tracing::debug!(id, key = %key, "checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::metadata::CycleState;
    use tempfile::TempDir;

    fn sample_metadata() -> CycleMetadata {
        let mut meta = CycleMetadata {
            current_publish_uuid: "u500".to_string(),
            current_publish_ref: "tid_500".to_string(),
            completed: 500,
            total: 12000,
            iteration: 1,
            errors: 3,
            ..Default::default()
        };
        meta.recompute_progress();
        meta.set_primary_state(CycleState::Running);
        meta
    }

    #[tokio::test]
    async fn test_write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(dir.path()).unwrap();
        let metadata = sample_metadata();

        store.write("6f2a9cbe01d741c0", &metadata).await.unwrap();
        let loaded = store.load("6f2a9cbe01d741c0").await.unwrap().unwrap();

        assert_eq!(loaded, metadata);
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(dir.path()).unwrap();

        assert!(store.load("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_resolves_latest_key() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(dir.path()).unwrap();

        let mut first = sample_metadata();
        first.completed = 100;
        store.write("id", &first).await.unwrap();

        // land in a later centisecond so the keys differ
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;

        let mut second = sample_metadata();
        second.completed = 200;
        store.write("id", &second).await.unwrap();

        let loaded = store.load("id").await.unwrap().unwrap();
        assert_eq!(loaded.completed, 200);
    }

    #[tokio::test]
    async fn test_checkpoints_are_isolated_per_id() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(dir.path()).unwrap();

        let mut a = sample_metadata();
        a.completed = 1;
        let mut b = sample_metadata();
        b.completed = 2;

        store.write("cycle-a", &a).await.unwrap();
        store.write("cycle-b", &b).await.unwrap();

        assert_eq!(store.load("cycle-a").await.unwrap().unwrap().completed, 1);
        assert_eq!(store.load("cycle-b").await.unwrap().unwrap().completed, 2);
    }

    #[test]
    fn test_key_format_sorts_chronologically() {
        let key = FileMetadataStore::checkpoint_key();
        assert_eq!(key.len(), "YYYYMMDDThhmmssNN".len());
        assert!(key.chars().nth(8) == Some('T'));
    }
}
