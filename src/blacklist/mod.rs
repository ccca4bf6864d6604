//! Publish-eligibility filtering
//!
//! A blacklist decides per (uuid, content) whether an item may be
//! republished. Filters are chained: every filter must pass for the item
//! to be valid. The file-based filter excludes any uuid that appears on a
//! line of the given file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::native::Content;
use crate::scheduler::error::{SchedulerError, SchedulerResult};

/// Per-item publish eligibility predicate
pub trait Blacklist: Send + Sync {
    /// `Ok(false)` means the item is excluded from publishing.
    fn valid_for_publish(&self, uuid: &str, content: &Content) -> SchedulerResult<bool>;
}

type Filter = Arc<dyn Fn(&str, &Content) -> SchedulerResult<bool> + Send + Sync>;

/// Chains filters; all must pass.
pub struct ChainedBlacklist {
    chain: Vec<Filter>,
}

impl std::fmt::Debug for ChainedBlacklist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedBlacklist")
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

impl Blacklist for ChainedBlacklist {
    fn valid_for_publish(&self, uuid: &str, content: &Content) -> SchedulerResult<bool> {
        for filter in &self.chain {
            match filter(uuid, content)? {
                true => continue,
                false => return Ok(false),
            }
        }
        Ok(true)
    }
}

/// A blacklist that excludes nothing, used when no filters are configured.
pub struct NoopBlacklist;

impl Blacklist for NoopBlacklist {
    fn valid_for_publish(&self, _uuid: &str, _content: &Content) -> SchedulerResult<bool> {
        Ok(true)
    }
}

/// Builds a [`ChainedBlacklist`] from the configured filters.
///
/// Construction errors are accumulated and all of them are reported by
/// `build`, so a misconfigured deployment surfaces every broken filter at
/// once rather than only the last.
#[derive(Default)]
pub struct Builder {
    chain: Vec<Filter>,
    errors: Vec<String>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file-based filter: each line of the file is an excluded uuid.
    pub fn file_based(mut self, path: impl AsRef<Path>) -> Self {
        let path: PathBuf = path.as_ref().to_path_buf();
        match load_uuid_set(&path) {
            Ok(excluded) => {
                self.chain.push(Arc::new(move |uuid, _content| {
                    Ok(!excluded.contains(uuid))
                }));
            }
            Err(err) => {
                self.errors.push(format!("{}: {err}", path.display()));
            }
        }
        self
    }

    pub fn build(self) -> SchedulerResult<ChainedBlacklist> {
        if !self.errors.is_empty() {
            return Err(SchedulerError::invalid_config(format!(
                "blacklist construction failed: {}",
                self.errors.join("; ")
            )));
        }
        Ok(ChainedBlacklist { chain: self.chain })
    }
}

fn load_uuid_set(path: &Path) -> std::io::Result<HashSet<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
