//! Downstream notification client and the publish task built on it
//!
//! Each republished document is POSTed to the downstream notification
//! endpoint with its origin system, per-item correlation token and a hash
//! of the native payload. [`NativeContentPublishTask`] is the concrete
//! [`PublishTask`]: prepare reads the native document and derives the
//! correlation token, execute submits it through the notifier.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::native::{Content, NativeStore};
use crate::scheduler::cycle::{PreparedPublish, PublishTask};
use crate::scheduler::error::{SchedulerError, SchedulerResult};

/// Downstream notification endpoint
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        origin: &str,
        tx_id: &str,
        content: &Content,
        hash: &str,
    ) -> SchedulerResult<()>;
}

/// HTTP implementation of [`Notifier`]
pub struct HttpNotifier {
    client: reqwest::Client,
    notify_url: String,
}

impl HttpNotifier {
    pub fn new(notify_url: impl Into<String>) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| SchedulerError::task(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            notify_url: notify_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        origin: &str,
        tx_id: &str,
        content: &Content,
        hash: &str,
    ) -> SchedulerResult<()> {
        let body = serde_json::to_vec(&content.body)
            .map_err(|err| SchedulerError::task(format!("failed to encode body: {err}")))?;

        let content_type = if content.content_type.is_empty() {
            "application/json"
        } else {
            &content.content_type
        };

        let response = self
            .client
            .post(&self.notify_url)
            .header("Content-Type", content_type)
            .header("X-Origin-System-Id", origin)
            .header("X-Request-Id", tx_id)
            .header("X-Native-Hash", hash)
            .body(body)
            .send()
            .await
            .map_err(|err| SchedulerError::task(format!("notify request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchedulerError::task(format!(
                "notify returned {status} for {tx_id}"
            )));
        }

        Ok(())
    }
}

/// Publish task reading native content and submitting it downstream
pub struct NativeContentPublishTask {
    store: Arc<dyn NativeStore>,
    notifier: Arc<dyn Notifier>,
}

impl NativeContentPublishTask {
    pub fn new(store: Arc<dyn NativeStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }
}

/// Hash of the native payload, forwarded so the downstream can detect
/// unchanged republishes.
pub fn native_hash(content: &Content) -> String {
    let body = serde_json::to_vec(&content.body).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&body);
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl PublishTask for NativeContentPublishTask {
    async fn prepare(&self, collection: &str, uuid: &str) -> SchedulerResult<PreparedPublish> {
        let tx = self.store.open().await?;
        let content = tx.read_content(collection, uuid).await?;
        let tx_id = format!("tid_{}", Uuid::new_v4().simple());
        Ok(PreparedPublish { content, tx_id })
    }

    async fn execute(
        &self,
        uuid: &str,
        content: &Content,
        origin: &str,
        tx_id: &str,
    ) -> SchedulerResult<()> {
        let hash = native_hash(content);
        tracing::debug!(uuid, tx_id, origin, "notifying downstream");
        self.notifier.notify(origin, tx_id, content, &hash).await
    }
}
