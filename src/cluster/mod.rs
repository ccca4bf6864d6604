//! Cluster health gate
//!
//! Publishing is only allowed while the surrounding cluster is in a fit
//! state. [`PublishGate`] is the boolean signal the cycle loops block on;
//! [`GtgPoller`] drives it by checking the good-to-go endpoints of the
//! configured cluster services on an interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared healthy-to-publish signal
#[derive(Clone)]
pub struct PublishGate {
    tx: Arc<watch::Sender<bool>>,
}

impl PublishGate {
    pub fn new(initially_healthy: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_healthy);
        Self { tx: Arc::new(tx) }
    }

    /// A gate that always allows publishing.
    pub fn always_open() -> Self {
        Self::new(true)
    }

    pub fn set_healthy(&self, healthy: bool) {
        // send_replace never fails and notifies only on change
        let previous = self.tx.send_replace(healthy);
        if previous != healthy {
            tracing::info!(healthy, "cluster publish gate changed");
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver for edge notifications.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Block until the gate opens; returns `false` if cancelled first.
    pub async fn wait_until_healthy(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

/// A cluster service whose good-to-go endpoint gates publishing
#[derive(Debug, Clone)]
pub struct GtgService {
    pub name: String,
    pub url: String,
}

/// Polls service good-to-go endpoints and drives the [`PublishGate`]
pub struct GtgPoller {
    services: Vec<GtgService>,
    client: reqwest::Client,
    interval: Duration,
    gate: PublishGate,
}

impl GtgPoller {
    pub fn new(services: Vec<GtgService>, interval: Duration, gate: PublishGate) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            services,
            client,
            interval,
            gate,
        }
    }

    /// Check every service once; errors from all failing services are
    /// concatenated into one message.
    pub async fn check_all(&self) -> Result<(), String> {
        let mut failures = Vec::new();

        for service in &self.services {
            match self.client.get(&service.url).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    failures.push(format!(
                        "gtg for {} returned {}",
                        service.name,
                        resp.status()
                    ));
                }
                Err(err) => {
                    failures.push(format!("gtg for {} failed: {err}", service.name));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }

    /// Start polling in the background until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.check_all().await {
                            Ok(()) => self.gate.set_healthy(true),
                            Err(reason) => {
                                tracing::warn!(%reason, "cluster not good to go, suspending publishing");
                                self.gate.set_healthy(false);
                            }
                        }
                    }
                }
            }
        })
    }
}
