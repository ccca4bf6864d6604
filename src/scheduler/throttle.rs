//! Shared publish throttle
//!
//! A throttle is a first-class entity with its own lifecycle: cycles hold a
//! reference by name, so several cycles sharing one throttle share a single
//! rate budget. A background ticker feeds a bounded channel at the
//! configured interval; each `wait` consumes one tick. The channel mutex is
//! FIFO-fair, so waiters sharing a throttle are served in arrival order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{SchedulerError, SchedulerResult};

/// Outcome of a [`Throttle::wait`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleResult {
    /// A tick was acquired; the caller may dispatch one item
    Ready,
    /// The caller's cancellation token fired before a tick arrived
    Cancelled,
    /// The throttle itself was stopped; no further ticks will come
    Stopped,
}

struct Inner {
    interval: Duration,
    ticks: Mutex<mpsc::Receiver<()>>,
    stop: CancellationToken,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Rate limiter gating dispatch across the cycles that share it
#[derive(Clone)]
pub struct Throttle {
    inner: Arc<Inner>,
}

impl Throttle {
    /// Create a throttle ticking every `interval`, buffering at most
    /// `burst` unconsumed ticks.
    pub fn new(interval: Duration, burst: usize) -> SchedulerResult<Self> {
        if interval.is_zero() {
            return Err(SchedulerError::invalid_config(
                "throttle interval must be non-zero",
            ));
        }

        let (tx, rx) = mpsc::channel(burst.max(1));
        let stop = CancellationToken::new();

        let ticker_stop = stop.clone();
        let ticker = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = ticker_stop.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = ticker_stop.cancelled() => break,
                            sent = tx.send(()) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            inner: Arc::new(Inner {
                interval,
                ticks: Mutex::new(rx),
                stop,
                ticker: std::sync::Mutex::new(Some(ticker)),
            }),
        })
    }

    /// The configured average period between acquisitions.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Block until the next tick, the caller's cancellation, or throttle stop.
    pub async fn wait(&self, cancel: &CancellationToken) -> ThrottleResult {
        tokio::select! {
            _ = cancel.cancelled() => ThrottleResult::Cancelled,
            _ = self.inner.stop.cancelled() => ThrottleResult::Stopped,
            tick = async {
                let mut ticks = self.inner.ticks.lock().await;
                ticks.recv().await
            } => match tick {
                Some(()) => ThrottleResult::Ready,
                None => ThrottleResult::Stopped,
            },
        }
    }

    /// Stop the ticker and release every current and future waiter with
    /// [`ThrottleResult::Stopped`]. Idempotent.
    pub fn stop(&self) {
        self.inner.stop.cancel();
        if let Some(handle) = self.inner.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.is_cancelled()
    }
}
