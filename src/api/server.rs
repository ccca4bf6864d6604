//! Control surface server
//!
//! Wraps the router with request tracing and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::trace::TraceLayer;

use super::create_router;
use crate::error::{Error, Result};
use crate::scheduler::CarouselScheduler;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<CarouselScheduler>,
    pub start_time: Instant,
}

/// HTTP server for the control surface
pub struct CarouselServer {
    state: AppState,
    bind_address: SocketAddr,
}

impl CarouselServer {
    pub fn new(scheduler: Arc<CarouselScheduler>, bind_address: SocketAddr) -> Self {
        Self {
            state: AppState {
                scheduler,
                start_time: Instant::now(),
            },
            bind_address,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn build_router(&self) -> Router {
        create_router(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Serve until the shutdown signal resolves.
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.build_router();

        tracing::info!("starting the carousel control surface on {}", self.bind_address);

        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(Error::Io)?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(Error::Io)?;

        tracing::info!("control surface shutdown complete");
        Ok(())
    }
}
