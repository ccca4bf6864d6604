//! REST control surface
//!
//! Exposes the scheduler's cycle and throttle directories over HTTP:
//! listing and inspecting cycles, creating and deleting them, driving
//! their lifecycle, replacing the throttle of a throttled cycle, and the
//! health endpoints the platform probes.

pub mod server;

pub use server::{AppState, CarouselServer};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{format_duration, parse_duration};
use crate::scheduler::cycle::{Cycle, CycleConfig, CycleKind};
use crate::scheduler::error::SchedulerError;
use crate::scheduler::metadata::{CycleMetadata, CycleState};

/// One cycle as rendered by the control surface
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleView {
    pub id: String,
    #[serde(flatten)]
    pub config: CycleConfig,
    pub metadata: CycleMetadata,
}

impl CycleView {
    async fn from_cycle(cycle: &Arc<dyn Cycle>) -> Self {
        Self {
            id: cycle.id().to_string(),
            config: cycle.transform_to_config(),
            metadata: cycle.metadata().await,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThrottleView {
    pub interval: String,
}

/// Aggregated health over all cycles
#[derive(Debug, Serialize)]
pub struct HealthView {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub cycles: Vec<CycleHealth>,
}

#[derive(Debug, Serialize)]
pub struct CycleHealth {
    pub id: String,
    pub name: String,
    pub state: BTreeSet<CycleState>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(err: &SchedulerError) -> Response {
    let status = match err {
        SchedulerError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
        SchedulerError::Conflict { .. } => StatusCode::CONFLICT,
        SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    error_response(&SchedulerError::not_found(what))
}

/// Build the router for the control surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/cycles", get(get_cycles).post(create_cycle))
        .route("/cycles/:id", get(get_cycle).delete(delete_cycle))
        .route("/cycles/:id/start", post(start_cycle))
        .route("/cycles/:id/stop", post(stop_cycle))
        .route("/cycles/:id/resume", post(resume_cycle))
        .route("/cycles/:id/reset", post(reset_cycle))
        .route(
            "/cycles/:id/throttle",
            get(get_cycle_throttle).put(set_cycle_throttle),
        )
        .route("/scheduler/start", post(enable_scheduler))
        .route("/scheduler/stop", post(disable_scheduler))
        .route("/health", get(health))
        .route("/__gtg", get(gtg))
        .with_state(state)
}

async fn get_cycles(State(state): State<AppState>) -> impl IntoResponse {
    let cycles = state.scheduler.cycles().await;
    let mut views = Vec::with_capacity(cycles.len());
    for cycle in cycles.values() {
        views.push(CycleView::from_cycle(cycle).await);
    }
    views.sort_by(|a, b| a.id.cmp(&b.id));
    Json(views)
}

async fn get_cycle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.cycle(&id).await {
        Some(cycle) => Json(CycleView::from_cycle(&cycle).await).into_response(),
        None => not_found(&format!("cycle {id}")),
    }
}

async fn create_cycle(
    State(state): State<AppState>,
    Json(config): Json<CycleConfig>,
) -> Response {
    match state.scheduler.add_cycle(config).await {
        Ok(id) => (
            StatusCode::CREATED,
            [(header::LOCATION, format!("/cycles/{id}"))],
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to create cycle");
            error_response(&err)
        }
    }
}

async fn delete_cycle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.delete_cycle(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

async fn start_cycle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.cycle(&id).await {
        Some(cycle) => {
            cycle.start();
            StatusCode::OK.into_response()
        }
        None => not_found(&format!("cycle {id}")),
    }
}

async fn resume_cycle(state: State<AppState>, id: Path<String>) -> Response {
    start_cycle(state, id).await
}

async fn stop_cycle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.cycle(&id).await {
        Some(cycle) => {
            cycle.stop().await;
            StatusCode::OK.into_response()
        }
        None => not_found(&format!("cycle {id}")),
    }
}

async fn reset_cycle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.cycle(&id).await {
        Some(cycle) => {
            cycle.reset().await;
            StatusCode::OK.into_response()
        }
        None => not_found(&format!("cycle {id}")),
    }
}

async fn get_cycle_throttle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(cycle) = state.scheduler.cycle(&id).await else {
        return not_found(&format!("cycle {id}"));
    };

    match cycle.throttle() {
        Some(throttle) => Json(ThrottleView {
            interval: format_duration(throttle.interval()),
        })
        .into_response(),
        None => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(ErrorBody {
                error: format!("cycle is not throttled: {id}"),
            }),
        )
            .into_response(),
    }
}

/// Replace the throttle of a throttled cycle. Modeled as delete-and-
/// recreate so a cycle's throttle stays fixed for the duration of an
/// iteration.
async fn set_cycle_throttle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ThrottleView>,
) -> Response {
    let Some(cycle) = state.scheduler.cycle(&id).await else {
        return not_found(&format!("cycle {id}"));
    };

    if cycle.kind() != CycleKind::ThrottledWholeCollection {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(ErrorBody {
                error: format!("cycle is not throttled: {id}"),
            }),
        )
            .into_response();
    }

    let interval = match parse_duration(&update.interval) {
        Ok(interval) => interval,
        Err(reason) => return error_response(&SchedulerError::invalid_config(reason)),
    };

    let mut config = cycle.transform_to_config();
    config.throttle = Some(format_duration(interval));

    if let Err(err) = state.scheduler.delete_cycle(&id).await {
        return error_response(&err);
    }

    match state.scheduler.add_cycle(config).await {
        Ok(new_id) => (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, format!("/cycles/{new_id}"))],
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn enable_scheduler(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.manual_toggle("true").await;
    StatusCode::OK
}

async fn disable_scheduler(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.manual_toggle("false").await;
    StatusCode::OK
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let cycles = state.scheduler.cycles().await;
    let mut checks = Vec::with_capacity(cycles.len());
    let mut healthy = true;

    for cycle in cycles.values() {
        let cycle_state = cycle.state().await;
        if cycle_state.contains(&CycleState::Unhealthy) {
            healthy = false;
        }
        checks.push(CycleHealth {
            id: cycle.id().to_string(),
            name: cycle.name().to_string(),
            state: cycle_state,
        });
    }
    checks.sort_by(|a, b| a.id.cmp(&b.id));

    Json(HealthView {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cycles: checks,
    })
}

async fn gtg(State(state): State<AppState>) -> Response {
    if state.scheduler.is_enabled() && state.scheduler.gate().is_healthy() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "publishing disabled").into_response()
    }
}
