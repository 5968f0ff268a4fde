//! HTTP API handlers for health and readiness.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use meridian_core::{Diagnosis, Service};

use crate::health::{HealthTracker, ServiceHealth};
use crate::registry::{Provenance, ServiceRegistry};

/// Shared application state.
pub struct ApiState {
    pub registry: Arc<ServiceRegistry>,
    pub health: Arc<HealthTracker>,
}

/// Creates the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Service diagnostics
        .route("/services", get(list_services))
        .route("/services/{name}", get(get_service))
        .route("/services/{name}/diagnose", post(diagnose_service))
        .with_state(state)
}

/// Liveness endpoint: the process is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "alive" })
}

/// Readiness endpoint: all registered services report non-fatal.
async fn readiness_check(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let services = state.health.all().len();
    if state.health.all_ready() {
        (StatusCode::OK, Json(ReadyResponse {
            ready: true,
            services,
        }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                services,
            }),
        )
    }
}

/// List all tracked services with their latest health.
///
/// `live` reflects the registry's weak reference: false once the service's
/// owning task has completed, even though its last health entry lingers.
async fn list_services(State(state): State<Arc<ApiState>>) -> Json<Vec<ServiceResponse>> {
    let live: std::collections::HashSet<String> = state
        .registry
        .live()
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    let mut services: Vec<ServiceResponse> = state
        .health
        .all()
        .into_iter()
        .map(|(name, health)| {
            let is_live = live.contains(&name);
            let provenance = state.registry.provenance(&name);
            ServiceResponse::new(name, &health, is_live, provenance)
        })
        .collect();

    services.sort_by(|a, b| a.name.cmp(&b.name));
    Json(services)
}

/// Get a specific service's health.
async fn get_service(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<ServiceResponse>, StatusCode> {
    state
        .health
        .get(&name)
        .map(|health| {
            let is_live = state.registry.lookup(&name).is_ok();
            let provenance = state.registry.provenance(&name);
            Json(ServiceResponse::new(name, &health, is_live, provenance))
        })
        .ok_or(StatusCode::NOT_FOUND)
}

/// Run a service's self-check on demand.
async fn diagnose_service(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<Diagnosis>, StatusCode> {
    let service = state
        .registry
        .lookup(&name)
        .map_err(|_| StatusCode::NOT_FOUND)?;

    let diagnosis = service.diagnose().await;
    state.health.record_diagnosis(&name, diagnosis.clone());

    Ok(Json(diagnosis))
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    services: usize,
}

#[derive(Serialize)]
struct ServiceResponse {
    name: String,
    live: bool,
    phase: String,
    provenance: Option<String>,
    verdict: Option<String>,
    detail: Option<String>,
    checked_secs_ago: Option<u64>,
    registered_secs_ago: u64,
}

impl ServiceResponse {
    fn new(
        name: String,
        health: &ServiceHealth,
        live: bool,
        provenance: Option<Provenance>,
    ) -> Self {
        Self {
            name,
            live,
            phase: health.phase.to_string(),
            provenance: provenance.map(|p| p.to_string()),
            verdict: health
                .last_diagnosis
                .as_ref()
                .map(|d| d.verdict.to_string()),
            detail: health
                .last_diagnosis
                .as_ref()
                .and_then(|d| d.detail.clone()),
            checked_secs_ago: health.last_checked.map(|t| t.elapsed().as_secs()),
            registered_secs_ago: health.registered_at.elapsed().as_secs(),
        }
    }
}
