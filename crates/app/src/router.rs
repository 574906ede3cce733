use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use credvault_core::CredentialService;

use crate::{auth, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    credentials: CredentialService,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, credentials: CredentialService) -> Self {
        Self {
            metrics,
            credentials,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/signup", post(auth::signup))
        .route("/signin", post(auth::signin))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
