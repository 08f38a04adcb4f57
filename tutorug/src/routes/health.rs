//! Health check endpoint
//!
//! `/health` is a liveness check: it answers 200 whenever the process is
//! serving. `status` drops to `degraded` when the AI tutor backend reports
//! itself unavailable, so dashboards can tell chat outages apart.

use hyper::Response;
use serde::Serialize;
use std::sync::Arc;

use crate::server::{AppState, BoxBody};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// `online` or `degraded`
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since start-up
    pub uptime: u64,
    /// `mongodb` or `memory`
    pub storage: &'static str,
    pub llm_backend: String,
    pub llm_available: bool,
    pub dev_mode: bool,
    pub timestamp: String,
}

pub async fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let backend = state.tutor.backend();
    let llm_available = backend.is_available().await;

    let body = HealthResponse {
        healthy: true,
        status: if llm_available { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        storage: state.storage.as_str(),
        llm_backend: backend.id().to_string(),
        llm_available,
        dev_mode: state.args.dev_mode,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    super::json_response(hyper::StatusCode::OK, &body)
}
