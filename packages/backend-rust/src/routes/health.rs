use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    storage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    timestamp: String,
    uptime: u64,
}

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    version: &'static str,
}

#[derive(Debug)]
enum StorageCheck {
    InProcess,
    Connected { latency_ms: u64 },
    Timeout,
    Disconnected,
}

async fn root(State(state): State<AppState>) -> Response {
    let check = storage_check(&state).await;
    let (status, storage, latency_ms) = match check {
        StorageCheck::InProcess => ("ok", "memory", None),
        StorageCheck::Connected { latency_ms } => ("ok", "connected", Some(latency_ms)),
        StorageCheck::Timeout => ("degraded", "timeout", None),
        StorageCheck::Disconnected => ("degraded", "disconnected", None),
    };

    let status_code = if status == "ok" {
        StatusCode::OK
    } else {
        tracing::warn!(storage, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status,
        storage,
        latency_ms,
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
    };
    (status_code, Json(body)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

async fn storage_check(state: &AppState) -> StorageCheck {
    let Some(db) = state.database() else {
        return StorageCheck::InProcess;
    };

    let started = Instant::now();
    match tokio::time::timeout(DB_CHECK_TIMEOUT, db.ping()).await {
        Ok(true) => StorageCheck::Connected {
            latency_ms: started.elapsed().as_millis() as u64,
        },
        Ok(false) => StorageCheck::Disconnected,
        Err(_) => StorageCheck::Timeout,
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
