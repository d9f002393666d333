use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::error::ItemFailure;
use crate::memory::review::{BatchStatus, ReviewSubmission};
use crate::memory::types::{ItemType, MemoryUnit};
use crate::response::{ok, AppError};
use crate::services::memory::UnitSeed;
use crate::state::AppState;

pub const OWNER_HEADER: &str = "x-user-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/units", post(initialize_units))
        .route("/units/start", post(start_learning))
        .route("/units/:id", get(get_unit))
        .route("/due", get(due_list))
        .route("/reviews", post(submit_reviews))
        .route("/stats", get(stats))
        .route("/summary", get(summary))
}

#[derive(Debug, Deserialize)]
struct InitializeRequest {
    items: Vec<UnitSeed>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResponse {
    unit_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    item_type: ItemType,
    content_ref: String,
}

#[derive(Debug, Deserialize)]
struct ReviewBatchRequest {
    items: Vec<ReviewSubmission>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewBatchResponse {
    success: bool,
    #[serde(flatten)]
    status: BatchStatus,
    updated: Vec<MemoryUnit>,
    failures: Vec<ItemFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeQuery {
    #[serde(rename = "type")]
    item_type: Option<String>,
    limit: Option<String>,
    window_days: Option<String>,
}

async fn initialize_units(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let payload: InitializeRequest = parse_body(&body)?;
    let unit_ids = state.memory().initialize_units(&owner, &payload.items).await?;
    Ok(ok(InitializeResponse { unit_ids }))
}

async fn start_learning(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let payload: StartRequest = parse_body(&body)?;
    let unit = state
        .memory()
        .start_learning(&owner, payload.item_type, &payload.content_ref)
        .await?;
    Ok(ok(unit))
}

async fn get_unit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let unit_id = Uuid::parse_str(raw_id.trim())
        .map_err(|_| AppError::bad_request("unit id must be a UUID"))?;
    let unit = state.memory().get_unit(&owner, unit_id).await?;
    Ok(ok(unit))
}

async fn due_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TypeQuery>,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let item_type = item_type_from(&query)?;
    let limit = parse_number::<usize>(query.limit.as_deref(), "limit")?;
    let due = state
        .memory()
        .list_due_for_review(&owner, item_type, limit)
        .await?;
    Ok(ok(due))
}

async fn submit_reviews(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let payload: ReviewBatchRequest = parse_body(&body)?;
    let outcome = state
        .memory()
        .submit_review_batch(&owner, &payload.items)
        .await?;

    let status = outcome.status();
    let http_status = match status {
        BatchStatus::Succeeded => StatusCode::OK,
        BatchStatus::Partial { .. } => StatusCode::MULTI_STATUS,
        BatchStatus::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    if !matches!(status, BatchStatus::Succeeded) {
        tracing::info!(owner = %owner, ?status, "review batch finished with item failures");
    }

    let body = ReviewBatchResponse {
        success: matches!(status, BatchStatus::Succeeded),
        status,
        updated: outcome.updated,
        failures: outcome.partial.map(|p| p.failures).unwrap_or_default(),
    };
    Ok((http_status, Json(body)).into_response())
}

async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TypeQuery>,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let item_type = item_type_from(&query)?;
    let window_days = parse_number::<u32>(query.window_days.as_deref(), "windowDays")?;
    let stats = state
        .memory()
        .get_stats(&owner, item_type, window_days)
        .await?;
    Ok(ok(stats))
}

async fn summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TypeQuery>,
) -> Result<Response, AppError> {
    let owner = owner_from(&headers)?;
    let item_type = item_type_from(&query)?;
    let summary = state.memory().summary(&owner, item_type).await?;
    Ok(ok(summary))
}

fn owner_from(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::unauthorized(format!("missing {OWNER_HEADER} header")))
}

fn item_type_from(query: &TypeQuery) -> Result<ItemType, AppError> {
    let raw = query
        .item_type
        .as_deref()
        .ok_or_else(|| AppError::validation("type is required"))?;
    ItemType::parse(raw)
        .ok_or_else(|| AppError::validation("type must be one of: character, word"))
}

fn parse_number<T: std::str::FromStr>(raw: Option<&str>, field: &str) -> Result<Option<T>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::validation(format!("{field} must be a non-negative integer"))),
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|err| {
        tracing::debug!(error = %err, "rejected request body");
        AppError::validation("invalid request body")
    })
}
