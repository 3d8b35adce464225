//! Request handlers.

use super::AppState;
use super::error::ApiError;
use crate::config::AppConfig;
use crate::error::Error;
use crate::model::{CitationFilter, NewCitation};
use crate::service::citation::CitationService;
use crate::service::driver::get_driver;
use crate::service::payment::PaymentRequest;
use crate::service::report::DateRange;
use crate::service::{DriverService, DuplicateDetectionService, PaymentService, ReportService, ViolationTypeService};
use crate::storage::SqliteStorage;
use crate::validate::{date_end_millis, date_start_millis, parse_date};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Run a service call on the blocking pool with the storage locked.
async fn with_storage<T, F>(state: &AppState, op: &'static str, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteStorage, &AppConfig) -> crate::Result<T> + Send + 'static,
{
    let state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut storage = state
            .storage
            .lock()
            .map_err(|_| Error::Other("storage lock poisoned".into()))?;
        f(&mut storage, &state.config)
    })
    .await
    .map_err(|e| Error::Other(format!("request task failed: {e}")))?;

    match &outcome {
        Ok(_) => info!(op, "API request ok"),
        Err(e) => info!(op, code = e.error_code().as_str(), "API request rejected"),
    }
    Ok(outcome?)
}

/// Acting user from `X-Actor`, else `api`.
fn actor(headers: &HeaderMap) -> String {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| "api".to_string(), str::to_string)
}

/// `YYYY-MM-DD` query bounds as a half-open millisecond range.
fn date_range(from: Option<&str>, to: Option<&str>) -> crate::Result<DateRange> {
    let parse = |s: &str| parse_date(s).map_err(Error::InvalidArgument);
    Ok(DateRange {
        from: from.map(parse).transpose()?.map(date_start_millis),
        to: to.map(parse).transpose()?.map(date_end_millis),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_violation_types(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let types = with_storage(&state, "list_violation_types", |storage, config| {
        ViolationTypeService::new(storage, config).list(false)
    })
    .await?;
    Ok(Json(json!({ "violation_types": types })))
}

#[derive(Debug, Deserialize)]
pub struct DriverQuery {
    search: Option<String>,
    limit: Option<u32>,
}

pub async fn list_drivers(State(state): State<AppState>, Query(q): Query<DriverQuery>) -> ApiResult<Json<Value>> {
    let drivers = with_storage(&state, "list_drivers", move |storage, config| {
        DriverService::new(storage, config).list(q.search.as_deref(), q.limit)
    })
    .await?;
    Ok(Json(json!({ "drivers": drivers })))
}

pub async fn driver_duplicates(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let candidates = with_storage(&state, "driver_duplicates", move |storage, _| {
        let driver = get_driver(storage.conn(), &id)?;
        DuplicateDetectionService::new(storage.conn()).candidates_for(&driver)
    })
    .await?;
    Ok(Json(json!({ "candidates": candidates })))
}

#[derive(Debug, Deserialize)]
pub struct CitationQuery {
    status: Option<String>,
    driver_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    search: Option<String>,
    limit: Option<u32>,
}

pub async fn list_citations(State(state): State<AppState>, Query(q): Query<CitationQuery>) -> ApiResult<Json<Value>> {
    let citations = with_storage(&state, "list_citations", move |storage, _| {
        let range = date_range(q.from.as_deref(), q.to.as_deref())?;
        let filter = CitationFilter {
            status: q.status,
            driver_id: q.driver_id,
            from: range.from,
            to: range.to,
            search: q.search,
            limit: q.limit,
        };
        CitationService::new(storage).list(&filter)
    })
    .await?;
    Ok(Json(json!({ "citations": citations })))
}

pub async fn get_citation(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let detail = with_storage(&state, "get_citation", move |storage, _| {
        CitationService::new(storage).get(&id)
    })
    .await?;
    Ok(Json(json!(detail)))
}

pub async fn create_citation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewCitation>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let actor = actor(&headers);
    let detail = with_storage(&state, "create_citation", move |storage, _| {
        CitationService::new(storage).create(&new, &actor)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!(detail))))
}

#[derive(Debug, Deserialize)]
pub struct FinePreviewQuery {
    driver_id: Option<String>,
    /// Comma-separated violation codes
    codes: String,
}

pub async fn fine_preview(State(state): State<AppState>, Query(q): Query<FinePreviewQuery>) -> ApiResult<Json<Value>> {
    let preview = with_storage(&state, "fine_preview", move |storage, _| {
        let codes: Vec<String> = q.codes.split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect();
        CitationService::new(storage).fine_preview(q.driver_id.as_deref(), &codes, None)
    })
    .await?;
    Ok(Json(json!(preview)))
}

pub async fn check_or(State(state): State<AppState>, Path(or): Path<String>) -> ApiResult<Json<Value>> {
    let check = with_storage(&state, "check_or", move |storage, config| {
        PaymentService::new(storage, config).check_or(&or)
    })
    .await?;
    Ok(Json(json!(check)))
}

pub async fn next_or(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let or_number = with_storage(&state, "next_or", |storage, config| {
        PaymentService::new(storage, config).next_or()
    })
    .await?;
    Ok(Json(json!({ "or_number": or_number })))
}

pub async fn record_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let actor = actor(&headers);
    let payment = with_storage(&state, "record_payment", move |storage, config| {
        PaymentService::new(storage, config).record(&request, &actor)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!(payment))))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let actor = actor(&headers);
    let (payment, receipt) = with_storage(&state, "confirm_payment", move |storage, config| {
        PaymentService::new(storage, config).confirm_print(&id, &actor)
    })
    .await?;
    Ok(Json(json!({ "payment": payment, "receipt": receipt })))
}

#[derive(Debug, Deserialize)]
pub struct VoidRequest {
    #[serde(default)]
    reason: String,
}

pub async fn void_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<VoidRequest>,
) -> ApiResult<Json<Value>> {
    let actor = actor(&headers);
    let payment = with_storage(&state, "void_payment", move |storage, config| {
        PaymentService::new(storage, config).void(&id, &body.reason, &actor)
    })
    .await?;
    Ok(Json(json!(payment)))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

pub async fn report_summary(State(state): State<AppState>, Query(q): Query<RangeQuery>) -> ApiResult<Json<Value>> {
    let summary = with_storage(&state, "report_summary", move |storage, _| {
        let range = date_range(q.from.as_deref(), q.to.as_deref())?;
        ReportService::new(storage.conn()).summary(range)
    })
    .await?;
    Ok(Json(json!(summary)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor(&headers), "api");
        headers.insert("x-actor", "maria".parse().unwrap());
        assert_eq!(actor(&headers), "maria");
    }

    #[test]
    fn test_date_range_bounds() {
        let range = date_range(Some("2024-01-01"), Some("2024-01-01")).unwrap();
        assert_eq!(range.to.unwrap() - range.from.unwrap(), 86_400_000);
        assert!(matches!(date_range(Some("soon"), None), Err(Error::InvalidArgument(_))));
        assert!(date_range(None, None).unwrap().from.is_none());
    }
}
