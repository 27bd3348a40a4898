use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::analysis::stats::{PlanShapeSummary, SlowQuery};
use crate::analysis::{compare, plan_shapes, slow_queries, summarize, ComparisonResult, StatisticsSummary};
use crate::config::DEFAULT_COLLECTION;
use crate::model::{ExecutionRecord, Page};
use crate::plan::PlanDetail;
use crate::search::{build_query, Pagination, QueryError, RecordQuery, SearchFilters};
use crate::web::error::ApiError;
use crate::web::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// Request types

#[derive(Debug, Deserialize)]
pub struct CollectionParams {
    pub collection: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub collection: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SlowSqlParams {
    pub collection: Option<String>,
    pub slow_sql_threshold: Option<f64>,
    pub limit: Option<usize>,
}

// Numbers arrive as text so that an empty `min_execution_time=` means "no bound".
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub collection: Option<String>,
    pub q: Option<String>,
    pub status: Option<String>,
    pub min_execution_time: Option<String>,
    pub max_execution_time: Option<String>,
    pub file_name: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub plan_ids: Vec<String>,
    pub collection: Option<String>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct CollectionList {
    pub collections: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SlowSqlList {
    pub slow_sql_threshold: f64,
    pub count: usize,
    pub items: Vec<SlowQuery>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub backend: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: i64,
    pub collection_count: usize,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

fn collection_or_default(collection: Option<String>) -> String {
    collection
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COLLECTION.to_string())
}

fn checked_threshold(threshold: f64) -> Result<f64, ApiError> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(threshold)
    } else {
        Err(ApiError::BadRequest(format!(
            "slow_sql_threshold must be a non-negative number, got {}",
            threshold
        )))
    }
}

fn parse_bound(field: &'static str, raw: Option<String>) -> Result<Option<f64>, QueryError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text.parse::<f64>().map(Some).map_err(|_| QueryError::InvalidFilterValue {
            field,
            reason: format!("'{}' is not a number", text),
        }),
    }
}

impl AppState {
    fn page_size(&self, size: Option<u32>) -> Result<u32, ApiError> {
        let size = size.unwrap_or(self.config.analysis.default_page_size);
        let max = self.config.analysis.max_page_size;
        if size > max {
            return Err(ApiError::BadRequest(format!(
                "size must not exceed {} (got {})",
                max, size
            )));
        }
        Ok(size)
    }
}

// API Implementations

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> ApiResult<SystemStatus> {
    let collections = state.with_store(|store| Ok(store.list_collections()?)).await?;

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.config.database.backend.clone(),
        started_at: state.startup_time,
        uptime_seconds: state.uptime_seconds(),
        collection_count: collections.len(),
    }))
}

pub async fn list_collections(State(state): State<Arc<AppState>>) -> ApiResult<CollectionList> {
    let collections = state.with_store(|store| Ok(store.list_collections()?)).await?;
    Ok(Json(CollectionList { collections }))
}

pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Page<ExecutionRecord>> {
    let Query(params) = params?;
    let size = state.page_size(params.size)?;
    let pagination = Pagination::new(params.page.unwrap_or(1), size)?;
    let collection = collection_or_default(params.collection);

    let page = state
        .with_store(move |store| Ok(store.fetch_page(&collection, &RecordQuery::unfiltered(pagination))?))
        .await?;
    Ok(Json(page))
}

pub async fn basic_stats(
    State(state): State<Arc<AppState>>,
    params: Result<Query<CollectionParams>, QueryRejection>,
) -> ApiResult<StatisticsSummary> {
    let Query(params) = params?;
    collection_summary(&state, collection_or_default(params.collection), None).await
}

/// Slow-query statistics; the threshold is mandatory here.
pub async fn slow_sql_stats(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SlowSqlParams>, QueryRejection>,
) -> ApiResult<StatisticsSummary> {
    let Query(params) = params?;
    let threshold = params
        .slow_sql_threshold
        .ok_or_else(|| ApiError::BadRequest("slow_sql_threshold is required".to_string()))?;
    let threshold = checked_threshold(threshold)?;
    collection_summary(&state, collection_or_default(params.collection), Some(threshold)).await
}

pub async fn summary_stats(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SlowSqlParams>, QueryRejection>,
) -> ApiResult<StatisticsSummary> {
    let Query(params) = params?;
    let threshold = checked_threshold(
        params
            .slow_sql_threshold
            .unwrap_or(state.config.analysis.slow_sql_threshold_ms),
    )?;
    collection_summary(&state, collection_or_default(params.collection), Some(threshold)).await
}

async fn collection_summary(
    state: &AppState,
    collection: String,
    threshold: Option<f64>,
) -> ApiResult<StatisticsSummary> {
    let buckets = state.buckets.clone();
    let summary = state
        .with_store(move |store| {
            let records = store.fetch_all_for_stats(&collection)?;
            debug!("Summarizing {} records from {}", records.len(), collection);
            Ok(summarize(&records, threshold, &buckets))
        })
        .await?;
    Ok(Json(summary))
}

pub async fn slow_sql_list(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SlowSqlParams>, QueryRejection>,
) -> ApiResult<SlowSqlList> {
    let Query(params) = params?;
    let threshold = checked_threshold(
        params
            .slow_sql_threshold
            .unwrap_or(state.config.analysis.slow_sql_threshold_ms),
    )?;
    let limit = params.limit.unwrap_or(state.config.analysis.slow_sql_list_limit);
    let collection = collection_or_default(params.collection);

    let items = state
        .with_store(move |store| {
            let records = store.fetch_all_for_stats(&collection)?;
            Ok(slow_queries(&records, threshold, limit))
        })
        .await?;

    Ok(Json(SlowSqlList {
        slow_sql_threshold: threshold,
        count: items.len(),
        items,
    }))
}

pub async fn plan_shape_stats(
    State(state): State<Arc<AppState>>,
    params: Result<Query<CollectionParams>, QueryRejection>,
) -> ApiResult<PlanShapeSummary> {
    let Query(params) = params?;
    let collection = collection_or_default(params.collection);

    let shapes = state
        .with_store(move |store| Ok(plan_shapes(&store.fetch_all_for_stats(&collection)?)))
        .await?;
    Ok(Json(shapes))
}

pub async fn plan_detail(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
    params: Result<Query<CollectionParams>, QueryRejection>,
) -> ApiResult<PlanDetail> {
    let Query(params) = params?;
    let collection = collection_or_default(params.collection);

    let detail = state
        .with_store(move |store| {
            let record = store.fetch_by_id(&collection, &plan_id)?;
            PlanDetail::from_record(&record).map_err(|source| ApiError::Plan { plan_id, source })
        })
        .await?;

    debug!("Decomposed plan {} into {} nodes", detail.plan_id, detail.node_count());
    Ok(Json(detail))
}

pub async fn compare_plans(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> ApiResult<ComparisonResult> {
    let Json(request) = payload?;
    let collection = collection_or_default(request.collection);
    info!("Comparing {} plans in {}", request.plan_ids.len(), collection);

    let result = state
        .with_store(move |store| Ok(compare(&request.plan_ids, &collection, store)?))
        .await?;
    Ok(Json(result))
}

pub async fn search_plans(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Page<ExecutionRecord>> {
    let Query(params) = params?;
    let filters = SearchFilters {
        q: params.q,
        status: params.status,
        min_execution_time: parse_bound("min_execution_time", params.min_execution_time)?,
        max_execution_time: parse_bound("max_execution_time", params.max_execution_time)?,
        file_name: params.file_name,
    };
    let size = state.page_size(params.size)?;
    let query = build_query(&filters, params.page.unwrap_or(1), size)?;
    let collection = collection_or_default(params.collection);

    let page = state
        .with_store(move |store| Ok(store.fetch_page(&collection, &query)?))
        .await?;
    Ok(Json(page))
}
