use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::executor::ExecutionResult;
use crate::db::queries::{
    self, Page, DEFAULT_LOW_STOCK_LIMIT, DEFAULT_LOW_STOCK_THRESHOLD, DEFAULT_PRODUCT_LIMIT,
    DEFAULT_SALES_LIMIT,
};
use crate::domain::DateRange;
use crate::web::error::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyQuery {
    pub pharmacy_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub pharmacy_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesQuery {
    pub pharmacy_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryQuery {
    pub pharmacy_id: Option<String>,
    pub threshold: Option<i64>,
    pub limit: Option<usize>,
}

fn pharmacy_id(value: Option<String>) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingField("pharmacyId"))
}

fn listing(result: ExecutionResult) -> Json<Value> {
    Json(json!({
        "status": "success",
        "count": result.row_count,
        "data": result.rows,
    }))
}

pub async fn pharmacies(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PharmacyQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let options = state.listing_options();

    let result = match query.pharmacy_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => queries::pharmacy_info(&state.executor, id.trim(), options).await?,
        None => queries::list_pharmacies(&state.executor, options).await?,
    };
    Ok(listing(result))
}

pub async fn products(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let id = pharmacy_id(query.pharmacy_id)?;
    let page = Page {
        limit: query.limit.unwrap_or(DEFAULT_PRODUCT_LIMIT),
        offset: query.offset.unwrap_or(0),
    };

    let result = queries::list_products(&state.executor, &id, page, state.listing_options()).await?;
    Ok(listing(result))
}

pub async fn sales(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SalesQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let id = pharmacy_id(query.pharmacy_id)?;
    let start = query.start_date.ok_or(ApiError::MissingField("startDate"))?;
    let end = query.end_date.ok_or(ApiError::MissingField("endDate"))?;
    let range = DateRange::new(start, end);
    if !range.is_ordered() {
        return Err(ApiError::InvalidInput(format!(
            "startDate {} is after endDate {}",
            start, end
        )));
    }

    let limit = query.limit.unwrap_or(DEFAULT_SALES_LIMIT);
    let result = queries::list_sales(&state.executor, &id, &range, limit, state.listing_options()).await?;
    Ok(listing(result))
}

pub async fn inventory(
    State(state): State<Arc<AppState>>,
    query: Result<Query<InventoryQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let id = pharmacy_id(query.pharmacy_id)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let limit = query.limit.unwrap_or(DEFAULT_LOW_STOCK_LIMIT);

    let result = queries::low_stock(&state.executor, &id, threshold, limit, state.listing_options()).await?;
    Ok(listing(result))
}
