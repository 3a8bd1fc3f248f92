use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::types::{ListItem, Vulnerability};
use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/vulnerabilities", get(list_vulnerabilities))
        .route("/vulnerabilities/search/query", get(search_vulnerabilities))
        .route("/vulnerabilities/:id", get(get_vulnerability))
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub data: Vec<ListItem>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub success: bool,
    pub data: Vulnerability,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<ListItem>,
    pub total: usize,
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[instrument(skip(state))]
pub async fn list_vulnerabilities(State(state): State<AppState>) -> Json<ListResponse> {
    let data = state.catalog.list();
    Json(ListResponse {
        success: true,
        total: data.len(),
        data,
    })
}

#[instrument(skip(state))]
pub async fn get_vulnerability(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DetailResponse>, AppError> {
    let vulnerability = state
        .catalog
        .find(&id)
        .ok_or(AppError::NotFound("vulnerability"))?;
    Ok(Json(DetailResponse {
        success: true,
        data: vulnerability.clone(),
    }))
}

#[instrument(skip(state))]
pub async fn search_vulnerabilities(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("query parameter 'q' is required".into()))?;

    let data = state.catalog.search(&query);
    debug!(query = %query, hits = data.len(), "catalog search");
    Ok(Json(SearchResponse {
        success: true,
        total: data.len(),
        data,
        query,
    }))
}
