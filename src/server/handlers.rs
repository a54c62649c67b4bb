//! HTTP request handlers for API endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::config::ViewConfig;
use crate::dashboard::{self, RenderRequest, VariantListing, ViewRender};
use crate::diagram::{build_diagram, ProcessDiagram};
use crate::error::DashboardError;
use crate::source::TableSource;
use crate::table::Table;

/// Table listing machine/variant pairs when none is given.
const DEFAULT_VARIANTS_TABLE: &str = "all_variants";
const DEFAULT_VARIANTS_LIMIT: usize = 10;

/// Health check endpoint
///
/// Returns a simple status response to verify the server is running
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok"
    }))
}

/// Response for view listing
#[derive(Debug, Serialize)]
pub struct ViewsResponse {
    pub views: Vec<ViewSummary>,
}

/// Information about a single configured view
#[derive(Debug, Serialize)]
pub struct ViewSummary {
    pub name: String,
    pub title: String,
    pub filters: Vec<String>,
    pub machines: Vec<String>,
    pub default_machine: Option<String>,
}

impl From<&ViewConfig> for ViewSummary {
    fn from(view: &ViewConfig) -> Self {
        ViewSummary {
            name: view.name.clone(),
            title: view.title.clone(),
            filters: view.filters.clone(),
            machines: view
                .source
                .machines()
                .into_iter()
                .map(str::to_string)
                .collect(),
            default_machine: view.source.machine(None).map(str::to_string),
        }
    }
}

/// GET /views - List configured dashboard views
pub async fn list_views<S: TableSource>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<ViewsResponse> {
    let views = state.dashboard.views.iter().map(ViewSummary::from).collect();
    Json(ViewsResponse { views })
}

fn find_view<'a, S>(state: &'a AppState<S>, name: &str) -> Result<&'a ViewConfig, ApiError> {
    state
        .dashboard
        .view(name)
        .ok_or_else(|| ApiError::ViewNotFound(name.to_string()))
}

/// POST /views/{view}/render - Run one render cycle
pub async fn render_view<S: TableSource>(
    State(state): State<Arc<AppState<S>>>,
    Path(view): Path<String>,
    Json(request): Json<RenderRequest>,
) -> Result<Json<ViewRender>, ApiError> {
    let view = find_view(&state, &view)?;
    let render = dashboard::render_view(&state.fetcher, view, &request).await;
    Ok(Json(render))
}

/// POST /views/{view}/export - Filtered view as CSV
pub async fn export_view<S: TableSource>(
    State(state): State<Arc<AppState<S>>>,
    Path(view): Path<String>,
    Json(request): Json<RenderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = find_view(&state, &view)?;
    let (table, warnings) = dashboard::filtered_table(&state.fetcher, view, &request).await;
    for warning in &warnings {
        tracing::warn!(view = %view.name, "{}", warning);
    }

    let csv = table.to_csv()?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv))
}

/// Response for a raw table query
#[derive(Debug, Serialize)]
pub struct TableResponse {
    pub table: String,
    pub from_cache: bool,
    pub data: Table,
    pub warnings: Vec<DashboardError>,
}

/// GET /tables/{table} - All records of a table
pub async fn get_table<S: TableSource>(
    State(state): State<Arc<AppState<S>>>,
    Path(table): Path<String>,
) -> Json<TableResponse> {
    let result = state.fetcher.fetch(&table).await;
    Json(TableResponse {
        table,
        from_cache: result.from_cache,
        data: (*result.table).clone(),
        warnings: result.unavailable.into_iter().collect(),
    })
}

/// Query parameters for the variants overview
#[derive(Debug, Deserialize)]
pub struct VariantsQuery {
    pub table: Option<String>,
    pub limit: Option<usize>,
}

/// GET /variants - Machine/variant overview with diagrams
pub async fn list_variants<S: TableSource>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<VariantsQuery>,
) -> Result<Json<VariantListing>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_VARIANTS_LIMIT);
    if limit == 0 {
        return Err(ApiError::InvalidParameter(
            "limit must be greater than 0".to_string(),
        ));
    }
    let table = params
        .table
        .unwrap_or_else(|| DEFAULT_VARIANTS_TABLE.to_string());

    let listing = dashboard::variant_listing(&state.fetcher, &table, limit).await;
    Ok(Json(listing))
}

/// Query parameters for diagram construction
#[derive(Debug, Deserialize)]
pub struct DiagramQuery {
    pub variant: String,
}

/// Response for diagram construction
#[derive(Debug, Serialize)]
pub struct DiagramResponse {
    pub variant: String,
    pub diagram: ProcessDiagram,
    pub dot: String,
}

/// GET /diagram?variant=A,B,C - Flow diagram of a variant string
pub async fn get_diagram(Query(params): Query<DiagramQuery>) -> Json<DiagramResponse> {
    let diagram = build_diagram(&params.variant);
    let dot = diagram.to_dot();
    Json(DiagramResponse {
        variant: params.variant,
        diagram,
        dot,
    })
}
