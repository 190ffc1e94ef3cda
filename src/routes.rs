use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::aggregator::{Aggregator, RefreshOutcome, ViewMode};
use crate::config::FeedConfig;
use crate::debounce::SearchDebouncer;
use crate::filter::{group_by_source, Filters, SourceGroup};
use crate::model::FeedEntry;
use crate::time::{format_relative_time, TimeWindow};

pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub search: SearchDebouncer,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/entries", get(entries))
        .route("/api/filters", post(update_filters))
        .route("/api/search", post(search))
        .route("/api/refresh", post(refresh))
        .route("/api/status", get(status))
        .route("/api/sources", get(sources))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: FeedEntry,
    pub published_relative: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesResponse {
    pub view_mode: ViewMode,
    pub filters: Filters,
    pub item_count: usize,
    pub last_updated: String,
    pub entries: Vec<EntryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<SourceGroup>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterUpdate {
    pub search_query: Option<String>,
    pub category: Option<String>,
    pub time_window: Option<TimeWindow>,
    pub view_mode: Option<ViewMode>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub refreshing: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_updated: String,
    pub last_error: Option<String>,
    pub total_entries: usize,
    pub filtered_entries: usize,
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

fn last_updated_label(last_fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    last_fetched_at
        .map(|at| format_relative_time(at, now))
        .unwrap_or_else(|| "Never".to_string())
}

async fn entries_response(aggregator: &Aggregator) -> EntriesResponse {
    let state = aggregator.snapshot().await;
    let now = Utc::now();

    let groups = match state.view_mode {
        ViewMode::Individual => Some(group_by_source(&state.filtered_entries)),
        ViewMode::Aggregated => None,
    };

    EntriesResponse {
        view_mode: state.view_mode,
        filters: state.filters,
        item_count: state.filtered_entries.len(),
        last_updated: last_updated_label(state.last_fetched_at, now),
        entries: state
            .filtered_entries
            .into_iter()
            .map(|entry| EntryView {
                published_relative: format_relative_time(entry.published_at, now),
                entry,
            })
            .collect(),
        groups,
    }
}

// Route handlers
pub async fn entries(State(state): State<Arc<AppState>>) -> Json<EntriesResponse> {
    Json(entries_response(&state.aggregator).await)
}

pub async fn update_filters(
    State(state): State<Arc<AppState>>,
    Json(update): Json<FilterUpdate>,
) -> Json<EntriesResponse> {
    let aggregator = &state.aggregator;

    if let Some(view_mode) = update.view_mode {
        aggregator.set_view_mode(view_mode).await;
    }

    if update.search_query.is_some() || update.category.is_some() || update.time_window.is_some()
    {
        aggregator
            .update_filters(|filters| {
                if let Some(query) = update.search_query {
                    filters.search_query = query;
                }
                if let Some(category) = update.category {
                    filters.category = category;
                }
                if let Some(window) = update.time_window {
                    filters.time_window = window;
                }
            })
            .await;
    }

    Json(entries_response(aggregator).await)
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<StatusCode, AppError> {
    if !state.search.push(request.query) {
        return Err(anyhow::anyhow!("Search debouncer is not running").into());
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let aggregator = state.aggregator.clone();
    if aggregator.is_refreshing().await {
        info!("Manual refresh skipped, a refresh is already in progress");
        return (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "refreshing": true, "started": false })),
        );
    }

    // Spawn the refresh task
    tokio::spawn(async move {
        match aggregator.refresh_all().await {
            Ok(RefreshOutcome::Skipped) => {
                info!("Manual refresh skipped, a refresh is already in progress")
            }
            Ok(RefreshOutcome::Completed { .. }) => {}
            Err(e) => error!("Manual refresh failed: {}", e),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "refreshing": true, "started": true })),
    )
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let aggregator = &state.aggregator;
    let refreshing = aggregator.is_refreshing().await;
    let snapshot = aggregator.snapshot().await;

    Json(StatusResponse {
        refreshing,
        last_fetched_at: snapshot.last_fetched_at,
        last_updated: last_updated_label(snapshot.last_fetched_at, Utc::now()),
        last_error: snapshot.last_error,
        total_entries: snapshot.all_entries.len(),
        filtered_entries: snapshot.filtered_entries.len(),
    })
}

pub async fn sources(State(state): State<Arc<AppState>>) -> Json<Vec<FeedConfig>> {
    Json(state.aggregator.sources().to_vec())
}

pub async fn health() -> impl IntoResponse {
    "OK"
}
