use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinError;
use tracing::{error, info};

use crate::cache::CacheStore;
use crate::config::FeedConfig;
use crate::fetcher::Fetcher;
use crate::filter::{self, Filters};
use crate::model::FeedEntry;
use crate::time::TimeWindow;

/// Message shown to users when a refresh could not be merged.
pub const REFRESH_FAILED_MESSAGE: &str = "Failed to load feeds. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Aggregated,
    Individual,
}

/// Everything the presentation layer reads.
///
/// `filtered_entries` is always derived from `all_entries` and `filters`.
#[derive(Debug, Clone, Default)]
pub struct AggregateState {
    pub all_entries: Vec<FeedEntry>,
    pub filtered_entries: Vec<FeedEntry>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub filters: Filters,
    pub view_mode: ViewMode,
    pub last_error: Option<String>,
}

impl AggregateState {
    fn recompute(&mut self, now: DateTime<Utc>) {
        self.filtered_entries = filter::apply(&self.all_entries, &self.filters, now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was already running.
    Skipped,
    Completed {
        entry_count: usize,
        failed_sources: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to merge feed results: {0}")]
    Merge(#[from] JoinError),
}

struct SourceFetch {
    source_name: String,
    entries: Option<Vec<FeedEntry>>,
}

struct Merged {
    entries: Vec<FeedEntry>,
    failed_sources: Vec<String>,
}

pub struct Aggregator {
    sources: Vec<FeedConfig>,
    fetcher: Arc<Fetcher>,
    cache: Arc<CacheStore>,
    state: RwLock<AggregateState>,
    refreshing: RwLock<bool>,
    revision: watch::Sender<u64>,
}

impl Aggregator {
    pub fn new(sources: Vec<FeedConfig>, fetcher: Arc<Fetcher>, cache: Arc<CacheStore>) -> Self {
        let (revision, _) = watch::channel(0);

        Self {
            sources,
            fetcher,
            cache,
            state: RwLock::new(AggregateState::default()),
            refreshing: RwLock::new(false),
            revision,
        }
    }

    pub fn sources(&self) -> &[FeedConfig] {
        &self.sources
    }

    /// Receives a new revision number every time the filtered entries change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Fetches every source and replaces the aggregate.
    ///
    /// Returns [`RefreshOutcome::Skipped`] when a refresh is already in flight.
    pub async fn refresh_all(&self) -> Result<RefreshOutcome, RefreshError> {
        // Check if already refreshing
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(RefreshOutcome::Skipped);
            }
            *refreshing = true;
        }

        let result = self.do_refresh_all().await;

        // Clear refreshing flag
        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result
    }

    async fn do_refresh_all(&self) -> Result<RefreshOutcome, RefreshError> {
        info!("Refreshing {} feeds", self.sources.len());

        let tasks = self.sources.iter().cloned().map(|source| {
            let fetcher = self.fetcher.clone();
            tokio::spawn(async move {
                match fetcher.fetch(&source).await {
                    Ok(report) => SourceFetch {
                        source_name: source.name,
                        entries: Some(report.entries),
                    },
                    Err(e) => {
                        error!("Failed to fetch '{}': {}", source.name, e);
                        SourceFetch {
                            source_name: source.name,
                            entries: None,
                        }
                    }
                }
            })
        });

        let merged = merge(join_all(tasks).await);
        self.commit(merged, Utc::now()).await
    }

    /// Replaces the aggregate with a merged refresh result. A failed merge
    /// only records `last_error`; the previous entries stay in place.
    async fn commit(
        &self,
        merged: Result<Merged, RefreshError>,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, RefreshError> {
        let merged = match merged {
            Ok(merged) => merged,
            Err(e) => {
                error!("Error fetching feeds: {}", e);
                self.state.write().await.last_error = Some(REFRESH_FAILED_MESSAGE.to_string());
                return Err(e);
            }
        };

        self.cache.save(&merged.entries, now).await;

        let entry_count = merged.entries.len();
        {
            let mut state = self.state.write().await;
            state.all_entries = merged.entries;
            state.last_fetched_at = Some(now);
            state.last_error = None;
            state.recompute(now);
        }
        self.bump_revision();

        info!(
            "Feed refresh complete: {} entries, {} sources failed",
            entry_count,
            merged.failed_sources.len()
        );

        Ok(RefreshOutcome::Completed {
            entry_count,
            failed_sources: merged.failed_sources,
        })
    }

    /// Populates the aggregate from a fresh cache snapshot, if there is one.
    pub async fn restore_from_cache(&self) -> bool {
        let Some(snapshot) = self.cache.load().await else {
            return false;
        };

        let count = snapshot.entries.len();
        {
            let mut state = self.state.write().await;
            state.all_entries = snapshot.entries;
            state.last_fetched_at = Some(snapshot.captured_at);
            state.recompute(Utc::now());
        }
        self.bump_revision();

        info!("Loaded {} entries from cache", count);
        true
    }

    /// Recomputes the filtered entries from the current state.
    pub async fn apply_filters(&self) {
        self.state.write().await.recompute(Utc::now());
        self.bump_revision();
    }

    pub async fn set_filters(&self, filters: Filters) {
        self.update_filters(|current| *current = filters).await;
    }

    pub async fn set_search_query(&self, query: String) {
        self.update_filters(|f| f.search_query = query).await;
    }

    pub async fn set_category(&self, category: String) {
        self.update_filters(|f| f.category = category).await;
    }

    pub async fn set_time_window(&self, window: TimeWindow) {
        self.update_filters(|f| f.time_window = window).await;
    }

    /// Edits the filters and recomputes under a single write lock, so
    /// concurrent partial updates never overwrite each other.
    pub async fn update_filters(&self, update: impl FnOnce(&mut Filters)) {
        {
            let mut state = self.state.write().await;
            update(&mut state.filters);
            state.recompute(Utc::now());
        }
        self.bump_revision();
    }

    pub async fn set_view_mode(&self, view_mode: ViewMode) {
        self.state.write().await.view_mode = view_mode;
    }

    pub async fn all_entries(&self) -> Vec<FeedEntry> {
        self.state.read().await.all_entries.clone()
    }

    pub async fn filtered_entries(&self) -> Vec<FeedEntry> {
        self.state.read().await.filtered_entries.clone()
    }

    pub async fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_fetched_at
    }

    pub async fn filters(&self) -> Filters {
        self.state.read().await.filters.clone()
    }

    pub async fn view_mode(&self) -> ViewMode {
        self.state.read().await.view_mode
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// A consistent copy of the whole state.
    pub async fn snapshot(&self) -> AggregateState {
        self.state.read().await.clone()
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Flattens per-source results in source order. Failed sources contribute
/// nothing; a task that did not run to completion fails the whole merge.
fn merge(results: Vec<Result<SourceFetch, JoinError>>) -> Result<Merged, RefreshError> {
    let mut merged = Merged {
        entries: Vec::new(),
        failed_sources: Vec::new(),
    };

    for result in results {
        let fetched = result?;
        match fetched.entries {
            Some(entries) => merged.entries.extend(entries),
            None => merged.failed_sources.push(fetched.source_name),
        }
    }

    Ok(merged)
}

pub async fn start_background_refresh(aggregator: Arc<Aggregator>, interval: Duration) {
    // Do initial fetch
    info!("Starting initial feed fetch");
    if let Err(e) = aggregator.refresh_all().await {
        error!("Initial feed fetch failed: {}", e);
    }

    // The next run is only scheduled once the previous one returns.
    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed refresh");
        if let Err(e) = aggregator.refresh_all().await {
            error!("Scheduled feed refresh failed: {}", e);
        }
    }
}
