//! Search, category and time-window filtering over the merged entry set.
//!
//! Everything here is a pure function of its arguments; the current time is
//! passed in rather than read from the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::FeedEntry;
use crate::time::TimeWindow;

/// Category value that disables category filtering.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(default)]
    pub search_query: String,
    #[serde(default = "all_categories")]
    pub category: String,
    #[serde(default)]
    pub time_window: TimeWindow,
}

fn all_categories() -> String {
    ALL_CATEGORIES.to_string()
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            category: all_categories(),
            time_window: TimeWindow::All,
        }
    }
}

/// Entries from one source, in the order they appeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceGroup {
    pub source_name: String,
    pub source_icon: String,
    pub entries: Vec<FeedEntry>,
}

/// Applies `filters` to `entries` and sorts the result newest first.
///
/// Filters combine with AND. Entries with equal dates keep their input order.
pub fn apply(entries: &[FeedEntry], filters: &Filters, now: DateTime<Utc>) -> Vec<FeedEntry> {
    let query = filters.search_query.to_lowercase();
    let cutoff = filters.time_window.duration().map(|window| now - window);

    let mut filtered: Vec<FeedEntry> = entries
        .iter()
        .filter(|entry| query.trim().is_empty() || matches_search(entry, &query))
        .filter(|entry| filters.category == ALL_CATEGORIES || entry.category == filters.category)
        .filter(|entry| cutoff.map_or(true, |cutoff| entry.published_at >= cutoff))
        .cloned()
        .collect();

    filtered.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    filtered
}

fn matches_search(entry: &FeedEntry, query: &str) -> bool {
    entry.title.to_lowercase().contains(query)
        || entry.summary.to_lowercase().contains(query)
        || entry.source_name.to_lowercase().contains(query)
}

/// Groups entries by source name, groups ordered by first appearance.
pub fn group_by_source(entries: &[FeedEntry]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();

    for entry in entries {
        match groups.iter_mut().find(|g| g.source_name == entry.source_name) {
            Some(group) => group.entries.push(entry.clone()),
            None => groups.push(SourceGroup {
                source_name: entry.source_name.clone(),
                source_icon: entry.source_icon.clone(),
                entries: vec![entry.clone()],
            }),
        }
    }

    groups
}
