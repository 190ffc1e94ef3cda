use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;

/// A normalized article, independent of the feed format it came from.
///
/// The source fields are copies taken from the owning [`FeedConfig`] when the
/// entry was parsed, so reloading the configuration never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub source_name: String,
    pub source_icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_icon_url: Option<String>,
    pub category: String,
    #[serde(default)]
    pub summary: String,
}

impl FeedEntry {
    pub fn new(
        source: &FeedConfig,
        title: String,
        link: String,
        published_at: DateTime<Utc>,
        summary: String,
    ) -> Self {
        Self {
            title,
            link,
            published_at,
            source_name: source.name.clone(),
            source_icon: source.icon.clone(),
            source_icon_url: source.icon_url.clone(),
            category: source.category.clone(),
            summary,
        }
    }
}
