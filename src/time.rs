//! Relative-time formatting and the time windows used by the filter engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Formats `date` relative to `now` the way the article list shows it.
///
/// Anything older than a week falls back to the calendar date.
pub fn format_relative_time(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(date);

    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else if days < 7 {
        format!("{}d ago", days)
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl TimeWindow {
    /// Length of the window, `None` for an unbounded one.
    pub fn duration(self) -> Option<Duration> {
        match self {
            TimeWindow::Day => Some(Duration::hours(24)),
            TimeWindow::Week => Some(Duration::days(7)),
            TimeWindow::Month => Some(Duration::days(30)),
            TimeWindow::All => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Day => "24h",
            TimeWindow::Week => "7d",
            TimeWindow::Month => "30d",
            TimeWindow::All => "all",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown time window: {0}")]
pub struct UnknownTimeWindow(pub String);

impl FromStr for TimeWindow {
    type Err = UnknownTimeWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(TimeWindow::Day),
            "7d" => Ok(TimeWindow::Week),
            "30d" => Ok(TimeWindow::Month),
            "all" => Ok(TimeWindow::All),
            other => Err(UnknownTimeWindow(other.to_string())),
        }
    }
}
