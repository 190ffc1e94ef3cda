//! Best-effort persistence of the last aggregate in a single key/value slot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::FeedEntry;

/// Storage slot holding the serialized snapshot.
pub const CACHE_KEY: &str = "feedCache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub entries: Vec<FeedEntry>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
}

pub struct CacheStore {
    pool: SqlitePool,
    max_age: Duration,
}

impl CacheStore {
    pub async fn new(database_url: &str, max_age: Duration) -> Result<Self, CacheError> {
        // A single connection keeps `sqlite::memory:` databases shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        Ok(Self { pool, max_age })
    }

    pub async fn initialize(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persists a snapshot. Failures are logged and otherwise ignored.
    pub async fn save(&self, entries: &[FeedEntry], captured_at: DateTime<Utc>) {
        if let Err(e) = self.try_save(entries, captured_at).await {
            warn!("Failed to save cache: {}", e);
        }
    }

    pub async fn try_save(
        &self,
        entries: &[FeedEntry],
        captured_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let snapshot = CacheSnapshot {
            entries: entries.to_vec(),
            captured_at,
        };
        let json = serde_json::to_string(&snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(CACHE_KEY)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the stored snapshot if it is younger than the maximum age.
    ///
    /// Missing, stale and unreadable snapshots all yield `None`.
    pub async fn load(&self) -> Option<CacheSnapshot> {
        self.load_at(Utc::now()).await
    }

    pub async fn load_at(&self, now: DateTime<Utc>) -> Option<CacheSnapshot> {
        match self.try_load().await {
            Ok(Some(snapshot)) if now - snapshot.captured_at < self.max_age => Some(snapshot),
            Ok(Some(snapshot)) => {
                info!(
                    "Ignoring stale cache captured at {}",
                    snapshot.captured_at.to_rfc3339()
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load cache: {}", e);
                None
            }
        }
    }

    /// Reads the snapshot regardless of age.
    pub async fn try_load(&self) -> Result<Option<CacheSnapshot>, CacheError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(CACHE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
