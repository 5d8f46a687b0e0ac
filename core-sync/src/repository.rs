//! # Pending-Change Repository
//!
//! SQLite persistence for the outbox of changes not yet acknowledged by the
//! remote provider.
//!
//! ## Overview
//!
//! Every queued change is one row of `sync_queue`, tagged with a
//! [`QueueCategory`]:
//! - `added_feed` / `removed_feed` rows carry the feed URL as reported plus
//!   its canonical `feed_key`, and act as sets (one row per key and category)
//! - `episode_action` rows carry a JSON-encoded episode action and act as an
//!   append-only list
//!
//! Feed enqueues run in a transaction so the opposite-category check, the
//! cancellation and the insert are observed atomically.

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::path::Path;
use tracing::{debug, instrument};

use crate::error::{Result, SyncError};
use crate::normalize::canonicalize_url;

const CREATE_QUEUE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS sync_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category TEXT NOT NULL,
        feed_url TEXT,
        feed_key TEXT,
        payload TEXT,
        enqueued_at INTEGER NOT NULL
    )
"#;

const CREATE_QUEUE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_category ON sync_queue (category, id)";

/// Category of a queued change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueCategory {
    AddedFeed,
    RemovedFeed,
    EpisodeAction,
}

impl QueueCategory {
    pub const ALL: [QueueCategory; 3] = [
        QueueCategory::AddedFeed,
        QueueCategory::RemovedFeed,
        QueueCategory::EpisodeAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueCategory::AddedFeed => "added_feed",
            QueueCategory::RemovedFeed => "removed_feed",
            QueueCategory::EpisodeAction => "episode_action",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == value)
    }

    /// The category a feed entry cancels. `None` for episode actions.
    pub fn opposite(&self) -> Option<Self> {
        match self {
            QueueCategory::AddedFeed => Some(QueueCategory::RemovedFeed),
            QueueCategory::RemovedFeed => Some(QueueCategory::AddedFeed),
            QueueCategory::EpisodeAction => None,
        }
    }
}

/// Result of a feed enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEnqueueOutcome {
    Queued,
    AlreadyQueued,
    /// An unflushed entry of the opposite category was removed instead.
    CancelledOpposite,
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub category: QueueCategory,
    pub feed_url: Option<String>,
    pub payload: Option<String>,
    pub enqueued_at: i64,
}

/// Repository trait for pending-change persistence
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Insert a feed entry unless present; an entry of the opposite category
    /// for the same feed is deleted instead of inserting. Entries are matched
    /// by canonical URL and keep the first spelling stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn enqueue_feed(&self, category: QueueCategory, feed_url: &str)
        -> Result<FeedEnqueueOutcome>;

    /// Insert feed entries that are not present yet, without cancellation.
    ///
    /// Returns the number of rows inserted.
    async fn insert_feeds(&self, category: QueueCategory, feed_urls: &[String]) -> Result<usize>;

    /// Append an encoded episode action.
    async fn append_action(&self, payload: &str) -> Result<i64>;

    /// All rows in insertion order, read in one statement.
    async fn list_all(&self) -> Result<Vec<QueueEntry>>;

    async fn delete_entries(&self, ids: &[i64]) -> Result<u64>;

    /// Delete every row of the given categories.
    async fn clear(&self, categories: &[QueueCategory]) -> Result<u64>;
}

/// SQLite implementation of [`QueueRepository`]
pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the queue table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(CREATE_QUEUE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        sqlx::query(CREATE_QUEUE_INDEX)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<Option<QueueEntry>> {
        let category: String = row.try_get("category").map_err(database_error)?;
        let Some(category) = QueueCategory::parse(&category) else {
            return Ok(None);
        };

        Ok(Some(QueueEntry {
            id: row.try_get("id").map_err(database_error)?,
            category,
            feed_url: row.try_get("feed_url").map_err(database_error)?,
            payload: row.try_get("payload").map_err(database_error)?,
            enqueued_at: row.try_get("enqueued_at").map_err(database_error)?,
        }))
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    #[instrument(skip(self))]
    async fn enqueue_feed(
        &self,
        category: QueueCategory,
        feed_url: &str,
    ) -> Result<FeedEnqueueOutcome> {
        let Some(opposite) = category.opposite() else {
            return Err(SyncError::Database(format!(
                "{} is not a feed category",
                category.as_str()
            )));
        };

        let feed_key = canonicalize_url(feed_url);
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let cancelled = sqlx::query("DELETE FROM sync_queue WHERE category = ? AND feed_key = ?")
            .bind(opposite.as_str())
            .bind(&feed_key)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?
            .rows_affected();

        let outcome = if cancelled > 0 {
            FeedEnqueueOutcome::CancelledOpposite
        } else {
            let existing = sqlx::query("SELECT id FROM sync_queue WHERE category = ? AND feed_key = ?")
                .bind(category.as_str())
                .bind(&feed_key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(database_error)?;

            if existing.is_some() {
                FeedEnqueueOutcome::AlreadyQueued
            } else {
                sqlx::query(
                    "INSERT INTO sync_queue (category, feed_url, feed_key, payload, enqueued_at) VALUES (?, ?, ?, NULL, ?)",
                )
                .bind(category.as_str())
                .bind(feed_url)
                .bind(&feed_key)
                .bind(Self::now())
                .execute(&mut *tx)
                .await
                .map_err(database_error)?;
                FeedEnqueueOutcome::Queued
            }
        };

        tx.commit().await.map_err(database_error)?;
        debug!(?outcome, "Feed change enqueued");
        Ok(outcome)
    }

    async fn insert_feeds(&self, category: QueueCategory, feed_urls: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;
        let mut inserted = 0;

        for feed_url in feed_urls {
            let feed_key = canonicalize_url(feed_url);
            let result = sqlx::query(
                r#"
                INSERT INTO sync_queue (category, feed_url, feed_key, payload, enqueued_at)
                SELECT ?, ?, ?, NULL, ?
                WHERE NOT EXISTS (
                    SELECT 1 FROM sync_queue WHERE category = ? AND feed_key = ?
                )
                "#,
            )
            .bind(category.as_str())
            .bind(feed_url)
            .bind(&feed_key)
            .bind(Self::now())
            .bind(category.as_str())
            .bind(&feed_key)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(database_error)?;
        Ok(inserted)
    }

    async fn append_action(&self, payload: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO sync_queue (category, feed_url, payload, enqueued_at) VALUES (?, NULL, ?, ?)",
        )
        .bind(QueueCategory::EpisodeAction.as_str())
        .bind(payload)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn list_all(&self) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(
            "SELECT id, category, feed_url, payload, enqueued_at FROM sync_queue ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entry) = Self::row_to_entry(row)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn delete_entries(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(database_error)?;
        let mut deleted = 0;
        for id in ids {
            deleted += sqlx::query("DELETE FROM sync_queue WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(database_error)?
                .rows_affected();
        }
        tx.commit().await.map_err(database_error)?;
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn clear(&self, categories: &[QueueCategory]) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;
        let mut deleted = 0;
        for category in categories {
            deleted += sqlx::query("DELETE FROM sync_queue WHERE category = ?")
                .bind(category.as_str())
                .execute(&mut *tx)
                .await
                .map_err(database_error)?
                .rows_affected();
        }
        tx.commit().await.map_err(database_error)?;
        debug!(deleted, "Cleared queue categories");
        Ok(deleted)
    }
}

fn database_error(error: sqlx::Error) -> SyncError {
    SyncError::Database(error.to_string())
}

/// Open (or create) the queue database at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened
pub async fn open_pool(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Database(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePool::connect_with(options).await.map_err(database_error)
}

/// One-connection in-memory pool; each `:memory:` connection is a separate
/// database.
pub async fn in_memory_pool() -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(database_error)
}
