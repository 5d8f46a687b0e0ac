//! Local Podcast Library
//!
//! The sync engine never owns feed or episode records. It reads and mutates
//! them through this collaborator, implemented by the host's storage layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Playback record of one episode's media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMedia {
    /// Enclosure URL, the fallback identity of the episode.
    pub download_url: String,
    pub duration_ms: Option<u64>,
    pub position_ms: u64,
    /// Position at which the current listening session began.
    pub played_start_ms: Option<u64>,
}

impl FeedMedia {
    pub fn new(download_url: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            duration_ms: None,
            position_ms: 0,
            played_start_ms: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_position_ms(mut self, position_ms: u64) -> Self {
        self.position_ms = position_ms;
        self
    }

    pub fn with_played_start_ms(mut self, start_ms: u64) -> Self {
        self.played_start_ms = Some(start_ms);
        self
    }
}

/// A locally known episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: i64,
    pub feed_url: String,
    pub guid: Option<String>,
    pub title: String,
    pub played: bool,
    pub media: Option<FeedMedia>,
}

impl FeedItem {
    pub fn new(id: i64, feed_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            feed_url: feed_url.into(),
            guid: None,
            title: title.into(),
            played: false,
            media: None,
        }
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    pub fn with_media(mut self, media: FeedMedia) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_played(mut self, played: bool) -> Self {
        self.played = played;
        self
    }
}

/// Local storage collaborator
///
/// Lookups take the episode's GUID when one is known and its enclosure URL
/// otherwise; implementations should match on either.
#[async_trait]
pub trait PodcastLibrary: Send + Sync {
    /// Feed URLs of every local subscription.
    async fn subscription_urls(&self) -> Result<Vec<String>>;

    /// Subscribe to a feed and start downloading it.
    async fn subscribe(&self, feed_url: &str) -> Result<()>;

    /// Remove a local subscription. Unknown URLs are ignored.
    async fn unsubscribe(&self, feed_url: &str) -> Result<()>;

    /// Every episode currently marked played.
    async fn played_items(&self) -> Result<Vec<FeedItem>>;

    async fn find_item(&self, guid: Option<&str>, episode_url: &str) -> Result<Option<FeedItem>>;

    /// Persist a batch of modified items in one operation.
    async fn update_items(&self, items: &[FeedItem]) -> Result<()>;

    /// Remove the given items from the play queue.
    async fn remove_from_play_queue(&self, item_ids: &[i64]) -> Result<()>;
}
