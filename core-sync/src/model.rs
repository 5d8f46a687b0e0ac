//! # Sync Data Model
//!
//! Episode actions and the change sets exchanged with a sync provider.
//!
//! [`EpisodeAction`] serializes to the gpodder episode-action JSON shape so
//! the same value can be queued locally and uploaded unchanged:
//!
//! ```json
//! {
//!   "podcast": "https://example.com/feed.xml",
//!   "episode": "https://example.com/ep1.mp3",
//!   "guid": "ep-1",
//!   "action": "play",
//!   "timestamp": "2024-03-01T10:15:30",
//!   "started": 0,
//!   "position": 120,
//!   "total": 3600
//! }
//! ```

use bridge_traits::library::FeedItem;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a reported episode event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeActionKind {
    New,
    Download,
    Play,
    Delete,
    /// Any action name this client does not understand.
    Unknown,
}

impl<'de> Deserialize<'de> for EpisodeActionKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

impl EpisodeActionKind {
    /// Case-insensitive; unrecognized names map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "download" => Self::Download,
            "play" => Self::Play,
            "delete" => Self::Delete,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Download => "download",
            Self::Play => "play",
            Self::Delete => "delete",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds that are reconciled and applied to local playback state.
    pub fn affects_playback(&self) -> bool {
        matches!(self, Self::New | Self::Play)
    }
}

impl fmt::Display for EpisodeActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One playback event for one episode. Offsets are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeAction {
    /// Feed URL
    pub podcast: String,
    /// Episode enclosure URL
    pub episode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub action: EpisodeActionKind,
    #[serde(
        default,
        with = "gpodder_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl EpisodeAction {
    pub fn builder(
        podcast: impl Into<String>,
        episode: impl Into<String>,
        action: EpisodeActionKind,
    ) -> EpisodeActionBuilder {
        EpisodeActionBuilder {
            action: EpisodeAction {
                podcast: podcast.into(),
                episode: episode.into(),
                guid: None,
                action,
                timestamp: None,
                started: None,
                position: None,
                total: None,
            },
        }
    }

    /// Builder pre-filled with the identity of a local item.
    ///
    /// `None` when the item has no media, since the enclosure URL is the
    /// action's episode identity.
    pub fn builder_for_item(item: &FeedItem, action: EpisodeActionKind) -> Option<EpisodeActionBuilder> {
        let media = item.media.as_ref()?;
        let mut builder = Self::builder(item.feed_url.clone(), media.download_url.clone(), action);
        if let Some(guid) = &item.guid {
            builder = builder.guid(guid.clone());
        }
        Some(builder)
    }

    /// Checks `started <= position <= total` over the offsets that are known.
    /// A zero `total` counts as unknown.
    pub fn is_consistent(&self) -> bool {
        let ordered = |a: Option<u64>, b: Option<u64>| match (a, b) {
            (Some(a), Some(b)) => a <= b,
            _ => true,
        };
        let total = self.total.filter(|total| *total > 0);
        ordered(self.started, self.position)
            && ordered(self.position, total)
            && ordered(self.started, total)
    }

    /// Remote actions without an identity, with an unknown kind or with
    /// out-of-order offsets are unusable.
    pub fn is_well_formed(&self) -> bool {
        !self.podcast.trim().is_empty()
            && !self.episode.trim().is_empty()
            && self.action != EpisodeActionKind::Unknown
            && self.is_consistent()
    }
}

impl fmt::Display for EpisodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.episode)?;
        if let Some(position) = self.position {
            write!(f, " @{}s", position)?;
        }
        if let Some(ts) = self.timestamp {
            write!(f, " ({})", ts.format(gpodder_timestamp::FORMAT))?;
        }
        Ok(())
    }
}

pub struct EpisodeActionBuilder {
    action: EpisodeAction,
}

impl EpisodeActionBuilder {
    pub fn guid(mut self, guid: impl Into<String>) -> Self {
        self.action.guid = Some(guid.into());
        self
    }

    /// Timestamps carry whole seconds only, matching the wire format.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.action.timestamp = Utc.timestamp_opt(timestamp.timestamp(), 0).single();
        self
    }

    pub fn started(mut self, seconds: u64) -> Self {
        self.action.started = Some(seconds);
        self
    }

    pub fn position(mut self, seconds: u64) -> Self {
        self.action.position = Some(seconds);
        self
    }

    pub fn total(mut self, seconds: u64) -> Self {
        self.action.total = Some(seconds);
        self
    }

    pub fn build(self) -> EpisodeAction {
        self.action
    }
}

/// Subscription delta reported by a provider since a watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// New watermark issued by the server
    pub timestamp: i64,
}

/// Episode actions reported by a provider since a watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeActionChanges {
    pub actions: Vec<EpisodeAction>,
    pub timestamp: i64,
}

/// Acknowledgement of an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadChangesResponse {
    /// New watermark issued by the server
    pub timestamp: i64,
    /// `(sent, rewritten)` pairs for URLs the server sanitized
    pub updated_urls: Vec<(String, String)>,
}

impl UploadChangesResponse {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            updated_urls: Vec::new(),
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SS` in UTC.
///
/// Unparseable values decode to `None` instead of failing the whole batch.
pub(crate) mod gpodder_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, FORMAT) {
            return Some(naive.and_utc());
        }
        // Some servers send fractional seconds or an offset
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}
