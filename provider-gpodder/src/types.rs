//! gpodder.net API v2 wire types
//!
//! See: https://gpoddernet.readthedocs.io/en/latest/api/reference/

use core_sync::{EpisodeAction, EpisodeActionChanges, SubscriptionChanges, UploadChangesResponse};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `GET /api/2/subscriptions/{user}/{device}.json?since=T`
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionChangesResponse {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
    pub timestamp: i64,
}

impl From<SubscriptionChangesResponse> for SubscriptionChanges {
    fn from(response: SubscriptionChangesResponse) -> Self {
        SubscriptionChanges {
            added: response.add,
            removed: response.remove,
            timestamp: response.timestamp,
        }
    }
}

/// Body of `POST /api/2/subscriptions/{user}/{device}.json`
#[derive(Debug, Serialize)]
pub struct SubscriptionChangesRequest<'a> {
    pub add: &'a [String],
    pub remove: &'a [String],
}

/// `GET /api/2/episodes/{user}.json?since=T`
///
/// Actions are kept as raw JSON so one malformed entry does not reject the
/// whole batch.
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeActionsResponse {
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
    pub timestamp: i64,
}

impl From<EpisodeActionsResponse> for EpisodeActionChanges {
    fn from(response: EpisodeActionsResponse) -> Self {
        let actions = response
            .actions
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<EpisodeAction>(raw) {
                Ok(action) => Some(action),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable episode action");
                    None
                }
            })
            .collect();

        EpisodeActionChanges {
            actions,
            timestamp: response.timestamp,
        }
    }
}

/// Answer to both upload endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub timestamp: i64,
    /// `[sent, rewritten]` pairs; the rewritten URL may be empty when the
    /// server dropped the URL
    #[serde(default)]
    pub update_urls: Vec<(String, String)>,
}

impl From<UploadResponse> for UploadChangesResponse {
    fn from(response: UploadResponse) -> Self {
        UploadChangesResponse {
            timestamp: response.timestamp,
            updated_urls: response.update_urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_sync::EpisodeActionKind;

    #[test]
    fn test_subscription_changes_decode() {
        let response: SubscriptionChangesResponse = serde_json::from_str(
            r#"{"add": ["https://a.example/feed"], "remove": [], "timestamp": 12347}"#,
        )
        .unwrap();
        let changes = SubscriptionChanges::from(response);
        assert_eq!(changes.added, vec!["https://a.example/feed".to_string()]);
        assert!(changes.removed.is_empty());
        assert_eq!(changes.timestamp, 12347);
    }

    #[test]
    fn test_episode_actions_skip_malformed_entries() {
        let response: EpisodeActionsResponse = serde_json::from_str(
            r#"{
                "actions": [
                    {"podcast": "p", "episode": "e", "action": "play", "position": 10},
                    {"episode": "missing podcast"},
                    {"podcast": "p", "episode": "e2", "action": "download"}
                ],
                "timestamp": 99
            }"#,
        )
        .unwrap();
        let changes = EpisodeActionChanges::from(response);
        assert_eq!(changes.actions.len(), 2);
        assert_eq!(changes.actions[0].action, EpisodeActionKind::Play);
        assert_eq!(changes.actions[0].position, Some(10));
        assert_eq!(changes.timestamp, 99);
    }

    #[test]
    fn test_upload_response_decode() {
        let response: UploadResponse = serde_json::from_str(
            r#"{"timestamp": 1337, "update_urls": [["feed2.example.com/rss", "http://feed2.example.com/rss"]]}"#,
        )
        .unwrap();
        let upload = UploadChangesResponse::from(response);
        assert_eq!(upload.timestamp, 1337);
        assert_eq!(upload.updated_urls[0].1, "http://feed2.example.com/rss");

        let bare: UploadResponse = serde_json::from_str(r#"{"timestamp": 5}"#).unwrap();
        assert!(bare.update_urls.is_empty());
    }
}
