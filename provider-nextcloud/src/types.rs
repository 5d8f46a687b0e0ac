//! gpoddersync wire types

use core_sync::{EpisodeAction, EpisodeActionChanges, SubscriptionChanges, UploadChangesResponse};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `GET subscriptions?since=T`
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionsResponse {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
    pub timestamp: i64,
}

impl From<SubscriptionsResponse> for SubscriptionChanges {
    fn from(response: SubscriptionsResponse) -> Self {
        SubscriptionChanges {
            added: response.add,
            removed: response.remove,
            timestamp: response.timestamp,
        }
    }
}

/// Body of `POST subscription_change/create`
#[derive(Debug, Serialize)]
pub struct SubscriptionChangeRequest<'a> {
    pub add: &'a [String],
    pub remove: &'a [String],
}

/// `GET episode_action?since=T`
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeActionsResponse {
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
    pub timestamp: i64,
}

impl From<EpisodeActionsResponse> for EpisodeActionChanges {
    fn from(response: EpisodeActionsResponse) -> Self {
        let total = response.actions.len();
        let actions: Vec<EpisodeAction> = response
            .actions
            .into_iter()
            .filter_map(|raw| serde_json::from_value(raw).ok())
            .collect();
        if actions.len() < total {
            warn!(
                skipped = total - actions.len(),
                "Skipping undecodable episode actions"
            );
        }

        EpisodeActionChanges {
            actions,
            timestamp: response.timestamp,
        }
    }
}

/// Answer to both `create` routes. gpoddersync never rewrites URLs.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponse {
    pub timestamp: i64,
}

impl From<CreateResponse> for UploadChangesResponse {
    fn from(response: CreateResponse) -> Self {
        UploadChangesResponse::new(response.timestamp)
    }
}
