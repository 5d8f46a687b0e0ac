//! Conflict Resolution for Episode Actions
//!
//! Decides which of two competing playback reports for one episode wins.
//!
//! ## Overview
//!
//! Remote actions fetched since the watermark and locally queued actions
//! may both describe the same episode. The resolver keys every action by
//! [`EpisodeKey`] (GUID when both sides have one, otherwise canonical
//! episode URL) and keeps at most one authoritative action per episode:
//!
//! - Within one batch, a later entry replaces an earlier one when it is
//!   strictly newer or the earlier one carries no timestamp.
//! - Across batches, the remote entry wins only when it is strictly newer
//!   than the local one. Ties (including two missing timestamps) go to the
//!   local entry.
//! - The loser is discarded whole; fields are never merged.
//!
//! Only `NEW` and `PLAY` take part. Other kinds never reach local
//! playback state.
//!
//! ## Usage
//!
//! ```no_run
//! use core_sync::conflict_resolver::ConflictResolver;
//! # use core_sync::EpisodeAction;
//! # fn example(remote: Vec<EpisodeAction>, queued: Vec<EpisodeAction>) {
//! let resolution = ConflictResolver::resolve(&remote, &queued);
//! for action in resolution.remote_overrides() {
//!     println!("apply {}", action);
//! }
//! # }
//! ```

use std::collections::HashMap;
use tracing::debug;

use crate::model::EpisodeAction;
use crate::normalize::EpisodeKey;

/// Which batch a winning action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAction {
    pub origin: ActionOrigin,
    pub key: EpisodeKey,
    pub action: EpisodeAction,
}

/// Winners of one resolution, one per distinct episode.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    winners: Vec<ResolvedAction>,
}

impl Resolution {
    pub fn winners(&self) -> &[ResolvedAction] {
        &self.winners
    }

    /// Remote actions that must be applied to local state.
    pub fn remote_overrides(&self) -> impl Iterator<Item = &EpisodeAction> {
        self.winners_from(ActionOrigin::Remote)
    }

    /// Local actions that beat or had no remote counterpart.
    pub fn local_winners(&self) -> impl Iterator<Item = &EpisodeAction> {
        self.winners_from(ActionOrigin::Local)
    }

    fn winners_from(&self, origin: ActionOrigin) -> impl Iterator<Item = &EpisodeAction> {
        self.winners
            .iter()
            .filter(move |winner| winner.origin == origin)
            .map(|winner| &winner.action)
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }
}

/// Last-writer-wins resolver over episode actions.
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn resolve(remote: &[EpisodeAction], local: &[EpisodeAction]) -> Resolution {
        let remote = LatestByEpisode::collect(remote);
        let local = LatestByEpisode::collect(local);

        let mut winners = Vec::with_capacity(remote.entries.len() + local.entries.len());
        let mut local_beaten = vec![false; local.entries.len()];

        for (key, remote_action) in &remote.entries {
            match local.find(key) {
                Some(index) => {
                    let local_action = &local.entries[index].1;
                    if remote_is_newer(remote_action, local_action) {
                        local_beaten[index] = true;
                        winners.push(ResolvedAction {
                            origin: ActionOrigin::Remote,
                            key: key.clone(),
                            action: remote_action.clone(),
                        });
                    } else {
                        debug!(episode = %key.episode_url, "Local action wins over remote");
                    }
                }
                None => winners.push(ResolvedAction {
                    origin: ActionOrigin::Remote,
                    key: key.clone(),
                    action: remote_action.clone(),
                }),
            }
        }

        for (index, (key, local_action)) in local.entries.into_iter().enumerate() {
            if !local_beaten[index] {
                winners.push(ResolvedAction {
                    origin: ActionOrigin::Local,
                    key,
                    action: local_action,
                });
            }
        }

        Resolution { winners }
    }
}

/// Strictly newer; an unknown remote timestamp never wins.
fn remote_is_newer(remote: &EpisodeAction, local: &EpisodeAction) -> bool {
    match (remote.timestamp, local.timestamp) {
        (Some(remote_ts), Some(local_ts)) => remote_ts > local_ts,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Newest playback-relevant action per episode within one batch.
struct LatestByEpisode {
    entries: Vec<(EpisodeKey, EpisodeAction)>,
    by_guid: HashMap<String, usize>,
    by_url: HashMap<String, Vec<usize>>,
}

impl LatestByEpisode {
    fn collect(actions: &[EpisodeAction]) -> Self {
        let mut latest = Self {
            entries: Vec::new(),
            by_guid: HashMap::new(),
            by_url: HashMap::new(),
        };

        for action in actions.iter().filter(|a| a.action.affects_playback()) {
            let key = EpisodeKey::for_action(action);
            match latest.find(&key) {
                Some(index) => {
                    let current = &latest.entries[index].1;
                    if current.timestamp.is_none() || action.timestamp > current.timestamp {
                        latest.entries[index] = (key.clone(), action.clone());
                        latest.index(&key, index);
                    }
                }
                None => {
                    let index = latest.entries.len();
                    latest.entries.push((key.clone(), action.clone()));
                    latest.index(&key, index);
                }
            }
        }

        latest
    }

    fn index(&mut self, key: &EpisodeKey, index: usize) {
        if let Some(guid) = &key.guid {
            self.by_guid.entry(guid.clone()).or_insert(index);
        }
        let slots = self.by_url.entry(key.episode_url.clone()).or_default();
        if !slots.contains(&index) {
            slots.push(index);
        }
    }

    fn find(&self, key: &EpisodeKey) -> Option<usize> {
        if let Some(guid) = &key.guid {
            if let Some(&index) = self.by_guid.get(guid) {
                return Some(index);
            }
        }
        self.by_url
            .get(&key.episode_url)?
            .iter()
            .copied()
            .find(|&index| self.entries[index].0.matches(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EpisodeActionKind;
    use chrono::{TimeZone, Utc};

    const EPISODE: &str = "http://example.com/ep1.mp3";

    fn play(episode: &str, ts: Option<i64>, position: u64) -> EpisodeAction {
        let mut builder = EpisodeAction::builder("http://example.com/feed", episode, EpisodeActionKind::Play)
            .position(position);
        if let Some(ts) = ts {
            builder = builder.timestamp(Utc.timestamp_opt(ts, 0).unwrap());
        }
        builder.build()
    }

    fn positions<'a>(actions: impl Iterator<Item = &'a EpisodeAction>) -> Vec<u64> {
        actions.filter_map(|a| a.position).collect()
    }

    #[test]
    fn test_newer_remote_wins() {
        let resolution = ConflictResolver::resolve(
            &[play(EPISODE, Some(200), 50)],
            &[play(EPISODE, Some(100), 10)],
        );

        assert_eq!(positions(resolution.remote_overrides()), vec![50]);
        assert_eq!(resolution.local_winners().count(), 0);
        assert_eq!(resolution.len(), 1);
    }

    #[test]
    fn test_newer_local_wins() {
        let resolution = ConflictResolver::resolve(
            &[play(EPISODE, Some(100), 50)],
            &[play(EPISODE, Some(200), 10)],
        );

        assert_eq!(resolution.remote_overrides().count(), 0);
        assert_eq!(positions(resolution.local_winners()), vec![10]);
    }

    #[test]
    fn test_tie_goes_to_local() {
        let resolution = ConflictResolver::resolve(
            &[play(EPISODE, Some(100), 50)],
            &[play(EPISODE, Some(100), 10)],
        );
        assert_eq!(resolution.remote_overrides().count(), 0);
        assert_eq!(positions(resolution.local_winners()), vec![10]);

        let resolution =
            ConflictResolver::resolve(&[play(EPISODE, None, 50)], &[play(EPISODE, None, 10)]);
        assert_eq!(resolution.remote_overrides().count(), 0);
    }

    #[test]
    fn test_untimed_local_loses_to_timed_remote() {
        let resolution =
            ConflictResolver::resolve(&[play(EPISODE, Some(1), 50)], &[play(EPISODE, None, 10)]);
        assert_eq!(positions(resolution.remote_overrides()), vec![50]);
    }

    #[test]
    fn test_one_sided_entries_pass_through() {
        let resolution = ConflictResolver::resolve(
            &[play("http://example.com/remote.mp3", Some(100), 1)],
            &[play("http://example.com/local.mp3", Some(100), 2)],
        );

        assert_eq!(positions(resolution.remote_overrides()), vec![1]);
        assert_eq!(positions(resolution.local_winners()), vec![2]);
    }

    #[test]
    fn test_newest_within_batch_is_kept() {
        let resolution = ConflictResolver::resolve(
            &[
                play(EPISODE, Some(100), 1),
                play(EPISODE, Some(300), 3),
                play(EPISODE, Some(200), 2),
            ],
            &[],
        );
        assert_eq!(positions(resolution.remote_overrides()), vec![3]);
    }

    #[test]
    fn test_guid_and_url_references_are_one_episode() {
        let remote = EpisodeAction::builder("http://example.com/feed", EPISODE, EpisodeActionKind::Play)
            .guid("ep-1")
            .timestamp(Utc.timestamp_opt(200, 0).unwrap())
            .position(50)
            .build();
        let local = play("HTTP://EXAMPLE.COM/ep1.mp3", Some(100), 10);

        let resolution = ConflictResolver::resolve(&[remote], &[local]);
        assert_eq!(resolution.len(), 1);
        assert_eq!(positions(resolution.remote_overrides()), vec![50]);
    }

    #[test]
    fn test_different_guids_on_same_url_are_distinct() {
        let with_guid = |guid: &str, position: u64| {
            EpisodeAction::builder("http://example.com/feed", EPISODE, EpisodeActionKind::Play)
                .guid(guid)
                .timestamp(Utc.timestamp_opt(100, 0).unwrap())
                .position(position)
                .build()
        };

        let resolution = ConflictResolver::resolve(&[with_guid("a", 1), with_guid("b", 2)], &[]);
        assert_eq!(positions(resolution.remote_overrides()), vec![1, 2]);
    }

    #[test]
    fn test_non_playback_kinds_are_ignored() {
        let download = EpisodeAction::builder("p", EPISODE, EpisodeActionKind::Download)
            .timestamp(Utc.timestamp_opt(500, 0).unwrap())
            .build();
        let delete = EpisodeAction::builder("p", EPISODE, EpisodeActionKind::Delete)
            .timestamp(Utc.timestamp_opt(500, 0).unwrap())
            .build();

        let resolution = ConflictResolver::resolve(&[download, delete], &[]);
        assert!(resolution.is_empty());
    }

    #[test]
    fn test_new_action_follows_timestamp_rule() {
        let new = EpisodeAction::builder("p", EPISODE, EpisodeActionKind::New)
            .timestamp(Utc.timestamp_opt(300, 0).unwrap())
            .build();

        let resolution = ConflictResolver::resolve(&[new], &[play(EPISODE, Some(200), 10)]);
        let applied: Vec<_> = resolution.remote_overrides().collect();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].action, EpisodeActionKind::New);
    }
}
