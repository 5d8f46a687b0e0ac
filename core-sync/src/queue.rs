//! Pending-change queue.
//!
//! [`SynchronizationQueue`] is the outbox the engine uploads from. Feed
//! entries are stored as given and deduplicated by canonical URL, so the set
//! semantics hold across differently formatted references to one feed while
//! uploads carry the URL the user subscribed to. Writers are serialized by
//! an internal mutex that is independent of the pass-level upload lock.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::EpisodeAction;
use crate::normalize::{canonicalize_url, unique_urls};
use crate::repository::{FeedEnqueueOutcome, QueueCategory, QueueRepository};

/// Consistent point-in-time view of all three categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub added_feeds: Vec<String>,
    pub removed_feeds: Vec<String>,
    pub episode_actions: Vec<EpisodeAction>,
}

impl QueueSnapshot {
    pub fn has_feed_changes(&self) -> bool {
        !self.added_feeds.is_empty() || !self.removed_feeds.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_feed_changes() && self.episode_actions.is_empty()
    }
}

pub struct SynchronizationQueue {
    repository: Arc<dyn QueueRepository>,
    write_lock: Mutex<()>,
}

impl SynchronizationQueue {
    pub fn new(repository: Arc<dyn QueueRepository>) -> Self {
        Self {
            repository,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn enqueue_feed_added(&self, feed_url: &str) -> Result<FeedEnqueueOutcome> {
        self.enqueue_feed(QueueCategory::AddedFeed, feed_url).await
    }

    pub async fn enqueue_feed_removed(&self, feed_url: &str) -> Result<FeedEnqueueOutcome> {
        self.enqueue_feed(QueueCategory::RemovedFeed, feed_url).await
    }

    async fn enqueue_feed(
        &self,
        category: QueueCategory,
        feed_url: &str,
    ) -> Result<FeedEnqueueOutcome> {
        let feed_url = feed_url.trim();
        if canonicalize_url(feed_url).is_empty() {
            warn!(category = category.as_str(), "Ignoring empty feed URL");
            return Ok(FeedEnqueueOutcome::AlreadyQueued);
        }

        let _guard = self.write_lock.lock().await;
        self.repository.enqueue_feed(category, feed_url).await
    }

    pub async fn enqueue_episode_action(&self, action: &EpisodeAction) -> Result<()> {
        let payload = serde_json::to_string(action)?;

        let _guard = self.write_lock.lock().await;
        let id = self.repository.append_action(&payload).await?;
        debug!(id, action = %action, "Episode action enqueued");
        Ok(())
    }

    /// Bulk-insert feeds as pending additions, skipping those already queued.
    ///
    /// Used by the first-sync bootstrap; no cancellation against the removed
    /// set takes place.
    pub async fn seed_feeds_added(&self, feed_urls: &[String]) -> Result<usize> {
        let feed_urls = unique_urls(feed_urls);
        if feed_urls.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        self.repository
            .insert_feeds(QueueCategory::AddedFeed, &feed_urls)
            .await
    }

    /// Read all categories in one statement.
    ///
    /// Action rows whose payload no longer decodes are dropped from the
    /// snapshot and deleted.
    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        let entries = self.repository.list_all().await?;

        let mut snapshot = QueueSnapshot::default();
        let mut malformed = Vec::new();

        for entry in entries {
            match entry.category {
                QueueCategory::AddedFeed | QueueCategory::RemovedFeed => {
                    let Some(url) = entry.feed_url.filter(|url| !url.is_empty()) else {
                        warn!(id = entry.id, "Dropping queued feed change without URL");
                        malformed.push(entry.id);
                        continue;
                    };
                    if entry.category == QueueCategory::AddedFeed {
                        snapshot.added_feeds.push(url);
                    } else {
                        snapshot.removed_feeds.push(url);
                    }
                }
                QueueCategory::EpisodeAction => {
                    let decoded = entry
                        .payload
                        .as_deref()
                        .map(serde_json::from_str::<EpisodeAction>);
                    match decoded {
                        Some(Ok(action)) => snapshot.episode_actions.push(action),
                        Some(Err(e)) => {
                            warn!(id = entry.id, error = %e, "Dropping malformed queued episode action");
                            malformed.push(entry.id);
                        }
                        None => {
                            warn!(id = entry.id, "Dropping queued episode action without payload");
                            malformed.push(entry.id);
                        }
                    }
                }
            }
        }

        if !malformed.is_empty() {
            let _guard = self.write_lock.lock().await;
            self.repository.delete_entries(&malformed).await?;
        }

        Ok(snapshot)
    }

    pub async fn queued_added_feeds(&self) -> Result<Vec<String>> {
        Ok(self.snapshot().await?.added_feeds)
    }

    pub async fn queued_removed_feeds(&self) -> Result<Vec<String>> {
        Ok(self.snapshot().await?.removed_feeds)
    }

    pub async fn queued_episode_actions(&self) -> Result<Vec<EpisodeAction>> {
        Ok(self.snapshot().await?.episode_actions)
    }

    /// Only call after the subscription upload was acknowledged.
    pub async fn clear_feed_queues(&self) -> Result<()> {
        self.clear(&[QueueCategory::AddedFeed, QueueCategory::RemovedFeed])
            .await
    }

    /// Only call after the episode-action upload was acknowledged.
    pub async fn clear_episode_action_queue(&self) -> Result<()> {
        self.clear(&[QueueCategory::EpisodeAction]).await
    }

    pub async fn clear_queue(&self) -> Result<()> {
        self.clear(&QueueCategory::ALL).await
    }

    async fn clear(&self, categories: &[QueueCategory]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.repository.clear(categories).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EpisodeActionKind;
    use crate::repository::{in_memory_pool, SqliteQueueRepository};

    async fn queue_with_repository() -> (SynchronizationQueue, Arc<SqliteQueueRepository>) {
        let repository = Arc::new(SqliteQueueRepository::new(in_memory_pool().await.unwrap()));
        repository.initialize().await.unwrap();
        (SynchronizationQueue::new(repository.clone()), repository)
    }

    async fn queue() -> SynchronizationQueue {
        queue_with_repository().await.0
    }

    fn play(episode: &str, position: u64) -> EpisodeAction {
        EpisodeAction::builder("http://example.com/feed", episode, EpisodeActionKind::Play)
            .position(position)
            .build()
    }

    #[tokio::test]
    async fn test_feed_enqueue_dedupes_by_canonical_url() {
        let queue = queue().await;

        queue.enqueue_feed_added(" HTTP://Example.com/Feed ").await.unwrap();
        let outcome = queue.enqueue_feed_added("http://example.com/Feed").await.unwrap();

        assert_eq!(outcome, FeedEnqueueOutcome::AlreadyQueued);
        assert_eq!(
            queue.queued_added_feeds().await.unwrap(),
            vec!["HTTP://Example.com/Feed"]
        );
    }

    #[tokio::test]
    async fn test_add_then_remove_leaves_neither() {
        let queue = queue().await;

        queue.enqueue_feed_added("http://example.com/feed").await.unwrap();
        queue.enqueue_feed_removed("http://example.com/feed").await.unwrap();

        let snapshot = queue.snapshot().await.unwrap();
        assert!(snapshot.added_feeds.is_empty());
        assert!(snapshot.removed_feeds.is_empty());
    }

    #[tokio::test]
    async fn test_remove_then_add_leaves_neither() {
        let queue = queue().await;

        queue.enqueue_feed_removed("http://example.com/feed").await.unwrap();
        queue.enqueue_feed_added("feed://example.com/feed").await.unwrap();

        assert!(queue.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_episode_actions_keep_order() {
        let queue = queue().await;

        queue.enqueue_episode_action(&play("http://example.com/1.mp3", 10)).await.unwrap();
        queue.enqueue_episode_action(&play("http://example.com/2.mp3", 20)).await.unwrap();
        queue.enqueue_episode_action(&play("http://example.com/1.mp3", 30)).await.unwrap();

        let actions = queue.queued_episode_actions().await.unwrap();
        let positions: Vec<_> = actions.iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![Some(10), Some(20), Some(30)]);
    }

    #[tokio::test]
    async fn test_malformed_action_is_dropped_and_deleted() {
        let (queue, repository) = queue_with_repository().await;

        queue.enqueue_episode_action(&play("http://example.com/1.mp3", 10)).await.unwrap();
        repository.append_action("{not json").await.unwrap();

        let actions = queue.queued_episode_actions().await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(repository.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_skips_already_queued() {
        let queue = queue().await;
        queue.enqueue_feed_added("http://a.com/").await.unwrap();

        let inserted = queue
            .seed_feeds_added(&["http://a.com/".to_string(), "http://B.com".to_string()])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(
            queue.queued_added_feeds().await.unwrap(),
            vec!["http://a.com/", "http://B.com"]
        );
    }

    #[tokio::test]
    async fn test_clears_are_scoped() {
        let queue = queue().await;
        queue.enqueue_feed_added("http://a.com/").await.unwrap();
        queue.enqueue_feed_removed("http://b.com/").await.unwrap();
        queue.enqueue_episode_action(&play("http://example.com/1.mp3", 10)).await.unwrap();

        queue.clear_feed_queues().await.unwrap();
        let snapshot = queue.snapshot().await.unwrap();
        assert!(!snapshot.has_feed_changes());
        assert_eq!(snapshot.episode_actions.len(), 1);

        queue.enqueue_feed_added("http://c.com/").await.unwrap();
        queue.clear_episode_action_queue().await.unwrap();
        let snapshot = queue.snapshot().await.unwrap();
        assert_eq!(snapshot.added_feeds, vec!["http://c.com/"]);
        assert!(snapshot.episode_actions.is_empty());

        queue.clear_queue().await.unwrap();
        assert!(queue.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueues() {
        let queue = Arc::new(queue().await);

        let mut handles = Vec::new();
        for i in 0..10 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue_feed_added(&format!("http://example.com/{}", i))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.queued_added_feeds().await.unwrap().len(), 10);
    }
}
