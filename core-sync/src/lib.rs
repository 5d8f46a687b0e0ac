//! # Sync Engine
//!
//! Keeps podcast subscriptions and episode playback state consistent with a
//! remote sync provider.
//!
//! ## Overview
//!
//! Local changes are recorded in a durable outbox and uploaded by
//! incremental passes that fetch the remote delta since a per-channel
//! watermark. Passes run on the host's background executor, are retried
//! with backoff on synchronization failures and converge to last-writer-wins
//! state across devices.
//!
//! ## Components
//!
//! - **Data Model** (`model`): Episode actions and provider change sets
//! - **Normalization** (`normalize`): Feed URL canonicalization and episode identity
//! - **Repository** (`repository`): SQLite persistence for pending changes
//! - **Queue** (`queue`): Pending-change outbox with add/remove cancellation
//! - **Settings** (`settings`): Provider selection, watermarks and attempt metadata
//! - **Conflict Resolver** (`conflict_resolver`): Picks the authoritative action per episode
//! - **Provider** (`provider`): Remote provider capability set and registry
//! - **Sync Coordinator** (`coordinator`): Runs the subscription and episode-action phases
//! - **Scheduler** (`scheduler`): Unique-job triggers and enqueue-and-sync operations
//! - **Upload Lock** (`lock`): Serializes uploads against queue mutations

pub mod conflict_resolver;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod queue;
pub mod repository;
pub mod scheduler;
pub mod settings;

pub use conflict_resolver::{ActionOrigin, ConflictResolver, Resolution, ResolvedAction};
pub use coordinator::{is_almost_ended, SyncConfig, SyncCoordinator, SYNC_ERROR_TITLE};
pub use error::{Result, SyncError};
pub use lock::{LockedRun, UploadLock};
pub use model::{
    EpisodeAction, EpisodeActionBuilder, EpisodeActionChanges, EpisodeActionKind,
    SubscriptionChanges, UploadChangesResponse,
};
pub use normalize::{canonicalize_url, EpisodeKey};
pub use provider::{ProviderFactory, ProviderKind, SyncProvider};
pub use queue::{QueueSnapshot, SynchronizationQueue};
pub use repository::{
    FeedEnqueueOutcome, QueueCategory, QueueEntry, QueueRepository, SqliteQueueRepository,
};
pub use scheduler::{SyncScheduler, SYNC_WORK_ID};
pub use settings::{SyncSettingsSnapshot, SynchronizationSettings};
