//! # timeline-store
//!
//! Local timeline cache for the federated timeline sync engine.
//!
//! This crate provides:
//! - [`WriteBatch`] - the all-or-nothing persistence unit for one page fetch
//! - [`TimelineStore`] - the cache surface: batched writes, keyset reads,
//!   watermarks, reply chains, preferences and reactive `observe_*` streams
//! - [`SqliteCache`] - the SQLite implementation (sqlx)
//!
//! ## Consistency
//!
//! All mutation goes through [`TimelineStore::apply_batch`], which applies a
//! batch in one transaction. Observers are notified only after commit, so a
//! reactive read never sees half a batch.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod batch;
mod chain;
mod error;
mod notify;
mod records;
mod sqlite;

pub use batch::{WriteBatch, WriteCommand};
pub use error::{StorageError, StorageResult};
pub use notify::Topic;
pub use records::{TimelinePreference, TimelinePreferenceRecord, TimelineRow};
pub use sqlite::SqliteCache;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use timeline_types::{FeedItemRecord, PostUri, ProfileId, SourceId, ThreadedPost, Timestamp};

/// Trait for timeline cache backends.
///
/// Every read is partitioned by an explicit viewer. The `observe_*` methods
/// emit the current result immediately, then again after every committed
/// change that can affect it. They end only when a read fails.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Apply every command in the batch atomically.
    ///
    /// On error nothing from the batch is visible.
    async fn apply_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Timeline rows strictly older than `before`, newest first.
    async fn feed_items(
        &self,
        viewer: &ProfileId,
        source: &SourceId,
        before: Timestamp,
        offset: u32,
        limit: u32,
    ) -> StorageResult<Vec<FeedItemRecord>>;

    /// Reactive form of [`feed_items`](TimelineStore::feed_items).
    fn observe_feed_items(
        &self,
        viewer: ProfileId,
        source: SourceId,
        before: Timestamp,
        offset: u32,
        limit: u32,
    ) -> BoxStream<'static, Vec<FeedItemRecord>>;

    /// Anchor of the partition's latest page-0 fetch.
    async fn last_fetch_key(
        &self,
        viewer: &ProfileId,
        source: &SourceId,
    ) -> StorageResult<Option<Timestamp>>;

    /// Reactive form of [`last_fetch_key`](TimelineStore::last_fetch_key).
    fn observe_last_fetch_key(
        &self,
        viewer: ProfileId,
        source: SourceId,
    ) -> BoxStream<'static, Option<Timestamp>>;

    /// Post of the newest row strictly older than `before`.
    async fn newest_item_key(
        &self,
        viewer: &ProfileId,
        source: &SourceId,
        before: Timestamp,
    ) -> StorageResult<Option<PostUri>>;

    /// Cached reply chain around a post, generation-numbered.
    async fn thread_chain(
        &self,
        viewer: &ProfileId,
        post_uri: &PostUri,
    ) -> StorageResult<Vec<ThreadedPost>>;

    /// Reactive form of [`thread_chain`](TimelineStore::thread_chain).
    fn observe_thread_chain(
        &self,
        viewer: ProfileId,
        post_uri: PostUri,
    ) -> BoxStream<'static, Vec<ThreadedPost>>;

    /// A viewer's source preferences, ordered by position.
    async fn timeline_preferences(
        &self,
        viewer: &ProfileId,
    ) -> StorageResult<Vec<TimelinePreferenceRecord>>;

    /// Reactive form of [`timeline_preferences`](TimelineStore::timeline_preferences).
    fn observe_timeline_preferences(
        &self,
        viewer: ProfileId,
    ) -> BoxStream<'static, Vec<TimelinePreferenceRecord>>;

    /// Delete every row partitioned by `viewer`.
    ///
    /// Returns the number of rows deleted.
    async fn purge_viewer(&self, viewer: &ProfileId) -> StorageResult<u64>;
}
