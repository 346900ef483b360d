//! The public read/write surface of the sync engine.
//!
//! [`TimelineSyncFacade`] composes the remote API, the cursor pager, the
//! local cache, the update poller and the outbound write queue. Reads are
//! reactive streams over the cache; network fetches only ever write to the
//! cache and advance cursors.

use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use timeline_core::{assemble, dedupe_by_id, reconstruct};
use timeline_store::{
    SqliteCache, TimelinePreference, TimelinePreferenceRecord, TimelineStore, WriteBatch,
    WriteCommand,
};
use timeline_types::{
    Cursor, CursorQuery, FeedReason, FetchedPage, Page, Post, PostUri, ProfileId, SourceId,
    SourceRef, Timeline, TimelineItem, TimelineMeta, Timestamp, ViewerState,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, FeedApi, FeedRequest};
use crate::config::Config;
use crate::error::ClientError;
use crate::flow::{combine_latest, distinct_until_changed, flat_map_latest};
use crate::pager::{CursorPager, PartitionKey};
use crate::poller::UpdatePoller;
use crate::retry::RetryPolicy;
use crate::session::TimelineSession;
use crate::write_queue::{OutboundWrite, WriteQueue};

/// Result of a preference update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Persisted locally and queued for the remote.
    Success,
    /// Nothing changed; the reason is attached.
    Failure(String),
}

impl Outcome {
    /// Check for success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The viewer's new set of home timelines, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HomeTimelineUpdate {
    /// Every saved timeline, with its preference state.
    pub timelines: Vec<Timeline>,
}

/// A local reaction to a post.
///
/// Carries the post as the caller last saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostInteraction {
    /// Like the post.
    Like(Post),
    /// Remove the viewer's like.
    Unlike(Post),
    /// Repost the post.
    Repost(Post),
    /// Remove the viewer's repost.
    Unrepost(Post),
}

/// Timeline synchronization facade.
#[derive(Clone)]
pub struct TimelineSyncFacade {
    api: Arc<dyn FeedApi>,
    store: Arc<dyn TimelineStore>,
    writes: Arc<dyn WriteQueue>,
    pager: Arc<CursorPager>,
    poller: Arc<UpdatePoller>,
    retry: RetryPolicy,
    page_limit: u32,
}

impl TimelineSyncFacade {
    /// Create a facade over existing collaborators.
    pub fn new(
        api: Arc<dyn FeedApi>,
        store: Arc<dyn TimelineStore>,
        writes: Arc<dyn WriteQueue>,
        config: &Config,
    ) -> Self {
        let retry = config.retry_policy();
        let poller = UpdatePoller::new(
            Arc::clone(&api),
            Arc::clone(&store),
            retry,
            config.feed_interval(),
            config.profile_interval(),
        );
        Self {
            api,
            store,
            writes,
            pager: Arc::new(CursorPager::new()),
            poller: Arc::new(poller),
            retry,
            page_limit: config.fetch.page_limit,
        }
    }

    /// Open the configured SQLite cache and create a facade over it.
    pub async fn open(
        config: &Config,
        api: Arc<dyn FeedApi>,
        writes: Arc<dyn WriteQueue>,
    ) -> Result<Self, ClientError> {
        let store =
            SqliteCache::new(&config.store.database, config.store.max_connections).await?;
        info!(database = %config.store.database.display(), "Timeline cache opened");
        Ok(Self::new(api, Arc::new(store), writes, config))
    }

    /// Default page size.
    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    /// The cache this facade reads from.
    pub fn store(&self) -> &Arc<dyn TimelineStore> {
        &self.store
    }

    /// Open a session driving pagination for one timeline.
    pub fn session(&self, viewer: ProfileId, timeline: Timeline) -> TimelineSession {
        TimelineSession::new(self.clone(), viewer, timeline)
    }

    // =========================================================================
    // Timeline pages
    // =========================================================================

    /// Reactive page of timeline items for `(query, cursor)`.
    ///
    /// Emits once the page's rows are in the cache and the pager has
    /// settled the next cursor, then again whenever the rows change. A
    /// page-0 query waits for its own fetch to land so rows from an older
    /// session never show. A failed fetch keeps `cursor` as the next cursor.
    pub fn timeline_items(
        &self,
        viewer: ProfileId,
        timeline: &Timeline,
        query: CursorQuery,
        cursor: Cursor,
    ) -> BoxStream<'static, Page<TimelineItem>> {
        let source = timeline.source_ref();
        let source_id = source.source_id();

        let rows = if query.is_fresh() {
            let store = Arc::clone(&self.store);
            let (viewer, source_id) = (viewer.clone(), source_id.clone());
            let settled = distinct_until_changed(
                self.store
                    .observe_last_fetch_key(viewer.clone(), source_id.clone()),
            )
            .filter(move |watermark| future::ready(*watermark == Some(query.anchor)))
            .boxed();
            flat_map_latest(settled, move |_| {
                store.observe_feed_items(
                    viewer.clone(),
                    source_id.clone(),
                    query.anchor,
                    query.offset,
                    query.limit,
                )
            })
        } else {
            self.store.observe_feed_items(
                viewer.clone(),
                source_id,
                query.anchor,
                query.offset,
                query.limit,
            )
        };

        let facade = self.clone();
        let next_cursor = stream::once(async move {
            match facade.fetch_page(&viewer, &source, &query, cursor.clone()).await {
                Ok(next) => next,
                Err(e) => {
                    warn!(source = %source, page = query.page, error = %e, "Page fetch failed, keeping cursor");
                    cursor
                }
            }
        })
        .boxed();

        let pages = combine_latest(rows, next_cursor)
            .map(|(rows, next_cursor)| {
                let items = dedupe_by_id(rows.into_iter().map(assemble).collect());
                Page::new(items, next_cursor)
            })
            .boxed();
        distinct_until_changed(pages)
    }

    /// [`timeline_items`](Self::timeline_items) for whichever viewer is
    /// currently signed in.
    pub fn timeline_items_for_viewers(
        &self,
        viewers: BoxStream<'static, ProfileId>,
        timeline: Timeline,
        query: CursorQuery,
        cursor: Cursor,
    ) -> BoxStream<'static, Page<TimelineItem>> {
        let facade = self.clone();
        flat_map_latest(distinct_until_changed(viewers), move |viewer| {
            facade.timeline_items(viewer, &timeline, query, cursor.clone())
        })
    }

    /// Fetch and persist one page, returning the cursor for the next one.
    ///
    /// A page-0 fetch whose anchor differs from the partition's watermark
    /// purges the partition and moves the watermark in the same batch.
    pub async fn fetch_page(
        &self,
        viewer: &ProfileId,
        source: &SourceRef,
        query: &CursorQuery,
        cursor: Cursor,
    ) -> Result<Cursor, ClientError> {
        let source_id = source.source_id();
        let key = PartitionKey::new(viewer, &source_id);
        self.pager
            .advance(
                &key,
                query,
                cursor,
                |token| {
                    let request = FeedRequest {
                        source: source.clone(),
                        limit: query.limit,
                        cursor: token,
                    };
                    async move { self.retry.run(|| self.api.fetch_page(&request)).await }
                },
                |page: &FetchedPage| page.cursor.clone(),
                |page| self.persist_page(viewer, &source_id, query, page),
            )
            .await
    }

    async fn persist_page(
        &self,
        viewer: &ProfileId,
        source: &SourceId,
        query: &CursorQuery,
        page: FetchedPage,
    ) -> Result<(), ClientError> {
        let mut batch = WriteBatch::new();
        if query.is_fresh() {
            let watermark = self.store.last_fetch_key(viewer, source).await?;
            if watermark != Some(query.anchor) {
                info!(source = %source, anchor = %query.anchor, "New pagination session, resetting partition");
                batch
                    .reset_source(viewer, source)
                    .set_watermark(viewer, source, query.anchor);
            }
        }
        // Pins on the first page head the session: just under its anchor.
        let pin_sort_at = Timestamp::from_millis(query.anchor.millis() - 1);
        for entry in &page.feed {
            if query.is_fresh() && entry.reason == Some(FeedReason::Pin) {
                batch.add_feed_entry_at(viewer, source, entry, pin_sort_at);
            } else {
                batch.add_feed_entry(viewer, source, entry);
            }
        }
        self.store.apply_batch(batch).await?;
        debug!(source = %source, page = query.page, entries = page.feed.len(), "Page persisted");
        Ok(())
    }

    /// Stream of "new content above the last refresh" flags.
    pub fn has_updates(&self, viewer: ProfileId, timeline: &Timeline) -> BoxStream<'static, bool> {
        self.poller.watch(viewer, timeline)
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Reactive thread view around `post_uri`.
    ///
    /// Emits the cached chain right away, fetches the remote thread once, and
    /// re-emits as the cache changes. A failed fetch leaves the cached view.
    pub fn post_threaded_items(
        &self,
        viewer: ProfileId,
        post_uri: PostUri,
    ) -> BoxStream<'static, Vec<TimelineItem>> {
        let cached = self
            .store
            .observe_thread_chain(viewer.clone(), post_uri.clone())
            .map(|chain| Some(reconstruct(chain)));

        let facade = self.clone();
        let refresh = stream::once(async move {
            if let Err(e) = facade.fetch_thread(&viewer, &post_uri).await {
                warn!(post = %post_uri, error = %e, "Thread fetch failed, showing cached posts");
            }
            None::<Vec<TimelineItem>>
        });

        let items = stream::select(cached, refresh)
            .filter_map(future::ready)
            .boxed();
        distinct_until_changed(items)
    }

    /// Fetch a remote thread and persist every post in it.
    ///
    /// A post the remote no longer knows is marked deleted in the cache, so
    /// timeline and thread reads drop it. The `NotFound` error is still
    /// returned.
    pub async fn fetch_thread(&self, viewer: &ProfileId, post_uri: &PostUri) -> Result<(), ClientError> {
        let thread = match self
            .retry
            .run(|| self.api.fetch_post_thread(post_uri))
            .await
        {
            Ok(thread) => thread,
            Err(ApiError::NotFound(reason)) => {
                let mut batch = WriteBatch::new();
                batch.push(WriteCommand::MarkDeleted(post_uri.clone()));
                self.store.apply_batch(batch).await?;
                info!(post = %post_uri, reason = %reason, "Post gone from remote, marked deleted");
                return Err(ApiError::NotFound(reason).into());
            }
            Err(e) => return Err(e.into()),
        };
        let mut batch = WriteBatch::new();
        for post in &thread.posts {
            batch.add_post(viewer, post);
        }
        self.store.apply_batch(batch).await?;
        debug!(post = %post_uri, posts = thread.posts.len(), "Thread persisted");
        Ok(())
    }

    // =========================================================================
    // Home timelines
    // =========================================================================

    /// Replace the viewer's saved timelines.
    ///
    /// Preferences and the sources they reference are saved in one batch,
    /// then the change is queued for the remote.
    pub async fn update_home_timelines(
        &self,
        viewer: &ProfileId,
        update: HomeTimelineUpdate,
    ) -> Outcome {
        match self.save_home_timelines(viewer, update).await {
            Ok(()) => Outcome::Success,
            Err(e) => {
                warn!(viewer = %viewer, error = %e, "Home timeline update failed");
                Outcome::Failure(e.to_string())
            }
        }
    }

    async fn save_home_timelines(
        &self,
        viewer: &ProfileId,
        update: HomeTimelineUpdate,
    ) -> Result<(), ClientError> {
        let mut batch = WriteBatch::new();
        batch.push(WriteCommand::ClearPreferences {
            viewer: viewer.clone(),
        });

        let mut preferences = Vec::with_capacity(update.timelines.len());
        for timeline in &update.timelines {
            match timeline {
                Timeline::Feed { feed, .. } => {
                    batch.add_feed_source(feed);
                }
                Timeline::List { list, .. } | Timeline::StarterPack { list, .. } => {
                    batch.add_list_source(list);
                }
                Timeline::Following { .. } | Timeline::Profile { .. } => {}
            }
            let meta = timeline.meta();
            let preference = TimelinePreference {
                source: timeline.source_ref(),
                position: meta.position,
                is_pinned: meta.is_pinned,
                presentation: meta.presentation,
            };
            batch.push(WriteCommand::UpsertPreference {
                viewer: viewer.clone(),
                preference: preference.clone(),
            });
            preferences.push(preference);
        }

        self.store.apply_batch(batch).await?;
        let count = preferences.len();
        self.writes
            .enqueue(OutboundWrite::TimelinePreferences {
                viewer: viewer.clone(),
                preferences,
            })
            .await?;
        info!(viewer = %viewer, count, "Home timelines updated");
        Ok(())
    }

    /// The viewer's saved timelines, in position order.
    ///
    /// A viewer with nothing saved gets the home feed.
    pub fn home_timelines(&self, viewer: ProfileId) -> BoxStream<'static, Vec<Timeline>> {
        let timelines = self
            .store
            .observe_timeline_preferences(viewer)
            .map(|records| {
                let timelines: Vec<Timeline> =
                    records.into_iter().filter_map(timeline_from_record).collect();
                if timelines.is_empty() {
                    vec![Timeline::following()]
                } else {
                    timelines
                }
            })
            .boxed();
        distinct_until_changed(timelines)
    }

    // =========================================================================
    // Local writes
    // =========================================================================

    /// Apply a reaction optimistically, then queue it for the remote.
    ///
    /// A reaction that is already in place is a no-op. If the queue refuses
    /// the write, the optimistic change is reverted.
    pub async fn interact(
        &self,
        viewer: &ProfileId,
        interaction: PostInteraction,
    ) -> Result<(), ClientError> {
        let Some(plan) = Reaction::plan(viewer, interaction) else {
            debug!(viewer = %viewer, "Reaction already applied");
            return Ok(());
        };

        self.store.apply_batch(plan.batch(viewer, false)).await?;
        if let Err(e) = self.writes.enqueue(plan.write.clone()).await {
            warn!(post = %plan.post_uri, error = %e, "Outbound write refused, reverting");
            self.store.apply_batch(plan.batch(viewer, true)).await?;
            return Err(e);
        }
        Ok(())
    }

    /// Delete everything cached for `viewer`.
    ///
    /// Returns the number of rows deleted.
    pub async fn sign_out(&self, viewer: &ProfileId) -> Result<u64, ClientError> {
        self.pager.forget_viewer(viewer);
        let deleted = self.store.purge_viewer(viewer).await?;
        info!(viewer = %viewer, deleted, "Viewer signed out");
        Ok(deleted)
    }
}

fn timeline_from_record(record: TimelinePreferenceRecord) -> Option<Timeline> {
    let TimelinePreferenceRecord {
        preference,
        feed,
        list,
        last_fetched_at,
    } = record;
    let meta = TimelineMeta {
        position: preference.position,
        is_pinned: preference.is_pinned,
        last_refreshed: last_fetched_at,
        presentation: preference.presentation,
    };
    match preference.source {
        SourceRef::Following => Some(Timeline::Following { meta }),
        SourceRef::Feed { .. } => feed.map(|feed| Timeline::Feed { meta, feed }),
        SourceRef::List { .. } => list.map(|list| Timeline::List { meta, list }),
        SourceRef::StarterPack { .. } => list.map(|list| Timeline::StarterPack { meta, list }),
        SourceRef::Profile { profile_id, kind } => Some(Timeline::Profile {
            meta,
            profile_id,
            kind,
        }),
    }
}

/// An optimistic reaction change and the write that confirms it.
struct Reaction {
    post_uri: PostUri,
    before: ViewerState,
    after: ViewerState,
    like_delta: i64,
    repost_delta: i64,
    write: OutboundWrite,
}

impl Reaction {
    fn plan(viewer: &ProfileId, interaction: PostInteraction) -> Option<Self> {
        let viewer = viewer.clone();
        match interaction {
            PostInteraction::Like(post) => {
                if post.viewer.like_uri.is_some() {
                    return None;
                }
                let after = ViewerState {
                    like_uri: Some(pending_record_uri(&viewer, "app.bsky.feed.like")),
                    ..post.viewer.clone()
                };
                Some(Self {
                    write: OutboundWrite::Like {
                        viewer,
                        post_uri: post.uri.clone(),
                        cid: post.cid,
                    },
                    post_uri: post.uri,
                    before: post.viewer,
                    after,
                    like_delta: 1,
                    repost_delta: 0,
                })
            }
            PostInteraction::Unlike(post) => {
                let like_uri = post.viewer.like_uri.clone()?;
                let after = ViewerState {
                    like_uri: None,
                    ..post.viewer.clone()
                };
                Some(Self {
                    write: OutboundWrite::Unlike {
                        viewer,
                        post_uri: post.uri.clone(),
                        like_uri,
                    },
                    post_uri: post.uri,
                    before: post.viewer,
                    after,
                    like_delta: -1,
                    repost_delta: 0,
                })
            }
            PostInteraction::Repost(post) => {
                if post.viewer.repost_uri.is_some() {
                    return None;
                }
                let after = ViewerState {
                    repost_uri: Some(pending_record_uri(&viewer, "app.bsky.feed.repost")),
                    ..post.viewer.clone()
                };
                Some(Self {
                    write: OutboundWrite::Repost {
                        viewer,
                        post_uri: post.uri.clone(),
                        cid: post.cid,
                    },
                    post_uri: post.uri,
                    before: post.viewer,
                    after,
                    like_delta: 0,
                    repost_delta: 1,
                })
            }
            PostInteraction::Unrepost(post) => {
                let repost_uri = post.viewer.repost_uri.clone()?;
                let after = ViewerState {
                    repost_uri: None,
                    ..post.viewer.clone()
                };
                Some(Self {
                    write: OutboundWrite::Unrepost {
                        viewer,
                        post_uri: post.uri.clone(),
                        repost_uri,
                    },
                    post_uri: post.uri,
                    before: post.viewer,
                    after,
                    like_delta: 0,
                    repost_delta: -1,
                })
            }
        }
    }

    /// The cache writes applying (or with `revert`, undoing) this reaction.
    fn batch(&self, viewer: &ProfileId, revert: bool) -> WriteBatch {
        let (state, sign) = if revert {
            (self.before.clone(), -1)
        } else {
            (self.after.clone(), 1)
        };
        let mut batch = WriteBatch::new();
        batch
            .push(WriteCommand::UpsertViewerState {
                viewer: viewer.clone(),
                post_uri: self.post_uri.clone(),
                state,
            })
            .push(WriteCommand::AdjustCounts {
                post_uri: self.post_uri.clone(),
                like_delta: self.like_delta * sign,
                repost_delta: self.repost_delta * sign,
            });
        batch
    }
}

/// Placeholder record URI until the remote assigns the real one.
fn pending_record_uri(viewer: &ProfileId, collection: &str) -> String {
    format!("at://{viewer}/{collection}/pending-{}", Uuid::new_v4())
}
