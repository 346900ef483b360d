//! Per-timeline pagination driver.
//!
//! A [`TimelineSession`] owns the [`TimelineLoadState`] of one open
//! timeline. It feeds caller intents (refresh, load more) and fetch results
//! into the state machine and executes the actions it returns.

use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use timeline_core::{assemble, dedupe_by_id, LoadAction, LoadEvent, TimelineLoadState};
use timeline_types::{Page, ProfileId, Timeline, TimelineItem, Timestamp};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::facade::TimelineSyncFacade;
use crate::flow::{distinct_until_changed, flat_map_latest, watch_stream};

/// Drives pagination of one open timeline.
pub struct TimelineSession {
    facade: TimelineSyncFacade,
    viewer: ProfileId,
    timeline: Timeline,
    state: watch::Sender<TimelineLoadState>,
}

impl TimelineSession {
    /// Create a session in the `Uninitialized` state.
    pub fn new(facade: TimelineSyncFacade, viewer: ProfileId, timeline: Timeline) -> Self {
        let (state, _) = watch::channel(TimelineLoadState::new());
        Self {
            facade,
            viewer,
            timeline,
            state,
        }
    }

    /// The timeline this session pages through.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TimelineLoadState {
        self.state.borrow().clone()
    }

    /// Start a new pagination session anchored now.
    ///
    /// Ignored while a page-0 load is already in flight. On failure the
    /// previously loaded pages stay in place.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let actions = self.apply(LoadEvent::RefreshRequested {
            anchor: Timestamp::now(),
            limit: self.facade.page_limit(),
        });
        self.run(actions).await
    }

    /// Fetch the page after the last loaded one.
    ///
    /// Ignored unless the session is `Loaded`.
    pub async fn load_more(&self) -> Result<(), ClientError> {
        let actions = self.apply(LoadEvent::LoadMoreRequested);
        self.run(actions).await
    }

    /// Every loaded page as one list, with the cursor after the last one.
    ///
    /// Emits `None` until something has loaded.
    pub fn observe(&self) -> BoxStream<'static, Option<Page<TimelineItem>>> {
        let store = std::sync::Arc::clone(self.facade.store());
        let viewer = self.viewer.clone();
        let source = self.timeline.source_id();
        let settled = distinct_until_changed(
            watch_stream(self.state.subscribe())
                .map(|state| state.settled())
                .boxed(),
        );

        flat_map_latest(settled, move |settled| match settled {
            None => stream::once(future::ready(None)).boxed(),
            Some(settled) => {
                let loaded = settled.query.offset + settled.query.limit;
                store
                    .observe_feed_items(
                        viewer.clone(),
                        source.clone(),
                        settled.query.anchor,
                        0,
                        loaded,
                    )
                    .map(move |rows| {
                        let items = dedupe_by_id(rows.into_iter().map(assemble).collect());
                        Some(Page::new(items, settled.cursor.clone()))
                    })
                    .boxed()
            }
        })
    }

    fn apply(&self, event: LoadEvent) -> Vec<LoadAction> {
        let mut actions = Vec::new();
        self.state.send_if_modified(|state| {
            let (next, emitted) = state.clone().on_event(event);
            actions = emitted;
            let changed = next != *state;
            *state = next;
            changed
        });
        actions
    }

    async fn run(&self, actions: Vec<LoadAction>) -> Result<(), ClientError> {
        let source = self.timeline.source_ref();
        for action in actions {
            match action {
                LoadAction::FetchPage { query, cursor } => {
                    match self
                        .facade
                        .fetch_page(&self.viewer, &source, &query, cursor)
                        .await
                    {
                        Ok(cursor) => {
                            debug!(source = %source, page = query.page, "Page loaded");
                            self.apply(LoadEvent::PageLoaded { query, cursor });
                        }
                        Err(e) => {
                            for follow_up in self.apply(LoadEvent::PageFailed {
                                query,
                                error: e.to_string(),
                            }) {
                                if let LoadAction::ReportFailure { error } = follow_up {
                                    warn!(source = %source, page = query.page, error = %error, "Page load failed");
                                }
                            }
                            return Err(e);
                        }
                    }
                }
                LoadAction::ReportFailure { error } => {
                    warn!(source = %source, error = %error, "Page load failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::testing::{entry, harness, next_matching, page, post, viewer, Harness};
    use std::time::Duration;
    use timeline_types::{Cursor, SourceRef};

    fn session(h: &Harness) -> TimelineSession {
        h.facade.session(viewer(), Timeline::following())
    }

    fn texts(page: &Option<Page<TimelineItem>>) -> Vec<String> {
        page.iter()
            .flat_map(|page| page.items.iter())
            .filter_map(|item| item.anchor_post().map(|p| p.text.clone()))
            .collect()
    }

    fn two_pages(h: &Harness) {
        h.api.queue_page(
            &SourceRef::Following,
            page(vec![entry(post("a", 300)), entry(post("b", 200))], Some("c1")),
        );
        h.api
            .queue_page(&SourceRef::Following, page(vec![entry(post("c", 100))], None));
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let h = harness().await;
        let session = session(&h);

        assert_eq!(session.state(), TimelineLoadState::Uninitialized);
        let mut pages = session.observe();
        assert_eq!(crate::testing::next(&mut pages).await, None);
    }

    #[tokio::test]
    async fn refresh_loads_first_page() {
        let h = harness().await;
        two_pages(&h);
        let session = session(&h);

        session.refresh().await.unwrap();

        match session.state() {
            TimelineLoadState::Loaded { query, cursor } => {
                assert!(query.is_fresh());
                assert_eq!(cursor, Cursor::Next("c1".into()));
            }
            other => panic!("expected loaded, got {other:?}"),
        }
        let mut pages = session.observe();
        let loaded = next_matching(&mut pages, |p| p.is_some()).await;
        assert_eq!(texts(&loaded), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn refresh_during_refresh_is_ignored() {
        let h = harness().await;
        two_pages(&h);
        h.api.hold_responses();
        let session = session(&h);

        let (first, second) = tokio::join!(session.refresh(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(session.state().is_loading());
            let second = session.refresh().await;
            h.api.release(1);
            second
        });

        first.unwrap();
        second.unwrap();
        assert_eq!(h.api.request_count(), 1);
        assert!(matches!(session.state(), TimelineLoadState::Loaded { .. }));
    }

    #[tokio::test]
    async fn load_more_appends_until_exhausted() {
        let h = harness().await;
        two_pages(&h);
        let session = session(&h);

        session.refresh().await.unwrap();
        session.load_more().await.unwrap();
        assert!(session.state().is_exhausted());

        let mut pages = session.observe();
        let all = next_matching(&mut pages, |p| texts(p).len() == 3).await;
        assert_eq!(texts(&all), vec!["a", "b", "c"]);
        assert_eq!(all.map(|p| p.next_cursor), Some(Cursor::Pending));

        // Exhausted sessions do not fetch.
        session.load_more().await.unwrap();
        assert_eq!(h.api.request_count(), 2);
    }

    #[tokio::test]
    async fn failed_initial_load_stays_uninitialized() {
        let h = harness().await;
        h.api.fail_next(ApiError::Transient("offline".into()));
        let session = session(&h);

        assert!(session.refresh().await.is_err());
        assert_eq!(session.state(), TimelineLoadState::Uninitialized);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_loaded_pages() {
        let h = harness().await;
        two_pages(&h);
        let session = session(&h);
        session.refresh().await.unwrap();
        let loaded = session.state();

        tokio::time::sleep(Duration::from_millis(5)).await;
        h.api.fail_next(ApiError::Transient("offline".into()));
        assert!(session.refresh().await.is_err());
        assert_eq!(session.state(), loaded);

        let mut pages = session.observe();
        let current = next_matching(&mut pages, |p| p.is_some()).await;
        assert_eq!(texts(&current), vec!["a", "b"]);

        // Load more still continues the surviving session.
        session.load_more().await.unwrap();
        assert!(session.state().is_exhausted());
    }

    #[tokio::test]
    async fn failed_load_more_is_retryable() {
        let h = harness().await;
        two_pages(&h);
        let session = session(&h);
        session.refresh().await.unwrap();
        let loaded = session.state();

        h.api.fail_next(ApiError::Transient("offline".into()));
        assert!(session.load_more().await.is_err());
        assert_eq!(session.state(), loaded);

        session.load_more().await.unwrap();
        assert!(session.state().is_exhausted());
        assert_eq!(h.api.request_count(), 3);
    }

    #[tokio::test]
    async fn observe_follows_state_changes() {
        let h = harness().await;
        two_pages(&h);
        let session = session(&h);
        let mut pages = session.observe();
        assert_eq!(crate::testing::next(&mut pages).await, None);

        session.refresh().await.unwrap();
        let first = next_matching(&mut pages, |p| texts(p).len() == 2).await;
        assert_eq!(
            first.map(|p| p.next_cursor),
            Some(Cursor::Next("c1".into()))
        );

        session.load_more().await.unwrap();
        next_matching(&mut pages, |p| texts(p).len() == 3).await;
    }
}
