//! Timeline lifecycle state machine.
//!
//! This module provides a pure, side-effect-free state machine for one open
//! timeline as a caller observes it:
//!
//! ```text
//! Uninitialized -> Loading(page 0) -> Loaded(Next) -> LoadingMore(page n) -> Loaded(..)
//!                                          \-> Exhausted(Pending)
//! ```
//!
//! The state machine takes events as input and produces a new state plus a
//! list of actions. The actual fetching is performed by `timeline-client`.

use timeline_types::{Cursor, CursorQuery, Timestamp};

/// Lifecycle of one open timeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimelineLoadState {
    /// Nothing loaded yet.
    #[default]
    Uninitialized,
    /// A page-0 load is in flight.
    Loading {
        /// The in-flight fresh query.
        query: CursorQuery,
        /// Where to return if the load fails.
        fallback: Option<Settled>,
    },
    /// Pages loaded; more are available.
    Loaded {
        /// The last loaded page's query.
        query: CursorQuery,
        /// Cursor for the next page.
        cursor: Cursor,
    },
    /// A later page is in flight.
    LoadingMore {
        /// The in-flight query.
        query: CursorQuery,
        /// The last loaded page's query.
        loaded: CursorQuery,
        /// Cursor the in-flight request continues from.
        cursor: Cursor,
    },
    /// The remote feed has no more pages.
    Exhausted {
        /// The last loaded page's query.
        query: CursorQuery,
    },
}

/// A settled position to fall back to when a fetch fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    /// Last loaded page's query.
    pub query: CursorQuery,
    /// Cursor after that page.
    pub cursor: Cursor,
}

/// Events that can occur in a timeline's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// Caller asked for a fresh page 0.
    RefreshRequested {
        /// Anchor for the new pagination session.
        anchor: Timestamp,
        /// Page size.
        limit: u32,
    },
    /// Caller scrolled to the end of the loaded pages.
    LoadMoreRequested,
    /// A page fetch finished and its rows are durable.
    PageLoaded {
        /// The query that was fetched.
        query: CursorQuery,
        /// Cursor for the following page.
        cursor: Cursor,
    },
    /// A page fetch failed; the cache is unchanged.
    PageFailed {
        /// The query that failed.
        query: CursorQuery,
        /// Error description.
        error: String,
    },
}

/// Actions to be executed by the timeline session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadAction {
    /// Fetch one page through the cursor pager.
    FetchPage {
        /// Cache-side query.
        query: CursorQuery,
        /// Network cursor to continue from.
        cursor: Cursor,
    },
    /// Report a failure that left the state unchanged.
    ReportFailure {
        /// Error description.
        error: String,
    },
}

impl TimelineLoadState {
    /// Create a new state machine.
    pub fn new() -> Self {
        Self::Uninitialized
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function. The caller executes the returned actions.
    pub fn on_event(self, event: LoadEvent) -> (Self, Vec<LoadAction>) {
        match (self, event) {
            // A refresh while page 0 is already loading joins that load.
            (state @ Self::Loading { .. }, LoadEvent::RefreshRequested { .. }) => (state, vec![]),

            (state, LoadEvent::RefreshRequested { anchor, limit }) => {
                let query = CursorQuery::fresh(limit, anchor);
                (
                    Self::Loading {
                        query,
                        fallback: state.settled(),
                    },
                    vec![LoadAction::FetchPage {
                        query,
                        cursor: Cursor::Initial,
                    }],
                )
            }

            (Self::Loaded { query, cursor }, LoadEvent::LoadMoreRequested) => {
                let next = query.next_page();
                (
                    Self::LoadingMore {
                        query: next,
                        loaded: query,
                        cursor: cursor.clone(),
                    },
                    vec![LoadAction::FetchPage {
                        query: next,
                        cursor,
                    }],
                )
            }

            (Self::Loading { query, .. }, LoadEvent::PageLoaded { query: done, cursor })
                if query == done =>
            {
                (settle(query, cursor), vec![])
            }

            (Self::LoadingMore { query, .. }, LoadEvent::PageLoaded { query: done, cursor })
                if query == done =>
            {
                (settle(query, cursor), vec![])
            }

            (Self::Loading { query, fallback }, LoadEvent::PageFailed { query: done, error })
                if query == done =>
            {
                let state = match fallback {
                    Some(Settled { query, cursor }) => settle(query, cursor),
                    None => Self::Uninitialized,
                };
                (state, vec![LoadAction::ReportFailure { error }])
            }

            (
                Self::LoadingMore {
                    query,
                    loaded,
                    cursor,
                },
                LoadEvent::PageFailed { query: done, error },
            ) if query == done => (
                Self::Loaded {
                    query: loaded,
                    cursor,
                },
                vec![LoadAction::ReportFailure { error }],
            ),

            // Everything else (load more while loading or exhausted, results
            // for superseded queries) leaves the state unchanged.
            (state, _) => (state, vec![]),
        }
    }

    /// The settled position of this state, if any.
    pub fn settled(&self) -> Option<Settled> {
        match self {
            Self::Loaded { query, cursor } => Some(Settled {
                query: *query,
                cursor: cursor.clone(),
            }),
            Self::Exhausted { query } => Some(Settled {
                query: *query,
                cursor: Cursor::Pending,
            }),
            Self::LoadingMore { loaded, cursor, .. } => Some(Settled {
                query: *loaded,
                cursor: cursor.clone(),
            }),
            Self::Loading { fallback, .. } => fallback.clone(),
            Self::Uninitialized => None,
        }
    }

    /// Check if a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. } | Self::LoadingMore { .. })
    }

    /// Check if the remote feed is exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// The anchor of the current pagination session.
    pub fn anchor(&self) -> Option<Timestamp> {
        match self {
            Self::Uninitialized => None,
            Self::Loading { query, .. }
            | Self::Loaded { query, .. }
            | Self::LoadingMore { query, .. }
            | Self::Exhausted { query } => Some(query.anchor),
        }
    }
}

fn settle(query: CursorQuery, cursor: Cursor) -> TimelineLoadState {
    match cursor {
        Cursor::Pending => TimelineLoadState::Exhausted { query },
        cursor => TimelineLoadState::Loaded { query, cursor },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refresh(anchor: i64) -> LoadEvent {
        LoadEvent::RefreshRequested {
            anchor: Timestamp::from_millis(anchor),
            limit: 10,
        }
    }

    fn loaded(anchor: i64, token: &str) -> TimelineLoadState {
        TimelineLoadState::Loaded {
            query: CursorQuery::fresh(10, Timestamp::from_millis(anchor)),
            cursor: Cursor::Next(token.into()),
        }
    }

    #[test]
    fn starts_uninitialized() {
        let state = TimelineLoadState::new();
        assert!(matches!(state, TimelineLoadState::Uninitialized));
        assert_eq!(state.anchor(), None);
    }

    #[test]
    fn refresh_fetches_page_zero() {
        let (state, actions) = TimelineLoadState::new().on_event(refresh(100));
        assert!(matches!(state, TimelineLoadState::Loading { .. }));
        assert_eq!(
            actions,
            vec![LoadAction::FetchPage {
                query: CursorQuery::fresh(10, Timestamp::from_millis(100)),
                cursor: Cursor::Initial,
            }]
        );
    }

    #[test]
    fn refresh_while_loading_is_ignored() {
        let (state, _) = TimelineLoadState::new().on_event(refresh(100));
        let (state, actions) = state.on_event(refresh(200));
        assert!(actions.is_empty());
        assert_eq!(state.anchor(), Some(Timestamp::from_millis(100)));
    }

    #[test]
    fn refresh_from_loaded_restarts() {
        let (state, actions) = loaded(100, "t1").on_event(refresh(200));
        assert!(matches!(state, TimelineLoadState::Loading { .. }));
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn page_loaded_with_next_settles_loaded() {
        let query = CursorQuery::fresh(10, Timestamp::from_millis(100));
        let (state, _) = TimelineLoadState::new().on_event(refresh(100));
        let (state, actions) = state.on_event(LoadEvent::PageLoaded {
            query,
            cursor: Cursor::Next("t1".into()),
        });
        assert!(actions.is_empty());
        assert_eq!(state, loaded(100, "t1"));
    }

    #[test]
    fn page_loaded_with_pending_settles_exhausted() {
        let query = CursorQuery::fresh(10, Timestamp::from_millis(100));
        let (state, _) = TimelineLoadState::new().on_event(refresh(100));
        let (state, _) = state.on_event(LoadEvent::PageLoaded {
            query,
            cursor: Cursor::Pending,
        });
        assert!(state.is_exhausted());
    }

    #[test]
    fn load_more_fetches_next_page_with_cursor() {
        let (state, actions) = loaded(100, "t1").on_event(LoadEvent::LoadMoreRequested);
        assert!(state.is_loading());
        match &actions[..] {
            [LoadAction::FetchPage { query, cursor }] => {
                assert_eq!(query.page, 1);
                assert_eq!(query.offset, 10);
                assert_eq!(*cursor, Cursor::Next("t1".into()));
            }
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn load_more_when_exhausted_does_nothing() {
        let state = TimelineLoadState::Exhausted {
            query: CursorQuery::fresh(10, Timestamp::from_millis(100)),
        };
        let (state, actions) = state.on_event(LoadEvent::LoadMoreRequested);
        assert!(state.is_exhausted());
        assert!(actions.is_empty());
    }

    #[test]
    fn failed_first_load_returns_to_uninitialized() {
        let query = CursorQuery::fresh(10, Timestamp::from_millis(100));
        let (state, _) = TimelineLoadState::new().on_event(refresh(100));
        let (state, actions) = state.on_event(LoadEvent::PageFailed {
            query,
            error: "offline".into(),
        });
        assert_eq!(state, TimelineLoadState::Uninitialized);
        assert!(matches!(actions[..], [LoadAction::ReportFailure { .. }]));
    }

    #[test]
    fn failed_refresh_returns_to_previous_loaded() {
        let (state, _) = loaded(100, "t1").on_event(refresh(200));
        let (state, _) = state.on_event(LoadEvent::PageFailed {
            query: CursorQuery::fresh(10, Timestamp::from_millis(200)),
            error: "offline".into(),
        });
        assert_eq!(state, loaded(100, "t1"));
    }

    #[test]
    fn failed_load_more_keeps_existing_pages() {
        let (state, actions) = loaded(100, "t1").on_event(LoadEvent::LoadMoreRequested);
        let query = match &actions[0] {
            LoadAction::FetchPage { query, .. } => *query,
            other => panic!("unexpected action: {other:?}"),
        };
        let (state, _) = state.on_event(LoadEvent::PageFailed {
            query,
            error: "timeout".into(),
        });
        assert_eq!(state, loaded(100, "t1"));
    }

    #[test]
    fn result_for_superseded_query_is_ignored() {
        let (state, actions) = loaded(100, "t1").on_event(LoadEvent::LoadMoreRequested);
        let stale = match &actions[0] {
            LoadAction::FetchPage { query, .. } => *query,
            other => panic!("unexpected action: {other:?}"),
        };
        // Refresh supersedes the in-flight load-more.
        let (state, _) = state.on_event(refresh(200));
        let (state, _) = state.on_event(LoadEvent::PageLoaded {
            query: stale,
            cursor: Cursor::Pending,
        });
        assert!(matches!(state, TimelineLoadState::Loading { .. }));
        assert_eq!(state.anchor(), Some(Timestamp::from_millis(200)));
    }
}
