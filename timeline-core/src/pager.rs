//! Cursor bookkeeping for paginated remote feeds.
//!
//! [`PagerState`] is the pure half of the cursor pager: it decides whether a
//! `(query, cursor)` pair needs a network request, and records what each
//! completed request produced. The async half (single-flight locking, the
//! actual fetch, persistence ordering) lives in `timeline-client`.
//!
//! One `PagerState` covers one pagination session of one
//! `(viewer, source)` partition. A fresh page-0 query with a new anchor
//! starts a new session.

use std::collections::HashMap;
use timeline_types::{Cursor, CursorQuery, Timestamp};

/// What the pager should do for a requested `(query, cursor)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerDecision {
    /// Issue one network request with this token.
    Fetch {
        /// Remote page token, `None` for the first page.
        token: Option<String>,
    },
    /// Do not fetch; this is the cursor to report.
    Reuse(Cursor),
    /// The query belongs to an older pagination session; do not fetch.
    Stale,
}

/// Tracks completed requests for one pagination session.
///
/// The state maintains:
/// - The anchor of the current session (set by its page-0 query)
/// - Which request cursors already completed, and what they produced
/// - Whether the remote reported exhaustion
#[derive(Debug, Clone, Default)]
pub struct PagerState {
    /// Anchor of the current session.
    anchor: Option<Timestamp>,
    /// Request cursor -> resulting cursor, for completed requests.
    completed: HashMap<Cursor, Cursor>,
    /// The remote returned no next token at least once this session.
    exhausted: bool,
}

impl PagerState {
    /// Create an empty pager state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what to do for a requested page.
    ///
    /// A fresh query with a different anchor resets the session. Each
    /// request cursor is fetched at most once per session; `Pending` and
    /// exhausted sessions never fetch.
    pub fn begin(&mut self, query: &CursorQuery, cursor: &Cursor) -> PagerDecision {
        match self.anchor {
            Some(anchor) if anchor == query.anchor => {}
            Some(_) if !query.is_fresh() => return PagerDecision::Stale,
            _ => self.reset(query.anchor),
        }

        if cursor.is_pending() {
            return PagerDecision::Reuse(Cursor::Pending);
        }
        if let Some(done) = self.completed.get(cursor) {
            return PagerDecision::Reuse(done.clone());
        }
        if self.exhausted {
            return PagerDecision::Reuse(Cursor::Pending);
        }

        PagerDecision::Fetch {
            token: cursor.token().map(str::to_owned),
        }
    }

    /// Record a successful request and return the cursor to emit.
    ///
    /// Absence of a next token yields `Pending`.
    pub fn complete(&mut self, requested: Cursor, next_token: Option<String>) -> Cursor {
        let next = Cursor::from_token(next_token);
        if next.is_pending() {
            self.exhausted = true;
        }
        self.completed.insert(requested, next.clone());
        next
    }

    /// Start a new session anchored at `anchor`.
    pub fn reset(&mut self, anchor: Timestamp) {
        self.anchor = Some(anchor);
        self.completed.clear();
        self.exhausted = false;
    }

    /// Anchor of the current session, if one started.
    pub fn anchor(&self) -> Option<Timestamp> {
        self.anchor
    }

    /// True once the remote reported the end of the feed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of requests completed this session.
    pub fn completed_requests(&self) -> usize {
        self.completed.len()
    }
}
