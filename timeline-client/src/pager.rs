//! Single-flight cursor pagination per timeline partition.
//!
//! [`CursorPager`] wraps the pure [`PagerState`] with one async lock per
//! `(viewer, source)` partition. Holding the lock across fetch and persist
//! means two callers asking for the same page share one network request:
//! the second waits, then finds the page already completed.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use timeline_core::{PagerDecision, PagerState};
use timeline_types::{Cursor, CursorQuery, ProfileId, SourceId};
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::ApiError;
use crate::error::ClientError;

/// Cache partition a pager session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    /// Viewer owning the partition.
    pub viewer: ProfileId,
    /// Source of the partition.
    pub source: SourceId,
}

impl PartitionKey {
    /// Key for `viewer`'s view of `source`.
    pub fn new(viewer: &ProfileId, source: &SourceId) -> Self {
        Self {
            viewer: viewer.clone(),
            source: source.clone(),
        }
    }
}

/// Cursor pager with per-partition single-flight.
#[derive(Debug, Default)]
pub struct CursorPager {
    slots: DashMap<PartitionKey, Arc<Mutex<PagerState>>>,
}

impl CursorPager {
    /// Create an empty pager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the partition's pagination for `(query, cursor)`.
    ///
    /// Issues at most one fetch per distinct request cursor per session.
    /// `on_response` persists the response; it completes before the new
    /// cursor is returned, and a failure there leaves the request
    /// un-completed so it can be retried.
    ///
    /// On a fetch or persist error the partition's session is left as it
    /// was and the error is returned; the caller keeps its current cursor.
    pub async fn advance<R, Fetch, FetchFut, NextToken, Persist, PersistFut>(
        &self,
        key: &PartitionKey,
        query: &CursorQuery,
        cursor: Cursor,
        fetch: Fetch,
        next_token: NextToken,
        on_response: Persist,
    ) -> Result<Cursor, ClientError>
    where
        Fetch: FnOnce(Option<String>) -> FetchFut,
        FetchFut: Future<Output = Result<R, ApiError>>,
        NextToken: FnOnce(&R) -> Option<String>,
        Persist: FnOnce(R) -> PersistFut,
        PersistFut: Future<Output = Result<(), ClientError>>,
    {
        let slot = self.slot(key);
        let mut state = slot.lock().await;
        let previous = state.clone();

        let token = match state.begin(query, &cursor) {
            PagerDecision::Fetch { token } => token,
            PagerDecision::Reuse(next) => {
                debug!(source = %key.source, page = query.page, "Page already fetched");
                return Ok(next);
            }
            PagerDecision::Stale => {
                debug!(source = %key.source, page = query.page, "Ignoring stale page request");
                return Ok(cursor);
            }
        };

        let outcome: Result<Option<String>, ClientError> = async {
            let response = fetch(token).await?;
            let next = next_token(&response);
            on_response(response).await?;
            Ok(next)
        }
        .await;
        let next = match outcome {
            Ok(next) => state.complete(cursor, next),
            Err(e) => {
                *state = previous;
                return Err(e);
            }
        };
        debug!(
            source = %key.source,
            page = query.page,
            exhausted = next.is_pending(),
            "Page fetched"
        );
        Ok(next)
    }

    /// Drop every session of `viewer`.
    pub fn forget_viewer(&self, viewer: &ProfileId) {
        self.slots.retain(|key, _| key.viewer != *viewer);
    }

    /// Number of partitions with a session.
    pub fn partitions(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, key: &PartitionKey) -> Arc<Mutex<PagerState>> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(PagerState::new())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use timeline_store::StorageError;
    use timeline_types::Timestamp;

    fn key() -> PartitionKey {
        PartitionKey::new(
            &ProfileId::new_unchecked("did:plc:viewer"),
            &SourceId::new_unchecked(SourceId::FOLLOWING),
        )
    }

    fn fresh(anchor: i64) -> CursorQuery {
        CursorQuery::fresh(10, Timestamp::from_millis(anchor))
    }

    async fn advance_with(
        pager: &CursorPager,
        query: &CursorQuery,
        cursor: Cursor,
        fetches: &AtomicUsize,
        reply: Option<&str>,
    ) -> Result<Cursor, ClientError> {
        let reply = reply.map(str::to_owned);
        pager
            .advance(
                &key(),
                query,
                cursor,
                |_token| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, ApiError>(reply)
                },
                |reply| reply.clone(),
                |_| async { Ok(()) },
            )
            .await
    }

    #[tokio::test]
    async fn first_page_fetches_and_returns_next() {
        let pager = CursorPager::new();
        let fetches = AtomicUsize::new(0);

        let next = advance_with(&pager, &fresh(100), Cursor::Initial, &fetches, Some("p2"))
            .await
            .unwrap();
        assert_eq!(next, Cursor::Next("p2".into()));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let pager = CursorPager::new();
        let fetches = AtomicUsize::new(0);
        let query = fresh(100);

        let (a, b) = tokio::join!(
            advance_with(&pager, &query, Cursor::Initial, &fetches, Some("p2")),
            advance_with(&pager, &query, Cursor::Initial, &fetches, Some("p2")),
        );
        assert_eq!(a.unwrap(), Cursor::Next("p2".into()));
        assert_eq!(b.unwrap(), Cursor::Next("p2".into()));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pending_cursor_never_fetches() {
        let pager = CursorPager::new();
        let fetches = AtomicUsize::new(0);

        let next = advance_with(&pager, &fresh(100), Cursor::Pending, &fetches, Some("x"))
            .await
            .unwrap();
        assert_eq!(next, Cursor::Pending);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_token_exhausts() {
        let pager = CursorPager::new();
        let fetches = AtomicUsize::new(0);

        let next = advance_with(&pager, &fresh(100), Cursor::Initial, &fetches, None)
            .await
            .unwrap();
        assert_eq!(next, Cursor::Pending);
    }

    #[tokio::test]
    async fn fetch_failure_is_not_recorded() {
        let pager = CursorPager::new();
        let query = fresh(100);

        let failed = pager
            .advance(
                &key(),
                &query,
                Cursor::Initial,
                |_| async { Err::<Option<String>, _>(ApiError::Transient("down".into())) },
                |reply| reply.clone(),
                |_| async { Ok(()) },
            )
            .await;
        assert!(matches!(failed, Err(ClientError::Api(_))));

        let fetches = AtomicUsize::new(0);
        let next = advance_with(&pager, &query, Cursor::Initial, &fetches, Some("p2"))
            .await
            .unwrap();
        assert_eq!(next, Cursor::Next("p2".into()));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persist_runs_before_cursor_is_returned() {
        let pager = CursorPager::new();
        let events = StdMutex::new(Vec::new());

        let next = pager
            .advance(
                &key(),
                &fresh(100),
                Cursor::Initial,
                |_| async { Ok::<_, ApiError>(Some("p2".to_string())) },
                |reply| reply.clone(),
                |_| async {
                    events.lock().unwrap().push("persisted");
                    Ok(())
                },
            )
            .await
            .unwrap();
        events.lock().unwrap().push("returned");

        assert_eq!(next, Cursor::Next("p2".into()));
        assert_eq!(*events.lock().unwrap(), vec!["persisted", "returned"]);
    }

    #[tokio::test]
    async fn persist_failure_allows_retry() {
        let pager = CursorPager::new();
        let query = fresh(100);

        let failed = pager
            .advance(
                &key(),
                &query,
                Cursor::Initial,
                |_| async { Ok::<_, ApiError>(Some("p2".to_string())) },
                |reply| reply.clone(),
                |_| async {
                    Err(ClientError::Storage(StorageError::CorruptRow {
                        table: "timeline_items",
                        reason: "test".into(),
                    }))
                },
            )
            .await;
        assert!(matches!(failed, Err(ClientError::Storage(_))));

        let fetches = AtomicUsize::new(0);
        advance_with(&pager, &query, Cursor::Initial, &fetches, Some("p2"))
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_anchor_starts_new_session() {
        let pager = CursorPager::new();
        let fetches = AtomicUsize::new(0);

        advance_with(&pager, &fresh(100), Cursor::Initial, &fetches, Some("p2"))
            .await
            .unwrap();
        advance_with(&pager, &fresh(200), Cursor::Initial, &fetches, Some("p2"))
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        // Page 1 of the superseded session is ignored.
        let stale = fresh(100).next_page();
        let next = advance_with(&pager, &stale, Cursor::Next("p2".into()), &fetches, None)
            .await
            .unwrap();
        assert_eq!(next, Cursor::Next("p2".into()));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_session() {
        let pager = CursorPager::new();
        let fetches = AtomicUsize::new(0);
        let first = fresh(100);
        advance_with(&pager, &first, Cursor::Initial, &fetches, Some("p2"))
            .await
            .unwrap();

        let failed = pager
            .advance(
                &key(),
                &fresh(200),
                Cursor::Initial,
                |_| async { Err::<Option<String>, _>(ApiError::Transient("down".into())) },
                |reply| reply.clone(),
                |_| async { Ok(()) },
            )
            .await;
        assert!(failed.is_err());

        // Page 1 of the surviving session still fetches.
        let next = advance_with(
            &pager,
            &first.next_page(),
            Cursor::Next("p2".into()),
            &fetches,
            Some("p3"),
        )
        .await
        .unwrap();
        assert_eq!(next, Cursor::Next("p3".into()));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn forget_viewer_drops_sessions() {
        let pager = CursorPager::new();
        let fetches = AtomicUsize::new(0);
        advance_with(&pager, &fresh(100), Cursor::Initial, &fetches, Some("p2"))
            .await
            .unwrap();
        assert_eq!(pager.partitions(), 1);

        pager.forget_viewer(&ProfileId::new_unchecked("did:plc:viewer"));
        assert_eq!(pager.partitions(), 0);
    }
}
