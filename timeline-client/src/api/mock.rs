//! Mock feed API for testing.
//!
//! Allows queueing pages per source, forcing failures, holding responses
//! until released, and capturing requests for verification.

use super::{ApiError, FeedApi, FeedRequest};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use timeline_types::{FetchedPage, PostThread, PostUri, SourceId, SourceRef};
use tokio::sync::Semaphore;

/// Mock feed API for testing.
///
/// Sources with nothing queued answer with an empty, exhausted page.
#[derive(Debug, Default)]
pub struct MockFeedApi {
    inner: Arc<Mutex<MockFeedApiInner>>,
}

#[derive(Debug, Default)]
struct MockFeedApiInner {
    pages: HashMap<SourceId, VecDeque<Result<FetchedPage, ApiError>>>,
    threads: HashMap<PostUri, PostThread>,
    requests: Vec<FeedRequest>,
    thread_requests: Vec<PostUri>,
    fail_next: Option<ApiError>,
    gate: Option<Arc<Semaphore>>,
}

impl MockFeedApi {
    /// Create a new mock API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page to be returned by the next fetch of `source`.
    pub fn queue_page(&self, source: &SourceRef, page: FetchedPage) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .pages
            .entry(source.source_id())
            .or_default()
            .push_back(Ok(page));
    }

    /// Queue an error to be returned by the next fetch of `source`.
    pub fn queue_error(&self, source: &SourceRef, error: ApiError) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .pages
            .entry(source.source_id())
            .or_default()
            .push_back(Err(error));
    }

    /// Set the thread returned for `uri`.
    pub fn set_thread(&self, uri: &PostUri, thread: PostThread) {
        let mut inner = self.inner.lock().unwrap();
        inner.threads.insert(uri.clone(), thread);
    }

    /// Cause the next call of any kind to fail with the given error.
    pub fn fail_next(&self, error: ApiError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = Some(error);
    }

    /// Block every response until [`release`](Self::release) lets it through.
    ///
    /// Requests are still recorded on arrival.
    pub fn hold_responses(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held responses through.
    pub fn release(&self, count: usize) {
        let inner = self.inner.lock().unwrap();
        if let Some(gate) = &inner.gate {
            gate.add_permits(count);
        }
    }

    /// Get all page requests, in arrival order.
    pub fn requests(&self) -> Vec<FeedRequest> {
        let inner = self.inner.lock().unwrap();
        inner.requests.clone()
    }

    /// Number of page requests received.
    pub fn request_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.requests.len()
    }

    /// Get all thread requests, in arrival order.
    pub fn thread_requests(&self) -> Vec<PostUri> {
        let inner = self.inner.lock().unwrap();
        inner.thread_requests.clone()
    }

    /// Clear all state (queues, captures, failures, gate).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockFeedApiInner::default();
    }

    async fn pass_gate(&self) -> Result<(), ApiError> {
        let gate = {
            let inner = self.inner.lock().unwrap();
            inner.gate.clone()
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| ApiError::Transient("mock gate closed".into()))?
                .forget();
        }
        Ok(())
    }
}

impl Clone for MockFeedApi {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl FeedApi for MockFeedApi {
    async fn fetch_page(&self, request: &FeedRequest) -> Result<FetchedPage, ApiError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push(request.clone());
        }
        self.pass_gate().await?;

        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next.take() {
            return Err(error);
        }

        inner
            .pages
            .get_mut(&request.source.source_id())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(FetchedPage::default()))
    }

    async fn fetch_post_thread(&self, uri: &PostUri) -> Result<PostThread, ApiError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.thread_requests.push(uri.clone());
        }
        self.pass_gate().await?;

        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next.take() {
            return Err(error);
        }

        inner
            .threads
            .get(uri)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(uri.to_string()))
    }
}
