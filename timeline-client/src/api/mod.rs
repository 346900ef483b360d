//! Remote feed API abstraction.
//!
//! The sync engine never talks to the network directly. Everything it needs
//! from the remote service goes through [`FeedApi`]:
//! - `fetch_page()` pulls one page of a timeline source
//! - `fetch_single_newest()` pulls just the head of a source, for polling
//! - `fetch_post_thread()` pulls a post with its ancestors and replies
//!
//! # Example
//!
//! ```ignore
//! let api = MockFeedApi::new();
//! api.queue_page(&SourceRef::Following, page);
//! let page = api.fetch_page(&FeedRequest::first(SourceRef::Following, 50)).await?;
//! ```

mod mock;

pub use mock::MockFeedApi;

use async_trait::async_trait;
use thiserror::Error;
use timeline_types::{FetchedPage, PostThread, PostUri, SourceRef};

/// Remote API errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Network or server failure that may succeed on retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The server asked us to slow down.
    #[error("rate limited")]
    RateLimited,

    /// The source or post does not exist (or is no longer visible).
    #[error("not found: {0}")]
    NotFound(String),

    /// The server refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ApiError {
    /// Whether retrying the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited)
    }
}

/// One page request against a timeline source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    /// Which source to read.
    pub source: SourceRef,
    /// Maximum entries to return.
    pub limit: u32,
    /// Remote continuation token; `None` for the first page.
    pub cursor: Option<String>,
}

impl FeedRequest {
    /// Request for the head of a source.
    pub fn first(source: SourceRef, limit: u32) -> Self {
        Self {
            source,
            limit,
            cursor: None,
        }
    }
}

/// Remote feed service.
///
/// Implementations wrap the network client. Every call is independent; the
/// engine handles retries and persistence.
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Fetch one page of a timeline source.
    async fn fetch_page(&self, request: &FeedRequest) -> Result<FetchedPage, ApiError>;

    /// Fetch only the newest entry of a source.
    async fn fetch_single_newest(&self, source: &SourceRef) -> Result<FetchedPage, ApiError> {
        self.fetch_page(&FeedRequest::first(source.clone(), 1)).await
    }

    /// Fetch a post thread: the post, its visible ancestors and its replies.
    async fn fetch_post_thread(&self, uri: &PostUri) -> Result<PostThread, ApiError>;
}
