//! # timeline-client
//!
//! Timeline synchronization engine for a federated social network client.
//!
//! This crate provides:
//! - [`TimelineSyncFacade`] - reactive timeline pages, update flags, thread
//!   views, home timeline preferences and local reactions
//! - [`TimelineSession`] - refresh / load-more driver for one open timeline
//! - [`CursorPager`] - single-flight cursor pagination per partition
//! - [`UpdatePoller`] - interval polling for content above the last refresh
//! - [`FeedApi`] and [`WriteQueue`] - the remote seams, with
//!   [`MockFeedApi`] and [`ChannelWriteQueue`] implementations
//!
//! ## Example
//!
//! ```ignore
//! use timeline_client::{Config, TimelineSyncFacade};
//!
//! let facade = TimelineSyncFacade::open(&config, api, writes).await?;
//! let session = facade.session(viewer, Timeline::following());
//! session.refresh().await?;
//! let mut pages = session.observe();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod facade;
pub mod flow;
pub mod pager;
pub mod poller;
pub mod retry;
pub mod session;
pub mod telemetry;
pub mod write_queue;

#[cfg(test)]
mod testing;

pub use api::{ApiError, FeedApi, FeedRequest, MockFeedApi};
pub use config::{Config, ConfigError};
pub use error::ClientError;
pub use facade::{HomeTimelineUpdate, Outcome, PostInteraction, TimelineSyncFacade};
pub use pager::{CursorPager, PartitionKey};
pub use poller::UpdatePoller;
pub use retry::RetryPolicy;
pub use session::TimelineSession;
pub use telemetry::init_tracing;
pub use write_queue::{ChannelWriteQueue, OutboundWrite, WriteQueue};
