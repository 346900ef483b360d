//! # timeline-types
//!
//! Value types for the federated timeline sync engine.
//!
//! This crate provides the foundational types used across all timeline crates:
//! - [`ProfileId`], [`PostUri`], [`RecordUri`], [`SourceId`], [`Timestamp`] - identity and ordering
//! - [`Cursor`], [`CursorQuery`], [`Page`] - network and cache pagination
//! - [`Timeline`], [`SourceRef`] - addressable feed sources
//! - [`TimelineItem`] - the unit returned to callers
//! - [`FeedViewPost`], [`FetchedPage`], [`PostThread`] - remote view objects
//! - [`TypesError`] - error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod items;
mod models;
mod timeline;
mod views;

pub use error::TypesError;
pub use ids::{Cursor, PostUri, ProfileId, RecordUri, SourceId, Timestamp};
pub use items::{CursorQuery, FeedItemRecord, ItemKind, Page, ThreadedPost, TimelineItem};
pub use models::{FeedSource, ListSource, Post, PostStats, Profile, ViewerState};
pub use timeline::{Presentation, ProfileTimelineKind, SourceRef, Timeline, TimelineMeta};
pub use views::{FeedReason, FeedViewPost, FetchedPage, PostThread, ReplyContext};
