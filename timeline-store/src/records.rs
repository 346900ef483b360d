//! Row shapes written to and read from the cache.

use serde::{Deserialize, Serialize};
use timeline_types::{
    FeedSource, ItemKind, ListSource, PostUri, Presentation, ProfileId, SourceRef, Timestamp,
};

/// One materialized timeline row, keyed by `(viewer, source, post_uri)`.
///
/// Rows only reference posts and profiles; the referenced entities are
/// written by the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRow {
    /// The row's post.
    pub post_uri: PostUri,
    /// How the row entered the timeline.
    pub kind: ItemKind,
    /// Reposter, for repost rows.
    pub reposted_by: Option<ProfileId>,
    /// Conversation root the post replies into.
    pub reply_root: Option<PostUri>,
    /// Direct parent the post replies to.
    pub reply_parent: Option<PostUri>,
    /// Author of the parent's parent.
    pub grandparent_author: Option<ProfileId>,
    /// Position in the timeline.
    pub sort_at: Timestamp,
}

/// A viewer's persisted preference for one timeline source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePreference {
    /// Which source.
    pub source: SourceRef,
    /// Ordering among pinned sources.
    pub position: u32,
    /// Whether the source is pinned.
    pub is_pinned: bool,
    /// Rendering mode.
    pub presentation: Presentation,
}

/// A preference joined with the cached source rows and watermark it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelinePreferenceRecord {
    /// The stored preference.
    pub preference: TimelinePreference,
    /// Cached feed generator, for feed sources.
    pub feed: Option<FeedSource>,
    /// Cached list, for list and starter-pack sources.
    pub list: Option<ListSource>,
    /// Watermark of the source's last page-0 fetch.
    pub last_fetched_at: Option<Timestamp>,
}
