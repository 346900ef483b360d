//! Timeline items, pages and queries.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Cursor, Post, Profile, ProfileId, Timestamp, TypesError};

/// The unit returned to callers.
///
/// Every variant has an [`id`](TimelineItem::id) that is unique within one
/// page render and stable across renders, for list diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineItem {
    /// A plain post.
    Single {
        /// The post.
        post: Post,
    },
    /// A post reposted into the timeline.
    Repost {
        /// The reposted post.
        post: Post,
        /// Who reposted it.
        reposted_by: Profile,
        /// When it was reposted.
        at: Timestamp,
    },
    /// A post pinned to the top of a profile.
    Pinned {
        /// The pinned post.
        post: Post,
    },
    /// A reply chain, ordered root to leaf.
    Thread {
        /// Posts, root first.
        posts: Vec<Post>,
        /// Index of the post the thread is centered on.
        anchor_index: usize,
        /// A grandparent-level branch was skipped between root and parent.
        has_break: bool,
    },
    /// Placeholder while a page loads.
    Loading {
        /// Placeholder identity.
        id: String,
    },
}

impl TimelineItem {
    /// A fresh loading placeholder with a unique id.
    pub fn loading() -> Self {
        Self::Loading {
            id: format!("loading-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Stable identity for list diffing.
    pub fn id(&self) -> String {
        match self {
            Self::Single { post } => post.uri.to_string(),
            Self::Repost {
                post, reposted_by, ..
            } => format!("{}::repost::{}", post.uri, reposted_by.id),
            Self::Pinned { post } => format!("{}::pinned", post.uri),
            Self::Thread {
                posts,
                anchor_index,
                ..
            } => match posts.get(*anchor_index) {
                Some(anchor) => format!("{}::thread", anchor.uri),
                None => "empty::thread".to_string(),
            },
            Self::Loading { id } => id.clone(),
        }
    }

    /// The post the item is centered on, if it has one.
    pub fn anchor_post(&self) -> Option<&Post> {
        match self {
            Self::Single { post } | Self::Repost { post, .. } | Self::Pinned { post } => Some(post),
            Self::Thread {
                posts,
                anchor_index,
                ..
            } => posts.get(*anchor_index),
            Self::Loading { .. } => None,
        }
    }
}

/// A page of results plus the network cursor to continue from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in display order.
    pub items: Vec<T>,
    /// Where the network side of the pagination stands.
    pub next_cursor: Cursor,
}

impl<T> Page<T> {
    /// Create a page.
    pub fn new(items: Vec<T>, next_cursor: Cursor) -> Self {
        Self { items, next_cursor }
    }
}

/// Cache-side pagination query.
///
/// `page == 0 && offset == 0` is a fresh load. `anchor` pins the "before"
/// boundary of local reads so pages stay stable while new network data lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorQuery {
    /// Zero-based page number.
    pub page: u32,
    /// Row offset into the anchored cache read.
    pub offset: u32,
    /// Page size.
    pub limit: u32,
    /// Upper bound (exclusive) for cached item sort times.
    pub anchor: Timestamp,
}

impl CursorQuery {
    /// A fresh page-0 query anchored at `anchor`.
    pub fn fresh(limit: u32, anchor: Timestamp) -> Self {
        Self {
            page: 0,
            offset: 0,
            limit,
            anchor,
        }
    }

    /// True for a fresh load.
    pub fn is_fresh(&self) -> bool {
        self.page == 0 && self.offset == 0
    }

    /// The query for the following page, on the same anchor.
    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            offset: self.offset + self.limit,
            limit: self.limit,
            anchor: self.anchor,
        }
    }
}

/// How a cached timeline row entered its timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Authored post or reply.
    Post,
    /// Repost by someone else.
    Repost,
    /// Pinned to a profile.
    Pinned,
}

impl ItemKind {
    /// Stable string form for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Repost => "repost",
            Self::Pinned => "pinned",
        }
    }
}

impl FromStr for ItemKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(Self::Post),
            "repost" => Ok(Self::Repost),
            "pinned" => Ok(Self::Pinned),
            other => Err(TypesError::UnknownKind(other.to_string())),
        }
    }
}

/// A cached timeline row joined with the posts and profiles it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItemRecord {
    /// How the row entered the timeline.
    pub kind: ItemKind,
    /// The row's post.
    pub post: Post,
    /// Reposter, for reposts.
    pub reposted_by: Option<Profile>,
    /// Conversation root, for replies whose root is cached.
    pub root: Option<Post>,
    /// Direct parent, for replies whose parent is cached.
    pub parent: Option<Post>,
    /// Author of the parent's parent, when the remote reported one.
    pub grandparent_author: Option<ProfileId>,
    /// Position in the timeline.
    pub sort_at: Timestamp,
}

/// A post in a reply chain, with its generation relative to the anchor.
///
/// Generation 0 is the anchor (original) post, negative generations are
/// ancestors and positive generations are descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadedPost {
    /// Offset from the anchor post.
    pub generation: i64,
    /// The post.
    pub post: Post,
}
