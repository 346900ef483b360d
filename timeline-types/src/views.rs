//! Remote view objects.
//!
//! These are the shapes a page fetch hands to the persistence layer. The
//! wire encoding belongs to the remote API client; this crate only fixes the
//! logical shape.

use serde::{Deserialize, Serialize};

use crate::{Post, Profile, Timestamp};

/// Why an entry appears in a feed, when it is not simply authored there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedReason {
    /// Someone the feed follows reposted the post.
    Repost {
        /// The reposting profile.
        by: Profile,
        /// When the repost happened.
        indexed_at: Timestamp,
    },
    /// The post is pinned to the top of a profile.
    Pin,
}

/// Reply context attached to a feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContext {
    /// Conversation root, when visible.
    pub root: Option<Post>,
    /// Direct parent, when visible.
    pub parent: Option<Post>,
    /// Author of the parent's parent, when one exists.
    pub grandparent_author: Option<Profile>,
}

/// A single entry in a remote feed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedViewPost {
    /// The post itself.
    pub post: Post,
    /// Reply context, for replies.
    pub reply: Option<ReplyContext>,
    /// Repost/pin reason, if any.
    pub reason: Option<FeedReason>,
}

impl FeedViewPost {
    /// Entry for a plain authored post.
    pub fn single(post: Post) -> Self {
        Self {
            post,
            reply: None,
            reason: None,
        }
    }

    /// The time this entry sorts at in its timeline.
    ///
    /// Reposts sort at the repost time, everything else at the post time.
    pub fn sort_at(&self) -> Timestamp {
        match &self.reason {
            Some(FeedReason::Repost { indexed_at, .. }) => *indexed_at,
            _ => self.post.indexed_at,
        }
    }
}

/// One page of a remote feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchedPage {
    /// Entries, newest first.
    pub feed: Vec<FeedViewPost>,
    /// Token for the next page; `None` when exhausted.
    pub cursor: Option<String>,
}

/// A remote post thread, flattened.
///
/// Contains the anchor post, its visible ancestors and its visible replies.
/// Structure is recovered from each post's reply references.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostThread {
    /// All posts in the thread, in any order.
    pub posts: Vec<Post>,
}
