//! Domain models shared by the remote views and the local cache.

use serde::{Deserialize, Serialize};

use crate::{PostUri, ProfileId, RecordUri, Timestamp};

/// A profile as rendered next to its posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable identity.
    pub id: ProfileId,
    /// Current handle, e.g. `alice.example.com`.
    pub handle: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Optional avatar URL.
    pub avatar: Option<String>,
}

/// Engagement counters for a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostStats {
    /// Number of likes.
    pub like_count: i64,
    /// Number of reposts.
    pub repost_count: i64,
    /// Number of direct replies.
    pub reply_count: i64,
}

/// The viewer's own reactions to a post.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewerState {
    /// URI of the viewer's like record, if liked.
    pub like_uri: Option<String>,
    /// URI of the viewer's repost record, if reposted.
    pub repost_uri: Option<String>,
}

/// A post with its author and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Record URI.
    pub uri: PostUri,
    /// Content hash of the record version.
    pub cid: String,
    /// Author profile.
    pub author: Profile,
    /// Post body.
    pub text: String,
    /// When the remote indexed the post.
    pub indexed_at: Timestamp,
    /// Root of the conversation this post replies into.
    pub reply_root: Option<PostUri>,
    /// Direct parent this post replies to.
    pub reply_parent: Option<PostUri>,
    /// Engagement counters.
    #[serde(default)]
    pub stats: PostStats,
    /// Viewer reactions.
    #[serde(default)]
    pub viewer: ViewerState,
}

impl Post {
    /// The conversation root: the reply root, or the post itself.
    pub fn conversation_root(&self) -> &PostUri {
        self.reply_root.as_ref().unwrap_or(&self.uri)
    }
}

/// A named algorithmic feed generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Generator record URI.
    pub uri: RecordUri,
    /// Profile that published the generator.
    pub creator: Profile,
    /// Display name.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Number of likes on the generator.
    #[serde(default)]
    pub like_count: i64,
}

/// A curated member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSource {
    /// List record URI.
    pub uri: RecordUri,
    /// Profile that curates the list.
    pub creator: Profile,
    /// List name.
    pub name: String,
    /// List purpose, e.g. `curatelist` or `modlist`.
    pub purpose: String,
}
