//! Timeline sources.
//!
//! A [`Timeline`] is a named, addressable feed. Its [`SourceRef`] is the part
//! that identifies it to the remote API and to the cache; the rest is
//! presentation and preference state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{FeedSource, ListSource, ProfileId, RecordUri, SourceId, Timestamp, TypesError};

/// The kind of posts a profile timeline shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTimelineKind {
    /// Top-level posts and reposts.
    Posts,
    /// Posts including replies.
    Replies,
    /// Posts with media attached.
    Media,
    /// Posts the profile liked.
    Likes,
    /// Posts with video attached.
    Videos,
}

impl ProfileTimelineKind {
    /// Stable string form, used inside source ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Replies => "replies",
            Self::Media => "media",
            Self::Likes => "likes",
            Self::Videos => "videos",
        }
    }
}

impl FromStr for ProfileTimelineKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Self::Posts),
            "replies" => Ok(Self::Replies),
            "media" => Ok(Self::Media),
            "likes" => Ok(Self::Likes),
            "videos" => Ok(Self::Videos),
            other => Err(TypesError::UnknownKind(other.to_string())),
        }
    }
}

/// How a timeline is rendered. Persisted per source; irrelevant to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// Text-first list.
    #[default]
    Text,
    /// Media grid with condensed captions.
    CondensedMedia,
    /// Full-bleed media pages.
    ExpandedMedia,
}

impl Presentation {
    /// Stable string form for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::CondensedMedia => "condensed_media",
            Self::ExpandedMedia => "expanded_media",
        }
    }
}

impl FromStr for Presentation {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "condensed_media" => Ok(Self::CondensedMedia),
            "expanded_media" => Ok(Self::ExpandedMedia),
            other => Err(TypesError::UnknownKind(other.to_string())),
        }
    }
}

/// Identifies a timeline to the remote API and the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRef {
    /// The viewer's aggregate home feed.
    Following,
    /// A named algorithmic feed.
    Feed {
        /// Generator URI.
        uri: RecordUri,
    },
    /// Posts from a curated member list.
    List {
        /// List URI.
        uri: RecordUri,
    },
    /// A profile's posts of one kind.
    Profile {
        /// Whose posts.
        profile_id: ProfileId,
        /// Which posts.
        kind: ProfileTimelineKind,
    },
    /// A starter pack's member list.
    StarterPack {
        /// URI of the wrapped list.
        list_uri: RecordUri,
    },
}

impl SourceRef {
    /// The cache partition key for this source.
    ///
    /// A starter pack shares its wrapped list's partition.
    pub fn source_id(&self) -> SourceId {
        match self {
            Self::Following => SourceId::new_unchecked(SourceId::FOLLOWING),
            Self::Feed { uri } | Self::List { uri } => SourceId::new_unchecked(uri.as_str()),
            Self::StarterPack { list_uri } => SourceId::new_unchecked(list_uri.as_str()),
            Self::Profile { profile_id, kind } => {
                SourceId::new_unchecked(format!("{}-{}", profile_id, kind.as_str()))
            }
        }
    }

    /// True for profile timelines (which poll on a slower interval).
    pub fn is_profile(&self) -> bool {
        matches!(self, Self::Profile { .. })
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Following => f.write_str("following"),
            Self::Feed { uri } => write!(f, "feed({uri})"),
            Self::List { uri } => write!(f, "list({uri})"),
            Self::StarterPack { list_uri } => write!(f, "starter-pack({list_uri})"),
            Self::Profile { profile_id, kind } => {
                write!(f, "profile({profile_id}, {})", kind.as_str())
            }
        }
    }
}

/// Preference and presentation state carried by every timeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimelineMeta {
    /// Ordering among pinned sources.
    pub position: u32,
    /// Whether the source is pinned to the home screen.
    pub is_pinned: bool,
    /// When the source was last fetched from page 0.
    pub last_refreshed: Option<Timestamp>,
    /// Rendering mode.
    pub presentation: Presentation,
}

/// A named, addressable feed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Timeline {
    /// The viewer's aggregate home feed.
    Following {
        /// Preference state.
        meta: TimelineMeta,
    },
    /// A named algorithmic feed.
    Feed {
        /// Preference state.
        meta: TimelineMeta,
        /// The generator.
        feed: FeedSource,
    },
    /// Posts from a curated member list.
    List {
        /// Preference state.
        meta: TimelineMeta,
        /// The list.
        list: ListSource,
    },
    /// A profile's posts of one kind.
    Profile {
        /// Preference state.
        meta: TimelineMeta,
        /// Whose posts.
        profile_id: ProfileId,
        /// Which posts.
        kind: ProfileTimelineKind,
    },
    /// A starter pack, wrapping its member list.
    StarterPack {
        /// Preference state.
        meta: TimelineMeta,
        /// The wrapped list.
        list: ListSource,
    },
}

impl Timeline {
    /// The viewer's home feed with default preferences.
    pub fn following() -> Self {
        Self::Following {
            meta: TimelineMeta::default(),
        }
    }

    /// A profile timeline with default preferences.
    pub fn profile(profile_id: ProfileId, kind: ProfileTimelineKind) -> Self {
        Self::Profile {
            meta: TimelineMeta::default(),
            profile_id,
            kind,
        }
    }

    /// How to address this timeline remotely and in the cache.
    pub fn source_ref(&self) -> SourceRef {
        match self {
            Self::Following { .. } => SourceRef::Following,
            Self::Feed { feed, .. } => SourceRef::Feed {
                uri: feed.uri.clone(),
            },
            Self::List { list, .. } => SourceRef::List {
                uri: list.uri.clone(),
            },
            Self::Profile {
                profile_id, kind, ..
            } => SourceRef::Profile {
                profile_id: profile_id.clone(),
                kind: *kind,
            },
            Self::StarterPack { list, .. } => SourceRef::StarterPack {
                list_uri: list.uri.clone(),
            },
        }
    }

    /// The cache partition key.
    pub fn source_id(&self) -> SourceId {
        self.source_ref().source_id()
    }

    /// Preference state.
    pub fn meta(&self) -> &TimelineMeta {
        match self {
            Self::Following { meta }
            | Self::Feed { meta, .. }
            | Self::List { meta, .. }
            | Self::Profile { meta, .. }
            | Self::StarterPack { meta, .. } => meta,
        }
    }

    /// Mutable preference state.
    pub fn meta_mut(&mut self) -> &mut TimelineMeta {
        match self {
            Self::Following { meta }
            | Self::Feed { meta, .. }
            | Self::List { meta, .. }
            | Self::Profile { meta, .. }
            | Self::StarterPack { meta, .. } => meta,
        }
    }
}
