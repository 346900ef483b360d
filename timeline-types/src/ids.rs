//! Identity and ordering types for the timeline engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::TypesError;

/// Identity of a profile (the viewer or any author).
///
/// Decentralized identifier string, e.g. `did:plc:abc123`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileId(String);

impl ProfileId {
    /// Create a ProfileId, rejecting empty or whitespace-containing values.
    pub fn parse(value: impl Into<String>) -> Result<Self, TypesError> {
        let value = value.into();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(TypesError::InvalidProfileId(value));
        }
        Ok(Self(value))
    }

    /// Create a ProfileId without validation (trusted, e.g. read back from the cache).
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileId({})", self.0)
    }
}

/// URI of a post record, e.g. `at://did:plc:abc/app.bsky.feed.post/3k...`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostUri(String);

impl PostUri {
    /// Create a PostUri. Must use the `at://` scheme.
    pub fn parse(value: impl Into<String>) -> Result<Self, TypesError> {
        let value = value.into();
        if !value.starts_with("at://") || value.len() <= "at://".len() {
            return Err(TypesError::InvalidUri(value));
        }
        Ok(Self(value))
    }

    /// Create a PostUri without validation.
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PostUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostUri({})", self.0)
    }
}

/// URI of a non-post record: a feed generator or a curated list.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordUri(String);

impl RecordUri {
    /// Create a RecordUri. Must use the `at://` scheme.
    pub fn parse(value: impl Into<String>) -> Result<Self, TypesError> {
        let value = value.into();
        if !value.starts_with("at://") || value.len() <= "at://".len() {
            return Err(TypesError::InvalidUri(value));
        }
        Ok(Self(value))
    }

    /// Create a RecordUri without validation.
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordUri({})", self.0)
    }
}

/// Stable identity of one timeline; the cache partition key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    /// Source id of the viewer's aggregate home feed.
    pub const FOLLOWING: &'static str = "following";

    /// Create a SourceId, rejecting empty values.
    pub fn parse(value: impl Into<String>) -> Result<Self, TypesError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypesError::InvalidSourceId(value));
        }
        Ok(Self(value))
    }

    /// Create a SourceId without validation.
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
///
/// Used for cursor anchors, watermarks and item sort keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from milliseconds since the epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Milliseconds since the epoch.
    pub const fn millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Network-side pagination cursor.
///
/// Tri-state wrapper around the remote's opaque page token:
/// - `Initial`: no token yet, the next request is the first page
/// - `Next(token)`: continue from `token`
/// - `Pending`: exhausted, or the last fetch for this query already ran
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cursor {
    /// First request, no token.
    #[default]
    Initial,
    /// Continue from this remote token.
    Next(String),
    /// Nothing more to fetch for this query.
    Pending,
}

impl Cursor {
    /// Cursor for a remote response's optional next-page token.
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.is_empty() => Self::Next(token),
            _ => Self::Pending,
        }
    }

    /// The token to send with a request, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Next(token) => Some(token),
            Self::Initial | Self::Pending => None,
        }
    }

    /// True once pagination has reached its terminal state.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}
