//! Outbound writes to the remote service.
//!
//! Local mutations (reactions, preference changes) are applied to the cache
//! optimistically and then handed to a [`WriteQueue`], which delivers them
//! to the remote in the background. Delivery itself is outside the engine.

use async_trait::async_trait;
use timeline_store::TimelinePreference;
use timeline_types::{PostUri, ProfileId};
use tokio::sync::mpsc;

use crate::error::ClientError;

/// A write the remote service still has to learn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundWrite {
    /// Like a post.
    Like {
        /// Who likes.
        viewer: ProfileId,
        /// What.
        post_uri: PostUri,
        /// Content id of the liked revision.
        cid: String,
    },
    /// Remove a like.
    Unlike {
        /// Who unlikes.
        viewer: ProfileId,
        /// What.
        post_uri: PostUri,
        /// The like record to delete.
        like_uri: String,
    },
    /// Repost a post.
    Repost {
        /// Who reposts.
        viewer: ProfileId,
        /// What.
        post_uri: PostUri,
        /// Content id of the reposted revision.
        cid: String,
    },
    /// Remove a repost.
    Unrepost {
        /// Who unreposts.
        viewer: ProfileId,
        /// What.
        post_uri: PostUri,
        /// The repost record to delete.
        repost_uri: String,
    },
    /// Replace the viewer's saved timeline preferences.
    TimelinePreferences {
        /// Whose preferences.
        viewer: ProfileId,
        /// The full new set, ordered.
        preferences: Vec<TimelinePreference>,
    },
}

/// Sink for outbound writes.
#[async_trait]
pub trait WriteQueue: Send + Sync {
    /// Enqueue one write for delivery.
    async fn enqueue(&self, write: OutboundWrite) -> Result<(), ClientError>;
}

/// Write queue backed by a bounded tokio channel.
///
/// The receiving half goes to whatever task delivers writes.
#[derive(Debug, Clone)]
pub struct ChannelWriteQueue {
    tx: mpsc::Sender<OutboundWrite>,
}

impl ChannelWriteQueue {
    /// Create a queue holding up to `capacity` undelivered writes.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundWrite>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WriteQueue for ChannelWriteQueue {
    async fn enqueue(&self, write: OutboundWrite) -> Result<(), ClientError> {
        self.tx
            .send(write)
            .await
            .map_err(|_| ClientError::WriteQueue("delivery task stopped".into()))
    }
}
