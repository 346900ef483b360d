//! Write batches.
//!
//! A [`WriteBatch`] is the unit of atomic persistence: every command in it
//! becomes visible together, or none do. Callers enumerate heterogeneous
//! writes in any order; [`WriteBatch::into_ordered`] sorts them so that
//! referenced entities land before the rows that reference them.

use timeline_types::{
    FeedReason, FeedSource, FeedViewPost, ItemKind, ListSource, Post, PostUri, Profile, ProfileId,
    SourceId, Timestamp, ViewerState,
};

use crate::notify::Topic;
use crate::records::{TimelinePreference, TimelineRow};

/// One write against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCommand {
    /// Delete every timeline row of one partition.
    ResetSource {
        /// Viewer owning the partition.
        viewer: ProfileId,
        /// Source of the partition.
        source: SourceId,
    },
    /// Delete every preference row of a viewer.
    ClearPreferences {
        /// Whose preferences.
        viewer: ProfileId,
    },
    /// Insert or update a profile.
    UpsertProfile(Profile),
    /// Insert or update a post. The author must be upserted too.
    UpsertPost(Post),
    /// Insert or update a feed generator.
    UpsertFeedSource(FeedSource),
    /// Insert or update a list.
    UpsertListSource(ListSource),
    /// Flag a cached post as deleted. Reads skip it.
    MarkDeleted(PostUri),
    /// Replace a viewer's reaction state on a post.
    UpsertViewerState {
        /// Whose reactions.
        viewer: ProfileId,
        /// Which post.
        post_uri: PostUri,
        /// The reactions.
        state: ViewerState,
    },
    /// Shift a post's engagement counters.
    AdjustCounts {
        /// Which post.
        post_uri: PostUri,
        /// Change to the like count.
        like_delta: i64,
        /// Change to the repost count.
        repost_delta: i64,
    },
    /// Insert or update a timeline row.
    UpsertTimelineItem {
        /// Viewer owning the partition.
        viewer: ProfileId,
        /// Source of the partition.
        source: SourceId,
        /// The row.
        row: TimelineRow,
    },
    /// Record the anchor of the latest page-0 fetch.
    SetWatermark {
        /// Viewer owning the partition.
        viewer: ProfileId,
        /// Source of the partition.
        source: SourceId,
        /// The fetch anchor.
        at: Timestamp,
    },
    /// Insert or update one source preference.
    UpsertPreference {
        /// Whose preference.
        viewer: ProfileId,
        /// The preference.
        preference: TimelinePreference,
    },
}

impl WriteCommand {
    /// Apply order within a transaction: purges, then independent entities,
    /// then rows that reference them.
    fn phase(&self) -> u8 {
        match self {
            Self::ResetSource { .. } | Self::ClearPreferences { .. } => 0,
            Self::UpsertProfile(_) => 1,
            Self::UpsertPost(_) => 2,
            Self::UpsertFeedSource(_) | Self::UpsertListSource(_) => 3,
            Self::MarkDeleted(_) => 4,
            Self::UpsertViewerState { .. } | Self::AdjustCounts { .. } => 5,
            Self::UpsertTimelineItem { .. } => 6,
            Self::SetWatermark { .. } | Self::UpsertPreference { .. } => 7,
        }
    }

    /// Change topics to notify once this command is committed.
    pub(crate) fn topics(&self) -> Vec<Topic> {
        match self {
            Self::ResetSource { viewer, source } | Self::UpsertTimelineItem { viewer, source, .. } => {
                vec![Topic::Partition(viewer.clone(), source.clone())]
            }
            Self::SetWatermark { viewer, source, .. } => vec![
                Topic::Partition(viewer.clone(), source.clone()),
                Topic::Viewer(viewer.clone()),
            ],
            Self::ClearPreferences { viewer } | Self::UpsertPreference { viewer, .. } => {
                vec![Topic::Viewer(viewer.clone())]
            }
            Self::UpsertProfile(_)
            | Self::UpsertPost(_)
            | Self::UpsertFeedSource(_)
            | Self::UpsertListSource(_)
            | Self::MarkDeleted(_)
            | Self::UpsertViewerState { .. }
            | Self::AdjustCounts { .. } => vec![Topic::Content],
        }
    }
}

/// A batch of writes applied in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    commands: Vec<WriteCommand>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw command.
    pub fn push(&mut self, command: WriteCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Add a profile.
    pub fn add_profile(&mut self, profile: &Profile) -> &mut Self {
        self.push(WriteCommand::UpsertProfile(profile.clone()))
    }

    /// Add a post with its author and the viewer's reactions to it.
    pub fn add_post(&mut self, viewer: &ProfileId, post: &Post) -> &mut Self {
        self.add_profile(&post.author);
        self.push(WriteCommand::UpsertPost(post.clone()));
        self.push(WriteCommand::UpsertViewerState {
            viewer: viewer.clone(),
            post_uri: post.uri.clone(),
            state: post.viewer.clone(),
        })
    }

    /// Add a feed generator with its creator.
    pub fn add_feed_source(&mut self, feed: &FeedSource) -> &mut Self {
        self.add_profile(&feed.creator);
        self.push(WriteCommand::UpsertFeedSource(feed.clone()))
    }

    /// Add a list with its curator.
    pub fn add_list_source(&mut self, list: &ListSource) -> &mut Self {
        self.add_profile(&list.creator);
        self.push(WriteCommand::UpsertListSource(list.clone()))
    }

    /// Add one remote feed entry: the post, its reply context, its reposter
    /// and the timeline row tying them to the partition.
    pub fn add_feed_entry(
        &mut self,
        viewer: &ProfileId,
        source: &SourceId,
        entry: &FeedViewPost,
    ) -> &mut Self {
        self.add_feed_entry_at(viewer, source, entry, entry.sort_at())
    }

    /// Like [`add_feed_entry`](Self::add_feed_entry), with an explicit sort key
    /// for the timeline row.
    pub fn add_feed_entry_at(
        &mut self,
        viewer: &ProfileId,
        source: &SourceId,
        entry: &FeedViewPost,
        sort_at: Timestamp,
    ) -> &mut Self {
        let mut row = TimelineRow {
            post_uri: entry.post.uri.clone(),
            kind: ItemKind::Post,
            reposted_by: None,
            reply_root: entry.post.reply_root.clone(),
            reply_parent: entry.post.reply_parent.clone(),
            grandparent_author: None,
            sort_at,
        };

        if let Some(reply) = &entry.reply {
            if let Some(root) = &reply.root {
                self.add_post(viewer, root);
                row.reply_root = Some(root.uri.clone());
            }
            if let Some(parent) = &reply.parent {
                self.add_post(viewer, parent);
                row.reply_parent = Some(parent.uri.clone());
            }
            if let Some(grandparent) = &reply.grandparent_author {
                self.add_profile(grandparent);
                row.grandparent_author = Some(grandparent.id.clone());
            }
        }

        match &entry.reason {
            Some(FeedReason::Repost { by, .. }) => {
                self.add_profile(by);
                row.kind = ItemKind::Repost;
                row.reposted_by = Some(by.id.clone());
            }
            Some(FeedReason::Pin) => row.kind = ItemKind::Pinned,
            None => {}
        }

        self.add_post(viewer, &entry.post);
        self.push(WriteCommand::UpsertTimelineItem {
            viewer: viewer.clone(),
            source: source.clone(),
            row,
        })
    }

    /// Purge a partition before the rest of the batch lands.
    pub fn reset_source(&mut self, viewer: &ProfileId, source: &SourceId) -> &mut Self {
        self.push(WriteCommand::ResetSource {
            viewer: viewer.clone(),
            source: source.clone(),
        })
    }

    /// Record a page-0 fetch anchor.
    pub fn set_watermark(&mut self, viewer: &ProfileId, source: &SourceId, at: Timestamp) -> &mut Self {
        self.push(WriteCommand::SetWatermark {
            viewer: viewer.clone(),
            source: source.clone(),
            at,
        })
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands in insertion order.
    pub fn commands(&self) -> &[WriteCommand] {
        &self.commands
    }

    /// Commands in apply order. The sort is stable, so commands of the same
    /// kind keep their insertion order.
    pub fn into_ordered(self) -> Vec<WriteCommand> {
        let mut commands = self.commands;
        commands.sort_by_key(WriteCommand::phase);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline_types::{PostStats, ReplyContext};

    fn profile(id: &str) -> Profile {
        Profile {
            id: ProfileId::new_unchecked(id),
            handle: format!("{id}.test"),
            display_name: None,
            avatar: None,
        }
    }

    fn post(id: &str, at: i64) -> Post {
        Post {
            uri: PostUri::new_unchecked(format!("at://did:plc:a/post/{id}")),
            cid: format!("cid-{id}"),
            author: profile("did:plc:a"),
            text: id.into(),
            indexed_at: Timestamp::from_millis(at),
            reply_root: None,
            reply_parent: None,
            stats: PostStats::default(),
            viewer: ViewerState::default(),
        }
    }

    fn viewer() -> ProfileId {
        ProfileId::new_unchecked("did:plc:viewer")
    }

    fn source() -> SourceId {
        SourceId::new_unchecked("following")
    }

    #[test]
    fn ordering_puts_purges_first_and_rows_last() {
        let mut batch = WriteBatch::new();
        batch.set_watermark(&viewer(), &source(), Timestamp::from_millis(5));
        batch.add_feed_entry(&viewer(), &source(), &FeedViewPost::single(post("p", 1)));
        batch.reset_source(&viewer(), &source());

        let ordered = batch.into_ordered();
        assert!(matches!(ordered[0], WriteCommand::ResetSource { .. }));
        assert!(matches!(ordered[1], WriteCommand::UpsertProfile(_)));
        assert!(matches!(ordered[2], WriteCommand::UpsertPost(_)));
        assert!(matches!(
            ordered[ordered.len() - 2],
            WriteCommand::UpsertTimelineItem { .. }
        ));
        assert!(matches!(
            ordered[ordered.len() - 1],
            WriteCommand::SetWatermark { .. }
        ));
    }

    #[test]
    fn repost_entry_records_reposter_and_repost_time() {
        let mut batch = WriteBatch::new();
        let entry = FeedViewPost {
            post: post("p", 1),
            reply: None,
            reason: Some(FeedReason::Repost {
                by: profile("did:plc:b"),
                indexed_at: Timestamp::from_millis(9),
            }),
        };
        batch.add_feed_entry(&viewer(), &source(), &entry);

        let row = batch
            .commands()
            .iter()
            .find_map(|c| match c {
                WriteCommand::UpsertTimelineItem { row, .. } => Some(row.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(row.kind, ItemKind::Repost);
        assert_eq!(row.reposted_by, Some(ProfileId::new_unchecked("did:plc:b")));
        assert_eq!(row.sort_at, Timestamp::from_millis(9));
    }

    #[test]
    fn reply_entry_writes_context_posts() {
        let mut batch = WriteBatch::new();
        let root = post("root", 1);
        let parent = post("parent", 2);
        let mut reply = post("reply", 3);
        reply.reply_root = Some(root.uri.clone());
        reply.reply_parent = Some(parent.uri.clone());
        let entry = FeedViewPost {
            post: reply,
            reply: Some(ReplyContext {
                root: Some(root.clone()),
                parent: Some(parent.clone()),
                grandparent_author: Some(profile("did:plc:g")),
            }),
            reason: None,
        };
        batch.add_feed_entry(&viewer(), &source(), &entry);

        let posts: Vec<_> = batch
            .commands()
            .iter()
            .filter_map(|c| match c {
                WriteCommand::UpsertPost(p) => Some(p.text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(posts, vec!["root", "parent", "reply"]);

        let row = batch
            .commands()
            .iter()
            .find_map(|c| match c {
                WriteCommand::UpsertTimelineItem { row, .. } => Some(row.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(row.reply_root, Some(root.uri));
        assert_eq!(row.grandparent_author, Some(ProfileId::new_unchecked("did:plc:g")));
    }

    #[test]
    fn topics_follow_command_kind() {
        let reset = WriteCommand::ResetSource {
            viewer: viewer(),
            source: source(),
        };
        assert_eq!(reset.topics(), vec![Topic::Partition(viewer(), source())]);
        assert_eq!(
            WriteCommand::MarkDeleted(PostUri::new_unchecked("at://x/1")).topics(),
            vec![Topic::Content]
        );
    }
}
