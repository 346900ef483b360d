//! Feed row assembly.
//!
//! Turns a cached timeline row, already joined with the posts it references,
//! into the [`TimelineItem`] the caller renders.

use std::collections::HashSet;
use timeline_types::{FeedItemRecord, ItemKind, Post, TimelineItem};

/// Build the item for one cached row.
///
/// - A repost with a known reposter renders as [`TimelineItem::Repost`].
/// - A pinned row renders as [`TimelineItem::Pinned`].
/// - A reply whose root or parent is cached renders as a short
///   [`TimelineItem::Thread`] of root, parent and the post itself.
/// - Anything else renders as [`TimelineItem::Single`].
pub fn assemble(record: FeedItemRecord) -> TimelineItem {
    let FeedItemRecord {
        kind,
        post,
        reposted_by,
        root,
        parent,
        grandparent_author,
        sort_at,
    } = record;

    match (kind, reposted_by) {
        (ItemKind::Repost, Some(reposted_by)) => {
            return TimelineItem::Repost {
                post,
                reposted_by,
                at: sort_at,
            }
        }
        (ItemKind::Pinned, _) => return TimelineItem::Pinned { post },
        _ => {}
    }

    if root.is_none() && parent.is_none() {
        return TimelineItem::Single { post };
    }

    // Only a grandparent that is not the root itself hides posts.
    let has_break = match (&root, &parent) {
        (Some(root), Some(parent)) => {
            grandparent_author.is_some() && parent.reply_parent.as_ref() != Some(&root.uri)
        }
        _ => false,
    };

    let mut posts: Vec<Post> = Vec::with_capacity(3);
    for candidate in [root, parent, Some(post)].into_iter().flatten() {
        if !posts.iter().any(|p| p.uri == candidate.uri) {
            posts.push(candidate);
        }
    }
    let anchor_index = posts.len() - 1;

    TimelineItem::Thread {
        posts,
        anchor_index,
        has_break,
    }
}

/// Drop items whose id already appeared earlier in the list.
pub fn dedupe_by_id(items: Vec<TimelineItem>) -> Vec<TimelineItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id()))
        .collect()
}
