//! Thread reconstruction.
//!
//! Folds a flat, generation-numbered reply chain into grouped
//! [`TimelineItem::Thread`] items. Input order matters: the anchor post
//! (generation 0), then its ancestors walking up (-1, -2, ...), then
//! descendants in traversal order.
//!
//! Rules, applied left to right with one thread in progress:
//! 1. No thread yet, or generation 0: start a new thread with this post.
//! 2. Ancestor (generation <= -1): prepend to the thread in progress.
//! 3. Descendant from another conversation than the thread in progress, or
//!    a sibling branch (its parent was already grouped but is not the
//!    thread's last post): close the thread and start a new one.
//! 4. Descendant at exactly the next consecutive generation: append.
//!    Any other descendant is left out of the flat grouping; it remains
//!    reachable from the full thread view.

use std::collections::HashSet;
use timeline_types::{Post, PostUri, ThreadedPost, TimelineItem};

/// A thread being built. `generation` is that of `posts[0]`.
#[derive(Debug, Clone)]
struct ThreadGroup {
    generation: i64,
    posts: Vec<Post>,
    anchor_index: usize,
    has_break: bool,
}

impl ThreadGroup {
    fn start(entry: ThreadedPost) -> Self {
        Self {
            generation: entry.generation,
            posts: vec![entry.post],
            anchor_index: 0,
            has_break: false,
        }
    }

    fn next_generation(&self) -> i64 {
        self.generation + self.posts.len() as i64
    }

    fn into_item(self) -> TimelineItem {
        TimelineItem::Thread {
            posts: self.posts,
            anchor_index: self.anchor_index,
            has_break: self.has_break,
        }
    }
}

/// Group a reply chain into thread items.
pub fn reconstruct(chain: Vec<ThreadedPost>) -> Vec<TimelineItem> {
    chain
        .into_iter()
        .fold(Grouping::default(), Grouping::step)
        .groups
        .into_iter()
        .map(ThreadGroup::into_item)
        .collect()
}

/// Fold state: finished groups plus every post grouped so far.
#[derive(Default)]
struct Grouping {
    groups: Vec<ThreadGroup>,
    seen: HashSet<PostUri>,
}

impl Grouping {
    fn step(mut self, entry: ThreadedPost) -> Self {
        let Some(current) = self.groups.last_mut() else {
            return self.start(entry);
        };

        if entry.generation == 0 {
            return self.start(entry);
        }

        if entry.generation <= -1 {
            // A skipped ancestor between this post and the head is a break.
            let links_to_head = current.posts[0].reply_parent.as_ref() == Some(&entry.post.uri);
            if !links_to_head {
                current.has_break = true;
            }
            self.seen.insert(entry.post.uri.clone());
            current.posts.insert(0, entry.post);
            current.generation = entry.generation;
            current.anchor_index += 1;
            return self;
        }

        if entry.post.conversation_root() != current.posts[0].conversation_root() {
            return self.start(entry);
        }

        let parent = entry.post.reply_parent.as_ref();
        let continues = parent == current.posts.last().map(|p| &p.uri);
        if !continues && parent.is_some_and(|uri| self.seen.contains(uri)) {
            return self.start(entry);
        }

        if entry.generation == current.next_generation() {
            self.seen.insert(entry.post.uri.clone());
            current.posts.push(entry.post);
        }
        self
    }

    fn start(mut self, entry: ThreadedPost) -> Self {
        self.seen.insert(entry.post.uri.clone());
        self.groups.push(ThreadGroup::start(entry));
        self
    }
}
