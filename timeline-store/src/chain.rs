//! Reply chain ordering for cached conversations.

use std::collections::{HashMap, HashSet};
use timeline_types::{Post, PostUri, ThreadedPost};

/// Order the cached posts of one conversation around `anchor`.
///
/// Output: the anchor (generation 0), then its ancestors walking up the
/// parent links (-1, -2, ...), then its descendants in depth-first
/// pre-order with generation equal to depth. Siblings are ordered oldest
/// first. Posts not connected to the anchor are left out.
pub(crate) fn order_chain(anchor: &PostUri, posts: Vec<Post>) -> Vec<ThreadedPost> {
    let mut by_uri: HashMap<PostUri, Post> = HashMap::with_capacity(posts.len());
    let mut children: HashMap<PostUri, Vec<PostUri>> = HashMap::new();
    for post in posts {
        if let Some(parent) = &post.reply_parent {
            children
                .entry(parent.clone())
                .or_default()
                .push(post.uri.clone());
        }
        by_uri.insert(post.uri.clone(), post);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| {
            let key = |uri: &PostUri| by_uri.get(uri).map(|p| p.indexed_at);
            key(a).cmp(&key(b)).then_with(|| a.cmp(b))
        });
    }

    let Some(op) = by_uri.get(anchor) else {
        return Vec::new();
    };

    let mut chain = vec![ThreadedPost {
        generation: 0,
        post: op.clone(),
    }];
    let mut visited: HashSet<&PostUri> = HashSet::from([anchor]);

    let mut generation = 0;
    let mut cursor = op.reply_parent.as_ref();
    while let Some(parent) = cursor.and_then(|uri| by_uri.get(uri)) {
        if !visited.insert(&parent.uri) {
            break;
        }
        generation -= 1;
        chain.push(ThreadedPost {
            generation,
            post: parent.clone(),
        });
        cursor = parent.reply_parent.as_ref();
    }

    let mut stack: Vec<(&PostUri, i64)> = children
        .get(anchor)
        .map(|kids| kids.iter().rev().map(|uri| (uri, 1)).collect())
        .unwrap_or_default();
    while let Some((uri, depth)) = stack.pop() {
        let Some(post) = by_uri.get(uri) else {
            continue;
        };
        if !visited.insert(uri) {
            continue;
        }
        chain.push(ThreadedPost {
            generation: depth,
            post: post.clone(),
        });
        if let Some(kids) = children.get(uri) {
            stack.extend(kids.iter().rev().map(|kid| (kid, depth + 1)));
        }
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline_types::{PostStats, Profile, ProfileId, Timestamp, ViewerState};

    fn uri(id: &str) -> PostUri {
        PostUri::new_unchecked(format!("at://did:plc:a/post/{id}"))
    }

    fn post(id: &str, parent: Option<&str>, at: i64) -> Post {
        Post {
            uri: uri(id),
            cid: format!("cid-{id}"),
            author: Profile {
                id: ProfileId::new_unchecked("did:plc:a"),
                handle: "a.test".into(),
                display_name: None,
                avatar: None,
            },
            text: id.into(),
            indexed_at: Timestamp::from_millis(at),
            reply_root: parent.map(|_| uri("root")),
            reply_parent: parent.map(uri),
            stats: PostStats::default(),
            viewer: ViewerState::default(),
        }
    }

    fn shape(chain: &[ThreadedPost]) -> Vec<(i64, String)> {
        chain
            .iter()
            .map(|t| (t.generation, t.post.text.clone()))
            .collect()
    }

    #[test]
    fn anchor_then_ancestors_then_descendants() {
        let posts = vec![
            post("root", None, 1),
            post("mid", Some("root"), 2),
            post("op", Some("mid"), 3),
            post("r1", Some("op"), 4),
            post("r2", Some("r1"), 5),
        ];
        let chain = order_chain(&uri("op"), posts);
        assert_eq!(
            shape(&chain),
            vec![
                (0, "op".into()),
                (-1, "mid".into()),
                (-2, "root".into()),
                (1, "r1".into()),
                (2, "r2".into()),
            ]
        );
    }

    #[test]
    fn descendants_are_preorder_oldest_sibling_first() {
        let posts = vec![
            post("root", None, 1),
            post("b", Some("root"), 5),
            post("a", Some("root"), 2),
            post("a1", Some("a"), 3),
        ];
        let chain = order_chain(&uri("root"), posts);
        assert_eq!(
            shape(&chain),
            vec![
                (0, "root".into()),
                (1, "a".into()),
                (2, "a1".into()),
                (1, "b".into()),
            ]
        );
    }

    #[test]
    fn missing_anchor_yields_nothing() {
        let chain = order_chain(&uri("op"), vec![post("root", None, 1)]);
        assert!(chain.is_empty());
    }

    #[test]
    fn parent_cycle_terminates() {
        let mut a = post("a", Some("b"), 1);
        a.reply_root = Some(uri("a"));
        let b = post("b", Some("a"), 2);
        let chain = order_chain(&uri("a"), vec![a, b]);
        assert_eq!(chain.len(), 2);
    }
}
