//! Shared fixtures for client tests.

use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use timeline_store::SqliteCache;
use timeline_types::{
    FeedReason, FeedViewPost, FetchedPage, Post, PostStats, PostUri, Profile, ProfileId,
    ReplyContext, Timestamp, ViewerState,
};
use tokio::sync::mpsc;

use crate::api::MockFeedApi;
use crate::config::Config;
use crate::facade::TimelineSyncFacade;
use crate::write_queue::{ChannelWriteQueue, OutboundWrite};

pub(crate) fn viewer() -> ProfileId {
    ProfileId::new_unchecked("did:plc:viewer")
}

pub(crate) fn profile(name: &str) -> Profile {
    Profile {
        id: ProfileId::new_unchecked(format!("did:plc:{name}")),
        handle: format!("{name}.test"),
        display_name: None,
        avatar: None,
    }
}

pub(crate) fn post_uri(id: &str) -> PostUri {
    PostUri::new_unchecked(format!("at://did:plc:alice/app.bsky.feed.post/{id}"))
}

pub(crate) fn post(id: &str, at: i64) -> Post {
    Post {
        uri: post_uri(id),
        cid: format!("cid-{id}"),
        author: profile("alice"),
        text: id.into(),
        indexed_at: Timestamp::from_millis(at),
        reply_root: None,
        reply_parent: None,
        stats: PostStats::default(),
        viewer: ViewerState::default(),
    }
}

pub(crate) fn reply(id: &str, parent: &Post, root: &Post, at: i64) -> Post {
    Post {
        reply_root: Some(root.uri.clone()),
        reply_parent: Some(parent.uri.clone()),
        ..post(id, at)
    }
}

pub(crate) fn entry(post: Post) -> FeedViewPost {
    FeedViewPost::single(post)
}

pub(crate) fn reply_entry(post: Post, parent: Post, root: Post) -> FeedViewPost {
    FeedViewPost {
        post,
        reply: Some(ReplyContext {
            root: Some(root),
            parent: Some(parent),
            grandparent_author: None,
        }),
        reason: None,
    }
}

pub(crate) fn repost_entry(post: Post, by: &str, at: i64) -> FeedViewPost {
    FeedViewPost {
        post,
        reply: None,
        reason: Some(FeedReason::Repost {
            by: profile(by),
            indexed_at: Timestamp::from_millis(at),
        }),
    }
}

pub(crate) fn page(feed: Vec<FeedViewPost>, cursor: Option<&str>) -> FetchedPage {
    FetchedPage {
        feed,
        cursor: cursor.map(str::to_owned),
    }
}

/// Config with small pages, no retries and fast polling.
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.fetch.page_limit = 2;
    config.fetch.retry_attempts = 1;
    config.fetch.retry_base_delay_ms = 1;
    config.polling.feed_interval_ms = 20;
    config.polling.profile_interval_ms = 30;
    config
}

pub(crate) struct Harness {
    pub api: MockFeedApi,
    pub store: SqliteCache,
    pub facade: TimelineSyncFacade,
    pub writes: mpsc::Receiver<OutboundWrite>,
}

pub(crate) async fn harness() -> Harness {
    let api = MockFeedApi::new();
    let store = SqliteCache::in_memory().await.unwrap();
    let (queue, writes) = ChannelWriteQueue::new(16);
    let facade = TimelineSyncFacade::new(
        Arc::new(api.clone()),
        Arc::new(store.clone()),
        Arc::new(queue),
        &test_config(),
    );
    Harness {
        api,
        store,
        facade,
        writes,
    }
}

/// Next emission, failing the test after one second.
pub(crate) async fn next<T>(stream: &mut BoxStream<'static, T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("stream stalled")
        .expect("stream ended")
}

/// Emissions until one satisfies `done`, failing the test after one second.
pub(crate) async fn next_matching<T>(
    stream: &mut BoxStream<'static, T>,
    mut done: impl FnMut(&T) -> bool,
) -> T {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let value = stream.next().await.expect("stream ended");
            if done(&value) {
                return value;
            }
        }
    })
    .await
    .expect("no matching emission")
}

/// True if the stream emits nothing within `window`.
pub(crate) async fn stays_quiet<T>(stream: &mut BoxStream<'static, T>, window: Duration) -> bool {
    tokio::time::timeout(window, stream.next()).await.is_err()
}
