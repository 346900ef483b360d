//! Change notification and reactive reads.
//!
//! Every committed batch bumps a version counter on each topic it touched.
//! Reactive reads subscribe to the topics their query depends on and re-run
//! the query after each bump. Bumps that land while a query runs coalesce
//! into one re-run.

use dashmap::DashMap;
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use timeline_types::{ProfileId, SourceId};
use tokio::sync::watch;
use tracing::error;

use crate::error::StorageError;

/// What a committed write touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Timeline rows or the watermark of one partition.
    Partition(ProfileId, SourceId),
    /// A viewer's preferences or watermarks.
    Viewer(ProfileId),
    /// Shared entities: posts, profiles, sources, reactions.
    Content,
}

/// Version counters per topic.
pub(crate) struct ChangeNotifier {
    partitions: DashMap<(ProfileId, SourceId), watch::Sender<u64>>,
    viewers: DashMap<ProfileId, watch::Sender<u64>>,
    content: watch::Sender<u64>,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        let (content, _) = watch::channel(0);
        Self {
            partitions: DashMap::new(),
            viewers: DashMap::new(),
            content,
        }
    }

    /// Receiver that fires after the next committed change to `topic`.
    pub(crate) fn subscribe(&self, topic: &Topic) -> watch::Receiver<u64> {
        match topic {
            Topic::Partition(viewer, source) => self
                .partitions
                .entry((viewer.clone(), source.clone()))
                .or_insert_with(|| watch::channel(0).0)
                .subscribe(),
            Topic::Viewer(viewer) => self
                .viewers
                .entry(viewer.clone())
                .or_insert_with(|| watch::channel(0).0)
                .subscribe(),
            Topic::Content => self.content.subscribe(),
        }
    }

    /// Bump one topic.
    pub(crate) fn notify(&self, topic: &Topic) {
        match topic {
            Topic::Partition(viewer, source) => {
                if let Some(tx) = self.partitions.get(&(viewer.clone(), source.clone())) {
                    tx.send_modify(|version| *version += 1);
                }
            }
            Topic::Viewer(viewer) => {
                if let Some(tx) = self.viewers.get(viewer) {
                    tx.send_modify(|version| *version += 1);
                }
            }
            Topic::Content => self.content.send_modify(|version| *version += 1),
        }
    }

    /// Bump every topic scoped to `viewer`.
    pub(crate) fn notify_viewer(&self, viewer: &ProfileId) {
        for entry in self.partitions.iter() {
            if entry.key().0 == *viewer {
                entry.value().send_modify(|version| *version += 1);
            }
        }
        self.notify(&Topic::Viewer(viewer.clone()));
    }
}

struct Requery<F> {
    receivers: Vec<watch::Receiver<u64>>,
    query: F,
    primed: bool,
}

/// Stream that runs `query` once, then again after every change on any of
/// `receivers`.
///
/// A failed read is unrecoverable for the stream: it is logged and the
/// stream ends.
pub(crate) fn requery<T, F, Fut>(
    receivers: Vec<watch::Receiver<u64>>,
    query: F,
) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, StorageError>> + Send + 'static,
{
    let state = Requery {
        receivers,
        query,
        primed: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.primed && !wait_any(&mut state.receivers).await {
            return None;
        }
        state.primed = true;
        match (state.query)().await {
            Ok(value) => Some((value, state)),
            Err(e) => {
                error!(error = %e, "Cache read failed, closing stream");
                None
            }
        }
    })
    .boxed()
}

/// Wait for a change on any receiver. False once no change can arrive.
async fn wait_any(receivers: &mut [watch::Receiver<u64>]) -> bool {
    if receivers.is_empty() {
        return false;
    }
    let changes = receivers.iter_mut().map(|rx| Box::pin(rx.changed()));
    let (result, _, _) = future::select_all(changes).await;
    result.is_ok()
}
