//! Stream combinators for reactive timeline reads.
//!
//! All combinators take and return `BoxStream<'static, _>` so they compose
//! freely with the cache's `observe_*` streams. Dropping the output stream
//! drops every input stream with it.

use futures_util::future::{self, Either};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

enum Side<L, R> {
    Left(L),
    Right(R),
}

/// Pair the latest values of two streams.
///
/// Emits once both inputs have emitted, then on every emission of either.
/// Ends when both inputs end.
pub fn combine_latest<A, B>(
    left: BoxStream<'static, A>,
    right: BoxStream<'static, B>,
) -> BoxStream<'static, (A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    stream::select(left.map(Side::Left), right.map(Side::Right))
        .scan((None::<A>, None::<B>), |latest, side| {
            match side {
                Side::Left(a) => latest.0 = Some(a),
                Side::Right(b) => latest.1 = Some(b),
            }
            let pair = match latest {
                (Some(a), Some(b)) => Some((a.clone(), b.clone())),
                _ => None,
            };
            future::ready(Some(pair))
        })
        .filter_map(future::ready)
        .boxed()
}

/// Drop consecutive duplicates.
pub fn distinct_until_changed<T>(input: BoxStream<'static, T>) -> BoxStream<'static, T>
where
    T: Clone + PartialEq + Send + 'static,
{
    input
        .scan(None::<T>, |last, item| {
            let fresh = if last.as_ref() == Some(&item) {
                None
            } else {
                *last = Some(item.clone());
                Some(item)
            };
            future::ready(Some(fresh))
        })
        .filter_map(future::ready)
        .boxed()
}

struct Switch<T, U, F> {
    outer: Option<BoxStream<'static, T>>,
    inner: Option<BoxStream<'static, U>>,
    project: F,
}

enum Step<T, U> {
    Outer(Option<T>),
    Inner(Option<U>),
}

/// Map each outer value to a stream and follow only the newest one.
///
/// A new outer value drops the previous inner stream before its next
/// emission. Ends when the outer stream and the current inner stream have
/// both ended.
pub fn flat_map_latest<T, U, F>(outer: BoxStream<'static, T>, project: F) -> BoxStream<'static, U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> BoxStream<'static, U> + Send + 'static,
{
    let state = Switch {
        outer: Some(outer),
        inner: None,
        project,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            let step = match (state.outer.as_mut(), state.inner.as_mut()) {
                (None, None) => return None,
                (Some(outer), None) => Step::Outer(outer.next().await),
                (None, Some(inner)) => Step::Inner(inner.next().await),
                // Outer is polled first so a switch wins over a stale emission.
                (Some(outer), Some(inner)) => match future::select(outer.next(), inner.next()).await
                {
                    Either::Left((value, _)) => Step::Outer(value),
                    Either::Right((value, _)) => Step::Inner(value),
                },
            };
            match step {
                Step::Outer(Some(value)) => state.inner = Some((state.project)(value)),
                Step::Outer(None) => state.outer = None,
                Step::Inner(Some(value)) => return Some((value, state)),
                Step::Inner(None) => state.inner = None,
            }
        }
    })
    .boxed()
}

/// Current value of a watch channel, then every change.
///
/// Ends when the sender is dropped.
pub fn watch_stream<T>(receiver: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    stream::unfold((receiver, false), |(mut receiver, primed)| async move {
        if primed && receiver.changed().await.is_err() {
            return None;
        }
        let value = receiver.borrow_and_update().clone();
        Some((value, (receiver, true)))
    })
    .boxed()
}
