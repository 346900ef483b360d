//! Background polling for new timeline content.
//!
//! While a timeline is observed, [`UpdatePoller::watch`] fetches the single
//! newest remote entry on a fixed interval, persists it without touching the
//! caller's page window, and reports whether it differs from the newest
//! entry below the last refresh watermark.

use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use timeline_core::{has_new_content, poll_interval};
use timeline_store::{TimelineStore, WriteBatch};
use timeline_types::{FeedReason, ProfileId, SourceRef, Timeline, Timestamp};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::FeedApi;
use crate::error::ClientError;
use crate::flow::{distinct_until_changed, flat_map_latest};
use crate::retry::RetryPolicy;

/// Polls remote sources for content newer than the last refresh.
pub struct UpdatePoller {
    api: Arc<dyn FeedApi>,
    store: Arc<dyn TimelineStore>,
    retry: RetryPolicy,
    feed_interval: Duration,
    profile_interval: Duration,
}

impl UpdatePoller {
    /// Create a poller.
    pub fn new(
        api: Arc<dyn FeedApi>,
        store: Arc<dyn TimelineStore>,
        retry: RetryPolicy,
        feed_interval: Duration,
        profile_interval: Duration,
    ) -> Self {
        Self {
            api,
            store,
            retry,
            feed_interval,
            profile_interval,
        }
    }

    /// Poll interval for a source.
    pub fn interval_for(&self, source: &SourceRef) -> Duration {
        poll_interval(source, self.feed_interval, self.profile_interval)
    }

    /// Run one poll: fetch the newest remote entry, persist it, and compare.
    ///
    /// The entry is upserted into the partition without a reset, so it lands
    /// above `watermark` and stays out of pages anchored there. A pinned
    /// entry is not new content and is not persisted.
    pub async fn poll_once(
        &self,
        viewer: &ProfileId,
        source: &SourceRef,
        watermark: Timestamp,
    ) -> Result<bool, ClientError> {
        let source_id = source.source_id();
        let page = self
            .retry
            .run(|| self.api.fetch_single_newest(source))
            .await?;

        if let Some(entry) = page
            .feed
            .first()
            .filter(|entry| entry.reason != Some(FeedReason::Pin))
        {
            let mut batch = WriteBatch::new();
            batch.add_feed_entry(viewer, &source_id, entry);
            self.store.apply_batch(batch).await?;
        }

        let polled = self
            .store
            .newest_item_key(viewer, &source_id, Timestamp::now())
            .await?;
        let known = self
            .store
            .newest_item_key(viewer, &source_id, watermark)
            .await?;

        let fresh = has_new_content(polled.as_ref(), known.as_ref());
        debug!(source = %source, fresh, "Polled for updates");
        Ok(fresh)
    }

    /// Stream of "has new content" flags for `viewer`'s view of `timeline`.
    ///
    /// Emits `false` whenever the watermark moves (a refresh), then the result
    /// of each poll tick. Failed ticks emit nothing. Dropping the stream
    /// stops polling.
    pub fn watch(self: &Arc<Self>, viewer: ProfileId, timeline: &Timeline) -> BoxStream<'static, bool> {
        let source = timeline.source_ref();
        let period = self.interval_for(&source);
        let watermarks = distinct_until_changed(
            self.store
                .observe_last_fetch_key(viewer.clone(), source.source_id()),
        );

        let poller = Arc::clone(self);
        let flags = flat_map_latest(watermarks, move |watermark| match watermark {
            None => stream::once(future::ready(false)).boxed(),
            Some(at) => {
                let ticks = PollTicks {
                    poller: Arc::clone(&poller),
                    viewer: viewer.clone(),
                    source: source.clone(),
                    watermark: at,
                    period,
                    timer: None,
                };
                stream::once(future::ready(false))
                    .chain(ticks.into_stream())
                    .boxed()
            }
        });
        distinct_until_changed(flags)
    }
}

struct PollTicks {
    poller: Arc<UpdatePoller>,
    viewer: ProfileId,
    source: SourceRef,
    watermark: Timestamp,
    period: Duration,
    timer: Option<Interval>,
}

impl PollTicks {
    /// Wait for the next tick. The first tick fires one period after the
    /// first call.
    async fn tick(&mut self) {
        let period = self.period;
        let timer = self.timer.get_or_insert_with(|| {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        timer.tick().await;
    }

    fn into_stream(self) -> BoxStream<'static, bool> {
        stream::unfold(self, |mut ticks| async move {
            loop {
                ticks.tick().await;
                match ticks
                    .poller
                    .poll_once(&ticks.viewer, &ticks.source, ticks.watermark)
                    .await
                {
                    Ok(fresh) => return Some((fresh, ticks)),
                    Err(e) => {
                        warn!(source = %ticks.source, error = %e, "Update poll failed, skipping tick");
                    }
                }
            }
        })
        .boxed()
    }
}
