//! Update polling rules.
//!
//! Decides how often a timeline polls for new content and whether a poll
//! result means there is something new above the last refresh.

use std::time::Duration;
use timeline_types::{PostUri, SourceRef};

/// Default poll interval for the home feed, algorithmic feeds and lists.
pub const FEED_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default poll interval for profile timelines.
pub const PROFILE_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Pick the poll interval for a source.
pub fn poll_interval(source: &SourceRef, feed: Duration, profile: Duration) -> Duration {
    if source.is_profile() {
        profile
    } else {
        feed
    }
}

/// True when the newest post seen by a poll differs from the newest post
/// below the last refresh watermark.
///
/// A poll that saw nothing never reports new content.
pub fn has_new_content(polled_newest: Option<&PostUri>, watermark_newest: Option<&PostUri>) -> bool {
    match polled_newest {
        Some(polled) => watermark_newest != Some(polled),
        None => false,
    }
}
