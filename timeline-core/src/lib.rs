//! # timeline-core
//!
//! Pure logic for the federated timeline sync engine (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for timeline
//! sync without any network or disk I/O:
//! - [`PagerState`] - cursor bookkeeping for one pagination session
//! - [`TimelineLoadState`] - lifecycle of one open timeline
//! - [`reconstruct`] - reply chain to thread items
//! - [`assemble`] - cached row to timeline item
//! - [`has_new_content`] - update poll comparison
//!
//! The actual I/O (network, disk) is performed by `timeline-client`, which
//! interprets the decisions and actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assemble;
pub mod pager;
pub mod poll;
pub mod state;
pub mod thread;

pub use assemble::{assemble, dedupe_by_id};
pub use pager::{PagerDecision, PagerState};
pub use poll::{has_new_content, poll_interval, FEED_POLL_INTERVAL, PROFILE_POLL_INTERVAL};
pub use state::{LoadAction, LoadEvent, Settled, TimelineLoadState};
pub use thread::reconstruct;
