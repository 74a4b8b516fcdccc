//! Presence tracking for IRC watch lists.
//!
//! This crate holds the sans-IO engine: identity collation, batching of the
//! tracked set into protocol-safe commands, push/pull mode selection, poll
//! cycle bookkeeping and the response correlation that turns poll answers
//! into sign-on/sign-off events.

/// Split the tracked set into length-bounded batches.
pub mod batch;
/// Signal/command/event channel primitives for hosts.
pub mod channel;
/// Match poll responses to batches and compute presence transitions.
pub mod correlator;
/// Stable error types.
pub mod error;
/// Identity collation and configuration list parsing.
pub mod identity;
/// Per-connection push/pull decision.
pub mod mode;
/// Poll cycle bookkeeping.
pub mod poller;
/// Key-stable presence registry.
pub mod registry;
/// Host-facing protocol types (signals, commands, events, config).
pub mod types;
/// Engine tying the components together.
pub mod watch_list;

pub use batch::{Batch, split_batches};
pub use channel::{EventStream, WatchChannelError, WatchChannels, WatchReceivers, WatchSink};
pub use correlator::apply_response;
pub use error::{WatchError, WatchErrorCategory};
pub use identity::{CaseMapping, Collator, TrackedIdentity, parse_identity_list};
pub use mode::{ModeController, ModeTransition};
pub use poller::{PollCycle, PresencePoller};
pub use registry::PresenceRegistry;
pub use types::{
    DEFAULT_BATCH_LIMIT, DEFAULT_POLL_INTERVAL_SECS, PresenceChange, ServerCapabilities,
    WatchCommand, WatchEffect, WatchEvent, WatchListConfig, WatchMode, WatchSignal,
};
pub use watch_list::WatchList;
