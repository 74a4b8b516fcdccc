use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::WatchError, identity::CaseMapping};

/// Default delay between two poll cycles, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
/// Default ceiling for the identity-list part of one outgoing command.
pub const DEFAULT_BATCH_LIMIT: usize = 400;

/// Presence discovery strategy used for the current connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// No capability signal seen and not connected yet.
    #[default]
    Undetermined,
    /// Server-side subscription; the poll timer stays disarmed.
    Push,
    /// Client-side polling on a recurring timer.
    Pull,
}

/// Runtime configuration for one watch list instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchListConfig {
    /// Tracked identities, separated by commas and/or spaces.
    pub nicks: String,
    /// Delay between poll cycles in seconds.
    pub poll_interval_secs: u64,
    /// Maximum joined length of one batch.
    pub batch_limit: usize,
    /// Abandon a poll cycle that has been outstanding for this long.
    ///
    /// `None` keeps a cycle outstanding until reconnect.
    pub stale_cycle_timeout_ms: Option<u64>,
}

impl Default for WatchListConfig {
    fn default() -> Self {
        Self {
            nicks: String::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            stale_cycle_timeout_ms: None,
        }
    }
}

impl WatchListConfig {
    /// Build a config tracking `nicks` with default tuning.
    pub fn with_nicks(nicks: impl Into<String>) -> Self {
        Self {
            nicks: nicks.into(),
            ..Self::default()
        }
    }

    /// Reject tuning values the engine cannot work with.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.poll_interval_secs == 0 {
            return Err(WatchError::invalid_config(
                "poll_interval_secs",
                "must be at least 1",
            ));
        }
        if self.batch_limit == 0 {
            return Err(WatchError::invalid_config(
                "batch_limit",
                "must be at least 1",
            ));
        }
        if self.stale_cycle_timeout_ms == Some(0) {
            return Err(WatchError::invalid_config(
                "stale_cycle_timeout_ms",
                "must be greater than 0 when set",
            ));
        }
        Ok(())
    }
}

/// Capability information announced by the server after connecting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServerCapabilities {
    /// Whether the push subscription command is available.
    pub subscribe_supported: bool,
    /// Collation announced for this connection, when any.
    pub case_mapping: Option<CaseMapping>,
}

/// Outgoing protocol command, one per batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WatchCommand {
    /// `SUBSCRIBE +a +b ...`
    Subscribe { identities: Vec<String> },
    /// `POLL a b ...`
    Poll { identities: Vec<String> },
}

impl WatchCommand {
    /// Identities carried by this command, in send order.
    pub fn identities(&self) -> &[String] {
        match self {
            Self::Subscribe { identities } | Self::Poll { identities } => identities,
        }
    }
}

impl fmt::Display for WatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe { identities } => {
                f.write_str("SUBSCRIBE")?;
                for identity in identities {
                    write!(f, " +{identity}")?;
                }
                Ok(())
            }
            Self::Poll { identities } => {
                f.write_str("POLL")?;
                for identity in identities {
                    write!(f, " {identity}")?;
                }
                Ok(())
            }
        }
    }
}

/// Presence transition payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceChange {
    /// Identity text as reported (sign-on) or as tracked (sign-off).
    pub identity: String,
    /// Detection time in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
}

/// Event output forwarded to the host's event dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WatchEvent {
    /// A tracked identity came online.
    SignedOn(PresenceChange),
    /// A tracked identity went offline.
    SignedOff(PresenceChange),
    /// The discovery strategy for this connection was decided.
    ModeChanged {
        /// New mode.
        mode: WatchMode,
    },
    /// Native push notification, relayed unmodified.
    Notification {
        /// Raw notification text.
        text: String,
    },
}

/// Side effect requested by the engine; the host carries it out in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEffect {
    /// Write one command to the connection.
    Send(WatchCommand),
    /// Dispatch one event.
    Emit(WatchEvent),
    /// Start (or restart) the recurring poll timer.
    ArmPollTimer,
    /// Stop the recurring poll timer.
    DisarmPollTimer,
}

/// Input signal delivered by the host to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// Connection registered and ready for commands.
    Connected,
    /// Server capabilities were announced.
    Capabilities(ServerCapabilities),
    /// Response to one pull query: identities that are online.
    PollResponse {
        /// Raw tokens; the first one may carry a leading `:`.
        present: Vec<String>,
    },
    /// Native push notification line.
    Notification {
        /// Raw notification text.
        text: String,
    },
    /// Connection lost; the engine re-initializes.
    Disconnected,
    /// Replace the configuration and reset.
    Reconfigure(WatchListConfig),
}
