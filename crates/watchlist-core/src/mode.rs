use crate::{error::WatchError, types::WatchMode};

/// Outcome of feeding one signal to the [`ModeController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTransition {
    /// Nothing changed.
    Unchanged,
    /// Mode decided before the connection is ready; connect-time work waits.
    Decided(WatchMode),
    /// Mode is (re)entered on a live connection; connect-time work runs now.
    Entered(WatchMode),
}

/// Per-connection push/pull decision.
///
/// `Undetermined` moves to `Push` or `Pull` once per connection. The only
/// late switch allowed is `Pull -> Push`, when the capability announcement
/// arrives after a connect that defaulted to polling.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    mode: WatchMode,
    capability_seen: bool,
    connected: bool,
}

impl ModeController {
    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the recurring poll timer should be running.
    pub fn poll_timer_armed(&self) -> bool {
        self.connected && self.mode == WatchMode::Pull
    }

    pub fn on_connect(&mut self) -> ModeTransition {
        self.connected = true;
        if self.mode == WatchMode::Undetermined {
            self.mode = WatchMode::Pull;
        }
        ModeTransition::Entered(self.mode)
    }

    pub fn on_capabilities(
        &mut self,
        subscribe_supported: bool,
    ) -> Result<ModeTransition, WatchError> {
        if self.capability_seen {
            return Err(WatchError::invalid_mode(self.mode, "capabilities"));
        }
        self.capability_seen = true;

        let transition = match (subscribe_supported, self.mode) {
            (true, WatchMode::Undetermined) => {
                self.mode = WatchMode::Push;
                ModeTransition::Decided(WatchMode::Push)
            }
            (true, WatchMode::Pull) => {
                self.mode = WatchMode::Push;
                if self.connected {
                    ModeTransition::Entered(WatchMode::Push)
                } else {
                    ModeTransition::Decided(WatchMode::Push)
                }
            }
            (false, WatchMode::Undetermined) => {
                self.mode = WatchMode::Pull;
                ModeTransition::Decided(WatchMode::Pull)
            }
            (false, WatchMode::Pull) => ModeTransition::Unchanged,
            (_, WatchMode::Push) => {
                return Err(WatchError::invalid_mode(self.mode, "capabilities"));
            }
        };
        Ok(transition)
    }

    /// Forget the connection and the decision taken for it.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
