use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::{
    error::{WatchError, WatchErrorCategory},
    types::{WatchCommand, WatchEvent, WatchSignal},
};

/// Broadcast event stream type used by event subscribers.
pub type EventStream = broadcast::Receiver<WatchEvent>;

/// Errors returned by channel operations.
#[derive(Debug, Error)]
pub enum WatchChannelError {
    /// The signal receiver side is closed.
    #[error("signal channel is closed")]
    SignalChannelClosed,
    /// The transport stopped reading outgoing commands.
    #[error("command channel is closed")]
    CommandChannelClosed,
}

/// Receiving halves handed to the runtime and the transport.
#[derive(Debug)]
pub struct WatchReceivers {
    /// Signals consumed by the runtime.
    pub signals: mpsc::Receiver<WatchSignal>,
    /// Commands the transport writes to the connection.
    pub commands: mpsc::Receiver<WatchCommand>,
}

impl From<WatchChannelError> for WatchError {
    fn from(err: WatchChannelError) -> Self {
        let code = match err {
            WatchChannelError::SignalChannelClosed => "signal_channel_closed",
            WatchChannelError::CommandChannelClosed => "command_channel_closed",
        };
        WatchError::new(WatchErrorCategory::Channel, code, err.to_string())
    }
}

/// Signal sender plus outbound halves, held by the runtime's host.
///
/// The runtime stops once every clone of this set is dropped.
#[derive(Clone, Debug)]
pub struct WatchChannels {
    signal_tx: mpsc::Sender<WatchSignal>,
    sink: WatchSink,
}

/// Outbound halves owned by the runtime: ordered commands and broadcast events.
#[derive(Clone, Debug)]
pub struct WatchSink {
    command_tx: mpsc::Sender<WatchCommand>,
    event_tx: broadcast::Sender<WatchEvent>,
}

impl WatchChannels {
    /// Create a new channel set and return it with the receiving halves.
    pub fn new(
        signal_buffer: usize,
        command_buffer: usize,
        event_buffer: usize,
    ) -> (Self, WatchReceivers) {
        let (signal_tx, signals) = mpsc::channel(signal_buffer.max(1));
        let (command_tx, commands) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                signal_tx,
                sink: WatchSink {
                    command_tx,
                    event_tx,
                },
            },
            WatchReceivers { signals, commands },
        )
    }

    /// Outbound halves, without the signal sender.
    pub fn sink(&self) -> WatchSink {
        self.sink.clone()
    }

    /// Subscribe to emitted events.
    pub fn subscribe(&self) -> EventStream {
        self.sink.event_tx.subscribe()
    }

    /// Deliver one signal to the runtime.
    pub async fn send_signal(&self, signal: WatchSignal) -> Result<(), WatchChannelError> {
        self.signal_tx
            .send(signal)
            .await
            .map_err(|_| WatchChannelError::SignalChannelClosed)
    }
}

impl WatchSink {
    /// Queue one command for the transport, preserving issue order.
    pub async fn send_command(&self, command: WatchCommand) -> Result<(), WatchChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| WatchChannelError::CommandChannelClosed)
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: WatchEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PresenceChange, WatchMode};

    #[tokio::test]
    async fn sends_signals_to_receiver() {
        let (channels, mut receivers) = WatchChannels::new(8, 8, 8);
        channels
            .send_signal(WatchSignal::PollResponse {
                present: vec!["foo".to_owned()],
            })
            .await
            .expect("signal send should work");

        let signal = receivers
            .signals
            .recv()
            .await
            .expect("receiver should have a signal");
        match signal {
            WatchSignal::PollResponse { present } => assert_eq!(present, vec!["foo"]),
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn keeps_command_order_for_transport() {
        let (channels, mut receivers) = WatchChannels::new(4, 4, 4);
        let sink = channels.sink();
        for identities in [vec!["a".to_owned()], vec!["b".to_owned()]] {
            sink.send_command(WatchCommand::Poll { identities })
                .await
                .expect("command send should work");
        }

        let first = receivers.commands.recv().await.expect("first command");
        let second = receivers.commands.recv().await.expect("second command");
        assert_eq!(first.to_string(), "POLL a");
        assert_eq!(second.to_string(), "POLL b");
    }

    #[tokio::test]
    async fn reports_closed_command_channel() {
        let (channels, receivers) = WatchChannels::new(1, 1, 1);
        drop(receivers);
        let err = channels
            .sink()
            .send_command(WatchCommand::Poll {
                identities: vec!["a".to_owned()],
            })
            .await
            .expect_err("closed transport should fail");
        assert!(matches!(err, WatchChannelError::CommandChannelClosed));

        let err = WatchError::from(err);
        assert_eq!(err.category, WatchErrorCategory::Channel);
        assert_eq!(err.code, "command_channel_closed");
    }

    #[tokio::test]
    async fn signal_receiver_closes_when_every_sender_is_dropped() {
        let (channels, mut receivers) = WatchChannels::new(1, 1, 1);
        let sink = channels.sink();
        drop(channels);

        assert!(receivers.signals.recv().await.is_none());
        sink.emit(WatchEvent::Notification {
            text: "no subscribers".to_owned(),
        });
    }

    #[tokio::test]
    async fn fans_out_events_to_subscribers() {
        let (channels, _receivers) = WatchChannels::new(4, 4, 16);
        let mut a = channels.subscribe();
        let mut b = channels.subscribe();

        let sink = channels.sink();
        sink.emit(WatchEvent::ModeChanged {
            mode: WatchMode::Pull,
        });
        sink.emit(WatchEvent::SignedOn(PresenceChange {
            identity: "foo".to_owned(),
            timestamp_ms: 1,
        }));

        for _ in 0..2 {
            let event_a = a.recv().await.expect("subscriber a should receive event");
            let event_b = b.recv().await.expect("subscriber b should receive event");
            assert_eq!(event_a, event_b);
        }
    }
}
