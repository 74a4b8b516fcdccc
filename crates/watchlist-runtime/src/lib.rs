use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use watchlist_core::{
    EventStream, WatchChannels, WatchCommand, WatchEffect, WatchError, WatchList,
    WatchListConfig, WatchReceivers, WatchSignal, WatchSink,
};

const SIGNAL_BUFFER: usize = 128;
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 512;

#[derive(Clone, Debug)]
pub struct WatchRuntimeHandle {
    channels: WatchChannels,
    stop: CancellationToken,
}

impl WatchRuntimeHandle {
    pub async fn send(&self, signal: WatchSignal) -> Result<(), WatchError> {
        self.channels.send_signal(signal).await?;
        Ok(())
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    /// Stop the runtime task. Pending signals are discarded.
    ///
    /// Dropping every handle also stops it, once queued signals are handled.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }
}

/// A spawned runtime: the control handle, the transport's command feed and
/// the task itself.
#[derive(Debug)]
pub struct SpawnedRuntime {
    pub handle: WatchRuntimeHandle,
    pub commands: mpsc::Receiver<WatchCommand>,
    pub task: JoinHandle<()>,
}

pub fn spawn_runtime(config: WatchListConfig) -> Result<SpawnedRuntime, WatchError> {
    let watch = WatchList::new(config)?;
    let (channels, receivers) = WatchChannels::new(SIGNAL_BUFFER, COMMAND_BUFFER, EVENT_BUFFER);
    let WatchReceivers { signals, commands } = receivers;
    let stop = CancellationToken::new();

    let runtime = WatchRuntime {
        sink: channels.sink(),
        signal_rx: signals,
        watch,
        poll_timer: None,
        stop: stop.child_token(),
    };
    let task = tokio::spawn(async move {
        runtime.run().await;
    });

    Ok(SpawnedRuntime {
        handle: WatchRuntimeHandle { channels, stop },
        commands,
        task,
    })
}

struct WatchRuntime {
    sink: WatchSink,
    signal_rx: mpsc::Receiver<WatchSignal>,
    watch: WatchList,
    poll_timer: Option<Interval>,
    stop: CancellationToken,
}

impl WatchRuntime {
    async fn run(mut self) {
        info!(
            poll_interval_secs = self.watch.config().poll_interval_secs,
            "watch list runtime started"
        );
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                signal = self.signal_rx.recv() => {
                    let Some(signal) = signal else {
                        debug!("every runtime handle dropped");
                        break;
                    };
                    self.handle_signal(signal).await;
                }
                _ = next_tick(&mut self.poll_timer) => {
                    let effects = self.watch.on_timer_fire(now_ms());
                    self.apply_effects(effects).await;
                }
            }
        }
        info!("watch list runtime stopped");
    }

    async fn handle_signal(&mut self, signal: WatchSignal) {
        trace!(?signal, "handling signal");
        match self.watch.apply(signal, now_ms()) {
            Ok(effects) => self.apply_effects(effects).await,
            Err(err) => warn!(%err, "signal rejected"),
        }
    }

    async fn apply_effects(&mut self, effects: Vec<WatchEffect>) {
        for effect in effects {
            match effect {
                WatchEffect::Send(command) => {
                    if let Err(err) = self.sink.send_command(command).await {
                        warn!(%err, "dropping outgoing command");
                    }
                }
                WatchEffect::Emit(event) => self.sink.emit(event),
                WatchEffect::ArmPollTimer => self.arm_poll_timer(),
                WatchEffect::DisarmPollTimer => {
                    if self.poll_timer.take().is_some() {
                        debug!("poll timer disarmed");
                    }
                }
            }
        }
    }

    fn arm_poll_timer(&mut self) {
        let period = Duration::from_secs(self.watch.config().poll_interval_secs.max(1));
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll_timer = Some(timer);
        debug!(period_secs = period.as_secs(), "poll timer armed");
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
