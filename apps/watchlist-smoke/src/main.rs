mod config;
mod logging;

use std::{collections::HashSet, time::Duration};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use watchlist_core::{
    CaseMapping, Collator, ServerCapabilities, WatchCommand, WatchEvent, WatchSignal,
};
use watchlist_runtime::{SpawnedRuntime, WatchRuntimeHandle, spawn_runtime};

use crate::config::SmokeConfig;

const OBSERVE_FOR: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let SpawnedRuntime {
        handle,
        commands,
        task,
    } = match spawn_runtime(config.watch.clone()) {
        Ok(spawned) => spawned,
        Err(err) => {
            eprintln!("Failed to start watch list runtime: {err}");
            std::process::exit(1);
        }
    };
    let mut events = handle.subscribe();

    let case_mapping = config.case_mapping.unwrap_or_default();
    let server = tokio::spawn(simulate_server(
        handle.clone(),
        commands,
        config.online.clone(),
        case_mapping,
    ));

    let capabilities = WatchSignal::Capabilities(ServerCapabilities {
        subscribe_supported: config.push,
        case_mapping: config.case_mapping,
    });
    for signal in [capabilities, WatchSignal::Connected] {
        if let Err(err) = handle.send(signal).await {
            eprintln!("Failed to reach watch list runtime: {err}");
            std::process::exit(1);
        }
    }

    let deadline = tokio::time::sleep(OBSERVE_FOR);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown();
    if let Err(err) = task.await {
        warn!(%err, "runtime task ended abnormally");
    }
    server.abort();
    info!("smoke run finished");
}

fn print_event(event: &WatchEvent) {
    match event {
        WatchEvent::SignedOn(change) => {
            println!("[{}] {} signed on", change.timestamp_ms, change.identity)
        }
        WatchEvent::SignedOff(change) => {
            println!("[{}] {} signed off", change.timestamp_ms, change.identity)
        }
        WatchEvent::ModeChanged { mode } => println!("presence mode: {mode:?}"),
        WatchEvent::Notification { text } => println!("notification: {text}"),
    }
}

/// Stand-in for an IRC server: answers polls from a fixed online set and
/// acknowledges subscriptions with one notification per online identity.
async fn simulate_server(
    handle: WatchRuntimeHandle,
    mut commands: mpsc::Receiver<WatchCommand>,
    online: Vec<String>,
    case_mapping: CaseMapping,
) {
    let online: HashSet<String> = online
        .iter()
        .map(|identity| case_mapping.normalize(identity))
        .collect();

    while let Some(command) = commands.recv().await {
        println!(">> {command}");
        let present: Vec<String> = command
            .identities()
            .iter()
            .filter(|identity| online.contains(&case_mapping.normalize(identity)))
            .cloned()
            .collect();

        let replies = match command {
            WatchCommand::Poll { .. } => {
                let mut present = present;
                if let Some(first) = present.first_mut() {
                    first.insert(0, ':');
                }
                vec![WatchSignal::PollResponse { present }]
            }
            WatchCommand::Subscribe { .. } => present
                .into_iter()
                .map(|identity| WatchSignal::Notification {
                    text: format!("604 {identity} is online"),
                })
                .collect(),
        };

        for reply in replies {
            debug!(?reply, "simulated server reply");
            if handle.send(reply).await.is_err() {
                return;
            }
        }
    }
}
