use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    correlator::apply_response,
    error::WatchError,
    identity::{CaseMapping, Collator, TrackedIdentity, parse_identity_list},
    mode::{ModeController, ModeTransition},
    poller::PresencePoller,
    registry::PresenceRegistry,
    types::{
        ServerCapabilities, WatchCommand, WatchEffect, WatchEvent, WatchListConfig, WatchMode,
        WatchSignal,
    },
};

/// Presence tracking engine for one connection.
///
/// The engine performs no I/O. Every entry point returns the effects the
/// host must carry out, in order. Hosts deliver calls serially and keep
/// pull queries and their responses in FIFO order.
#[derive(Debug, Clone)]
pub struct WatchList {
    config: WatchListConfig,
    configured: Vec<String>,
    default_collator: Arc<dyn Collator>,
    collator: Arc<dyn Collator>,
    registry: PresenceRegistry,
    modes: ModeController,
    poller: PresencePoller,
}

impl WatchList {
    /// Build an engine using the RFC 1459 case mapping until the server
    /// announces its own.
    pub fn new(config: WatchListConfig) -> Result<Self, WatchError> {
        Self::with_collator(config, Arc::new(CaseMapping::default()))
    }

    /// Build an engine with a custom default collator.
    pub fn with_collator(
        config: WatchListConfig,
        collator: Arc<dyn Collator>,
    ) -> Result<Self, WatchError> {
        config.validate()?;
        let configured = parse_identity_list(&config.nicks);
        let registry =
            PresenceRegistry::from_configured(&configured).renormalized(collator.as_ref());
        let poller = PresencePoller::new(config.batch_limit, config.stale_cycle_timeout_ms);
        info!(tracked = registry.len(), "watch list configured");

        Ok(Self {
            config,
            configured,
            default_collator: Arc::clone(&collator),
            collator,
            registry,
            modes: ModeController::default(),
            poller,
        })
    }

    pub fn config(&self) -> &WatchListConfig {
        &self.config
    }

    pub fn mode(&self) -> WatchMode {
        self.modes.mode()
    }

    pub fn is_connected(&self) -> bool {
        self.modes.is_connected()
    }

    pub fn poll_timer_armed(&self) -> bool {
        self.modes.poll_timer_armed() && !self.registry.is_empty()
    }

    /// Pull queries of the current cycle still awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.poller.outstanding()
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Presence flag for `identity` (collated first), `None` if untracked.
    ///
    /// Registry keys are always collated with the active collator, so any
    /// spelling of a configured identity resolves, connected or not.
    pub fn is_online(&self, identity: &str) -> Option<bool> {
        self.registry.is_online(&self.collator.normalize(identity))
    }

    pub fn online_identities(&self) -> Vec<&TrackedIdentity> {
        self.registry.online_identities()
    }

    /// Dispatch one host signal.
    pub fn apply(
        &mut self,
        signal: WatchSignal,
        now_ms: u64,
    ) -> Result<Vec<WatchEffect>, WatchError> {
        let effects = match signal {
            WatchSignal::Connected => self.on_connect(now_ms),
            WatchSignal::Capabilities(capabilities) => self.on_capabilities(capabilities),
            WatchSignal::PollResponse { present } => {
                self.on_poll_response(present.as_slice(), now_ms)
            }
            WatchSignal::Notification { text } => self.on_notification(text),
            WatchSignal::Disconnected => self.reset(),
            WatchSignal::Reconfigure(config) => self.reconfigure(config, now_ms)?,
        };
        Ok(effects)
    }

    /// Connection is ready: collate the tracked set and start the mode.
    pub fn on_connect(&mut self, now_ms: u64) -> Vec<WatchEffect> {
        let previous = self.modes.mode();
        let transition = self.modes.on_connect();
        self.poller.abandon();

        let mut effects = Vec::new();
        let ModeTransition::Entered(mode) = transition else {
            return effects;
        };
        if mode != previous {
            effects.push(WatchEffect::Emit(WatchEvent::ModeChanged { mode }));
        }
        effects.extend(self.enter_mode(mode, now_ms));
        effects
    }

    /// Capability announcement for the current connection.
    pub fn on_capabilities(&mut self, capabilities: ServerCapabilities) -> Vec<WatchEffect> {
        if let Some(case_mapping) = capabilities.case_mapping {
            if self.modes.is_connected() {
                debug!(
                    %case_mapping,
                    "case mapping announced after connect; keeping active collation"
                );
            } else {
                debug!(%case_mapping, "using announced case mapping");
                self.collator = Arc::new(case_mapping);
                self.registry = self.collated_registry();
            }
        }

        let transition = match self.modes.on_capabilities(capabilities.subscribe_supported) {
            Ok(transition) => transition,
            Err(err) => {
                debug!(%err, "ignoring repeated capability announcement");
                return Vec::new();
            }
        };

        match transition {
            ModeTransition::Unchanged => Vec::new(),
            ModeTransition::Decided(mode) => {
                info!(?mode, "presence mode decided");
                let mut effects = vec![WatchEffect::Emit(WatchEvent::ModeChanged { mode })];
                if mode == WatchMode::Push {
                    effects.push(WatchEffect::DisarmPollTimer);
                }
                effects
            }
            ModeTransition::Entered(mode) => {
                info!(?mode, "switching live connection to push mode");
                self.poller.abandon();
                if let Some(case_mapping) = capabilities.case_mapping {
                    self.collator = Arc::new(case_mapping);
                }
                let mut effects = vec![WatchEffect::Emit(WatchEvent::ModeChanged { mode })];
                effects.extend(self.enter_mode(mode, 0));
                effects
            }
        }
    }

    /// Poll timer tick.
    pub fn on_timer_fire(&mut self, now_ms: u64) -> Vec<WatchEffect> {
        if !self.modes.poll_timer_armed() {
            debug!(mode = ?self.modes.mode(), "poll timer fired outside pull mode");
            return Vec::new();
        }
        self.poller
            .on_timer_fire(&self.registry, now_ms)
            .into_iter()
            .map(WatchEffect::Send)
            .collect()
    }

    /// One pull response, matched to the oldest outstanding query.
    pub fn on_poll_response<S: AsRef<str>>(
        &mut self,
        present: &[S],
        now_ms: u64,
    ) -> Vec<WatchEffect> {
        let Some(batch) = self.poller.answer_next() else {
            debug!("dropping unsolicited poll response");
            return Vec::new();
        };
        apply_response(
            &mut self.registry,
            &batch,
            present,
            self.collator.as_ref(),
            now_ms,
        )
        .into_iter()
        .map(WatchEffect::Emit)
        .collect()
    }

    /// Relay a native push notification unmodified.
    pub fn on_notification(&mut self, text: String) -> Vec<WatchEffect> {
        vec![WatchEffect::Emit(WatchEvent::Notification { text })]
    }

    /// Forget the connection: fresh registry, no cycle, undetermined mode.
    pub fn reset(&mut self) -> Vec<WatchEffect> {
        self.poller.abandon();
        self.modes.reset();
        self.collator = Arc::clone(&self.default_collator);
        self.registry = self.collated_registry();
        vec![WatchEffect::DisarmPollTimer]
    }

    /// Replace the configuration and reset the tracked set wholesale.
    ///
    /// A live connection keeps its mode and restarts it with the new set.
    pub fn reconfigure(
        &mut self,
        config: WatchListConfig,
        now_ms: u64,
    ) -> Result<Vec<WatchEffect>, WatchError> {
        config.validate()?;
        self.configured = parse_identity_list(&config.nicks);
        self.poller = PresencePoller::new(config.batch_limit, config.stale_cycle_timeout_ms);
        self.config = config;
        self.registry = self.collated_registry();
        info!(tracked = self.registry.len(), "watch list reconfigured");

        if !self.modes.is_connected() {
            return Ok(Vec::new());
        }
        Ok(self.enter_mode(self.modes.mode(), now_ms))
    }

    fn enter_mode(&mut self, mode: WatchMode, now_ms: u64) -> Vec<WatchEffect> {
        if self.registry.is_empty() {
            debug!(?mode, "no identities tracked; nothing to do on connect");
            return vec![WatchEffect::DisarmPollTimer];
        }

        self.registry = self.collated_registry();

        match mode {
            WatchMode::Push => {
                let mut effects = vec![WatchEffect::DisarmPollTimer];
                effects.extend(
                    self.registry
                        .batches(self.poller.batch_limit())
                        .iter()
                        .map(|batch| {
                            WatchEffect::Send(WatchCommand::Subscribe {
                                identities: batch.to_strings(),
                            })
                        }),
                );
                effects
            }
            WatchMode::Pull => {
                let mut effects = vec![WatchEffect::ArmPollTimer];
                effects.extend(self.on_timer_fire(now_ms));
                effects
            }
            WatchMode::Undetermined => {
                warn!("entered undetermined mode on a live connection");
                Vec::new()
            }
        }
    }

    /// Configured spellings collated with the active collator, all offline.
    fn collated_registry(&self) -> PresenceRegistry {
        PresenceRegistry::from_configured(&self.configured).renormalized(self.collator.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(nicks: &str) -> WatchList {
        WatchList::new(WatchListConfig::with_nicks(nicks)).expect("config should be valid")
    }

    fn sent_lines(effects: &[WatchEffect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                WatchEffect::Send(command) => Some(command.to_string()),
                _ => None,
            })
            .collect()
    }

    fn presence_events(effects: &[WatchEffect]) -> Vec<WatchEvent> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                WatchEffect::Emit(event @ (WatchEvent::SignedOn(_) | WatchEvent::SignedOff(_))) => {
                    Some(event.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn push_capable() -> ServerCapabilities {
        ServerCapabilities {
            subscribe_supported: true,
            case_mapping: None,
        }
    }

    fn pull_only() -> ServerCapabilities {
        ServerCapabilities {
            subscribe_supported: false,
            case_mapping: None,
        }
    }

    fn signed_on(identity: &str, timestamp_ms: u64) -> WatchEvent {
        WatchEvent::SignedOn(crate::types::PresenceChange {
            identity: identity.to_owned(),
            timestamp_ms,
        })
    }

    fn signed_off(identity: &str, timestamp_ms: u64) -> WatchEvent {
        WatchEvent::SignedOff(crate::types::PresenceChange {
            identity: identity.to_owned(),
            timestamp_ms,
        })
    }

    #[test]
    fn push_network_subscribes_with_one_command() {
        let mut watch = watch("foo bar baz");
        let effects = watch.on_capabilities(push_capable());
        assert!(effects.contains(&WatchEffect::DisarmPollTimer));

        let effects = watch.on_connect(0);
        assert_eq!(sent_lines(&effects), vec!["SUBSCRIBE +foo +bar +baz"]);
        assert!(!effects.contains(&WatchEffect::ArmPollTimer));
        assert_eq!(watch.mode(), WatchMode::Push);
        assert_eq!(watch.outstanding(), 0);
    }

    #[test]
    fn pull_network_polls_and_reports_transitions() {
        let mut watch = watch("foo bar baz");
        watch.on_capabilities(pull_only());

        let effects = watch.on_connect(0);
        assert!(effects.contains(&WatchEffect::ArmPollTimer));
        assert_eq!(sent_lines(&effects), vec!["POLL foo bar baz"]);
        assert_eq!(watch.outstanding(), 1);

        let effects = watch.on_poll_response(&["foo"], 100);
        assert_eq!(presence_events(&effects), vec![signed_on("foo", 100)]);
        assert_eq!(watch.outstanding(), 0);

        let effects = watch.on_timer_fire(15_000);
        assert_eq!(sent_lines(&effects), vec!["POLL foo bar baz"]);

        let effects = watch.on_poll_response(&[] as &[&str], 15_100);
        assert_eq!(presence_events(&effects), vec![signed_off("foo", 15_100)]);
    }

    #[test]
    fn connect_without_capability_signal_falls_back_to_polling() {
        let mut watch = watch("foo");
        let effects = watch.on_connect(0);
        assert!(effects.contains(&WatchEffect::Emit(WatchEvent::ModeChanged {
            mode: WatchMode::Pull
        })));
        assert_eq!(sent_lines(&effects), vec!["POLL foo"]);
    }

    #[test]
    fn irregular_config_is_collated_before_sending() {
        let mut watch = watch("Foo, BAR , baz");
        let effects = watch.on_connect(0);
        assert_eq!(sent_lines(&effects), vec!["POLL foo bar baz"]);

        let keys: Vec<&str> = watch.registry().keys().map(TrackedIdentity::as_str).collect();
        assert_eq!(keys, vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn announced_case_mapping_applies_before_connect() {
        let mut watch = watch("[Foo]~");
        watch.on_capabilities(ServerCapabilities {
            subscribe_supported: false,
            case_mapping: Some(CaseMapping::Ascii),
        });
        let effects = watch.on_connect(0);
        assert_eq!(sent_lines(&effects), vec!["POLL [foo]~"]);
    }

    #[test]
    fn double_trigger_polls_only_once() {
        let mut watch = watch("foo bar");
        watch.on_connect(0);
        assert!(sent_lines(&watch.on_timer_fire(15_000)).is_empty());
        assert_eq!(watch.outstanding(), 1);
    }

    #[test]
    fn responses_are_correlated_to_batches_in_issue_order() {
        let mut watch = WatchList::new(WatchListConfig {
            batch_limit: 3,
            ..WatchListConfig::with_nicks("a b c d")
        })
        .expect("config should be valid");

        let effects = watch.on_connect(0);
        assert_eq!(sent_lines(&effects), vec!["POLL a b", "POLL c d"]);
        assert_eq!(watch.outstanding(), 2);

        let effects = watch.on_poll_response(&["a"], 1);
        assert_eq!(presence_events(&effects), vec![signed_on("a", 1)]);
        assert_eq!(watch.is_online("b"), Some(false));

        let effects = watch.on_poll_response(&["c", "d"], 2);
        assert_eq!(
            presence_events(&effects),
            vec![signed_on("c", 2), signed_on("d", 2)]
        );
        assert_eq!(watch.outstanding(), 0);
    }

    #[test]
    fn unsolicited_response_is_dropped() {
        let mut watch = watch("foo");
        assert!(watch.on_poll_response(&["foo"], 1).is_empty());
        assert_eq!(watch.is_online("foo"), Some(false));
    }

    #[test]
    fn empty_tracked_set_does_nothing_on_connect() {
        let mut watch = watch(" , ");
        let effects = watch.on_connect(0);
        assert!(sent_lines(&effects).is_empty());
        assert!(!watch.poll_timer_armed());
        assert!(watch.on_timer_fire(15_000).is_empty());
    }

    #[test]
    fn late_push_capability_cancels_polling_and_subscribes() {
        let mut watch = watch("foo bar");
        watch.on_connect(0);
        assert_eq!(watch.outstanding(), 1);

        let effects = watch.on_capabilities(push_capable());
        assert!(effects.contains(&WatchEffect::DisarmPollTimer));
        assert_eq!(sent_lines(&effects), vec!["SUBSCRIBE +foo +bar"]);
        assert_eq!(watch.outstanding(), 0);
        assert!(watch.on_timer_fire(15_000).is_empty());
    }

    #[test]
    fn disconnect_resets_stuck_cycle_and_presence() {
        let mut watch = watch("foo");
        watch.on_connect(0);
        watch.on_poll_response(&["foo"], 1);
        watch.on_timer_fire(15_000);
        assert_eq!(watch.outstanding(), 1);

        let effects = watch
            .apply(WatchSignal::Disconnected, 20_000)
            .expect("disconnect never fails");
        assert_eq!(effects, vec![WatchEffect::DisarmPollTimer]);
        assert_eq!(watch.outstanding(), 0);
        assert_eq!(watch.mode(), WatchMode::Undetermined);
        assert_eq!(watch.is_online("foo"), Some(false));

        let effects = watch.on_connect(30_000);
        assert_eq!(sent_lines(&effects), vec!["POLL foo"]);
    }

    #[test]
    fn reconfigure_restarts_live_connection_with_new_set() {
        let mut watch = watch("foo");
        watch.on_connect(0);

        let effects = watch
            .apply(
                WatchSignal::Reconfigure(WatchListConfig::with_nicks("bar,baz")),
                5_000,
            )
            .expect("valid config");
        assert_eq!(sent_lines(&effects), vec!["POLL bar baz"]);
        assert_eq!(watch.is_online("foo"), None);
    }

    #[test]
    fn reconfigure_rejects_invalid_config() {
        let mut watch = watch("foo");
        let err = watch
            .apply(
                WatchSignal::Reconfigure(WatchListConfig {
                    poll_interval_secs: 0,
                    ..WatchListConfig::default()
                }),
                0,
            )
            .expect_err("invalid config must fail");
        assert_eq!(err.code, "invalid_config");
        assert_eq!(watch.config().nicks, "foo");
    }

    #[test]
    fn relays_push_notifications_unmodified() {
        let mut watch = watch("foo");
        let effects = watch
            .apply(
                WatchSignal::Notification {
                    text: ":server 600 me foo user host 0 :logged online".to_owned(),
                },
                0,
            )
            .expect("notification never fails");
        assert_eq!(
            effects,
            vec![WatchEffect::Emit(WatchEvent::Notification {
                text: ":server 600 me foo user host 0 :logged online".to_owned(),
            })]
        );
    }

    #[test]
    fn configured_spellings_resolve_before_connect_and_after_disconnect() {
        let mut watch = watch("Alice [Bob]");
        assert_eq!(watch.is_online("Alice"), Some(false));
        assert_eq!(watch.is_online("alice"), Some(false));
        assert_eq!(watch.is_online("[Bob]"), Some(false));
        assert_eq!(watch.is_online("{bob}"), Some(false));
        assert_eq!(watch.is_online("carol"), None);

        watch.on_connect(0);
        watch.on_poll_response(&["ALICE"], 1);
        assert_eq!(watch.is_online("Alice"), Some(true));

        watch
            .apply(WatchSignal::Disconnected, 2)
            .expect("disconnect never fails");
        assert_eq!(watch.is_online("Alice"), Some(false));
        assert_eq!(watch.is_online("[Bob]"), Some(false));
    }

    #[test]
    fn announced_case_mapping_recollates_before_connect() {
        let mut watch = watch("[Foo]");
        assert_eq!(watch.is_online("{foo}"), Some(false));

        watch.on_capabilities(ServerCapabilities {
            subscribe_supported: false,
            case_mapping: Some(CaseMapping::Ascii),
        });
        assert_eq!(watch.is_online("[FOO]"), Some(false));
        assert_eq!(watch.is_online("{foo}"), None);
    }

    #[derive(Debug)]
    struct UpperCase;

    impl Collator for UpperCase {
        fn normalize(&self, identity: &str) -> String {
            identity.to_uppercase()
        }
    }

    #[test]
    fn custom_collator_drives_keys_and_matching() {
        let mut watch = WatchList::with_collator(
            WatchListConfig::with_nicks("foo Bar"),
            Arc::new(UpperCase),
        )
        .expect("config should be valid");

        let effects = watch.on_connect(0);
        assert_eq!(sent_lines(&effects), vec!["POLL FOO BAR"]);
        let keys: Vec<&str> = watch.registry().keys().map(TrackedIdentity::as_str).collect();
        assert_eq!(keys, vec!["FOO", "BAR"]);

        let effects = watch.on_poll_response(&["bar"], 7);
        assert_eq!(presence_events(&effects), vec![signed_on("bar", 7)]);
        assert_eq!(watch.is_online("bAr"), Some(true));
        assert_eq!(watch.is_online("foo"), Some(false));
    }
}
