use std::collections::HashSet;

use tracing::{debug, trace};

use crate::{
    batch::Batch,
    identity::{Collator, strip_response_marker},
    registry::PresenceRegistry,
    types::{PresenceChange, WatchEvent},
};

/// Apply one pull response to the batch it answers.
///
/// Present identities that were offline sign on, reported with the spelling
/// the server used. Batch members missing from the response that were
/// online sign off, reported with their tracked spelling. Identities that
/// are not tracked are ignored.
pub fn apply_response<S: AsRef<str>>(
    registry: &mut PresenceRegistry,
    batch: &Batch,
    present: &[S],
    collator: &dyn Collator,
    now_ms: u64,
) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    let mut present_set = HashSet::with_capacity(present.len());

    for token in present {
        let reported = strip_response_marker(token.as_ref());
        if reported.is_empty() {
            continue;
        }
        let normalized = collator.normalize(reported);

        match registry.is_online(&normalized) {
            Some(false) => {
                registry.set_online(&normalized, true);
                debug!(identity = %reported, "identity signed on");
                events.push(WatchEvent::SignedOn(PresenceChange {
                    identity: reported.to_owned(),
                    timestamp_ms: now_ms,
                }));
            }
            Some(true) => {}
            None => trace!(identity = %reported, "ignoring untracked identity in response"),
        }

        present_set.insert(normalized);
    }

    for identity in batch.identities() {
        if present_set.contains(identity.as_str()) {
            continue;
        }
        if registry.set_online(identity.as_str(), false) == Some(true) {
            debug!(identity = %identity, "identity signed off");
            events.push(WatchEvent::SignedOff(PresenceChange {
                identity: identity.to_string(),
                timestamp_ms: now_ms,
            }));
        }
    }

    events
}
