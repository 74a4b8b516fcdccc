use std::collections::HashMap;

use crate::{
    batch::{Batch, split_batches},
    identity::{Collator, TrackedIdentity},
};

/// Tracked identities and their last-known presence.
///
/// The key set is fixed at construction; only presence flags change. A new
/// key set means building a new registry.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    entries: Vec<(TrackedIdentity, bool)>,
    index: HashMap<TrackedIdentity, usize>,
}

impl PresenceRegistry {
    /// Build a registry from configured spellings, all offline.
    pub fn from_configured<S: AsRef<str>>(identities: &[S]) -> Self {
        Self::build(
            identities
                .iter()
                .map(|raw| TrackedIdentity::verbatim(raw.as_ref())),
        )
    }

    /// Rebuild with every key collated, all offline.
    ///
    /// Keys that collate to the same identity collapse into the first one.
    pub fn renormalized(&self, collator: &dyn Collator) -> Self {
        Self::build(
            self.entries
                .iter()
                .map(|(identity, _)| TrackedIdentity::normalized(identity.as_str(), collator)),
        )
    }

    fn build(identities: impl Iterator<Item = TrackedIdentity>) -> Self {
        let mut registry = Self::default();
        for identity in identities {
            if registry.index.contains_key(&identity) {
                continue;
            }
            registry
                .index
                .insert(identity.clone(), registry.entries.len());
            registry.entries.push((identity, false));
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked identities in stable order.
    pub fn keys(&self) -> impl Iterator<Item = &TrackedIdentity> {
        self.entries.iter().map(|(identity, _)| identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }

    /// Presence flag for `identity`, `None` when it is not tracked.
    pub fn is_online(&self, identity: &str) -> Option<bool> {
        self.index
            .get(identity)
            .map(|&position| self.entries[position].1)
    }

    /// Update the flag of an existing key and return its previous value.
    ///
    /// Unknown identities are left untracked and yield `None`.
    pub fn set_online(&mut self, identity: &str, online: bool) -> Option<bool> {
        let position = *self.index.get(identity)?;
        let previous = self.entries[position].1;
        self.entries[position].1 = online;
        Some(previous)
    }

    /// Identities currently flagged online, in stable order.
    pub fn online_identities(&self) -> Vec<&TrackedIdentity> {
        self.entries
            .iter()
            .filter(|(_, online)| *online)
            .map(|(identity, _)| identity)
            .collect()
    }

    /// Split the key set into batches bounded by `limit`.
    pub fn batches(&self, limit: usize) -> Vec<Batch> {
        split_batches(self.keys(), limit)
    }
}
