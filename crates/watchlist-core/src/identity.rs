use std::{borrow::Borrow, collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Network-specific canonicalization of identity strings.
///
/// Implementations must be deterministic and idempotent:
/// `normalize(normalize(x)) == normalize(x)`.
pub trait Collator: fmt::Debug + Send + Sync {
    /// Return the canonical spelling of `raw`.
    fn normalize(&self, raw: &str) -> String;
}

/// IRC `CASEMAPPING` collations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaseMapping {
    /// `A-Z` fold to `a-z`.
    Ascii,
    /// ASCII folding plus `[]\~` fold to `{}|^`.
    #[default]
    Rfc1459,
    /// ASCII folding plus `[]\` fold to `{}|`.
    StrictRfc1459,
}

impl CaseMapping {
    /// Token used by servers to announce this mapping.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Rfc1459 => "rfc1459",
            Self::StrictRfc1459 => "strict-rfc1459",
        }
    }

    fn fold(self, ch: char) -> char {
        match (self, ch) {
            (_, 'A'..='Z') => ch.to_ascii_lowercase(),
            (Self::Rfc1459 | Self::StrictRfc1459, '[') => '{',
            (Self::Rfc1459 | Self::StrictRfc1459, ']') => '}',
            (Self::Rfc1459 | Self::StrictRfc1459, '\\') => '|',
            (Self::Rfc1459, '~') => '^',
            _ => ch,
        }
    }
}

impl Collator for CaseMapping {
    fn normalize(&self, raw: &str) -> String {
        raw.chars().map(|ch| self.fold(ch)).collect()
    }
}

impl FromStr for CaseMapping {
    type Err = WatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ascii" => Ok(Self::Ascii),
            "rfc1459" => Ok(Self::Rfc1459),
            "strict-rfc1459" => Ok(Self::StrictRfc1459),
            other => Err(WatchError::invalid_config(
                "case_mapping",
                format!("unsupported case mapping '{other}'"),
            )),
        }
    }
}

impl fmt::Display for CaseMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identity as stored in the registry.
///
/// Before the first connection this is the configured spelling; afterwards
/// it is the collated form for the active connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TrackedIdentity(String);

impl TrackedIdentity {
    /// Collate `raw` into a tracked identity.
    pub fn normalized(raw: &str, collator: &dyn Collator) -> Self {
        Self(collator.normalize(raw))
    }

    /// Wrap a configured spelling as-is.
    pub(crate) fn verbatim(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes, as counted against the batch limit.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<str> for TrackedIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a comma and/or space separated identity list.
///
/// Blank entries and exact duplicates are dropped; first-seen order is kept.
pub fn parse_identity_list(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(|ch: char| ch == ',' || ch.is_whitespace())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| seen.insert(*entry))
        .map(str::to_owned)
        .collect()
}

/// Strip the trailing-parameter marker a raw response token may carry.
pub fn strip_response_marker(token: &str) -> &str {
    token.strip_prefix(':').unwrap_or(token)
}
