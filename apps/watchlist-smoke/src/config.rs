//! Environment-backed runtime configuration for `watchlist-smoke`.

use std::env;

use thiserror::Error;
use watchlist_core::{
    CaseMapping, DEFAULT_BATCH_LIMIT, DEFAULT_POLL_INTERVAL_SECS, WatchListConfig,
    parse_identity_list,
};

const DEFAULT_NICKS: &str = "alice, bob, carol";

/// Runtime configuration used by the smoke binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeConfig {
    /// Engine configuration.
    pub watch: WatchListConfig,
    /// Case mapping the simulated server announces.
    pub case_mapping: Option<CaseMapping>,
    /// Identities the simulated server reports online.
    pub online: Vec<String>,
    /// Whether the simulated server supports push subscriptions.
    pub push: bool,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let nicks = optional_trimmed_env("WATCHLIST_NICKS", &mut lookup)
            .unwrap_or_else(|| DEFAULT_NICKS.to_owned());
        let poll_interval_secs = parse_optional_u64("WATCHLIST_POLL_DELAY_SECS", &mut lookup)?
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        let batch_limit =
            parse_optional_usize("WATCHLIST_BATCH_LIMIT", DEFAULT_BATCH_LIMIT, &mut lookup)?;
        let stale_cycle_timeout_ms =
            parse_optional_u64("WATCHLIST_STALE_CYCLE_TIMEOUT_MS", &mut lookup)?;

        let case_mapping = match optional_trimmed_env("WATCHLIST_CASEMAPPING", &mut lookup) {
            Some(value) => Some(value.parse::<CaseMapping>().map_err(|err| {
                ConfigError::InvalidValue {
                    key: "WATCHLIST_CASEMAPPING",
                    value,
                    reason: err.message,
                }
            })?),
            None => None,
        };

        let online = optional_trimmed_env("WATCHLIST_SMOKE_ONLINE", &mut lookup)
            .map(|value| parse_identity_list(&value))
            .unwrap_or_default();
        let push = parse_flag("WATCHLIST_SMOKE_PUSH", &mut lookup)?;

        let watch = WatchListConfig {
            nicks,
            poll_interval_secs,
            batch_limit,
            stale_cycle_timeout_ms,
        };
        watch.validate().map_err(ConfigError::Watch)?;

        Ok(Self {
            watch,
            case_mapping,
            online,
            push,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// Parsed values were rejected by the engine.
    #[error(transparent)]
    Watch(watchlist_core::WatchError),
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_optional_usize<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<usize>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_flag<F>(key: &'static str, lookup: &mut F) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean flag".to_owned(),
        }),
    }
}
