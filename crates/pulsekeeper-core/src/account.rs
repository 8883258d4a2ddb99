//! Account configuration model and settings resolution.
//!
//! The persisted document keeps the field names of the on-disk `config.json`
//! (`robloxCookie`, `globalConfig`, ...). Runtime code never reads these layers
//! directly; it asks [`EffectiveSettings::resolve`] for one merged value.
//!
//! Tunable fields are read leniently: a wrong type or `null` falls back to the
//! default instead of failing the whole document, so one odd entry never costs
//! the operator every stored account.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use strum::{Display, EnumString};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
pub const DEFAULT_PULSE_INTERVAL_FULL_MS: u64 = 30_000;
pub const DEFAULT_PULSE_INTERVAL_PARTIAL_MS: u64 = 572_123;

/// Heartbeat cadence of an account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Account interval, or the global full-mode default.
    #[default]
    Full,
    /// Fixed, longer global interval.
    Partial,
}

/// Defaults shared by all accounts (`globalConfig`).
///
/// Every field falls back to its hard-coded default when missing, so an empty
/// `{}` object is a valid value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    #[serde(deserialize_with = "lenient_count")]
    pub retry_attempts: u32,
    /// Milliseconds between pulse attempts
    #[serde(deserialize_with = "lenient_millis")]
    pub retry_delay: u64,
    /// Milliseconds between pulses in full mode when the account has no override
    #[serde(deserialize_with = "lenient_millis")]
    pub default_pulse_interval_full: u64,
    /// Milliseconds between pulses in partial mode
    #[serde(deserialize_with = "lenient_millis")]
    pub pulse_interval_partial: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY_MS,
            default_pulse_interval_full: DEFAULT_PULSE_INTERVAL_FULL_MS,
            pulse_interval_partial: DEFAULT_PULSE_INTERVAL_PARTIAL_MS,
        }
    }
}

fn default_logging() -> bool {
    true
}

/// Millisecond value from a number or a numeric string.
fn millis(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Unusable values read as zero, which resolution treats as unset.
fn lenient_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(millis).unwrap_or(0))
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(millis)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0))
}

fn lenient_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(millis))
}

/// Only `"partial"` (any case) selects partial mode.
fn lenient_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mode, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("partial") => Mode::Partial,
        _ => Mode::Full,
    })
}

/// Only an explicit `false` turns logging off.
fn lenient_logging<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(!matches!(raw, Some(Value::Bool(false))))
}

/// Per-account entry of the `accounts` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    pub username: String,
    pub roblox_cookie: String,
    /// Explicit full-mode interval in milliseconds
    #[serde(
        default,
        deserialize_with = "lenient_interval",
        skip_serializing_if = "Option::is_none"
    )]
    pub pulse_interval: Option<u64>,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: Mode,
    #[serde(default = "default_logging", deserialize_with = "lenient_logging")]
    pub enable_logging: bool,
}

impl AccountSettings {
    /// Creates settings for a new account in full mode with logging enabled.
    pub fn new(username: impl Into<String>, roblox_cookie: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            roblox_cookie: roblox_cookie.into(),
            pulse_interval: None,
            mode: Mode::Full,
            enable_logging: true,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_pulse_interval(mut self, interval_ms: u64) -> Self {
        self.pulse_interval = Some(interval_ms);
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }
}

/// The whole persisted configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseConfig {
    #[serde(default)]
    pub accounts: Vec<AccountSettings>,
    #[serde(default)]
    pub global_config: GlobalSettings,
}

impl PulseConfig {
    pub fn find(&self, username: &str) -> Option<&AccountSettings> {
        self.accounts.iter().find(|a| a.username == username)
    }

    pub fn find_mut(&mut self, username: &str) -> Option<&mut AccountSettings> {
        self.accounts.iter_mut().find(|a| a.username == username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.find(username).is_some()
    }

    /// Removes an account, returning whether it was present.
    pub fn remove(&mut self, username: &str) -> bool {
        let before = self.accounts.len();
        self.accounts.retain(|a| a.username != username);
        self.accounts.len() != before
    }
}

/// Settings a monitor actually runs with, merged from the global defaults,
/// the persisted account entry and an optional in-memory mode override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub mode: Mode,
    pub pulse_interval: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub logging_enabled: bool,
}

impl EffectiveSettings {
    /// Resolves the layered configuration for one account.
    ///
    /// `partial` always uses the global partial interval; `full` uses the
    /// account interval if set (zero counts as unset), else the global full
    /// default. Zero-valued global fields fall back to the hard-coded defaults.
    pub fn resolve(
        global: &GlobalSettings,
        account: &AccountSettings,
        mode_override: Option<Mode>,
    ) -> Self {
        let mode = mode_override.unwrap_or(account.mode);
        let interval_ms = resolve_interval_ms(global, account.pulse_interval, mode);
        let retry_attempts = if global.retry_attempts == 0 {
            DEFAULT_RETRY_ATTEMPTS
        } else {
            global.retry_attempts
        };
        let retry_delay = non_zero_or(global.retry_delay, DEFAULT_RETRY_DELAY_MS);

        Self {
            mode,
            pulse_interval: Duration::from_millis(interval_ms),
            retry_attempts,
            retry_delay: Duration::from_millis(retry_delay),
            logging_enabled: account.enable_logging,
        }
    }

    pub fn pulse_interval_ms(&self) -> u64 {
        self.pulse_interval.as_millis() as u64
    }
}

/// The interval resolution rule, in milliseconds.
pub fn resolve_interval_ms(global: &GlobalSettings, account_interval: Option<u64>, mode: Mode) -> u64 {
    match mode {
        Mode::Partial => non_zero_or(global.pulse_interval_partial, DEFAULT_PULSE_INTERVAL_PARTIAL_MS),
        Mode::Full => account_interval.filter(|ms| *ms > 0).unwrap_or_else(|| {
            non_zero_or(global.default_pulse_interval_full, DEFAULT_PULSE_INTERVAL_FULL_MS)
        }),
    }
}

fn non_zero_or(value: u64, fallback: u64) -> u64 {
    if value == 0 { fallback } else { value }
}
