//! Snapshot types reported by monitors and the registry.

use crate::account::Mode;
use crate::remote::Presence;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::Display;

/// Lifecycle phase of a session monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MonitorPhase {
    #[default]
    Stopped,
    Starting,
    Active,
    Restarting,
}

/// Point-in-time view of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub username: String,
    pub is_active: bool,
    pub phase: MonitorPhase,
    /// RFC 3339 time of the last successful pulse
    pub last_pulse: Option<String>,
    pub user_id: Option<u64>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub presence: Option<Presence>,
    pub mode: Mode,
    /// Resolved pulse interval in milliseconds
    pub pulse_interval: u64,
    pub logging_enabled: bool,
    pub last_error: Option<String>,
}

/// Result of a batch presence refresh.
///
/// Serializes as the bare username map on success and as `{"error": ...}` on
/// failure, which is the shape the dashboard expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PresenceReport {
    Updated(HashMap<String, Presence>),
    Failed { error: String },
}

impl PresenceReport {
    pub fn is_failed(&self) -> bool {
        matches!(self, PresenceReport::Failed { .. })
    }
}

/// Outcome of a registry mutation that may leave the account inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
}

impl OperationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
