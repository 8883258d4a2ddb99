//! Remote service seam.
//!
//! [`RemoteService`] exposes the raw replies of the six remote calls the
//! heartbeat lifecycle depends on. Interpreting them (which header carries the
//! CSRF token, which cookie is the session tracker, how failures are
//! classified) is done by the application layer, so it can be exercised
//! against a scripted implementation.

use crate::credential::Credential;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page the heartbeat claims the browser is on.
pub const PULSE_LOCATION_URL: &str = "https://www.roblox.com/home";
/// Referrer reported alongside [`PULSE_LOCATION_URL`].
pub const PULSE_REFERRER_URL: &str = "https://www.roblox.com/";

/// A remote reply that reached us, successful or not.
///
/// Only transport failures (no response at all) are reported as `Err` by a
/// [`RemoteService`]; every HTTP status, including 4xx/5xx, arrives here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteReply {
    pub status: u16,
    /// Value of the `x-csrf-token` response header, if any
    pub csrf_token: Option<String>,
    /// Raw `set-cookie` header values
    pub set_cookies: Vec<String>,
    /// Parsed JSON body, or `Value::Null` if the body was empty or not JSON
    pub body: Value,
}

impl RemoteReply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.set_cookies.push(cookie.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Best-effort error text from a Roblox API body: `errors[0].message`,
    /// then `message`, then the raw body.
    pub fn error_message(&self) -> Option<String> {
        if let Some(message) = self
            .body
            .get("errors")
            .and_then(|errors| errors.get(0))
            .and_then(|first| first.get("message"))
            .and_then(Value::as_str)
        {
            return Some(message.to_string());
        }
        if let Some(message) = self.body.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }
        match &self.body {
            Value::Null => None,
            Value::String(text) if text.is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Identity of the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: u64,
    pub name: String,
    pub display_name: String,
}

/// One entry of the batch presence lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: u64,
    #[serde(default)]
    pub user_presence_type: i64,
    #[serde(default)]
    pub last_location: Option<String>,
    #[serde(default)]
    pub last_online: Option<String>,
    /// Remaining fields (place, game and universe ids) passed through as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Where a pulse's session id came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionId {
    /// Extracted from an `RBXSessionTracker` cookie
    Tracked(String),
    /// Derived from the credential because no tracker cookie was returned
    Derived(String),
    /// Derived from the credential because the home page request failed
    Fallback(String),
}

impl SessionId {
    pub fn as_str(&self) -> &str {
        match self {
            SessionId::Tracked(id) | SessionId::Derived(id) | SessionId::Fallback(id) => id,
        }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, SessionId::Tracked(_))
    }

    /// Last ten characters, for log lines.
    pub fn short(&self) -> &str {
        let id = self.as_str();
        let count = id.chars().count();
        if count <= 10 {
            return id;
        }
        let start = id.char_indices().nth(count - 10).map(|(i, _)| i).unwrap_or(0);
        &id[start..]
    }
}

/// Heartbeat request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulsePayload {
    pub client_side_timestamp_epoch_ms: i64,
    pub session_info: SessionInfo,
    pub location_info: LocationInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub roblox_website_location_info: WebsiteLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteLocation {
    pub url: String,
    pub referrer_url: String,
}

impl PulsePayload {
    /// Builds the payload with the fixed home-page location metadata.
    pub fn new(timestamp_ms: i64, session_id: &SessionId) -> Self {
        Self {
            client_side_timestamp_epoch_ms: timestamp_ms,
            session_info: SessionInfo {
                session_id: session_id.as_str().to_string(),
            },
            location_info: LocationInfo {
                roblox_website_location_info: WebsiteLocation {
                    url: PULSE_LOCATION_URL.to_string(),
                    referrer_url: PULSE_REFERRER_URL.to_string(),
                },
            },
        }
    }
}

/// Raw access to the remote platform.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// State-changing logout call used only to provoke an `x-csrf-token` header.
    async fn logout(&self, credential: &Credential) -> Result<RemoteReply>;

    /// Authenticated identity lookup.
    async fn authenticated_user(&self, credential: &Credential) -> Result<RemoteReply>;

    /// Avatar headshot thumbnail lookup.
    async fn avatar_headshot(&self, user_id: u64) -> Result<RemoteReply>;

    /// Authenticated home page navigation; replies carry its `set-cookie` values.
    async fn home(&self, credential: &Credential) -> Result<RemoteReply>;

    /// Heartbeat submission.
    async fn pulse(
        &self,
        credential: &Credential,
        csrf_token: &str,
        payload: &PulsePayload,
    ) -> Result<RemoteReply>;

    /// Batch presence lookup by numeric user id.
    async fn presence(&self, user_ids: &[u64]) -> Result<RemoteReply>;
}
