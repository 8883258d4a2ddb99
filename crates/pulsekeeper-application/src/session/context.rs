//! State shared between a monitor and its pulse timer task.

use chrono::{DateTime, Utc};
use pulsekeeper_core::activity::{ActivityLog, LogLevel, LogRecord};
use pulsekeeper_core::credential::Credential;
use pulsekeeper_core::remote::{Identity, Presence, RemoteService, SessionId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Data learned from the remote service while the account runs.
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    pub identity: Option<Identity>,
    pub avatar_url: Option<String>,
    pub presence: Option<Presence>,
    pub last_pulse: Option<DateTime<Utc>>,
    pub session_id: Option<SessionId>,
    pub last_error: Option<String>,
}

/// Everything one account's network operations need.
pub struct SessionContext {
    username: String,
    credential: Credential,
    logging_enabled: bool,
    remote: Arc<dyn RemoteService>,
    activity: Arc<dyn ActivityLog>,
    runtime: RwLock<RuntimeState>,
    cookies_logged: AtomicBool,
}

impl SessionContext {
    pub fn new(
        username: impl Into<String>,
        credential: Credential,
        logging_enabled: bool,
        remote: Arc<dyn RemoteService>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            username: username.into(),
            credential,
            logging_enabled,
            remote,
            activity,
            runtime: RwLock::new(RuntimeState::default()),
            cookies_logged: AtomicBool::new(false),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn remote(&self) -> &dyn RemoteService {
        self.remote.as_ref()
    }

    pub fn runtime(&self) -> &RwLock<RuntimeState> {
        &self.runtime
    }

    /// Display name once the identity is known, else the username.
    pub async fn label(&self) -> String {
        self.runtime
            .read()
            .await
            .identity
            .as_ref()
            .map(|identity| identity.display_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.username.clone())
    }

    /// Appends an activity record for this account, unless logging is disabled.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        if !self.logging_enabled {
            return;
        }
        let label = self.label().await;
        self.activity.append(LogRecord::new(level, label, message));
    }

    /// Returns `true` exactly once: the first time it is called.
    pub fn claim_cookie_diagnostic(&self) -> bool {
        !self.cookies_logged.swap(true, Ordering::SeqCst)
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        self.runtime.write().await.last_error = Some(message.into());
    }
}
