//! Heartbeat sender with bounded retries.

use super::context::SessionContext;
use super::tokens::{acquire_csrf_token, resolve_session_id};
use chrono::Utc;
use pulsekeeper_core::account::EffectiveSettings;
use pulsekeeper_core::activity::LogLevel;
use pulsekeeper_core::error::{PulseError, Result};
use pulsekeeper_core::remote::{PulsePayload, RemoteReply};
use serde_json::Value;

const CSRF_REJECTED_MESSAGE: &str = "Token Validation Failed";

/// Why a single pulse attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unauthorized,
    CsrfRejected,
    Forbidden,
    Other,
}

impl FailureKind {
    pub fn classify(reply: &RemoteReply) -> Self {
        match reply.status {
            401 => FailureKind::Unauthorized,
            403 if reply.error_message().as_deref() == Some(CSRF_REJECTED_MESSAGE) => {
                FailureKind::CsrfRejected
            }
            403 => FailureKind::Forbidden,
            _ => FailureKind::Other,
        }
    }

    fn hint(self) -> &'static str {
        match self {
            FailureKind::Unauthorized => "Unauthorized (cookie might be invalid). ",
            FailureKind::CsrfRejected => "CSRF Token Validation Failed. ",
            FailureKind::Forbidden => "Forbidden (check permissions or headers). ",
            FailureKind::Other => "",
        }
    }
}

#[derive(Debug)]
struct AttemptFailure {
    kind: FailureKind,
    detail: String,
}

impl AttemptFailure {
    fn other(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Other,
            detail: detail.into(),
        }
    }

    fn from_reply(reply: &RemoteReply) -> Self {
        let api_message = reply
            .error_message()
            .unwrap_or_else(|| "no error message".to_string());
        Self {
            kind: FailureKind::classify(reply),
            detail: format!("{} (HTTP {})", api_message, reply.status),
        }
    }

    fn describe(&self) -> String {
        format!("{}{}", self.kind.hint(), self.detail)
    }
}

/// Sends one heartbeat, retrying up to `settings.retry_attempts` times.
///
/// Returns the service acknowledgement on success, or
/// [`PulseError::PulseExhausted`] once every attempt has failed.
pub async fn send_pulse(ctx: &SessionContext, settings: &EffectiveSettings) -> Result<Value> {
    let attempts = settings.retry_attempts.max(1);
    let mut attempt = 1;

    loop {
        let failure = match attempt_pulse(ctx).await {
            Ok(ack) => {
                ctx.runtime().write().await.last_pulse = Some(Utc::now());
                let label = ctx.label().await;
                ctx.log(
                    LogLevel::Success,
                    format!("Pulse successful for {}. Mode: {}.", label, settings.mode),
                )
                .await;
                return Ok(ack);
            }
            Err(failure) => failure,
        };

        let cause = failure.describe();
        let label = ctx.label().await;
        ctx.log(
            LogLevel::Error,
            format!(
                "Pulse request failed for {}: {} (Attempt {})",
                label, cause, attempt
            ),
        )
        .await;

        if attempt >= attempts {
            return Err(PulseError::PulseExhausted { attempts, cause });
        }

        ctx.log(
            LogLevel::Warning,
            format!("Retrying pulse... Attempt {}/{}", attempt + 1, attempts),
        )
        .await;
        tokio::time::sleep(settings.retry_delay).await;
        attempt += 1;
    }
}

async fn attempt_pulse(ctx: &SessionContext) -> std::result::Result<Value, AttemptFailure> {
    let csrf_token = acquire_csrf_token(ctx)
        .await
        .map_err(|e| AttemptFailure::other(e.to_string()))?;
    let session_id = resolve_session_id(ctx).await;
    let payload = PulsePayload::new(Utc::now().timestamp_millis(), &session_id);

    ctx.log(
        LogLevel::Info,
        format!("Sending pulse with sessionId: ...{}", session_id.short()),
    )
    .await;

    let reply = ctx
        .remote()
        .pulse(ctx.credential(), &csrf_token, &payload)
        .await
        .map_err(|e| AttemptFailure::other(e.to_string()))?;

    if reply.is_success() {
        Ok(reply.body)
    } else {
        Err(AttemptFailure::from_reply(&reply))
    }
}
