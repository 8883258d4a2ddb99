//! CSRF token, session id and identity acquisition.

use super::context::SessionContext;
use once_cell::sync::Lazy;
use pulsekeeper_core::activity::LogLevel;
use pulsekeeper_core::error::{PulseError, Result};
use pulsekeeper_core::remote::{Identity, RemoteReply, SessionId};
use regex::Regex;
use serde_json::Value;

/// Marker of the cookie carrying the browser session id.
pub const SESSION_TRACKER_MARKER: &str = "rbxsessiontracker";

const DERIVED_SESSION_PREFIX: &str = "rbx_pulse_sess_";
const FALLBACK_SESSION_PREFIX: &str = "fallback_pulse_sess_";
const SESSION_TAIL_LEN: usize = 32;

static SESSION_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sessionid=([^;]+)").expect("session id pattern is a valid regex")
});

/// Obtains a CSRF token by probing the logout endpoint.
///
/// The endpoint normally rejects the probe and hands the token back on the
/// error response; a successful reply that carries one is accepted too.
pub async fn acquire_csrf_token(ctx: &SessionContext) -> Result<String> {
    let reply = match ctx.remote().logout(ctx.credential()).await {
        Ok(reply) => reply,
        Err(e) => {
            let message = format!("Failed to get CSRF token: {}", e);
            ctx.log(LogLevel::Error, message.clone()).await;
            return Err(PulseError::CsrfAcquisitionFailed(message));
        }
    };

    match reply.csrf_token.as_deref() {
        Some(token) if reply.is_success() => {
            ctx.log(LogLevel::Info, "CSRF token obtained from logout response headers.")
                .await;
            Ok(token.to_string())
        }
        Some(token) => {
            ctx.log(LogLevel::Info, "CSRF token obtained from error response.")
                .await;
            Ok(token.to_string())
        }
        None => {
            let detail = reply
                .error_message()
                .unwrap_or_else(|| format!("HTTP {}", reply.status));
            let message = format!(
                "Failed to get CSRF token: no x-csrf-token header in response ({})",
                detail
            );
            ctx.log(LogLevel::Error, message.clone()).await;
            Err(PulseError::CsrfAcquisitionFailed(message))
        }
    }
}

/// Resolves the session id sent with each pulse and caches it on the context.
///
/// Never fails: when no tracker cookie can be read an id derived from the
/// credential is used instead.
pub async fn resolve_session_id(ctx: &SessionContext) -> SessionId {
    let session_id = match probe_session_cookie(ctx).await {
        Ok(Some(id)) => {
            ctx.log(
                LogLevel::Info,
                format!("RBXSessionTracker sessionid found: {}", id),
            )
            .await;
            SessionId::Tracked(id)
        }
        Ok(None) => {
            let id = SessionId::Derived(derived_session_id(ctx, DERIVED_SESSION_PREFIX));
            ctx.log(
                LogLevel::Warning,
                format!(
                    "No specific sessionid found from /home cookies, using derived session ID: ...{}",
                    id.short()
                ),
            )
            .await;
            id
        }
        Err(e) => {
            ctx.log(
                LogLevel::Error,
                format!(
                    "Error fetching /home for session ID: {}. Will use a fallback session ID.",
                    e
                ),
            )
            .await;
            let id = SessionId::Fallback(derived_session_id(ctx, FALLBACK_SESSION_PREFIX));
            ctx.log(
                LogLevel::Warning,
                format!("Using fallback session ID: ...{}", id.short()),
            )
            .await;
            id
        }
    };

    ctx.runtime().write().await.session_id = Some(session_id.clone());
    session_id
}

/// Fetches the home page and looks for the session tracker cookie.
async fn probe_session_cookie(ctx: &SessionContext) -> Result<Option<String>> {
    let reply = ctx
        .remote()
        .home(ctx.credential())
        .await
        .map_err(|e| PulseError::SessionIdUnavailable(e.to_string()))?;

    if !(200..400).contains(&reply.status) {
        return Err(PulseError::SessionIdUnavailable(format!(
            "home page returned HTTP {}",
            reply.status
        )));
    }

    if !reply.set_cookies.is_empty() && ctx.claim_cookie_diagnostic() {
        log_cookie_diagnostic(ctx, &reply).await;
    }

    Ok(extract_session_id(&reply.set_cookies))
}

async fn log_cookie_diagnostic(ctx: &SessionContext, reply: &RemoteReply) {
    let listing = serde_json::to_string_pretty(&reply.set_cookies)
        .unwrap_or_else(|_| reply.set_cookies.join("\n"));
    ctx.log(LogLevel::System, "=== Initial Cookies from /home ===")
        .await;
    ctx.log(LogLevel::Info, listing).await;
    ctx.log(LogLevel::System, "=================================")
        .await;
}

/// Extracts the `sessionid` value from the first tracker cookie.
pub fn extract_session_id(set_cookies: &[String]) -> Option<String> {
    set_cookies
        .iter()
        .filter(|cookie| cookie.to_lowercase().contains(SESSION_TRACKER_MARKER))
        .find_map(|cookie| {
            SESSION_ID_PATTERN
                .captures(cookie)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|id| !id.is_empty())
        })
}

fn derived_session_id(ctx: &SessionContext, prefix: &str) -> String {
    format!("{}{}", prefix, ctx.credential().tail(SESSION_TAIL_LEN))
}

/// Fetches the authenticated identity and, best effort, the avatar.
pub async fn fetch_identity(ctx: &SessionContext) -> Result<Identity> {
    let reply = match ctx.remote().authenticated_user(ctx.credential()).await {
        Ok(reply) => reply,
        Err(e) => {
            let message = format!("Failed to fetch user info: {}", e);
            ctx.log(LogLevel::Error, message.clone()).await;
            return Err(PulseError::IdentityUnavailable(message));
        }
    };

    if !reply.is_success() {
        let detail = reply
            .error_message()
            .unwrap_or_else(|| format!("HTTP {}", reply.status));
        let message = format!("Failed to fetch user info: {}", detail);
        ctx.log(LogLevel::Error, message.clone()).await;
        if reply.status == 401 {
            ctx.log(
                LogLevel::Error,
                "The .ROBLOSECURITY cookie might be invalid or expired.",
            )
            .await;
        }
        return Err(PulseError::IdentityUnavailable(message));
    }

    let identity = parse_identity(&reply.body).ok_or_else(|| {
        PulseError::IdentityUnavailable("Unexpected user info response".to_string())
    });
    let identity = match identity {
        Ok(identity) => identity,
        Err(e) => {
            ctx.log(LogLevel::Error, format!("Failed to fetch user info: {}", e))
                .await;
            return Err(e);
        }
    };

    ctx.runtime().write().await.identity = Some(identity.clone());
    ctx.log(
        LogLevel::Success,
        format!(
            "User info fetched: {} (ID: {})",
            identity.display_name, identity.id
        ),
    )
    .await;

    let avatar_url = fetch_avatar(ctx, identity.id).await;
    ctx.runtime().write().await.avatar_url = avatar_url;

    Ok(identity)
}

fn parse_identity(body: &Value) -> Option<Identity> {
    let id = body.get("id")?.as_u64()?;
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let display_name = body
        .get("displayName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| name.clone());
    Some(Identity {
        id,
        name,
        display_name,
    })
}

async fn fetch_avatar(ctx: &SessionContext, user_id: u64) -> Option<String> {
    let outcome = match ctx.remote().avatar_headshot(user_id).await {
        Ok(reply) if reply.is_success() => reply
            .body
            .pointer("/data/0/imageUrl")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| "no image in thumbnail response".to_string()),
        Ok(reply) => Err(reply
            .error_message()
            .unwrap_or_else(|| format!("HTTP {}", reply.status))),
        Err(e) => Err(e.to_string()),
    };

    match outcome {
        Ok(url) => {
            ctx.log(LogLevel::Info, format!("Avatar URL fetched: {}", url))
                .await;
            Some(url)
        }
        Err(message) => {
            ctx.log(
                LogLevel::Warning,
                format!("Failed to fetch avatar: {}", message),
            )
            .await;
            None
        }
    }
}
