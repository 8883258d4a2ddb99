//! RobloxClient - `reqwest` implementation of [`RemoteService`].
//!
//! The client only shapes requests and captures replies. Every HTTP status
//! comes back as a [`RemoteReply`]; only failures without a response (DNS,
//! TLS, timeouts) become `PulseError::Transport`.

use crate::endpoints::{
    AUTHENTICATED_USER_URL, AVATAR_HEADSHOT_URL, CSRF_HEADER, HOME_URL, HTML_ACCEPT, JSON_ACCEPT,
    JSON_CONTENT_TYPE, LOGOUT_URL, MAX_REDIRECTS, ORIGIN, PRESENCE_URL, PULSE_URL, USER_AGENT,
    avatar_query,
};
use async_trait::async_trait;
use pulsekeeper_core::credential::Credential;
use pulsekeeper_core::error::{PulseError, Result};
use pulsekeeper_core::remote::{PulsePayload, RemoteReply, RemoteService};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, HeaderMap, ORIGIN as ORIGIN_HEADER, REFERER, SET_COOKIE};
use reqwest::{Client, RequestBuilder, redirect};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the Roblox endpoints.
#[derive(Clone)]
pub struct RobloxClient {
    client: Client,
}

impl RobloxClient {
    /// Creates a client with a desktop browser user agent, a request timeout
    /// and a bounded redirect policy.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PulseError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn authenticated(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request.header(COOKIE, credential.cookie_header())
    }

    async fn execute(&self, request: RequestBuilder, what: &str) -> Result<RemoteReply> {
        let response = request.send().await.map_err(|e| {
            tracing::debug!("[RobloxClient] {} request failed: {}", what, e);
            PulseError::transport(format!("{} request failed: {}", what, e))
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| {
            PulseError::transport(format!("Failed to read {} response body: {}", what, e))
        })?;

        tracing::debug!("[RobloxClient] {} -> {}", what, status);
        Ok(reply_from_parts(status, &headers, &text))
    }
}

/// Builds a [`RemoteReply`] from a received response.
pub fn reply_from_parts(status: u16, headers: &HeaderMap, body: &str) -> RemoteReply {
    let csrf_token = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let set_cookies = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    let body = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
    };

    RemoteReply {
        status,
        csrf_token,
        set_cookies,
        body,
    }
}

#[async_trait]
impl RemoteService for RobloxClient {
    async fn logout(&self, credential: &Credential) -> Result<RemoteReply> {
        let request = self.authenticated(self.client.post(LOGOUT_URL), credential);
        self.execute(request, "logout").await
    }

    async fn authenticated_user(&self, credential: &Credential) -> Result<RemoteReply> {
        let request = self.authenticated(self.client.get(AUTHENTICATED_USER_URL), credential);
        self.execute(request, "authenticated user").await
    }

    async fn avatar_headshot(&self, user_id: u64) -> Result<RemoteReply> {
        let request = self
            .client
            .get(AVATAR_HEADSHOT_URL)
            .query(&avatar_query(user_id));
        self.execute(request, "avatar headshot").await
    }

    async fn home(&self, credential: &Credential) -> Result<RemoteReply> {
        let request = self
            .authenticated(self.client.get(HOME_URL), credential)
            .header(ACCEPT, HTML_ACCEPT);
        self.execute(request, "home").await
    }

    async fn pulse(
        &self,
        credential: &Credential,
        csrf_token: &str,
        payload: &PulsePayload,
    ) -> Result<RemoteReply> {
        let request = self
            .authenticated(self.client.post(PULSE_URL), credential)
            .header(ACCEPT, JSON_ACCEPT)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(CSRF_HEADER, csrf_token)
            .header(ORIGIN_HEADER, ORIGIN)
            .header(REFERER, HOME_URL)
            .body(serde_json::to_vec(payload)?);
        self.execute(request, "pulse").await
    }

    async fn presence(&self, user_ids: &[u64]) -> Result<RemoteReply> {
        let request = self
            .client
            .post(PRESENCE_URL)
            .json(&serde_json::json!({ "userIds": user_ids }));
        self.execute(request, "presence").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_reply_captures_csrf_and_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_static("tok-123"));
        headers.append(SET_COOKIE, HeaderValue::from_static("RBXEventTrackerV2=CreateDate=1; path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("RBXSessionTracker=sessionid=abc-def; domain=roblox.com"),
        );

        let reply = reply_from_parts(403, &headers, r#"{"errors":[{"code":0,"message":"Token Validation Failed"}]}"#);
        assert_eq!(reply.status, 403);
        assert_eq!(reply.csrf_token.as_deref(), Some("tok-123"));
        assert_eq!(reply.set_cookies.len(), 2);
        assert_eq!(reply.error_message().as_deref(), Some("Token Validation Failed"));
    }

    #[test]
    fn test_reply_keeps_non_json_body_as_text() {
        let reply = reply_from_parts(200, &HeaderMap::new(), "<html>home</html>");
        assert_eq!(reply.body, Value::String("<html>home</html>".to_string()));
        assert!(reply.csrf_token.is_none());
    }

    #[test]
    fn test_reply_empty_body_is_null() {
        let reply = reply_from_parts(200, &HeaderMap::new(), "  ");
        assert_eq!(reply.body, Value::Null);
    }

    #[test]
    fn test_client_builds() {
        assert!(RobloxClient::new().is_ok());
    }
}
