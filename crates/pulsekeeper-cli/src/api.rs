//! Local dashboard API.
//!
//! ```text
//! GET    /health
//! GET    /api/accounts
//! POST   /api/accounts
//! DELETE /api/accounts/{username}
//! POST   /api/accounts/{username}/mode
//! GET    /api/logs
//! ```

use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Body, Method, Request, Response, StatusCode};
use pulsekeeper_application::AccountRegistry;
use pulsekeeper_core::account::{AccountSettings, Mode};
use pulsekeeper_core::error::PulseError;
use pulsekeeper_infrastructure::FileActivityLog;
use serde::Deserialize;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

const INVALID_MODE: &str = "Invalid mode. Must be 'full' or 'partial'.";

/// Shared handles the request handlers work with.
#[derive(Clone)]
pub struct ApiState {
    registry: Arc<AccountRegistry>,
    activity: Arc<FileActivityLog>,
}

impl ApiState {
    pub fn new(registry: Arc<AccountRegistry>, activity: Arc<FileActivityLog>) -> Self {
        Self { registry, activity }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddAccountRequest {
    username: Option<String>,
    roblox_cookie: Option<String>,
    pulse_interval: Option<u64>,
    mode: Option<String>,
    enable_logging: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

pub async fn handle_request(
    req: Request<Body>,
    state: ApiState,
) -> Result<Response<Body>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let parts: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .map(decode_path_segment)
        .collect();
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();

    tracing::debug!("[Api] {} {}", method, path);

    match (&method, parts.as_slice()) {
        (&Method::GET, ["health"]) => Ok(text_response(StatusCode::OK, "ok".to_string())),
        (&Method::GET, ["api", "accounts"]) => Ok(list_accounts(&state).await),
        (&Method::POST, ["api", "accounts"]) => {
            let body = hyper::body::to_bytes(req.into_body()).await?;
            Ok(add_account(&state, &body).await)
        }
        (&Method::DELETE, ["api", "accounts", username]) => {
            Ok(remove_account(&state, username).await)
        }
        (&Method::POST, ["api", "accounts", username, "mode"]) => {
            let body = hyper::body::to_bytes(req.into_body()).await?;
            Ok(update_mode(&state, username, &body).await)
        }
        (&Method::GET, ["api", "logs"]) => Ok(read_logs(&state)),
        _ => Ok(error_response(StatusCode::NOT_FOUND, "Not found")),
    }
}

async fn list_accounts(state: &ApiState) -> Response<Body> {
    let _ = state.registry.fetch_all_presences().await;
    let status = state.registry.status().await;
    json_response(StatusCode::OK, &status)
}

async fn add_account(state: &ApiState, body: &[u8]) -> Response<Body> {
    let request: AddAccountRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid request body: {}", e));
        }
    };

    let username = request.username.as_deref().map(str::trim).unwrap_or_default();
    let cookie = request.roblox_cookie.as_deref().map(str::trim).unwrap_or_default();
    if username.is_empty() || cookie.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Username and robloxCookie are required.",
        );
    }

    let mode = match request.mode.as_deref() {
        None => Mode::default(),
        Some(raw) => match Mode::from_str(raw) {
            Ok(mode) => mode,
            Err(_) => return error_response(StatusCode::BAD_REQUEST, INVALID_MODE),
        },
    };

    let mut settings = AccountSettings::new(username, cookie).with_mode(mode);
    if let Some(interval) = request.pulse_interval.filter(|ms| *ms > 0) {
        settings = settings.with_pulse_interval(interval);
    }
    if let Some(enabled) = request.enable_logging {
        settings = settings.with_logging(enabled);
    }

    match state.registry.add_account(settings).await {
        Ok(outcome) => json_response(StatusCode::CREATED, &outcome),
        Err(e) => registry_error(e),
    }
}

async fn remove_account(state: &ApiState, username: &str) -> Response<Body> {
    match state.registry.remove_account(username).await {
        Ok(outcome) => json_response(StatusCode::OK, &outcome),
        Err(e) => registry_error(e),
    }
}

async fn update_mode(state: &ApiState, username: &str, body: &[u8]) -> Response<Body> {
    let mode = serde_json::from_slice::<ModeRequest>(body)
        .ok()
        .and_then(|request| request.mode)
        .and_then(|raw| Mode::from_str(&raw).ok());
    let Some(mode) = mode else {
        return error_response(StatusCode::BAD_REQUEST, INVALID_MODE);
    };

    match state.registry.update_account_mode(username, mode).await {
        Ok(outcome) => json_response(StatusCode::OK, &outcome),
        Err(e) => registry_error(e),
    }
}

fn read_logs(state: &ApiState) -> Response<Body> {
    match state.activity.read_all() {
        Ok(Some(text)) => text_response(StatusCode::OK, text),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Log file not found."),
        Err(e) => {
            tracing::error!("[Api] Failed to read log file: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read log file.")
        }
    }
}

fn registry_error(error: PulseError) -> Response<Body> {
    let status = if error.is_duplicate() {
        StatusCode::CONFLICT
    } else if error.is_not_found() {
        StatusCode::NOT_FOUND
    } else if error.is_invalid_credential() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!("[Api] Request failed: {}", error);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, &error.to_string())
}

fn decode_path_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => response(status, Body::from(bytes), "application/json"),
        Err(e) => {
            tracing::error!("[Api] Failed to serialize response: {}", e);
            response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Body::from(r#"{"error":"Failed to serialize response"}"#),
                "application/json",
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &ErrorBody { error: message })
}

fn text_response(status: StatusCode, text: String) -> Response<Body> {
    response(status, Body::from(text), "text/plain; charset=utf-8")
}

fn response(status: StatusCode, body: Body, content_type: &'static str) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
