//! Scripted remote service shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use pulsekeeper_core::credential::Credential;
use pulsekeeper_core::error::{PulseError, Result};
use pulsekeeper_core::remote::{PulsePayload, RemoteReply, RemoteService};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const CSRF_TOKEN: &str = "csrf-token-123";

/// A credential that passes validation, distinct per seed.
pub fn cookie(seed: &str) -> String {
    format!("_|WARNING:-DO-NOT-SHARE-THIS.--{}-{}", seed, "X".repeat(40))
}

/// Remote service driven by per-test scripts.
///
/// Unless scripted otherwise every call succeeds: the logout probe returns
/// 403 with a CSRF token, identities are derived from the credential, and
/// pulses return 200.
#[derive(Default)]
pub struct ScriptedRemote {
    identities: Mutex<HashMap<String, (u64, String)>>,
    unauthorized: Mutex<HashSet<String>>,
    pulse_script: Mutex<VecDeque<u16>>,
    pulse_default: Mutex<Option<u16>>,
    home_cookies: Mutex<Vec<String>>,
    home_fails: AtomicBool,
    logout_without_token: AtomicBool,
    presence_fails: AtomicBool,
    next_id: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub identity_calls: AtomicUsize,
    pub home_calls: AtomicUsize,
    pub pulse_calls: AtomicUsize,
    pub presence_calls: AtomicUsize,
    pub session_ids: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(self, cookie: &str, id: u64, display_name: &str) -> Self {
        self.identities
            .lock()
            .unwrap()
            .insert(cookie.to_string(), (id, display_name.to_string()));
        self
    }

    /// Identity lookups for this credential answer 401.
    pub fn reject_identity(self, cookie: &str) -> Self {
        self.unauthorized.lock().unwrap().insert(cookie.to_string());
        self
    }

    /// Statuses returned by successive pulses before the default applies.
    pub fn with_pulse_script(self, statuses: &[u16]) -> Self {
        self.pulse_script.lock().unwrap().extend(statuses.iter().copied());
        self
    }

    /// Status returned by every unscripted pulse.
    pub fn with_pulse_default(self, status: u16) -> Self {
        *self.pulse_default.lock().unwrap() = Some(status);
        self
    }

    pub fn with_home_cookies(self, cookies: &[&str]) -> Self {
        *self.home_cookies.lock().unwrap() = cookies.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_failing_home(self) -> Self {
        self.home_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn without_csrf_token(self) -> Self {
        self.logout_without_token.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_presence_failing(&self, failing: bool) {
        self.presence_fails.store(failing, Ordering::SeqCst);
    }

    pub fn pulses(&self) -> usize {
        self.pulse_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn logout(&self, _credential: &Credential) -> Result<RemoteReply> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let reply = RemoteReply::new(403).with_body(json!({
            "errors": [{ "code": 0, "message": "Token Validation Failed" }]
        }));
        if self.logout_without_token.load(Ordering::SeqCst) {
            Ok(reply)
        } else {
            Ok(reply.with_csrf_token(CSRF_TOKEN))
        }
    }

    async fn authenticated_user(&self, credential: &Credential) -> Result<RemoteReply> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        let key = credential.expose().to_string();
        if self.unauthorized.lock().unwrap().contains(&key) {
            return Ok(RemoteReply::new(401).with_body(json!({
                "errors": [{ "code": 0, "message": "Authorization has been denied for this request." }]
            })));
        }

        let scripted = self.identities.lock().unwrap().get(&key).cloned();
        let (id, display_name) = scripted.unwrap_or_else(|| {
            let id = 1_000 + self.next_id.fetch_add(1, Ordering::SeqCst) as u64;
            (id, format!("Player{}", id))
        });
        Ok(RemoteReply::new(200).with_body(json!({
            "id": id,
            "name": display_name.to_lowercase(),
            "displayName": display_name,
        })))
    }

    async fn avatar_headshot(&self, user_id: u64) -> Result<RemoteReply> {
        Ok(RemoteReply::new(200).with_body(json!({
            "data": [{
                "targetId": user_id,
                "state": "Completed",
                "imageUrl": format!("https://tr.rbxcdn.com/{}/150/150/AvatarHeadshot/Png", user_id),
            }]
        })))
    }

    async fn home(&self, _credential: &Credential) -> Result<RemoteReply> {
        self.home_calls.fetch_add(1, Ordering::SeqCst);
        if self.home_fails.load(Ordering::SeqCst) {
            return Err(PulseError::transport("connection reset"));
        }
        let mut reply = RemoteReply::new(200);
        for cookie in self.home_cookies.lock().unwrap().iter() {
            reply = reply.with_cookie(cookie.clone());
        }
        Ok(reply)
    }

    async fn pulse(
        &self,
        _credential: &Credential,
        csrf_token: &str,
        payload: &PulsePayload,
    ) -> Result<RemoteReply> {
        self.pulse_calls.fetch_add(1, Ordering::SeqCst);
        self.session_ids
            .lock()
            .unwrap()
            .push(payload.session_info.session_id.clone());
        assert_eq!(csrf_token, CSRF_TOKEN);

        let status = self
            .pulse_script
            .lock()
            .unwrap()
            .pop_front()
            .or(*self.pulse_default.lock().unwrap())
            .unwrap_or(200);

        let reply = RemoteReply::new(status);
        Ok(if status < 300 {
            reply.with_body(json!({ "success": true }))
        } else {
            reply.with_body(json!({ "errors": [{ "code": 0, "message": "Service unavailable" }] }))
        })
    }

    async fn presence(&self, user_ids: &[u64]) -> Result<RemoteReply> {
        self.presence_calls.fetch_add(1, Ordering::SeqCst);
        if self.presence_fails.load(Ordering::SeqCst) {
            return Ok(RemoteReply::new(500).with_body(json!({ "errors": [{ "message": "down" }] })));
        }
        let entries: Vec<_> = user_ids
            .iter()
            .map(|id| {
                json!({
                    "userPresenceType": 1,
                    "lastLocation": "Website",
                    "placeId": null,
                    "userId": id,
                })
            })
            .collect();
        Ok(RemoteReply::new(200).with_body(json!({ "userPresences": entries })))
    }
}
