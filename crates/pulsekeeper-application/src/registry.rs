//! AccountRegistry - the set of account monitors and their persisted configuration.
//!
//! Mutations hold the configuration lock only while the document is saved and
//! the maps are updated. Monitor start and stop run outside it, so status
//! snapshots never wait behind a slow account.

use pulsekeeper_core::account::{
    AccountSettings, EffectiveSettings, GlobalSettings, Mode, PulseConfig,
};
use pulsekeeper_core::activity::{ActivityLog, LogLevel, LogRecord};
use pulsekeeper_core::error::{PulseError, Result};
use pulsekeeper_core::remote::{Presence, RemoteService};
use pulsekeeper_core::repository::ConfigRepository;
use pulsekeeper_core::status::{AccountStatus, MonitorPhase, OperationOutcome, PresenceReport};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::session::SessionMonitor;

/// Delay inserted before each start in [`AccountRegistry::start_all`].
pub const DEFAULT_START_STAGGER: Duration = Duration::from_millis(1000);

/// Account identifier used for registry-level activity records.
pub const REGISTRY_IDENTIFIER: &str = "AccountManager";

/// An account kept in the configuration whose credential failed validation.
#[derive(Debug, Clone)]
struct RejectedAccount {
    settings: AccountSettings,
    reason: String,
}

/// Owns every account monitor and the persisted configuration.
///
/// `AccountRegistry` is responsible for:
/// - Loading (or regenerating) `config.json` at startup
/// - Adding, removing and re-moding accounts, persisting each change
/// - Batch presence lookups
/// - Starting and stopping all monitors
pub struct AccountRegistry {
    /// Running and stopped monitors, keyed by username
    monitors: RwLock<HashMap<String, Arc<SessionMonitor>>>,
    /// Accounts with invalid credentials, kept so they stay visible and removable
    rejected: RwLock<HashMap<String, RejectedAccount>>,
    /// Last persisted configuration document; also serializes mutations
    config: Mutex<PulseConfig>,
    /// Global defaults as loaded; never changed at runtime
    global: GlobalSettings,
    repository: Arc<dyn ConfigRepository>,
    remote: Arc<dyn RemoteService>,
    activity: Arc<dyn ActivityLog>,
    stagger: Duration,
}

impl AccountRegistry {
    /// Loads the configuration and builds one monitor per account.
    ///
    /// A missing or malformed configuration is replaced with defaults and
    /// written back immediately; a malformed file is first copied aside by
    /// [`ConfigRepository::backup`]. Nothing is started.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup fails (the file is then left alone) or
    /// if a regenerated configuration cannot be saved.
    pub fn open(
        repository: Arc<dyn ConfigRepository>,
        remote: Arc<dyn RemoteService>,
        activity: Arc<dyn ActivityLog>,
    ) -> Result<Self> {
        let config = load_or_regenerate(repository.as_ref(), activity.as_ref())?;

        let mut monitors = HashMap::new();
        let mut rejected = HashMap::new();
        for account in &config.accounts {
            match SessionMonitor::new(
                account,
                &config.global_config,
                Arc::clone(&remote),
                Arc::clone(&activity),
            ) {
                Ok(monitor) => {
                    monitors.insert(account.username.clone(), Arc::new(monitor));
                }
                Err(e) => {
                    activity.append(LogRecord::new(
                        LogLevel::Error,
                        account.username.clone(),
                        format!(
                            "Skipping account {}: {}. This account will be inactive.",
                            account.username, e
                        ),
                    ));
                    rejected.insert(
                        account.username.clone(),
                        RejectedAccount {
                            settings: account.clone(),
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        tracing::info!(
            "[AccountRegistry] Loaded {} account(s), {} rejected",
            monitors.len(),
            rejected.len()
        );

        Ok(Self {
            monitors: RwLock::new(monitors),
            rejected: RwLock::new(rejected),
            global: config.global_config.clone(),
            config: Mutex::new(config),
            repository,
            remote,
            activity,
            stagger: DEFAULT_START_STAGGER,
        })
    }

    /// Overrides the delay between starts in [`start_all`](Self::start_all).
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub async fn monitor(&self, username: &str) -> Option<Arc<SessionMonitor>> {
        self.monitors.read().await.get(username).cloned()
    }

    /// Snapshot of the persisted configuration.
    pub async fn config(&self) -> PulseConfig {
        self.config.lock().await.clone()
    }

    async fn is_known(&self, username: &str) -> bool {
        self.monitors.read().await.contains_key(username)
            || self.rejected.read().await.contains_key(username)
    }

    /// Adds, persists and starts a new account.
    ///
    /// A start failure is reported as a partial outcome; the persisted entry
    /// is kept so the account shows up as inactive.
    ///
    /// # Errors
    ///
    /// - `DuplicateAccount` if the username is already registered
    /// - `InvalidCredential` if the cookie fails validation (nothing is persisted)
    /// - persistence errors from the repository
    pub async fn add_account(&self, settings: AccountSettings) -> Result<OperationOutcome> {
        let username = settings.username.clone();
        let monitor = {
            let mut config = self.config.lock().await;
            if config.contains(&username) || self.is_known(&username).await {
                return Err(PulseError::DuplicateAccount(username));
            }

            let monitor = Arc::new(SessionMonitor::new(
                &settings,
                &self.global,
                Arc::clone(&self.remote),
                Arc::clone(&self.activity),
            )?);

            let mut next = config.clone();
            next.accounts.push(settings.clone());
            self.repository.save(&next)?;
            *config = next;

            self.monitors
                .write()
                .await
                .insert(username.clone(), Arc::clone(&monitor));
            monitor
        };

        match monitor.start().await {
            Ok(()) => {
                self.log(
                    LogLevel::System,
                    format!("Account {} added and started in {} mode.", username, settings.mode),
                );
                Ok(OperationOutcome::ok(format!("Account {} added.", username)))
            }
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    format!("Failed to start newly added account {}: {}", username, e),
                );
                Ok(OperationOutcome::partial(format!(
                    "Account {} added but failed to start.",
                    username
                )))
            }
        }
    }

    /// Forgets an account, persists the configuration, then stops its monitor.
    ///
    /// The monitor is retired before it is stopped, so a start still queued
    /// for it (from [`start_all`](Self::start_all)) becomes a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the username is unknown; the registry and the
    /// configuration are left unchanged.
    pub async fn remove_account(&self, username: &str) -> Result<OperationOutcome> {
        let monitor = {
            let mut config = self.config.lock().await;
            if !self.is_known(username).await {
                return Err(PulseError::not_found("account", username));
            }

            let mut next = config.clone();
            next.remove(username);
            self.repository.save(&next)?;
            *config = next;

            self.rejected.write().await.remove(username);
            self.monitors.write().await.remove(username)
        };

        if let Some(monitor) = monitor {
            monitor.retire().await;
        }

        self.log(LogLevel::System, format!("Account {} removed.", username));
        Ok(OperationOutcome::ok(format!("Account {} removed.", username)))
    }

    /// Persists a new mode for an account and restarts its monitor with it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the username is unknown, or a persistence error.
    pub async fn update_account_mode(&self, username: &str, mode: Mode) -> Result<OperationOutcome> {
        let (monitor, interval_ms) = {
            let mut config = self.config.lock().await;
            if !self.is_known(username).await {
                return Err(PulseError::not_found("account", username));
            }

            let mut next = config.clone();
            let entry = next
                .find_mut(username)
                .ok_or_else(|| PulseError::not_found("account", username))?;
            entry.mode = mode;
            let entry = entry.clone();
            let interval_ms =
                EffectiveSettings::resolve(&self.global, &entry, None).pulse_interval_ms();
            self.repository.save(&next)?;
            *config = next;

            if let Some(rejected) = self.rejected.write().await.get_mut(username) {
                rejected.settings = entry;
            }
            (self.monitor(username).await, interval_ms)
        };

        let Some(monitor) = monitor else {
            return Ok(OperationOutcome::partial(format!(
                "Account {} mode updated to {} but it cannot run with its current credential.",
                username, mode
            )));
        };

        let restarted = monitor.set_mode(mode).await;
        self.log(
            LogLevel::System,
            format!(
                "Account {} mode updated to {}. Effective interval: {}ms.",
                username, mode, interval_ms
            ),
        );

        match restarted {
            Ok(()) => Ok(OperationOutcome::ok(format!(
                "Account {} mode updated to {}.",
                username, mode
            ))),
            Err(e) => {
                tracing::warn!("[AccountRegistry] Restart after mode change failed for {}: {}", username, e);
                Ok(OperationOutcome::partial(format!(
                    "Account {} mode updated to {} but failed to restart.",
                    username, mode
                )))
            }
        }
    }

    /// Refreshes presence for every account with a known remote identity.
    ///
    /// Never fails: a lookup failure is logged and reported as
    /// [`PresenceReport::Failed`], leaving cached presence untouched.
    pub async fn fetch_all_presences(&self) -> PresenceReport {
        let monitors: Vec<Arc<SessionMonitor>> =
            self.monitors.read().await.values().cloned().collect();

        let mut by_id: HashMap<u64, Arc<SessionMonitor>> = HashMap::new();
        for monitor in monitors {
            if let Some(user_id) = monitor.user_id().await {
                by_id.insert(user_id, monitor);
            }
        }

        if by_id.is_empty() {
            tracing::debug!("[AccountRegistry] No user ids known yet, skipping presence lookup");
            return PresenceReport::Updated(HashMap::new());
        }

        let mut user_ids: Vec<u64> = by_id.keys().copied().collect();
        user_ids.sort_unstable();

        let presences = match self.lookup_presences(&user_ids).await {
            Ok(presences) => presences,
            Err(message) => {
                self.log(
                    LogLevel::Error,
                    format!("Global presence fetch failed: {}", message),
                );
                return PresenceReport::Failed {
                    error: "Failed to fetch presences".to_string(),
                };
            }
        };

        let mut report = HashMap::new();
        for presence in presences {
            if let Some(monitor) = by_id.get(&presence.user_id) {
                monitor.set_presence(presence.clone()).await;
                report.insert(monitor.username().to_string(), presence);
            }
        }
        tracing::debug!("[AccountRegistry] Presence updated for {} account(s)", report.len());
        PresenceReport::Updated(report)
    }

    async fn lookup_presences(&self, user_ids: &[u64]) -> std::result::Result<Vec<Presence>, String> {
        let reply = self.remote.presence(user_ids).await.map_err(|e| e.to_string())?;
        if !reply.is_success() {
            return Err(reply
                .error_message()
                .unwrap_or_else(|| format!("HTTP {}", reply.status)));
        }
        let entries = reply
            .body
            .get("userPresences")
            .cloned()
            .ok_or_else(|| "response has no userPresences".to_string())?;
        serde_json::from_value(entries).map_err(|e| e.to_string())
    }

    /// Status of every account, including rejected ones. Never touches the
    /// network.
    pub async fn status(&self) -> BTreeMap<String, AccountStatus> {
        let monitors: Vec<Arc<SessionMonitor>> =
            self.monitors.read().await.values().cloned().collect();

        let mut statuses = BTreeMap::new();
        for monitor in monitors {
            statuses.insert(monitor.username().to_string(), monitor.status().await);
        }

        for (username, rejected) in self.rejected.read().await.iter() {
            let settings = EffectiveSettings::resolve(&self.global, &rejected.settings, None);
            statuses.insert(
                username.clone(),
                AccountStatus {
                    username: username.clone(),
                    is_active: false,
                    phase: MonitorPhase::Stopped,
                    last_pulse: None,
                    user_id: None,
                    display_name: None,
                    avatar_url: None,
                    presence: None,
                    mode: settings.mode,
                    pulse_interval: settings.pulse_interval_ms(),
                    logging_enabled: settings.logging_enabled,
                    last_error: Some(rejected.reason.clone()),
                },
            );
        }
        statuses
    }

    /// Starts every monitor in configuration order, waiting the stagger
    /// delay before each one. Returns how many ended up active.
    pub async fn start_all(&self) -> usize {
        let order: Vec<String> = self
            .config
            .lock()
            .await
            .accounts
            .iter()
            .map(|account| account.username.clone())
            .collect();

        let mut pending = Vec::new();
        for username in order {
            let Some(monitor) = self.monitor(&username).await else {
                continue;
            };
            tokio::time::sleep(self.stagger).await;
            pending.push((
                username,
                tokio::spawn(async move { monitor.start().await }),
            ));
        }

        let mut started = 0;
        for (username, handle) in pending {
            match handle.await {
                Ok(Ok(())) => started += 1,
                Ok(Err(e)) => {
                    tracing::warn!("[AccountRegistry] {} did not start: {}", username, e)
                }
                Err(e) => {
                    tracing::error!("[AccountRegistry] Start task for {} failed: {}", username, e)
                }
            }
        }

        tracing::info!("[AccountRegistry] All account monitor startups initiated ({} active)", started);
        started
    }

    /// Stops every monitor. They stay registered and can be started again.
    pub async fn stop_all(&self) {
        let monitors: Vec<Arc<SessionMonitor>> =
            self.monitors.read().await.values().cloned().collect();
        for monitor in monitors {
            monitor.stop().await;
        }
        tracing::info!("[AccountRegistry] All monitors stopped");
    }

    fn log(&self, level: LogLevel, message: String) {
        self.activity
            .append(LogRecord::new(level, REGISTRY_IDENTIFIER, message));
    }
}

fn load_or_regenerate(
    repository: &dyn ConfigRepository,
    activity: &dyn ActivityLog,
) -> Result<PulseConfig> {
    let reason = match repository.load() {
        Ok(Some(config)) => return Ok(config),
        Ok(None) => "no configuration file found".to_string(),
        Err(e) => {
            if let Some(saved) = repository.backup()? {
                activity.append(LogRecord::new(
                    LogLevel::Warning,
                    REGISTRY_IDENTIFIER,
                    format!("Unreadable configuration saved to {}.", saved),
                ));
            }
            e.to_string()
        }
    };

    tracing::warn!("[AccountRegistry] {}; regenerating defaults", reason);
    activity.append(LogRecord::new(
        LogLevel::Error,
        REGISTRY_IDENTIFIER,
        format!("Error loading config: {}. Using default configuration.", reason),
    ));

    let config = PulseConfig::default();
    repository.save(&config)?;
    Ok(config)
}
