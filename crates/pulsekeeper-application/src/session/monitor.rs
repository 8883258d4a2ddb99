//! SessionMonitor - lifecycle of one account's heartbeat.
//!
//! `start` confirms the identity, resolves a session id and sends one pulse
//! before arming the recurring timer. Lifecycle calls on one monitor are
//! serialized, so at most one timer is ever armed.

use super::context::SessionContext;
use super::pulse::send_pulse;
use super::tokens::{fetch_identity, resolve_session_id};
use pulsekeeper_core::account::{AccountSettings, EffectiveSettings, GlobalSettings, Mode};
use pulsekeeper_core::activity::{ActivityLog, LogLevel};
use pulsekeeper_core::credential::Credential;
use pulsekeeper_core::error::{PulseError, Result};
use pulsekeeper_core::remote::{Presence, RemoteService};
use pulsekeeper_core::status::{AccountStatus, MonitorPhase};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to an armed recurring pulse.
struct PulseTimer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Decrements the running-loop counter when a timer task ends.
struct LoopGuard(Arc<AtomicUsize>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SessionMonitor {
    ctx: Arc<SessionContext>,
    global: GlobalSettings,
    account: RwLock<AccountSettings>,
    settings: RwLock<EffectiveSettings>,
    phase: RwLock<MonitorPhase>,
    timer: Mutex<Option<PulseTimer>>,
    lifecycle: Mutex<()>,
    running_loops: Arc<AtomicUsize>,
    /// Set once the account is removed; later starts are refused
    retired: AtomicBool,
}

impl SessionMonitor {
    /// Builds a stopped monitor. Fails with `InvalidCredential` if the
    /// account's cookie does not pass validation.
    pub fn new(
        account: &AccountSettings,
        global: &GlobalSettings,
        remote: Arc<dyn RemoteService>,
        activity: Arc<dyn ActivityLog>,
    ) -> Result<Self> {
        let credential = Credential::new(account.roblox_cookie.clone())?;
        let settings = EffectiveSettings::resolve(global, account, None);
        let ctx = SessionContext::new(
            account.username.clone(),
            credential,
            settings.logging_enabled,
            remote,
            activity,
        );

        Ok(Self {
            ctx: Arc::new(ctx),
            global: global.clone(),
            account: RwLock::new(account.clone()),
            settings: RwLock::new(settings),
            phase: RwLock::new(MonitorPhase::Stopped),
            timer: Mutex::new(None),
            lifecycle: Mutex::new(()),
            running_loops: Arc::new(AtomicUsize::new(0)),
            retired: AtomicBool::new(false),
        })
    }

    pub fn username(&self) -> &str {
        self.ctx.username()
    }

    pub async fn settings(&self) -> EffectiveSettings {
        self.settings.read().await.clone()
    }

    pub async fn phase(&self) -> MonitorPhase {
        *self.phase.read().await
    }

    /// Whether a recurring pulse is currently armed.
    pub async fn is_active(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    /// Number of timer loops still running, including ones that were
    /// cancelled but are finishing an in-flight pulse.
    pub fn running_timers(&self) -> usize {
        self.running_loops.load(Ordering::SeqCst)
    }

    pub async fn user_id(&self) -> Option<u64> {
        self.ctx
            .runtime()
            .read()
            .await
            .identity
            .as_ref()
            .map(|identity| identity.id)
    }

    pub async fn set_presence(&self, presence: Presence) {
        self.ctx.runtime().write().await.presence = Some(presence);
    }

    /// Starts the monitor. A no-op when already active.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked().await
    }

    /// Stops the recurring pulse. Idempotent; an in-flight pulse is allowed
    /// to finish.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await;
    }

    /// Stops the monitor for good. Starts queued behind this call, or made
    /// after it, fail with `NotFound`.
    pub async fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.stop().await;
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Switches mode and restarts with the recomputed interval.
    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let current = self.settings.read().await.mode;
        let label = self.ctx.label().await;
        self.ctx
            .log(
                LogLevel::System,
                format!(
                    "Attempting to change mode from {} to {} for {}...",
                    current, mode, label
                ),
            )
            .await;

        self.stop_locked().await;
        *self.phase.write().await = MonitorPhase::Restarting;

        let settings = {
            let mut account = self.account.write().await;
            account.mode = mode;
            EffectiveSettings::resolve(&self.global, &account, None)
        };
        let interval_ms = settings.pulse_interval_ms();
        *self.settings.write().await = settings;

        self.ctx
            .log(
                LogLevel::System,
                format!(
                    "Mode for {} set to {}. New interval: {}ms. Restarting monitor...",
                    label, mode, interval_ms
                ),
            )
            .await;

        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<()> {
        if self.is_retired() {
            *self.phase.write().await = MonitorPhase::Stopped;
            return Err(PulseError::not_found("account", self.username()));
        }
        if self.timer.lock().await.is_some() {
            tracing::debug!("[SessionMonitor] {} already active", self.username());
            return Ok(());
        }

        *self.phase.write().await = MonitorPhase::Starting;
        let settings = self.settings.read().await.clone();
        let label = self.ctx.label().await;
        self.ctx
            .log(
                LogLevel::System,
                format!("Starting monitor for {} in {} mode...", label, settings.mode),
            )
            .await;

        if let Err(e) = self.bring_up(&settings).await {
            let label = self.ctx.label().await;
            self.ctx
                .log(
                    LogLevel::Error,
                    format!(
                        "FATAL: Failed to start monitor for {}: {}. This account will be inactive.",
                        label, e
                    ),
                )
                .await;
            self.ctx.record_error(e.to_string()).await;
            *self.phase.write().await = MonitorPhase::Stopped;
            return Err(e);
        }

        *self.timer.lock().await = Some(self.arm_timer(&settings));
        *self.phase.write().await = MonitorPhase::Active;
        self.ctx.runtime().write().await.last_error = None;

        let label = self.ctx.label().await;
        self.ctx
            .log(
                LogLevel::Success,
                format!(
                    "Monitor started for {}. Mode: {}, Interval: {}ms.",
                    label,
                    settings.mode,
                    settings.pulse_interval_ms()
                ),
            )
            .await;
        Ok(())
    }

    async fn bring_up(&self, settings: &EffectiveSettings) -> Result<()> {
        let identity = fetch_identity(&self.ctx).await?;
        self.ctx
            .log(
                LogLevel::Info,
                format!("User info confirmed for {}.", identity.display_name),
            )
            .await;
        resolve_session_id(&self.ctx).await;
        send_pulse(&self.ctx, settings).await?;
        Ok(())
    }

    async fn stop_locked(&self) {
        let timer = self.timer.lock().await.take();
        *self.phase.write().await = MonitorPhase::Stopped;

        if let Some(timer) = timer {
            timer.cancel.cancel();
            // Detached: the loop exits on its own after any in-flight pulse.
            drop(timer.task);
            let label = self.ctx.label().await;
            self.ctx
                .log(
                    LogLevel::System,
                    format!("Heartbeat Monitor stopped for {}.", label),
                )
                .await;
        }
    }

    fn arm_timer(&self, settings: &EffectiveSettings) -> PulseTimer {
        let cancel = CancellationToken::new();
        self.running_loops.fetch_add(1, Ordering::SeqCst);
        let guard = LoopGuard(Arc::clone(&self.running_loops));
        let ctx = Arc::clone(&self.ctx);
        let settings = settings.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            run_pulse_loop(ctx, settings, token).await;
        });

        PulseTimer { cancel, task }
    }

    /// Point-in-time status. Never touches the network.
    pub async fn status(&self) -> AccountStatus {
        let settings = self.settings.read().await.clone();
        let runtime = self.ctx.runtime().read().await.clone();
        AccountStatus {
            username: self.username().to_string(),
            is_active: self.is_active().await,
            phase: self.phase().await,
            last_pulse: runtime.last_pulse.map(|t| t.to_rfc3339()),
            user_id: runtime.identity.as_ref().map(|i| i.id),
            display_name: runtime.identity.map(|i| i.display_name),
            avatar_url: runtime.avatar_url,
            presence: runtime.presence,
            mode: settings.mode,
            pulse_interval: settings.pulse_interval_ms(),
            logging_enabled: settings.logging_enabled,
            last_error: runtime.last_error,
        }
    }
}

async fn run_pulse_loop(
    ctx: Arc<SessionContext>,
    settings: EffectiveSettings,
    cancel: CancellationToken,
) {
    let period = settings.pulse_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        if let Err(e) = send_pulse(&ctx, &settings).await {
            let label = ctx.label().await;
            ctx.log(
                LogLevel::Error,
                format!("Scheduled pulse failed for {}: {}", label, e),
            )
            .await;
        }

        let elapsed = started.elapsed();
        if elapsed > period {
            ctx.log(
                LogLevel::Warning,
                format!(
                    "Pulse took {}ms, longer than the {}ms interval. Missed ticks were skipped.",
                    elapsed.as_millis(),
                    period.as_millis()
                ),
            )
            .await;
        }
    }

    tracing::debug!("[SessionMonitor] pulse loop for {} ended", ctx.username());
}
