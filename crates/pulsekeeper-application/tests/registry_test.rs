mod support;

use pulsekeeper_application::AccountRegistry;
use pulsekeeper_core::account::{AccountSettings, GlobalSettings, Mode, PulseConfig};
use pulsekeeper_core::activity::{LogLevel, MemoryActivityLog};
use pulsekeeper_core::repository::ConfigRepository;
use pulsekeeper_core::status::{MonitorPhase, PresenceReport};
use pulsekeeper_infrastructure::{FileActivityLog, JsonConfigRepository};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{ScriptedRemote, cookie};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    repository: Arc<JsonConfigRepository>,
    remote: Arc<ScriptedRemote>,
    log: Arc<MemoryActivityLog>,
}

impl Fixture {
    fn new(remote: ScriptedRemote, config: Option<PulseConfig>) -> Self {
        let dir = TempDir::new().unwrap();
        let repository = Arc::new(JsonConfigRepository::new(dir.path().join("config.json")));
        if let Some(config) = config {
            repository.save(&config).unwrap();
        }
        Self {
            _dir: dir,
            repository,
            remote: Arc::new(remote),
            log: Arc::new(MemoryActivityLog::new()),
        }
    }

    fn open(&self) -> AccountRegistry {
        AccountRegistry::open(
            self.repository.clone(),
            self.remote.clone(),
            self.log.clone(),
        )
        .unwrap()
        .with_stagger(Duration::from_millis(5))
    }

    fn persisted(&self) -> PulseConfig {
        self.repository.load().unwrap().unwrap()
    }

    fn raw(&self) -> String {
        std::fs::read_to_string(self.repository.path()).unwrap()
    }
}

fn config_with(accounts: Vec<AccountSettings>) -> PulseConfig {
    PulseConfig {
        accounts,
        global_config: GlobalSettings::default(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_all_keeps_failures_isolated() {
    let healthy = cookie("healthy");
    let broken = cookie("broken");
    let fixture = Fixture::new(
        ScriptedRemote::new()
            .with_identity(&healthy, 11, "Healthy")
            .reject_identity(&broken),
        Some(config_with(vec![
            AccountSettings::new("broken", broken),
            AccountSettings::new("healthy", healthy),
        ])),
    );
    let registry = fixture.open();

    let started = registry.start_all().await;
    assert_eq!(started, 1);

    let status = registry.status().await;
    assert_eq!(status.len(), 2);
    assert!(status["healthy"].is_active);
    assert_eq!(status["healthy"].phase, MonitorPhase::Active);
    assert_eq!(status["healthy"].display_name.as_deref(), Some("Healthy"));
    assert!(!status["broken"].is_active);
    assert_eq!(status["broken"].phase, MonitorPhase::Stopped);
    assert!(status["broken"].last_error.is_some());

    registry.stop_all().await;
    assert!(!registry.status().await["healthy"].is_active);
}

#[tokio::test]
async fn test_remove_unknown_account_changes_nothing() {
    let fixture = Fixture::new(
        ScriptedRemote::new(),
        Some(config_with(vec![AccountSettings::new("alpha", cookie("a"))])),
    );
    let registry = fixture.open();
    let before = fixture.raw();

    let err = registry.remove_account("ghost").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(fixture.raw(), before);
    assert_eq!(registry.status().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_add_duplicate_account_is_rejected() {
    let fixture = Fixture::new(ScriptedRemote::new(), Some(config_with(vec![])));
    let registry = fixture.open();

    let outcome = registry
        .add_account(AccountSettings::new("alpha", cookie("a")))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.message, "Account alpha added.");

    let err = registry
        .add_account(AccountSettings::new("alpha", cookie("other")))
        .await
        .unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(fixture.persisted().accounts.len(), 1);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_add_invalid_credential_persists_nothing() {
    let fixture = Fixture::new(ScriptedRemote::new(), Some(config_with(vec![])));
    let registry = fixture.open();

    let err = registry
        .add_account(AccountSettings::new("alpha", "cookie=abcdefghijklmnopqrstuvwxyz0123456789"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_credential());
    assert!(fixture.persisted().accounts.is_empty());
    assert!(registry.status().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_add_account_that_fails_to_start_is_kept() {
    let bad = cookie("expired");
    let fixture = Fixture::new(
        ScriptedRemote::new().reject_identity(&bad),
        Some(config_with(vec![])),
    );
    let registry = fixture.open();

    let outcome = registry
        .add_account(AccountSettings::new("alpha", bad))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.message, "Account alpha added but failed to start.");
    assert_eq!(fixture.persisted().accounts.len(), 1);
    assert!(!registry.status().await["alpha"].is_active);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_interval_persisted_only_when_given() {
    let fixture = Fixture::new(ScriptedRemote::new(), Some(config_with(vec![])));
    let registry = fixture.open();

    registry
        .add_account(AccountSettings::new("plain", cookie("p")).with_mode(Mode::Partial))
        .await
        .unwrap();
    registry
        .add_account(AccountSettings::new("custom", cookie("c")).with_pulse_interval(12_000))
        .await
        .unwrap();

    let persisted = fixture.persisted();
    assert_eq!(persisted.find("plain").unwrap().pulse_interval, None);
    assert_eq!(persisted.find("custom").unwrap().pulse_interval, Some(12_000));

    let status = registry.status().await;
    assert_eq!(status["plain"].pulse_interval, 572_123);
    assert_eq!(status["custom"].pulse_interval, 12_000);

    registry.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_remove_account_stops_and_persists() {
    let fixture = Fixture::new(ScriptedRemote::new(), Some(config_with(vec![])));
    let registry = fixture.open();
    registry
        .add_account(AccountSettings::new("alpha", cookie("a")))
        .await
        .unwrap();
    let monitor = registry.monitor("alpha").await.unwrap();

    let outcome = registry.remove_account("alpha").await.unwrap();
    assert_eq!(outcome.message, "Account alpha removed.");
    assert!(!monitor.is_active().await);
    assert!(registry.monitor("alpha").await.is_none());
    assert!(fixture.persisted().accounts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_update_mode_persists_and_restarts() {
    let fixture = Fixture::new(
        ScriptedRemote::new(),
        Some(config_with(vec![
            AccountSettings::new("alpha", cookie("a")).with_pulse_interval(40_000),
        ])),
    );
    let registry = fixture.open();
    registry.start_all().await;

    let outcome = registry
        .update_account_mode("alpha", Mode::Partial)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.message, "Account alpha mode updated to partial.");

    let entry = fixture.persisted().find("alpha").cloned().unwrap();
    assert_eq!(entry.mode, Mode::Partial);
    assert_eq!(entry.pulse_interval, Some(40_000));

    let status = &registry.status().await["alpha"];
    assert!(status.is_active);
    assert_eq!(status.mode, Mode::Partial);
    assert_eq!(status.pulse_interval, 572_123);
    assert_eq!(
        fixture
            .log
            .matching(LogLevel::System, "Effective interval: 572123ms.")
            .len(),
        1
    );

    let err = registry
        .update_account_mode("ghost", Mode::Full)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    registry.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_presences_cached_and_failures_reported() {
    let fixture = Fixture::new(
        ScriptedRemote::new().with_identity(&cookie("a"), 77, "Alpha"),
        Some(config_with(vec![AccountSettings::new("alpha", cookie("a"))])),
    );
    let registry = fixture.open();

    // No identities known yet: no lookup is made.
    assert_eq!(
        registry.fetch_all_presences().await,
        PresenceReport::Updated(Default::default())
    );
    assert_eq!(fixture.remote.presence_calls.load(Ordering::SeqCst), 0);

    registry.start_all().await;
    let PresenceReport::Updated(report) = registry.fetch_all_presences().await else {
        panic!("presence lookup should succeed");
    };
    assert_eq!(report["alpha"].user_id, 77);
    assert_eq!(report["alpha"].last_location.as_deref(), Some("Website"));

    fixture.remote.set_presence_failing(true);
    let failed = registry.fetch_all_presences().await;
    assert!(failed.is_failed());
    assert_eq!(
        fixture
            .log
            .matching(LogLevel::Error, "Global presence fetch failed")
            .len(),
        1
    );

    let cached = registry.status().await["alpha"].presence.clone().unwrap();
    assert_eq!(cached.user_id, 77);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_malformed_config_is_regenerated() {
    let fixture = Fixture::new(ScriptedRemote::new(), None);
    std::fs::write(fixture.repository.path(), "{ not json").unwrap();

    let registry = fixture.open();
    assert!(registry.status().await.is_empty());

    let regenerated = fixture.persisted();
    assert_eq!(regenerated, PulseConfig::default());
    assert_eq!(regenerated.global_config.retry_attempts, 3);
    assert_eq!(regenerated.global_config.pulse_interval_partial, 572_123);
    assert_eq!(
        fixture
            .log
            .matching(LogLevel::Error, "Using default configuration.")
            .len(),
        1
    );

    let backup = fixture.repository.backup_path();
    assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ not json");
    assert_eq!(
        fixture
            .log
            .matching(LogLevel::Warning, "Unreadable configuration saved to")
            .len(),
        1
    );
}

#[tokio::test]
async fn test_odd_field_values_keep_every_account() {
    let fixture = Fixture::new(ScriptedRemote::new(), None);
    let raw = format!(
        r#"{{"accounts": [
    {{"username": "alpha", "robloxCookie": "{}", "mode": "Partial"}},
    {{"username": "beta", "robloxCookie": "{}", "mode": "spoof", "enableLogging": null}}
]}}"#,
        cookie("a"),
        cookie("b")
    );
    std::fs::write(fixture.repository.path(), &raw).unwrap();

    let registry = fixture.open();
    let status = registry.status().await;
    assert_eq!(status.len(), 2);
    assert_eq!(status["alpha"].mode, Mode::Partial);
    assert_eq!(status["beta"].mode, Mode::Full);
    assert!(status["beta"].logging_enabled);

    assert_eq!(fixture.raw(), raw);
    assert!(!fixture.repository.backup_path().exists());
    assert!(
        fixture
            .log
            .matching(LogLevel::Error, "Error loading config")
            .is_empty()
    );
}

#[tokio::test(start_paused = true)]
async fn test_status_answers_while_removal_waits_on_a_slow_start() {
    let fixture = Fixture::new(
        ScriptedRemote::new().with_pulse_default(500),
        Some(config_with(vec![AccountSettings::new("slow", cookie("s"))])),
    );
    let registry = Arc::new(fixture.open());
    let monitor = registry.monitor("slow").await.unwrap();

    let starting = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.start().await })
    };
    while monitor.phase().await != MonitorPhase::Starting {
        tokio::task::yield_now().await;
    }

    let removing = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.remove_account("slow").await })
    };
    for _ in 0..100 {
        if registry.monitor("slow").await.is_none() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(registry.monitor("slow").await.is_none());

    // The start is still retrying; status must not queue behind it.
    let status = tokio::time::timeout(Duration::from_secs(1), registry.status())
        .await
        .expect("status blocked behind a pending removal");
    assert!(status.is_empty());
    assert!(fixture.persisted().accounts.is_empty());

    assert!(starting.await.unwrap().unwrap_err().is_pulse_exhausted());
    removing.await.unwrap().unwrap();
    assert!(!monitor.is_active().await);
    assert_eq!(monitor.running_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_removal_during_start_all_leaves_no_timer() {
    let fixture = Fixture::new(
        ScriptedRemote::new(),
        Some(config_with(vec![AccountSettings::new("alpha", cookie("a"))])),
    );
    let registry = Arc::new(fixture.open());
    let monitor = registry.monitor("alpha").await.unwrap();

    let starting_all = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.start_all().await })
    };
    // start_all has picked up the monitor and is waiting out the stagger.
    tokio::task::yield_now().await;
    registry.remove_account("alpha").await.unwrap();

    assert_eq!(starting_all.await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(60_000)).await;
    assert!(monitor.is_retired());
    assert!(!monitor.is_active().await);
    assert_eq!(monitor.running_timers(), 0);
    assert_eq!(fixture.remote.pulses(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_activity_reaches_log_file() {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(JsonConfigRepository::new(dir.path().join("config.json")));
    repository
        .save(&config_with(vec![AccountSettings::new("alpha", cookie("a"))]))
        .unwrap();
    let file_log = Arc::new(FileActivityLog::new(dir.path().join("roblox_heartbeat.log")));
    let remote = Arc::new(ScriptedRemote::new().with_identity(&cookie("a"), 5, "Alpha"));

    let registry = AccountRegistry::open(repository, remote, file_log.clone())
        .unwrap()
        .with_stagger(Duration::ZERO);
    registry.start_all().await;
    registry.stop_all().await;

    let text = file_log.read_all().unwrap().unwrap();
    assert!(text.contains("[SYSTEM] [alpha] Starting monitor for alpha in full mode..."));
    assert!(text.contains("[SUCCESS] [Alpha] Pulse successful for Alpha. Mode: full."));
    assert!(text.contains("[SYSTEM] [Alpha] Heartbeat Monitor stopped for Alpha."));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_logging_emits_nothing() {
    let fixture = Fixture::new(
        ScriptedRemote::new(),
        Some(config_with(vec![
            AccountSettings::new("quiet", cookie("q")).with_logging(false),
        ])),
    );
    let registry = fixture.open();
    registry.start_all().await;

    assert!(registry.status().await["quiet"].is_active);
    assert!(fixture.log.records().is_empty());

    registry.stop_all().await;
}
