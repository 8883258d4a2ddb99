//! Process setup: tracing, configuration scaffolding and the serve loop.

use crate::api::{self, ApiState};
use anyhow::{Context, Result, bail};
use hyper::Server;
use hyper::server::Builder;
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use pulsekeeper_application::AccountRegistry;
use pulsekeeper_core::account::EffectiveSettings;
use pulsekeeper_core::credential;
use pulsekeeper_core::repository::ConfigRepository;
use pulsekeeper_core::status::PresenceReport;
use pulsekeeper_infrastructure::config_repository::default_scaffold;
use pulsekeeper_infrastructure::{FileActivityLog, JsonConfigRepository, PulsePaths};
use pulsekeeper_interaction::RobloxClient;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// First dashboard port tried by `serve`.
pub const DEFAULT_PORT: u16 = 13370;
/// How many successive ports `serve` tries before giving up.
pub const PORT_ATTEMPTS: u16 = 50;

const PRESENCE_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Installs the console subscriber. An explicit level wins over `RUST_LOG`.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Writes the default configuration, refusing to clobber an existing one
/// unless `force` is set.
pub fn init(paths: &PulsePaths, force: bool) -> Result<()> {
    paths
        .ensure_base_dir()
        .with_context(|| format!("Failed to create {}", paths.base_dir().display()))?;
    let repository = JsonConfigRepository::new(paths.config_file());

    if repository.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            repository.path().display()
        );
    }

    repository
        .save(&default_scaffold())
        .context("Failed to write default configuration")?;
    println!("Wrote {}", repository.path().display());
    println!("Replace the placeholder cookie, then run `pulsekeeper serve`.");
    Ok(())
}

/// Prints each account's resolved settings as JSON. No network access.
pub fn print_status(paths: &PulsePaths) -> Result<()> {
    let repository = JsonConfigRepository::new(paths.config_file());
    let config = repository
        .load()
        .context("Failed to read configuration")?
        .unwrap_or_default();

    let accounts: Vec<serde_json::Value> = config
        .accounts
        .iter()
        .map(|account| {
            let settings = EffectiveSettings::resolve(&config.global_config, account, None);
            serde_json::json!({
                "username": account.username,
                "mode": settings.mode,
                "pulseInterval": settings.pulse_interval_ms(),
                "retryAttempts": settings.retry_attempts,
                "retryDelay": settings.retry_delay.as_millis() as u64,
                "enableLogging": settings.logging_enabled,
                "credentialValid": credential::validate(&account.roblox_cookie).is_ok(),
            })
        })
        .collect();

    let report = serde_json::json!({
        "configFile": repository.path().display().to_string(),
        "logFile": paths.log_file().display().to_string(),
        "accounts": accounts,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Runs every monitor plus the dashboard API until Ctrl-C.
pub async fn serve(paths: &PulsePaths, port: u16) -> Result<()> {
    paths
        .ensure_base_dir()
        .with_context(|| format!("Failed to create {}", paths.base_dir().display()))?;

    let repository = Arc::new(JsonConfigRepository::new(paths.config_file()));
    if !repository.exists() {
        repository
            .save(&default_scaffold())
            .context("Failed to write default configuration")?;
        tracing::info!(
            "[Bootstrap] Created default configuration at {}",
            repository.path().display()
        );
    }

    let activity = Arc::new(FileActivityLog::new(paths.log_file()));
    let remote = Arc::new(RobloxClient::new()?);
    let registry = Arc::new(
        AccountRegistry::open(repository, remote, activity.clone())
            .context("Failed to initialize account registry")?,
    );

    let (builder, addr) = bind_dashboard(port)?;
    let state = ApiState::new(Arc::clone(&registry), activity);
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                api::handle_request(req, state)
            }))
        }
    });
    let server = builder
        .serve(make_svc)
        .with_graceful_shutdown(shutdown_signal());

    tracing::info!("[Bootstrap] Dashboard API listening on http://{}", addr);
    tracing::info!("[Bootstrap] Health check: http://{}/health", addr);

    let starter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            registry.start_all().await;
        })
    };
    let refresher = tokio::spawn(refresh_presences(Arc::clone(&registry)));

    let served = server.await;

    starter.abort();
    refresher.abort();
    registry.stop_all().await;
    tracing::info!("[Bootstrap] Shutdown complete");

    served.context("Dashboard server failed")
}

/// Binds the first free port on localhost at or after `start`.
fn bind_dashboard(start: u16) -> Result<(Builder<AddrIncoming>, SocketAddr)> {
    for offset in 0..PORT_ATTEMPTS {
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match Server::try_bind(&addr) {
            Ok(builder) => return Ok((builder, addr)),
            Err(e) => {
                tracing::warn!("[Bootstrap] Port {} unavailable ({}), trying next", port, e);
            }
        }
    }
    bail!(
        "No free port found in {}..{}",
        start,
        start.saturating_add(PORT_ATTEMPTS)
    )
}

async fn refresh_presences(registry: Arc<AccountRegistry>) {
    let mut ticker = tokio::time::interval(PRESENCE_REFRESH_INTERVAL);
    // The first tick completes immediately; monitors are still starting then.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let PresenceReport::Failed { error } = registry.fetch_all_presences().await {
            tracing::warn!("[Bootstrap] Presence refresh failed: {}", error);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[Bootstrap] Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[Bootstrap] Ctrl-C received, stopping monitors...");
}
