use linkwatch::adapters::{FileCredentialStore, ReqwestHttpClient};
use linkwatch::auth::TokenManager;
use linkwatch::config::Settings;
use linkwatch::events::AuthEvent;
use linkwatch::health::{ConnectionMonitor, ConnectionState};
use linkwatch::traits::{CredentialStore, HttpClient};

use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linkwatch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn log_state(state: &ConnectionState) {
    match &state.error {
        Some(error) => warn!(
            "backend {} (retry {}, down for {}s, next probe in {}s): {}",
            state.status,
            state.retry_count,
            state.downtime.as_secs(),
            state.next_interval.as_secs(),
            error
        ),
        None => info!(
            "backend {} ({} ms)",
            state.status,
            state.latency.map(|l| l.as_millis()).unwrap_or_default()
        ),
    }
}

fn credential_store(settings: &Settings) -> Result<Arc<dyn CredentialStore>> {
    let dir = settings.credentials_dir.as_ref().ok_or_else(|| {
        eyre!("no home directory to keep credentials in; set LINKWATCH_CREDENTIALS_DIR")
    })?;
    Ok(Arc::new(FileCredentialStore::new(dir)))
}

/// Probe once and print the resulting state as JSON.
async fn run_check(monitor: &ConnectionMonitor) -> Result<()> {
    monitor.start();
    let state = monitor.check_connection().await;
    monitor.stop();
    println!("{}", serde_json::to_string_pretty(&state)?);
    if !state.is_connected() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(settings: Settings, check_only: bool) -> Result<()> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let monitor = ConnectionMonitor::new(Arc::clone(&http), settings.monitor.clone());

    if check_only {
        return run_check(&monitor).await;
    }

    let store = credential_store(&settings)?;
    let tokens = TokenManager::new(http, store, settings.token.clone());

    let _state_log = monitor.subscribe(log_state);
    let _auth_log = tokens.subscribe(|event| match event {
        AuthEvent::TokenRefreshed { .. } => info!("session renewed"),
        AuthEvent::Logout => warn!("session ended; sign in again"),
    });

    match tokens.initialize().await {
        Ok(true) => info!(
            "session restored for {}",
            tokens
                .current_user()
                .map(|u| u.username)
                .unwrap_or_else(|| "unknown user".to_string())
        ),
        Ok(false) => info!("no stored session"),
        Err(e) => warn!("could not restore session: {}", e),
    }

    info!("monitoring {}", settings.monitor.health_url);
    monitor.start();

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    monitor.stop();
    Ok(())
}

fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("linkwatch {}", VERSION);
        std::process::exit(0);
    }
    let check_only = std::env::args().any(|arg| arg == "--check");

    color_eyre::install()?;
    init_tracing();

    let settings = Settings::from_env();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(settings, check_only))
}
