use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use renewal_core::{
    audit::{create_event_system, EventStore, SqliteEventStore},
    load_config,
    output::{DatasetSink, FsKeyValueStore, KeyValueStore, SqliteDataset},
    record_setup_failure, validate_config, BrowserDriver, Config, Credentials, RunOrchestrator,
    RunState, RunSummary, WebDriverClient,
};

/// Buffer size for the run event channel
const EVENT_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    init_logging();

    match run().await {
        Ok(summary) if summary.state == RunState::Aborted => {
            error!(
                reason = summary.abort_reason.as_deref().unwrap_or("unknown"),
                "Run aborted"
            );
            std::process::exit(1);
        }
        Ok(_) => {}
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Console logging; JSON lines when `RENEWAL_LOG_FORMAT=json`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("RENEWAL_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run() -> Result<RunSummary> {
    // Determine config path
    let config_path = std::env::var("RENEWAL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load and validate configuration before any network activity
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        mode = config.run.mode.as_str(),
        screenshot_policy = ?config.run.screenshot_policy,
        timeout_secs = config.run.timeout_secs,
        "Configuration loaded"
    );

    // From here on every failure leaves an aborted summary behind
    let store: Arc<dyn KeyValueStore> = Arc::new(FsKeyValueStore::new(&config.output.storage_dir));
    let Setup {
        credentials,
        dataset,
        event_store,
        driver,
    } = match prepare(&config).await {
        Ok(setup) => setup,
        Err(e) => {
            record_setup_failure(store.as_ref(), &config.run, format!("{:#}", e)).await;
            return Err(e);
        }
    };

    // Event system
    let (events, writer) = create_event_system(event_store, EVENT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(writer.run());

    let orchestrator = match RunOrchestrator::new(config, Arc::clone(&driver)) {
        Ok(orchestrator) => orchestrator
            .with_events(events)
            .with_store(store)
            .with_dataset(dataset),
        Err(e) => {
            close_driver(driver.as_ref()).await;
            return Err(e).context("Failed to create orchestrator");
        }
    };

    // Ctrl-C / SIGTERM end the run at the next listing boundary
    let abort = orchestrator.abort_handle();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping after the current listing");
        abort.abort();
    });

    let summary = orchestrator.run(&credentials).await;

    signal_task.abort();
    drop(orchestrator);
    close_driver(driver.as_ref()).await;

    // Wait for writer to finish processing remaining events
    match writer_handle.await {
        Ok(report) if report.failed > 0 => warn!(
            written = report.written,
            failed = report.failed,
            "Some run events were not persisted"
        ),
        Ok(report) => debug!(written = report.written, "Run events persisted"),
        Err(e) => warn!("Event writer task failed: {}", e),
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
    );
    Ok(summary)
}

/// Everything a run needs besides the config and the summary store.
struct Setup {
    credentials: Credentials,
    dataset: Arc<dyn DatasetSink>,
    event_store: Arc<dyn EventStore>,
    driver: Arc<dyn BrowserDriver>,
}

async fn prepare(config: &Config) -> Result<Setup> {
    let credentials = read_credentials()?;

    ensure_parent_dir(&config.output.database)?;
    let dataset: Arc<dyn DatasetSink> = Arc::new(
        SqliteDataset::new(&config.output.database).context("Failed to open dataset")?,
    );
    let event_store: Arc<dyn EventStore> = Arc::new(
        SqliteEventStore::new(&config.output.database).context("Failed to open event store")?,
    );
    info!("Output stores initialized at {:?}", config.output.storage_dir);

    info!(
        url = %config.driver.webdriver.url,
        browser = ?config.driver.webdriver.browser,
        headless = config.run.headless,
        "Connecting to WebDriver"
    );
    let driver: Arc<dyn BrowserDriver> = Arc::new(
        WebDriverClient::connect(config.driver.webdriver.clone(), config.run.headless)
            .await
            .context("Failed to start browser session")?,
    );

    Ok(Setup {
        credentials,
        dataset,
        event_store,
        driver,
    })
}

/// Credentials from the environment; the pilot's variable names are accepted too.
fn read_credentials() -> Result<Credentials> {
    let identifier = env_any(&["RENEWAL_IDENTIFIER", "CL_EMAIL"])
        .context("Missing account identifier: set RENEWAL_IDENTIFIER")?;
    let secret = env_any(&["RENEWAL_SECRET", "CL_PASSWORD"])
        .context("Missing account secret: set RENEWAL_SECRET")?;
    Ok(Credentials::new(identifier, secret))
}

fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    Ok(())
}

async fn close_driver(driver: &dyn BrowserDriver) {
    if let Err(e) = driver.close().await {
        warn!(error = %e, "Failed to close browser session");
    } else {
        info!("Browser session closed");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
