//! Kiiex Gateway Binary
//!
//! Starts the order execution gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kiiex-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Credentials
//! - `KIIEX_API_KEY`: Venue API key (no login is attempted without it)
//! - `KIIEX_API_SECRET`: Secret used to sign the login request
//! - `KIIEX_API_SIGNATURE`: Precomputed signature, used when no secret is set
//! - `KIIEX_API_NONCE`, `KIIEX_API_USER_ID`, `KIIEX_USERNAME`
//! - `KIIEX_OMS_ID`, `KIIEX_ACCOUNT_ID`: Venue trading account
//!
//! ## Optional
//! - `KIIEX_WEBSOCKET_URL`: Venue gateway (default: production `WSGateway`)
//! - `SYMBOL_MAPPING_PATH`: Instrument file (default: `configs/symbol_mapping.json`)
//! - `KIIEX_HANDSHAKE_TIMEOUT_SECS`, `KIIEX_WRITE_TIMEOUT_SECS`: Venue timeouts (default: 10)
//! - `KIIEX_RECONNECT_DELAY_SECS`: Delay between reconnect attempts (default: 5)
//! - `CHECKER_OTC_ADAPTER_PROVIDER`: Provider name used in queue names (default: kiiex)
//! - `KIIEX_POLL_INTERVAL_SECS`: Reconciliation poll interval (default: 300)
//! - `KIIEX_EVENT_QUEUE_CAPACITY`: Per-subscriber event queue size (default: 1024)
//! - `SERVER_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use kiiex_gateway::infrastructure::publisher::DEFAULT_OUTBOUND_CAPACITY;
use kiiex_gateway::infrastructure::telemetry;
use kiiex_gateway::{
    CommandConsumer, EventBus, EventBusConfig, EventPublisher, GatewayConfig, HealthServer,
    HealthServerState, InstrumentDirectory, OrderProcessor, ReconciliationTracker, Session,
    TracingSink, VenueAccount, VenueClient, VenueCredentials, VenueTransport, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Kiiex Gateway");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let instruments = Arc::new(InstrumentDirectory::new());
    let loaded = instruments
        .load_from_file(&config.processing.symbol_mapping_path)
        .with_context(|| {
            format!(
                "failed to load symbol mappings from {}",
                config.processing.symbol_mapping_path.display()
            )
        })?;
    tracing::info!(instruments = loaded, "Symbol mappings loaded");

    let events = Arc::new(EventBus::new(EventBusConfig {
        queue_capacity: config.processing.event_queue_capacity,
    }));

    // Connect to the venue; the first connection must succeed
    let client = Arc::new(VenueClient::new(config.venue.client_config()));
    client
        .connect()
        .await
        .context("failed to connect to the venue")?;
    let transport: Arc<dyn VenueTransport> = client.clone();

    if let Some(credentials) = &config.credentials
        && let Err(e) = credentials.validate()
    {
        tracing::warn!(error = %e, "Venue credentials are incomplete");
    }
    let account = config
        .credentials
        .as_ref()
        .map_or_else(VenueAccount::default, VenueCredentials::account);

    let session = Session::new(Arc::clone(&transport), config.credentials.clone());
    let processor = OrderProcessor::new(
        Arc::clone(&session),
        Arc::clone(&instruments),
        Arc::clone(&events),
        account,
    );

    // Reconciliation poll loop
    let tracker = ReconciliationTracker::new(
        processor.clone(),
        Arc::clone(&events),
        config.processing.poll_interval,
    );
    let tracker_task = tokio::spawn(Arc::clone(&tracker).run());

    let publisher = EventPublisher::start(
        &events,
        Arc::new(TracingSink),
        DEFAULT_OUTBOUND_CAPACITY,
        shutdown_token.clone(),
    );

    // The broker adapter owns queue consumption and feeds `CommandConsumer::handle`;
    // the binary only reports which queues that adapter should bind.
    let consumer = CommandConsumer::new(Arc::clone(&processor), &config.processing.provider);
    tracing::info!(queues = ?consumer.queues(), "Order command queues");

    // Refresh the directory from the venue; the file mapping stays as a fallback
    if let Err(e) = processor.get_instruments().await {
        tracing::warn!(error = %e, "Instrument refresh not sent");
    }

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&transport),
        Arc::clone(&tracker),
        Arc::clone(&instruments),
    ));
    let health_server = HealthServer::new(
        config.server.port,
        Arc::clone(&health_state),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!(state = ?transport.state(), "Gateway ready");

    await_shutdown(shutdown_token).await;

    tracker.stop();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, tracker_task)
        .await
        .is_err()
    {
        tracing::warn!("Reconciliation loop did not stop in time");
    }

    if let Err(e) = session.logout().await {
        tracing::debug!(error = %e, "Logout not sent");
    }
    client.close().await;
    events.shutdown();

    tracing::info!(
        delivered = publisher.delivered(),
        failed = publisher.failed(),
        "Kiiex Gateway stopped"
    );
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        venue_url = %config.venue.url,
        provider = %config.processing.provider,
        server_port = config.server.port,
        poll_interval_secs = config.processing.poll_interval.as_secs(),
        credentials = config.credentials.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        symbol_mapping_path = %config.processing.symbol_mapping_path.display(),
        event_queue_capacity = config.processing.event_queue_capacity,
        reconnect_delay_ms = config.venue.reconnect_delay.as_millis(),
        "Processing settings"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
