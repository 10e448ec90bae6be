use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tombola_core::{
    create_audit_system, load_config, metrics::register_metrics, validate_config, AuditEvent,
    AuditStore, CloseoutCoordinator, DrawEngine, HoldManager, HttpPaymentProvider, PaymentBackend,
    PaymentProvider, PurchaseCoordinator, RaffleStore, SqliteAuditStore, SqliteRaffleStore,
};

use tombola_server::api::create_router;
use tombola_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("TOMBOLA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!(
        "Hold TTL: {}s, sweep interval: {}s",
        config.holds.ttl_secs, config.holds.sweep_interval_secs
    );

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create SQLite raffle store
    let store: Arc<dyn RaffleStore> = Arc::new(
        SqliteRaffleStore::new(&config.database.path).context("Failed to create raffle store")?,
    );
    info!("Raffle store initialized");

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Create payment provider if configured
    let payment: Option<Arc<dyn PaymentProvider>> = match &config.payment {
        Some(payment_config) => match payment_config.backend {
            PaymentBackend::Http => {
                if let Some(http_config) = &payment_config.http {
                    info!("Initializing HTTP payment provider at {}", http_config.url);
                    match HttpPaymentProvider::new(http_config.clone()) {
                        Ok(provider) => Some(Arc::new(provider)),
                        Err(e) => {
                            error!("Failed to initialize payment provider: {}", e);
                            None
                        }
                    }
                } else {
                    error!("HTTP payment backend selected but no http config provided");
                    None
                }
            }
        },
        None => {
            info!("No payment provider configured; only callback-style settlement available");
            None
        }
    };

    // Create components
    let holds = HoldManager::new(Arc::clone(&store), config.holds.clone())
        .with_audit(audit_handle.clone());

    let mut purchases = PurchaseCoordinator::new(Arc::clone(&store)).with_audit(audit_handle.clone());
    if let Some(ref provider) = payment {
        purchases = purchases.with_payment_provider(Arc::clone(provider));
    }

    let mut closeout = CloseoutCoordinator::new(Arc::clone(&store)).with_audit(audit_handle.clone());
    if let Some(ref provider) = payment {
        closeout = closeout.with_payment_provider(Arc::clone(provider));
    }

    let draw = DrawEngine::new(Arc::clone(&store)).with_audit(audit_handle.clone());

    // Start the hold sweeper
    let sweeper = tombola_core::HoldSweeper::new(
        Arc::clone(&store),
        config.holds.sweep_interval_secs,
    )
    .with_audit(audit_handle.clone());
    sweeper.start();

    // Metrics registry
    let metrics_registry = prometheus::Registry::new();
    register_metrics(&metrics_registry);

    // Create app state
    let app_state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&store),
        audit_handle.clone(),
        audit_store,
        holds,
        purchases,
        closeout,
        draw,
        metrics_registry,
    ));

    // Create router
    let app = create_router(app_state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the sweeper
    info!("Stopping hold sweeper...");
    sweeper.stop();

    // Emit ServiceStopped event
    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop all holders of AuditHandle so the writer's channel closes.
    // The sweeper holds a clone, so it must be dropped too. Order matters:
    // the final event is emitted BEFORE the handles go away.
    drop(sweeper);
    drop(audit_handle);

    // Wait for writer to finish processing remaining events
    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
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
