use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telemetry_db::common::AppState;
use telemetry_db::config::Config;
use telemetry_db::routes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telemetry_db=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting telemetry-db...");

    // Load configuration (fail-fast)
    let config = Config::from_env()?;
    tracing::info!(
        host = %config.api_host,
        port = config.api_port,
        streaming = config.streaming_url.is_some(),
        "Configuration loaded"
    );

    // Connect to the primary store (fail-fast)
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Migrations completed");

    // Connect to the streaming sidecar, if configured
    let streaming_db = match &config.streaming_url {
        Some(url) => {
            tracing::info!("Connecting to streaming source...");
            let conn = Database::connect(url).await?;
            tracing::info!("Streaming source connection established");
            Some(conn)
        }
        None => {
            tracing::warn!("STREAMING_URL not set; live subscriptions disabled");
            None
        }
    };

    // Create application state
    let state = AppState::new(db, streaming_db, config.clone());
    let registry = state.registry.clone();

    // Build router
    let app = routes::build_router(state);

    // Start server with graceful shutdown
    let addr = config.bind_address();
    tracing::info!(address = %addr, "Starting server");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain live subscriptions before exit
    if !registry.is_empty() {
        tracing::info!(subscriptions = registry.len(), "Draining live subscriptions");
        registry.cancel_all();
        tokio::time::sleep(std::time::Duration::from_secs(
            config.shutdown_timeout_seconds.min(5),
        ))
        .await;
    }

    tracing::info!("Server shut down gracefully");
    Ok(())
}

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
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
