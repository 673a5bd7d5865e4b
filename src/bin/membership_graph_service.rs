//! Membership Graph Service Binary
//!
//! Runs the membership service as a REST API with:
//! - Structured JSON logging
//! - Request tracing with correlation IDs
//! - Graceful shutdown handling
//! - Health check endpoints
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (requires the `postgres` feature;
//!   the in-memory store is used when unset)
//! - `PORT`: Service port (default: 8001)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `QUERY_TIMEOUT_MS`: Deadline for transitive queries (default: 5000)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! LOG_FORMAT=pretty cargo run --bin membership_graph_service --features service
//! DATABASE_URL=postgresql://... cargo run --bin membership_graph_service --features service,postgres
//! ```

use std::net::SocketAddr;

use axum::middleware;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use membership_graph::service::{
    create_router, metrics_middleware, request_logging_middleware, LogFormat, ServiceConfig,
    ServiceState,
};
use membership_graph::{InMemoryMembershipStore, MembershipStore};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "membership_graph=info,membership_graph_service=info,tower_http=info,sqlx=warn".into());

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE)
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .flatten_event(true)
                )
                .init();
        }
    }
}

/// Resolve once Ctrl+C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Build the router for a store and serve it until shutdown.
async fn serve<S: MembershipStore + 'static>(
    store: S,
    config: ServiceConfig,
    backend: &'static str,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.bind_address().parse()?;
    let state = ServiceState::new(store, config, backend);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!(
        address = %addr,
        backend = backend,
        version = env!("CARGO_PKG_VERSION"),
        "Membership Graph Service listening"
    );

    let listener = TcpListener::bind(addr).await?;

    info!("Ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(feature = "postgres")]
async fn serve_postgres(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    use membership_graph::store::postgres::PostgresConfig;
    use membership_graph::PostgresMembershipStore;
    use std::time::{Duration, Instant};

    info!("Connecting to PostgreSQL...");
    let connect_start = Instant::now();

    let pg_config = PostgresConfig {
        database_url: config.database_url.clone().unwrap_or_default(),
        ..PostgresConfig::from_env()
    };

    let store = match tokio::time::timeout(
        Duration::from_secs(30),
        PostgresMembershipStore::new(pg_config),
    ).await {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            tracing::error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };

    store.ensure_schema().await?;

    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    serve(store, config, "postgres").await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env();
    init_tracing(config.log_format);

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");

    info!(
        version = version,
        build_sha = build_sha,
        query_timeout_ms = config.query_timeout.as_millis() as u64,
        "Starting Membership Graph Service"
    );

    if config.database_url.is_some() {
        #[cfg(feature = "postgres")]
        serve_postgres(config).await?;

        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "DATABASE_URL is set but the postgres feature is disabled. \
                 Falling back to the in-memory store."
            );
            serve(InMemoryMembershipStore::new(), config, "memory").await?;
        }
    } else {
        info!("DATABASE_URL not set, using in-memory store");
        serve(InMemoryMembershipStore::new(), config, "memory").await?;
    }

    info!("Membership Graph Service shutdown complete");

    Ok(())
}
