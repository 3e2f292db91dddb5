/// Marketplace Backend Application
///
/// This is the main entry point for the marketplace backend service.
/// The application exposes the order lifecycle over a REST API: order
/// creation with payment redirect, role-gated status transitions with
/// photographic and geolocation evidence, and role-scoped order listings.
///
/// # Architecture
///
/// The application follows a modular architecture with:
/// - Repository layer for data access
/// - Service layer for the order lifecycle engine
/// - API layer for HTTP endpoints
/// - Metrics for monitoring
///
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use app_config::AppConfig;
use model::GeoPoint;
use payment::SimulatedGateway;
use repository::{
    PgOrderItemsRepository, PgOrderLogsRepository, PgOrderPhotosRepository, PgOrdersRepository,
    PgProductsRepository, PgTransactionsRepository,
};
use server::Server;
use service::OrderServiceImpl;
use service::fsm::{GeofencePolicy, TransitionTable};
use tokio_postgres::{Client, NoTls};

/// Initialize the tracing subscriber for logging
fn init_logger() -> Result<()> {
    tracing_subscriber::fmt::init();
    Ok(())
}

/// Opens a dedicated Postgres client and drives its connection in the
/// background. Each repository gets its own client because
/// `tokio_postgres::Client` does not implement `Clone`.
async fn connect_client(dsn: &str, label: &'static str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(dsn, NoTls)
        .await
        .with_context(|| format!("Failed to connect to database for {label} repository"))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("{} connection error: {}", label, e);
        }
    });
    info!("Successfully connected to database for {} repository", label);
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = init_logger() {
        eprintln!("Failed to initialize logger: {}", err);
        return Err(anyhow::anyhow!("Failed to initialize logger"));
    }

    info!("Marketplace backend starting...");

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize database (runs migrations)
    let db_pool = match db::init_db_pool(&config).await {
        Ok(pool) => {
            info!("Database initialized successfully");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            error!("Database connection is required for application to function properly");
            return Err(anyhow::anyhow!("Failed to initialize database"));
        }
    };

    let dsn = format!(
        "host={} port={} user={} password={} dbname={} sslmode=disable",
        config.db_host, config.db_port, config.db_user, config.db_password, config.db_name
    );

    // Initialize repositories, one connection each
    let orders_repo = PgOrdersRepository::new(connect_client(&dsn, "orders").await?);
    let items_repo = PgOrderItemsRepository::new(connect_client(&dsn, "order items").await?);
    let photos_repo = PgOrderPhotosRepository::new(connect_client(&dsn, "order photos").await?);
    let logs_repo = PgOrderLogsRepository::new(connect_client(&dsn, "order logs").await?);
    let transactions_repo =
        PgTransactionsRepository::new(connect_client(&dsn, "transactions").await?);
    let products_repo = PgProductsRepository::new(connect_client(&dsn, "products").await?);

    // Payment gateway and lifecycle policies
    let gateway = SimulatedGateway::new(config.payment_base_url.clone());
    let transitions = TransitionTable::standard();
    let geofence = GeofencePolicy {
        store_point: GeoPoint {
            lat: config.store_lat,
            lon: config.store_lon,
        },
        radius_m: config.pickup_radius_m,
    };

    // Initialize order service
    let order_service = Arc::new(OrderServiceImpl::new(
        db_pool.clone(),
        orders_repo,
        items_repo,
        photos_repo,
        logs_repo,
        transactions_repo,
        products_repo,
        gateway,
        transitions,
        geofence,
    ));

    // Start HTTP server (blocks until shutdown signal)
    let http_port = config.http_port.to_string();
    info!("Using HTTP port: {}", http_port);

    let http_server = Server::new(http_port, order_service);
    http_server.start().await?;

    info!("Application stopped");
    Ok(())
}
