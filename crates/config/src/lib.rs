use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// `AppConfig` holds all configuration parameters required by the application.
///
/// The configuration is loaded from environment variables (optionally via a `.env` file)
/// or uses default values if the variable is not set. Fields cover the database,
/// the HTTP server, the payment redirect target, and the courier geofence gate.
/// This struct is deserializable via Serde.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname or service name (e.g. "postgres" in Docker Compose, "localhost" for local runs).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,

    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub shutdown_timeout: Duration,

    // --- Payment gateway ---
    /// Base URL the payment redirect points at (the frontend payment simulator).
    pub payment_base_url: String,

    // --- Courier geofence ---
    /// Latitude of the store reference point used by the pickup gate.
    pub store_lat: f64,
    /// Longitude of the store reference point used by the pickup gate.
    pub store_lon: f64,
    /// Maximum allowed distance from the store at pickup, in meters.
    pub pickup_radius_m: f64,
}

/// Custom deserializer for graceful shutdown timeout.
/// Accepts human-readable formats like "5s", "1m", etc.
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid or missing required values.
    pub fn load() -> Result<Self> {
        // Load from .env file (for Docker environment)
        dotenvy::dotenv().ok();

        // Note: These default values are for Docker Compose compatibility.
        // When running locally, these values should be overridden by environment variables
        // with localhost as hostname.
        let settings = config::Config::builder()
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "market_user")?
            .set_default("db_password", "securepassword")?
            .set_default("db_name", "market_db")?
            // HTTP
            .set_default("http_port", 8081)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Payment gateway
            .set_default("payment_base_url", "http://127.0.0.1:5173")?
            // Geofence: the single store reference point of the MVP
            .set_default("store_lat", 54.8886544)?
            .set_default("store_lon", 47.5303257)?
            .set_default("pickup_radius_m", 500.0)?
            .add_source(config::Environment::default().separator("_"))
            .build()?;

        settings
            .try_deserialize()
            .context("Failed to load configuration")
    }
}
