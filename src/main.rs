use std::net::TcpListener;
use std::sync::Arc;

use habit_tracker::auth::{CredentialVerifier, TokenCodec};
use habit_tracker::configuration::{get_configuration, StorageBackend};
use habit_tracker::startup::run;
use habit_tracker::store::{MemoryStore, PgStore};
use habit_tracker::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, message: &'static str) -> std::io::Error {
    std::io::Error::new(kind, message)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // Signing key is validated before anything binds
    let codec = TokenCodec::from_settings(&configuration.jwt).map_err(|e| {
        tracing::error!(error = %e, "Invalid JWT settings");
        startup_error(std::io::ErrorKind::InvalidInput, "Invalid JWT settings")
    })?;
    let credentials = CredentialVerifier::from_settings(&configuration.password);

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = match configuration.application.storage {
        StorageBackend::Postgres => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(configuration.database.max_connections)
                .connect(&configuration.database.connection_string())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    startup_error(
                        std::io::ErrorKind::ConnectionRefused,
                        "Database connection error",
                    )
                })?;

            let store = PgStore::new(pool);
            store.migrate().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                startup_error(std::io::ErrorKind::Other, "Database migration error")
            })?;
            tracing::info!("Database ready");

            run(listener, Arc::new(store), codec, credentials)?
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            run(listener, Arc::new(MemoryStore::new()), codec, credentials)?
        }
    };

    tracing::info!("Server started successfully");
    server.await
}
