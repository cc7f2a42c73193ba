//! dbshape - Main entry point.
//!
//! Connects an engine, runs a health query, prints the pool status as JSON
//! and disconnects.

use dbshape::config::Config;
use dbshape::db::Engine;
use dbshape::models::mask_connection_string;
use dbshape::sql::RawSql;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    info!(
        database = %mask_connection_string(&config.database_url),
        "Starting dbshape v{}",
        env!("CARGO_PKG_VERSION")
    );

    let engine = Engine::new(&config.database_url, config.pool_config())?;
    if let Err(e) = engine.connect().await {
        error!(error = %e, suggestion = ?e.suggestion(), "Failed to connect");
        return Err(e.into());
    }

    let started = Instant::now();
    let health = async {
        let mut session = engine.session().await?;
        let value = session.scalar(RawSql::new(&config.health_query)).await;
        session.close().await;
        value
    }
    .await;

    let outcome: Result<(), Box<dyn std::error::Error>> = match health {
        Ok(value) => {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                result = ?value,
                "Health query succeeded"
            );
            serde_json::to_string_pretty(&engine.status())
                .map(|status| println!("{status}"))
                .map_err(Into::into)
        }
        Err(e) => {
            error!(error = %e, "Health query failed");
            Err(e.into())
        }
    };

    engine.disconnect().await;
    outcome
}
