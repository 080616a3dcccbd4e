use log::{error, info, LevelFilter};
use log4rs_dynamic_filters::{default_deserializers, DynamicLevelFilter};
use rocket::Error as RocketError;
use thiserror::Error;

/// Overrides where the logging configuration is read from.
const LOG_CONFIG_VAR: &str = "BALLOT_ENGINE_LOG_CONFIG";
const DEFAULT_LOG_CONFIG: &str = "log4rs.yaml";

/// Errors that bring the whole server down.
#[derive(Debug, Error)]
enum Error {
    #[error("Server failed: {0}")]
    Rocket(#[from] RocketError),
}

async fn serve() -> Result<(), Error> {
    info!("Igniting ballot engine...");
    let rocket = ballot_engine::build().ignite().await?;
    info!("...config, storage and engine ready");
    // Our request log replaces Rocket's from here on.
    DynamicLevelFilter::set("rocket", LevelFilter::Off);
    rocket.launch().await?;
    info!("Ballot engine stopped");
    Ok(())
}

#[rocket::main]
async fn main() {
    let log_config =
        std::env::var(LOG_CONFIG_VAR).unwrap_or_else(|_| DEFAULT_LOG_CONFIG.to_string());
    if let Err(err) = log4rs::init_file(&log_config, default_deserializers()) {
        eprintln!("Failed to initialise logging from {log_config}: {err}");
        std::process::exit(1);
    }
    info!("Logging configured from {log_config}");

    if let Err(err) = serve().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
