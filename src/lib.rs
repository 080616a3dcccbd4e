#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

use rocket::{Build, Rocket};

use crate::{
    clock::{Clock, SystemClock},
    config::{ConfigFairing, EngineFairing, StoreFairing},
    logging::LoggerFairing,
    sweeper::SweeperFairing,
};

pub mod api;
pub mod biometric;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod sweeper;

/// Build the server, configured from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    assemble(rocket::build(), Arc::new(SystemClock))
}

/// Mount the API and attach every fairing. Order matters: the engine is
/// assembled from the config and store loaded before it.
fn assemble(rocket: Rocket<Build>, clock: Arc<dyn Clock>) -> Rocket<Build> {
    rocket
        .mount("/api", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(EngineFairing::new(clock))
        .attach(SweeperFairing)
}

/// A server over fresh in-memory storage with the example config, driven by
/// a manual clock.
#[cfg(test)]
pub(crate) fn rocket_for_test(clock: clock::ManualClock) -> Rocket<Build> {
    use rocket::figment::providers::Serialized;

    use crate::{
        config::Config,
        store::{MemoryStore, Store},
    };

    let figment = rocket::Config::figment()
        .merge(Serialized::globals(Config::example()))
        .merge(Serialized::global("storage", "memory"))
        .merge(Serialized::global("log_level", "off"));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    assemble(rocket::custom(figment).manage(store), Arc::new(clock))
}
