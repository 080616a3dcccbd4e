use std::sync::Arc;

use chrono::Duration;
use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::{Deserialize, Serialize};

use crate::{
    biometric::{ExactMatcher, Matcher, RemoteMatcher},
    clock::Clock,
    engine::Engine,
    model::candidate::{default_candidates, Candidate, Roster},
    store::{MemoryStore, MongoStore, Store},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // non-secrets
    session_ttl: u32,
    token_ttl: u32,
    assertion_ttl: u32,
    assertion_skew: u32,
    match_threshold: f64,
    matcher_timeout_ms: u64,
    session_cache_ttl: u32,
    sweep_interval: u32,
    policy_version: String,
    #[serde(default = "default_candidates")]
    candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matcher_url: Option<String>,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

impl Config {
    /// Lifetime of a session from issuance.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// Lifetime of a validation token from issuance.
    pub fn token_ttl(&self) -> Duration {
        Duration::seconds(self.token_ttl.into())
    }

    /// How old a biometric capture may be when presented.
    pub fn assertion_ttl(&self) -> Duration {
        Duration::seconds(self.assertion_ttl.into())
    }

    /// How far in the future a capture timestamp may lie.
    pub fn assertion_skew(&self) -> Duration {
        Duration::seconds(self.assertion_skew.into())
    }

    /// Minimum matcher score accepted as a match.
    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn matcher_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.matcher_timeout_ms)
    }

    /// How long a cached session may be served without re-reading the store.
    pub fn session_cache_ttl(&self) -> Duration {
        Duration::seconds(self.session_cache_ttl.into())
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval.into())
    }

    /// The consent policy version voters must agree to.
    pub fn policy_version(&self) -> &str {
        &self.policy_version
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn roster(&self) -> Roster {
        Roster::new(self.candidates.clone())
    }

    /// URL of a remote verification service; the exact matcher is used if unset.
    pub fn matcher_url(&self) -> Option<&str> {
        self.matcher_url.as_deref()
    }

    /// Secret key used to sign validation tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to HMAC national IDs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }

    /// Reject settings the engine cannot honour.
    pub fn check(&self) -> Result<(), String> {
        if self.session_ttl == 0 || self.token_ttl == 0 || self.assertion_ttl == 0 {
            return Err("TTLs must be positive".to_string());
        }
        if self.sweep_interval == 0 {
            return Err("sweep_interval must be positive".to_string());
        }
        if self.session_cache_ttl > self.session_ttl {
            return Err("session_cache_ttl must not exceed session_ttl".to_string());
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err("match_threshold must lie in [0, 1]".to_string());
        }
        if self.policy_version.trim().is_empty() {
            return Err("policy_version must not be empty".to_string());
        }
        if self.candidates.is_empty() {
            return Err("at least one candidate is required".to_string());
        }
        if self.jwt_secret.is_empty() || self.hmac_secret.is_empty() {
            return Err("jwt_secret and hmac_secret must be set".to_string());
        }
        Ok(())
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(e) = config.check() {
            error!("Invalid application config: {e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Backend {
    Memory,
    Mongodb,
}

/// Configuration for storage.
#[derive(Deserialize)]
struct StoreConfig {
    // non-secrets
    storage: Backend,
    // secrets
    db_uri: Option<String>,
}

/// A fairing that loads the storage config, connects to the backend,
/// performs any setup necessary, and places an `Arc<dyn Store>` into
/// managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Tests may have put a store in place already.
        if rocket.state::<Arc<dyn Store>>().is_some() {
            return Ok(rocket);
        }

        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load storage config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store: Arc<dyn Store> = match config.storage {
            Backend::Memory => {
                warn!("Using in-memory storage, nothing will survive a restart");
                Arc::new(MemoryStore::new())
            }
            Backend::Mongodb => {
                let Some(db_uri) = config.db_uri else {
                    error!("`db_uri` must be set for MongoDB storage");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                match MongoStore::connect(&db_uri, DATABASE).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
        };
        info!("...storage online!");

        // Manage the state.
        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// Name of the MongoDB database.
const DATABASE: &str = "ballot_engine";

/// A fairing that assembles the [`Engine`] from the managed config and store,
/// choosing a matcher from the config. Must be attached after
/// [`ConfigFairing`] and [`StoreFairing`].
pub struct EngineFairing {
    clock: Arc<dyn Clock>,
}

impl EngineFairing {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[rocket::async_trait]
impl Fairing for EngineFairing {
    fn info(&self) -> Info {
        Info {
            name: "Engine",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (Some(config), Some(store)) = (
            rocket.state::<Config>(),
            rocket.state::<Arc<dyn Store>>(),
        ) else {
            error!("Engine needs both config and storage to be loaded first");
            return Err(rocket);
        };

        let matcher: Arc<dyn Matcher> = match config.matcher_url() {
            Some(url) => {
                info!("Using remote biometric matcher at {url}");
                Arc::new(RemoteMatcher::new(url))
            }
            None => {
                warn!("No `matcher_url` set, using exact biometric matching");
                Arc::new(ExactMatcher)
            }
        };

        let engine = Engine::new(config, store.clone(), self.clock.clone(), matcher);
        rocket = rocket.manage(engine);
        Ok(rocket)
    }
}
