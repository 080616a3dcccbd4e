use log::{debug, error, info};
use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio::{
        self,
        time::{interval, MissedTickBehavior},
    },
    Orbit, Rocket,
};

use crate::{config::Config, engine::Engine};

/// A fairing that periodically removes expired sessions, and forgets
/// validation tokens that lapsed unspent, until the server shuts down.
pub struct SweeperFairing;

#[rocket::async_trait]
impl Fairing for SweeperFairing {
    fn info(&self) -> Info {
        Info {
            name: "Session sweeper",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let (Some(engine), Some(config)) = (rocket.state::<Engine>(), rocket.state::<Config>())
        else {
            error!("Session sweeper could not find the engine, not starting");
            return;
        };
        let engine = engine.clone();
        let period = config.sweep_interval();
        let shutdown = rocket.shutdown();

        tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticks.tick() => {
                        if let Err(err) = engine.sessions().sweep().await {
                            error!("Session sweep failed: {err}");
                        }
                        let lapsed = engine.ballot().sweep_pending();
                        if lapsed > 0 {
                            debug!("Forgot {lapsed} lapsed validation token(s)");
                        }
                    }
                }
            }
            info!("Session sweeper stopped");
        });
    }
}
