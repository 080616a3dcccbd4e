use rocket::{serde::json::Json, Route, State};

use crate::{config::Config, model::candidate::Candidate};

pub fn routes() -> Vec<Route> {
    routes![candidates]
}

/// The ballot roster. Needs no session.
#[get("/candidates")]
pub fn candidates(config: &State<Config>) -> Json<Vec<Candidate>> {
    Json(config.candidates().to_vec())
}
