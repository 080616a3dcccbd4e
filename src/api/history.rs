use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::{Engine, HistoryEntry},
    error::Result,
    model::session::Session,
};

pub fn routes() -> Vec<Route> {
    routes![history]
}

/// The signed-in voter's own votes, most recent first.
#[get("/history")]
pub async fn history(session: Session, engine: &State<Engine>) -> Result<Json<Vec<HistoryEntry>>> {
    let entries = engine.history().entries_for_voter(session.voter_id).await?;
    Ok(Json(entries))
}
