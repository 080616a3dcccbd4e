use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::Engine,
    error::Result,
    model::{api::StatusResponse, session::Session},
};

pub fn routes() -> Vec<Route> {
    routes![status]
}

#[get("/status")]
pub async fn status(session: Session, engine: &State<Engine>) -> Result<Json<StatusResponse>> {
    let state = engine.ballot().state(session.voter_id).await?;
    let enrolled_methods = engine.enrollment().enrolled_methods(session.voter_id).await?;
    Ok(Json(StatusResponse {
        state,
        completed_steps: session.completed_steps,
        enrolled_methods,
    }))
}
