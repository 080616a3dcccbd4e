use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::Engine,
    error::Result,
    model::{
        api::{CastRequest, CastResponse, ValidateRequest, ValidateResponse},
        session::Session,
    },
};

pub fn routes() -> Vec<Route> {
    routes![validate, cast]
}

/// Exchange a fresh biometric assertion for a single-use validation token.
#[post("/vote/validate", data = "<request>", format = "json")]
pub async fn validate(
    session: Session,
    request: Json<ValidateRequest>,
    engine: &State<Engine>,
) -> Result<Json<ValidateResponse>> {
    let validation_token = engine
        .ballot()
        .validate_intent(
            &session,
            &request.candidate_id,
            request.method,
            &request.assertion,
        )
        .await?;
    Ok(Json(ValidateResponse { validation_token }))
}

#[post("/vote/cast", data = "<request>", format = "json")]
pub async fn cast(
    session: Session,
    request: Json<CastRequest>,
    engine: &State<Engine>,
) -> Result<Json<CastResponse>> {
    let vote = engine
        .ballot()
        .cast_vote(&session, &request.validation_token)
        .await?;
    Ok(Json(vote.into()))
}
