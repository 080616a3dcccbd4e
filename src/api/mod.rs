use rocket::{
    http::{Status, StatusClass},
    serde::json::Json,
    Catcher, Request, Route,
};

use crate::error::ErrorBody;

pub mod auth;
pub mod consent;
pub mod enroll;
pub mod history;
pub mod public;
pub mod vote;
pub mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(consent::routes());
    routes.extend(enroll::routes());
    routes.extend(vote::routes());
    routes.extend(history::routes());
    routes.extend(voter::routes());
    routes.extend(public::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![json_error]
}

/// Render every error Rocket raises itself (failed guards, malformed bodies,
/// unknown routes) in the same JSON shape as handler errors.
#[catch(default)]
fn json_error(status: Status, req: &Request<'_>) -> (Status, Json<ErrorBody>) {
    // Left by a failed session guard.
    if let Some(body) = req.local_cache(|| None::<ErrorBody>) {
        return (status, Json(body.clone()));
    }

    let kind = match status.code {
        400 | 422 => "ValidationError",
        401 => "Unauthenticated",
        404 => "NotFound",
        503 => "Unavailable",
        _ if status.class() == StatusClass::ServerError => "Internal",
        _ => "BadRequest",
    };
    let mut body = ErrorBody::new(kind, status.reason_lossy());
    body.retryable = status == Status::ServiceUnavailable;
    (status, Json(body))
}
