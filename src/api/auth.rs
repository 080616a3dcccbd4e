use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    engine::Engine,
    error::Result,
    model::{
        api::{BiometricLoginRequest, LoginRequest, RegisterResponse, SessionResponse},
        session::{Session, SESSION_COOKIE},
        voter::Registration,
    },
};

pub fn routes() -> Vec<Route> {
    routes![register, login, biometric_login, logout]
}

#[post("/auth/register", data = "<registration>", format = "json")]
pub async fn register(
    registration: Json<Registration>,
    cookies: &CookieJar<'_>,
    engine: &State<Engine>,
) -> Result<Json<RegisterResponse>> {
    let (voter, session) = engine.register(registration.into_inner()).await?;
    cookies.add_private(session.to_cookie());
    Ok(Json(RegisterResponse::new(&voter, &session)))
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    credentials: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    engine: &State<Engine>,
) -> Result<Json<SessionResponse>> {
    let session = engine
        .login_password(&credentials.email, &credentials.password)
        .await?;
    cookies.add_private(session.to_cookie());
    Ok(Json(SessionResponse::from(&session)))
}

#[post("/auth/biometric", data = "<request>", format = "json")]
pub async fn biometric_login(
    request: Json<BiometricLoginRequest>,
    cookies: &CookieJar<'_>,
    engine: &State<Engine>,
) -> Result<Json<SessionResponse>> {
    let session = engine
        .login_biometric(&request.email, request.method, &request.assertion)
        .await?;
    cookies.add_private(session.to_cookie());
    Ok(Json(SessionResponse::from(&session)))
}

/// Signing out twice, or without a session, is not an error.
#[delete("/auth")]
pub async fn logout(
    session: Option<Session>,
    cookies: &CookieJar<'_>,
    engine: &State<Engine>,
) -> Result<Status> {
    if let Some(session) = session {
        engine.logout(&session.id).await?;
    }
    cookies.remove_private(Cookie::from(SESSION_COOKIE));
    Ok(Status::Ok)
}
