use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use data_encoding::BASE64URL_NOPAD;
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use rand::RngCore;
use rocket::{
    http::{Cookie, SameSite},
    request::{FromRequest, Outcome},
    time::Duration,
    Request,
};
use serde::{Deserialize, Serialize};

use crate::{
    engine::Engine,
    error::{Error, ErrorBody},
    model::id::Id,
};

pub const SESSION_COOKIE: &str = "session";
const SESSION_ID_BYTES: usize = 32;

/// An unguessable session identifier.
#[derive(Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn random() -> Self {
        let mut bytes = [0_u8; SESSION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(BASE64URL_NOPAD.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&SessionId> for Bson {
    fn from(id: &SessionId) -> Self {
        Bson::String(id.0.clone())
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Session IDs are bearer credentials; log only a prefix.
impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionId({prefix}..)")
    }
}

/// A step of the voting flow that a session may have completed.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Consent,
    Enrollment,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::Enrollment => "enrollment",
        }
    }
}

impl From<Step> for Bson {
    fn from(step: Step) -> Self {
        Bson::String(step.as_str().to_string())
    }
}

/// A server-owned authenticated session, bound to exactly one voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: SessionId,
    pub voter_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    pub completed_steps: BTreeSet<Step>,
}

impl Session {
    pub fn new(
        voter_id: Id,
        issued_at: DateTime<Utc>,
        ttl: chrono::Duration,
        completed_steps: BTreeSet<Step>,
    ) -> Self {
        Self {
            id: SessionId::random(),
            voter_id,
            issued_at,
            expires_at: issued_at + ttl,
            completed_steps,
        }
    }

    /// Expired sessions are inert.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn has_completed(&self, step: Step) -> bool {
        self.completed_steps.contains(&step)
    }

    /// A private cookie carrying this session's ID, living as long as the session.
    pub fn to_cookie(&self) -> Cookie<'static> {
        let lifetime = (self.expires_at - self.issued_at).num_seconds();
        Cookie::build((SESSION_COOKIE, self.id.to_string()))
            .max_age(Duration::seconds(lifetime))
            .http_only(true)
            .same_site(SameSite::Strict)
            .path("/")
            .build()
    }
}

/// Read the session ID from an `Authorization: Bearer` header, falling back
/// to the private session cookie.
pub fn session_id_from(req: &Request<'_>) -> Option<SessionId> {
    if let Some(header) = req.headers().get_one("Authorization") {
        return header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| SessionId(id.to_string()));
    }
    req.cookies()
        .get_private(SESSION_COOKIE)
        .map(|cookie| SessionId(cookie.value().to_string()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = Error;

    /// Validate the presented session. Every way of failing looks the same
    /// to the client. The error body is left in the request cache for the
    /// catcher to render.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let result = match (req.rocket().state::<Engine>(), session_id_from(req)) {
            (None, _) => Err(Error::Unavailable("engine is not managed".to_string())),
            (_, None) => Err(Error::Unauthenticated),
            (Some(engine), Some(session_id)) => engine
                .sessions()
                .validate(&session_id)
                .await
                .map_err(Error::from),
        };

        match result {
            Ok(session) => Outcome::Success(session),
            Err(err) => {
                req.local_cache(|| Some(ErrorBody::from(&err)));
                Outcome::Error((err.status(), err))
            }
        }
    }
}
