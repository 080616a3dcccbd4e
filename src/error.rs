use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error};
use mongodb::error::Error as DbError;
use reqwest::Error as HttpError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::{logging::RequestId, model::assertion::Rejection};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email address is already registered")]
    DuplicateEmail,
    #[error("National ID is already registered")]
    DuplicateNationalId,
    #[error("Consent to the current policy is required first")]
    ConsentMissing,
    #[error("No biometric enrollment for this method")]
    NotEnrolled,
    #[error("Voter is not eligible to vote")]
    NotEligible,
    #[error("Biometric verification rejected: {0}")]
    BiometricRejected(Rejection),
    #[error("Validation token has expired")]
    TokenExpired,
    #[error("Validation token is invalid")]
    TokenInvalid,
    #[error("Voter has already voted")]
    AlreadyVoted,
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Matcher(#[from] HttpError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// The stable failure kind reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Unauthenticated => "Unauthenticated",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::DuplicateEmail => "DuplicateEmail",
            Self::DuplicateNationalId => "DuplicateNationalId",
            Self::ConsentMissing => "ConsentMissing",
            Self::NotEnrolled => "NotEnrolled",
            Self::NotEligible => "NotEligible",
            Self::BiometricRejected(_) => "BiometricRejected",
            Self::TokenExpired => "TokenExpired",
            Self::TokenInvalid => "TokenInvalid",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::Db(_) | Self::Matcher(_) | Self::Unavailable(_) => "Unavailable",
            Self::Argon2(_) | Self::Jwt(_) => "Internal",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) | Self::TokenInvalid => Status::BadRequest,
            Self::Unauthenticated | Self::InvalidCredentials => Status::Unauthorized,
            Self::ConsentMissing
            | Self::NotEnrolled
            | Self::NotEligible
            | Self::BiometricRejected(_) => Status::Forbidden,
            Self::DuplicateEmail | Self::DuplicateNationalId | Self::AlreadyVoted => {
                Status::Conflict
            }
            Self::TokenExpired => Status::Gone,
            Self::Db(_) | Self::Matcher(_) | Self::Unavailable(_) => Status::ServiceUnavailable,
            Self::Argon2(_) | Self::Jwt(_) => Status::InternalServerError,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Db(_) | Self::Matcher(_) | Self::Unavailable(_))
    }
}

/// The JSON body of every failed response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorBody {
    pub fn new(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            reason: None,
            retryable: false,
        }
    }
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        // Infrastructure details stay in the log.
        let message = match err.status().class() {
            StatusClass::ServerError => err.status().reason_lossy().to_string(),
            _ => err.to_string(),
        };
        let reason = match err {
            Error::BiometricRejected(reason) => Some(*reason),
            _ => None,
        };
        Self {
            error: err.kind(),
            message,
            reason,
            retryable: err.is_retryable(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let id = RequestId::of(req);
        if status.class() == StatusClass::ServerError {
            error!("req{id} failed: {self}");
        } else {
            debug!("req{id} refused: {self}");
        }
        (status, Json(ErrorBody::from(&self))).respond_to(req)
    }
}
