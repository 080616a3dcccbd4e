//! Request and response bodies of the HTTP API. Everything is camelCase on
//! the wire, and IDs leave the server as hex strings.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    engine::VoterState,
    model::{
        assertion::Assertion,
        blob::Blob,
        candidate::CandidateId,
        consent::ConsentRecord,
        enrollment::{BiometricMethod, EnrollmentRecord},
        id::ApiId,
        session::{Session, Step},
        token::ValidationToken,
        vote::VoteRecord,
        voter::Voter,
    },
};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricLoginRequest {
    pub email: String,
    pub method: BiometricMethod,
    pub assertion: Assertion,
}

/// A freshly opened session. The ID doubles as the bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub voter_id: ApiId,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub completed_steps: BTreeSet<Step>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            voter_id: session.voter_id.into(),
            session_id: session.id.to_string(),
            expires_at: session.expires_at,
            completed_steps: session.completed_steps.clone(),
        }
    }
}

/// A newly registered voter and their first session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub voter_id: ApiId,
    pub full_name: String,
    pub email: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl RegisterResponse {
    pub fn new(voter: &Voter, session: &Session) -> Self {
        Self {
            voter_id: voter.id.into(),
            full_name: voter.full_name.clone(),
            email: voter.email.to_string(),
            session_id: session.id.to_string(),
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    /// Defaults to the current policy version.
    #[serde(default)]
    pub policy_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentResponse {
    pub consent_record_id: ApiId,
    pub policy_version: String,
    pub consented_at: DateTime<Utc>,
}

impl From<ConsentRecord> for ConsentResponse {
    fn from(record: ConsentRecord) -> Self {
        Self {
            consent_record_id: record.id.into(),
            policy_version: record.consent.policy_version,
            consented_at: record.consent.consented_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub method: BiometricMethod,
    pub descriptor: Blob,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub enrollment_id: ApiId,
    pub method: BiometricMethod,
    pub enrolled_at: DateTime<Utc>,
}

impl From<EnrollmentRecord> for EnrollResponse {
    fn from(record: EnrollmentRecord) -> Self {
        Self {
            enrollment_id: record.id.into(),
            method: record.method,
            enrolled_at: record.enrolled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub candidate_id: CandidateId,
    pub method: BiometricMethod,
    pub assertion: Assertion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub validation_token: ValidationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastRequest {
    pub validation_token: ValidationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastResponse {
    pub vote_id: ApiId,
    pub candidate_id: CandidateId,
    pub method: BiometricMethod,
    pub cast_at: DateTime<Utc>,
}

impl From<VoteRecord> for CastResponse {
    fn from(vote: VoteRecord) -> Self {
        Self {
            vote_id: vote.id.into(),
            candidate_id: vote.vote.candidate_id,
            method: vote.vote.method,
            cast_at: vote.vote.cast_at,
        }
    }
}

/// Where the signed-in voter stands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub state: VoterState,
    pub completed_steps: BTreeSet<Step>,
    pub enrolled_methods: Vec<BiometricMethod>,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl LoginRequest {
        pub fn example() -> Self {
            Self {
                email: "a@x.com".to_string(),
                password: "correct horse battery".to_string(),
            }
        }
    }

    impl EnrollRequest {
        pub fn example() -> Self {
            Self {
                method: BiometricMethod::Fingerprint,
                descriptor: Blob::example_fingerprint(),
            }
        }
    }

    impl ValidateRequest {
        pub fn example(candidate_id: &str, now: DateTime<Utc>) -> Self {
            Self {
                candidate_id: candidate_id.to_string(),
                method: BiometricMethod::Fingerprint,
                assertion: Assertion::example_fingerprint(now),
            }
        }
    }
}
