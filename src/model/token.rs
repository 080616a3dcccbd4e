use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        candidate::CandidateId,
        enrollment::BiometricMethod,
        id::{ApiId, Id},
    },
};

const TOKEN_ID_BYTES: usize = 16;

/// Proof that a voter passed a live biometric check for one candidate.
/// Single-use and short-lived; redeemed by casting the vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationToken(String);

impl ValidationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the signature and recover the claims. Expiry is deliberately
    /// not checked here: it is judged against the engine's clock.
    pub fn decode(&self, secret: &[u8]) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode(&self.0, &DecodingKey::from_secret(secret), &validation)
            .map(|data: TokenData<TokenClaims>| data.claims)
            .map_err(|_| Error::TokenInvalid)
    }
}

impl From<String> for ValidationToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Everything a validation token binds together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Unique token ID, remembered once redeemed.
    pub jti: String,
    #[serde(rename = "vid")]
    pub voter_id: ApiId,
    #[serde(rename = "cid")]
    pub candidate_id: CandidateId,
    #[serde(rename = "mth")]
    pub method: BiometricMethod,
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
}

impl TokenClaims {
    pub fn new(
        voter_id: Id,
        candidate_id: CandidateId,
        method: BiometricMethod,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let mut jti = [0_u8; TOKEN_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut jti);
        Self {
            jti: BASE64URL_NOPAD.encode(&jti),
            voter_id: voter_id.into(),
            candidate_id,
            method,
            iat: floor_second(now),
            expire_at: ceil_second(now + ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_at
    }

    pub fn encode(&self, secret: &[u8]) -> Result<ValidationToken> {
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret),
        )?;
        Ok(ValidationToken(token))
    }
}

// JWT times are whole seconds. Issuance rounds down and expiry up, so a
// token decodes to exactly the claims it was issued with and never lives
// shorter than its TTL.
fn floor_second(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::nanoseconds(t.timestamp_subsec_nanos().into())
}

fn ceil_second(t: DateTime<Utc>) -> DateTime<Utc> {
    let floor = floor_second(t);
    if floor == t {
        t
    } else {
        floor + Duration::seconds(1)
    }
}
