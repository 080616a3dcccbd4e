use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use log::{debug, warn};
use rocket::tokio::time::timeout;

use crate::{
    biometric::Matcher,
    clock::Clock,
    error::{Error, Result},
    model::{
        assertion::{Assertion, Rejection},
        enrollment::BiometricMethod,
        id::Id,
        password::PasswordHash,
        voter::Voter,
    },
    store::Store,
};

/// Outcome of a biometric check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified(BiometricMethod),
    Rejected(Rejection),
}

impl Verification {
    pub fn into_result(self) -> Result<BiometricMethod> {
        match self {
            Self::Verified(method) => Ok(method),
            Self::Rejected(reason) => Err(Error::BiometricRejected(reason)),
        }
    }
}

/// Checks passwords and live biometric assertions.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    matcher: Arc<dyn Matcher>,
    threshold: f64,
    matcher_timeout: StdDuration,
    assertion_ttl: Duration,
    assertion_skew: Duration,
}

impl CredentialVerifier {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        matcher: Arc<dyn Matcher>,
        threshold: f64,
        matcher_timeout: StdDuration,
        assertion_ttl: Duration,
        assertion_skew: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            matcher,
            threshold,
            matcher_timeout,
            assertion_ttl,
            assertion_skew,
        }
    }

    pub async fn verify_password(&self, voter_id: Id, candidate: &str) -> Result<bool> {
        let voter = self.store.voter_by_id(voter_id).await?;
        Ok(Self::check_password(voter.as_ref(), candidate))
    }

    /// Verify against the voter's hash, or against a decoy when there is no
    /// such voter so that both cases cost the same.
    pub fn check_password(voter: Option<&Voter>, candidate: &str) -> bool {
        match voter {
            Some(voter) => voter.password_hash.verify(candidate),
            None => {
                if let Some(decoy) = PasswordHash::decoy() {
                    decoy.verify(candidate);
                }
                false
            }
        }
    }

    /// Match a live assertion against the voter's active enrollment for the
    /// method. A matcher that times out rejects; one that fails outright is
    /// an infrastructure error. Neither ever verifies.
    pub async fn verify_biometric(
        &self,
        voter_id: Id,
        method: BiometricMethod,
        assertion: &Assertion,
    ) -> Result<Verification> {
        let Some(enrollment) = self.store.active_enrollment(voter_id, method).await? else {
            return Ok(Verification::Rejected(Rejection::NotEnrolled));
        };

        let now = self.clock.now();
        if !assertion.is_fresh(now, self.assertion_ttl, self.assertion_skew) {
            debug!("Stale {method} assertion from voter {voter_id}");
            return Ok(Verification::Rejected(Rejection::ExpiredAssertion));
        }

        let score = match timeout(
            self.matcher_timeout,
            self.matcher.score(&enrollment.descriptor, &assertion.data),
        )
        .await
        {
            Ok(score) => score?,
            Err(_) => {
                warn!("Biometric matcher timed out for voter {voter_id}");
                return Ok(Verification::Rejected(Rejection::MatcherTimeout));
            }
        };

        // NaN compares false, so it never passes.
        if score >= self.threshold {
            Ok(Verification::Verified(method))
        } else {
            debug!("Low {method} match score {score:.3} for voter {voter_id}");
            Ok(Verification::Rejected(Rejection::LowConfidenceMatch))
        }
    }
}
