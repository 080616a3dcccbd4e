use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::{
    clock::Clock,
    error::{Error, Result},
    model::{
        assertion::Assertion,
        candidate::Roster,
        enrollment::BiometricMethod,
        id::Id,
        session::Session,
        token::{TokenClaims, ValidationToken},
        vote::{VoteCore, VoteRecord},
    },
    store::{CommitOutcome, Redemption, Store},
};

use super::{
    consent::ConsentLedger, enrollment::EnrollmentManager, locks::VoterLocks,
    sessions::SessionManager, verifier::CredentialVerifier,
};

/// Where a voter stands in the voting flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoterState {
    /// Missing consent to the current policy, or any enrollment.
    NotEligible,
    Eligible,
    /// Holding a validation token that is neither spent nor expired.
    Validating,
    /// Has voted. Terminal.
    Committed,
}

/// The per-voter state machine. Validates vote intents against a live
/// biometric check and commits at most one vote per voter.
#[derive(Clone)]
pub struct BallotEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    sessions: SessionManager,
    consent: ConsentLedger,
    enrollment: EnrollmentManager,
    verifier: CredentialVerifier,
    roster: Arc<Roster>,
    jwt_secret: Arc<[u8]>,
    token_ttl: Duration,
    locks: VoterLocks,
    /// Expiry of the latest token issued to each voter on this server.
    pending: Arc<Mutex<HashMap<Id, DateTime<Utc>>>>,
}

impl BallotEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        sessions: SessionManager,
        consent: ConsentLedger,
        enrollment: EnrollmentManager,
        verifier: CredentialVerifier,
        roster: Arc<Roster>,
        jwt_secret: &[u8],
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            sessions,
            consent,
            enrollment,
            verifier,
            roster,
            jwt_secret: jwt_secret.into(),
            token_ttl,
            locks: VoterLocks::new(),
            pending: Arc::default(),
        }
    }

    pub async fn state(&self, voter_id: Id) -> Result<VoterState> {
        if self.has_voted(voter_id).await? {
            return Ok(VoterState::Committed);
        }
        if !self.is_eligible(voter_id).await? {
            return Ok(VoterState::NotEligible);
        }
        if self.live_pending().contains_key(&voter_id) {
            Ok(VoterState::Validating)
        } else {
            Ok(VoterState::Eligible)
        }
    }

    /// Forget tokens that expired unspent, returning how many.
    pub fn sweep_pending(&self) -> usize {
        let before = self.pending.lock().unwrap_or_else(PoisonError::into_inner).len();
        before.saturating_sub(self.live_pending().len())
    }

    /// The pending tokens, with expired ones already dropped.
    fn live_pending(&self) -> MutexGuard<'_, HashMap<Id, DateTime<Utc>>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        pending.retain(|_, expire_at| *expire_at > now);
        pending
    }

    /// Consent to the current policy and at least one active enrollment.
    pub async fn is_eligible(&self, voter_id: Id) -> Result<bool> {
        Ok(self.consent.has_current_consent(voter_id).await?
            && !self.enrollment.enrolled_methods(voter_id).await?.is_empty())
    }

    async fn has_voted(&self, voter_id: Id) -> Result<bool> {
        Ok(!self.store.votes_for_voter(voter_id).await?.is_empty())
    }

    /// Re-check the voter biometrically and, on a match, issue a token
    /// binding them to the candidate and method.
    pub async fn validate_intent(
        &self,
        session: &Session,
        candidate_id: &str,
        method: BiometricMethod,
        assertion: &Assertion,
    ) -> Result<ValidationToken> {
        if self.roster.get(candidate_id).is_none() {
            return Err(Error::validation(format!("Unknown candidate '{candidate_id}'")));
        }
        if assertion.data.is_empty() {
            return Err(Error::validation("Assertion must not be empty"));
        }
        self.sessions.ensure_live(session)?;

        let voter_id = session.voter_id;
        if !self.is_eligible(voter_id).await? {
            return Err(Error::NotEligible);
        }

        let method = self
            .verifier
            .verify_biometric(voter_id, method, assertion)
            .await?
            .into_result()?;

        let claims = TokenClaims::new(
            voter_id,
            candidate_id.to_string(),
            method,
            self.clock.now(),
            self.token_ttl,
        );
        let token = claims.encode(&self.jwt_secret)?;
        self.live_pending().insert(voter_id, claims.expire_at);
        info!("Issued validation token to voter {voter_id} via {method}");
        Ok(token)
    }

    /// Redeem a validation token, committing the vote it binds.
    pub async fn cast_vote(&self, session: &Session, token: &ValidationToken) -> Result<VoteRecord> {
        self.sessions.ensure_live(session)?;
        let claims = token.decode(&self.jwt_secret)?;
        let voter_id = session.voter_id;
        if *claims.voter_id != voter_id {
            warn!("Voter {voter_id} presented a token issued to another voter");
            return Err(Error::TokenInvalid);
        }
        let now = self.clock.now();
        if claims.is_expired(now) {
            return Err(Error::TokenExpired);
        }

        let _guard = self.locks.lock(voter_id).await;
        let outcome = self
            .store
            .commit_vote(
                Redemption {
                    token_id: claims.jti,
                    expire_at: claims.expire_at,
                },
                VoteCore {
                    voter_id,
                    candidate_id: claims.candidate_id,
                    method: claims.method,
                    cast_at: now,
                },
            )
            .await?;

        match outcome {
            CommitOutcome::Committed(vote) => {
                self.pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&voter_id);
                info!("Committed vote {} for voter {voter_id}", vote.id);
                Ok(vote)
            }
            CommitOutcome::TokenSpent => {
                warn!("Voter {voter_id} reused a validation token");
                Err(Error::TokenInvalid)
            }
            CommitOutcome::AlreadyVoted => {
                warn!("Double vote attempt by voter {voter_id}");
                Err(Error::AlreadyVoted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::futures::future::join_all;

    use super::*;

    use crate::{
        clock::ManualClock,
        engine::Engine,
        model::{blob::Blob, voter::Registration},
    };

    /// A registered voter who has consented and enrolled a fingerprint.
    async fn enrolled(engine: &Engine) -> Session {
        let (_, session) = engine.register(Registration::example()).await.unwrap();
        engine.consent().record_consent(&session, None).await.unwrap();
        engine
            .enrollment()
            .enroll(&session, BiometricMethod::Fingerprint, Blob::example_fingerprint())
            .await
            .unwrap();
        engine.sessions().validate(&session.id).await.unwrap()
    }

    async fn token(engine: &Engine, clock: &ManualClock, session: &Session, candidate: &str) -> ValidationToken {
        engine
            .ballot()
            .validate_intent(
                session,
                candidate,
                BiometricMethod::Fingerprint,
                &Assertion::example_fingerprint(clock.now()),
            )
            .await
            .unwrap()
    }

    #[rocket::async_test]
    async fn state_progression() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let (voter, session) = engine.register(Registration::example()).await.unwrap();
        let ballot = engine.ballot();

        assert_eq!(ballot.state(voter.id).await.unwrap(), VoterState::NotEligible);

        engine.consent().record_consent(&session, None).await.unwrap();
        assert_eq!(ballot.state(voter.id).await.unwrap(), VoterState::NotEligible);

        engine
            .enrollment()
            .enroll(&session, BiometricMethod::Fingerprint, Blob::example_fingerprint())
            .await
            .unwrap();
        assert_eq!(ballot.state(voter.id).await.unwrap(), VoterState::Eligible);

        let token = token(&engine, &clock, &session, "c-aziz").await;
        assert_eq!(ballot.state(voter.id).await.unwrap(), VoterState::Validating);

        ballot.cast_vote(&session, &token).await.unwrap();
        assert_eq!(ballot.state(voter.id).await.unwrap(), VoterState::Committed);
    }

    #[rocket::async_test]
    async fn unspent_token_lapses_back_to_eligible() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;

        token(&engine, &clock, &session, "c-aziz").await;
        clock.advance(Duration::seconds(120));

        let state = engine.ballot().state(session.voter_id).await.unwrap();
        assert_eq!(state, VoterState::Eligible);
    }

    #[rocket::async_test]
    async fn token_valid_for_full_ttl_on_fractional_clock() {
        let clock = ManualClock::example();
        clock.advance(Duration::milliseconds(700));
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;

        let token = token(&engine, &clock, &session, "c-aziz").await;
        clock.advance(Duration::milliseconds(119_500));

        let ballot = engine.ballot();
        assert_eq!(
            ballot.state(session.voter_id).await.unwrap(),
            VoterState::Validating
        );
        assert!(ballot.cast_vote(&session, &token).await.is_ok());
    }

    #[rocket::async_test]
    async fn abandoned_tokens_are_forgotten() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;
        let ballot = engine.ballot();

        token(&engine, &clock, &session, "c-aziz").await;
        assert_eq!(ballot.sweep_pending(), 0);

        clock.advance(Duration::days(30));
        assert_eq!(ballot.sweep_pending(), 1);
        assert!(ballot.pending.lock().unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn not_eligible_without_enrollment() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let (_, session) = engine.register(Registration::example()).await.unwrap();
        engine.consent().record_consent(&session, None).await.unwrap();

        let result = engine
            .ballot()
            .validate_intent(
                &session,
                "c-aziz",
                BiometricMethod::Fingerprint,
                &Assertion::example_fingerprint(clock.now()),
            )
            .await;

        assert!(matches!(result, Err(Error::NotEligible)));
    }

    #[rocket::async_test]
    async fn unknown_candidate_rejected() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;

        let result = engine
            .ballot()
            .validate_intent(
                &session,
                "c-nobody",
                BiometricMethod::Fingerprint,
                &Assertion::example_fingerprint(clock.now()),
            )
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[rocket::async_test]
    async fn wrong_biometric_rejected() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;

        let result = engine
            .ballot()
            .validate_intent(
                &session,
                "c-aziz",
                BiometricMethod::Fingerprint,
                &Assertion {
                    data: Blob::new(b"minutiae:somebody-else".to_vec()),
                    captured_at: clock.now(),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::BiometricRejected(crate::model::assertion::Rejection::LowConfidenceMatch))
        ));
    }

    #[rocket::async_test]
    async fn token_is_single_use() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;
        let token = token(&engine, &clock, &session, "c-aziz").await;

        engine.ballot().cast_vote(&session, &token).await.unwrap();
        let reuse = engine.ballot().cast_vote(&session, &token).await;

        assert!(matches!(reuse, Err(Error::TokenInvalid)));
    }

    #[rocket::async_test]
    async fn expired_token_rejected() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;
        let token = token(&engine, &clock, &session, "c-aziz").await;

        clock.advance(Duration::seconds(121));
        let result = engine.ballot().cast_vote(&session, &token).await;

        assert!(matches!(result, Err(Error::TokenExpired)));
        assert!(engine
            .history()
            .list_for_voter(session.voter_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[rocket::async_test]
    async fn token_of_another_voter_rejected() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;
        let token = token(&engine, &clock, &session, "c-aziz").await;
        let (_, other) = engine.register(Registration::example2()).await.unwrap();

        let result = engine.ballot().cast_vote(&other, &token).await;

        assert!(matches!(result, Err(Error::TokenInvalid)));
    }

    #[rocket::async_test]
    async fn second_vote_is_already_voted() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;

        let first = token(&engine, &clock, &session, "c-aziz").await;
        engine.ballot().cast_vote(&session, &first).await.unwrap();

        // Tokens are still issued; the commit is what refuses.
        let second = token(&engine, &clock, &session, "c-naima").await;
        let result = engine.ballot().cast_vote(&session, &second).await;

        assert!(matches!(result, Err(Error::AlreadyVoted)));
        let votes = engine.history().list_for_voter(session.voter_id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].candidate_id, "c-aziz");
    }

    #[rocket::async_test]
    async fn concurrent_casts_commit_exactly_once() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let session = enrolled(&engine).await;

        let mut tokens = Vec::new();
        for candidate in ["c-aziz", "c-naima", "c-hassan", "c-salma"] {
            tokens.push(token(&engine, &clock, &session, candidate).await);
        }

        let results = join_all(tokens.iter().map(|token| {
            let engine = engine.clone();
            let session = session.clone();
            let token = token.clone();
            rocket::tokio::spawn(async move { engine.ballot().cast_vote(&session, &token).await })
        }))
        .await;

        let mut winners = Vec::new();
        for result in results {
            match result.unwrap() {
                Ok(vote) => winners.push(vote),
                Err(err) => assert!(matches!(err, Error::AlreadyVoted), "unexpected {err:?}"),
            }
        }
        assert_eq!(winners.len(), 1);

        let votes = engine.history().list_for_voter(session.voter_id).await.unwrap();
        assert_eq!(votes, winners);
    }
}
