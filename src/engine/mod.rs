//! The ballot engine proper: every component of the voting flow, wired to a
//! shared store and clock. Route handlers only ever talk to an [`Engine`].

use std::collections::BTreeSet;
use std::sync::Arc;

use log::info;

use crate::{
    biometric::Matcher,
    clock::Clock,
    config::Config,
    error::{Error, Result},
    model::{
        assertion::{Assertion, Rejection},
        enrollment::BiometricMethod,
        id::Id,
        session::{Session, SessionId, Step},
        voter::{Email, Registration, Voter},
    },
    store::Store,
};

pub mod ballot;
pub mod consent;
pub mod enrollment;
pub mod history;
pub mod identity;
pub mod locks;
pub mod sessions;
pub mod verifier;

pub use ballot::{BallotEngine, VoterState};
pub use consent::ConsentLedger;
pub use enrollment::EnrollmentManager;
pub use history::{HistoryEntry, VotingHistory};
pub use identity::IdentityStore;
pub use sessions::{SessionError, SessionManager};
pub use verifier::{CredentialVerifier, Verification};

/// All engine components. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Engine {
    identity: IdentityStore,
    verifier: CredentialVerifier,
    sessions: SessionManager,
    consent: ConsentLedger,
    enrollment: EnrollmentManager,
    ballot: BallotEngine,
    history: VotingHistory,
}

impl Engine {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        matcher: Arc<dyn Matcher>,
    ) -> Self {
        let roster = Arc::new(config.roster());
        let identity = IdentityStore::new(store.clone(), clock.clone(), config.hmac_secret());
        let verifier = CredentialVerifier::new(
            store.clone(),
            clock.clone(),
            matcher,
            config.match_threshold(),
            config.matcher_timeout(),
            config.assertion_ttl(),
            config.assertion_skew(),
        );
        let sessions = SessionManager::new(
            store.clone(),
            clock.clone(),
            config.session_ttl(),
            config.session_cache_ttl(),
        );
        let consent = ConsentLedger::new(
            store.clone(),
            clock.clone(),
            sessions.clone(),
            config.policy_version(),
        );
        let enrollment = EnrollmentManager::new(
            store.clone(),
            clock.clone(),
            sessions.clone(),
            consent.clone(),
        );
        let ballot = BallotEngine::new(
            store.clone(),
            clock,
            sessions.clone(),
            consent.clone(),
            enrollment.clone(),
            verifier.clone(),
            roster.clone(),
            config.jwt_secret(),
            config.token_ttl(),
        );
        let history = VotingHistory::new(store, roster);

        Self {
            identity,
            verifier,
            sessions,
            consent,
            enrollment,
            ballot,
            history,
        }
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn consent(&self) -> &ConsentLedger {
        &self.consent
    }

    pub fn enrollment(&self) -> &EnrollmentManager {
        &self.enrollment
    }

    pub fn ballot(&self) -> &BallotEngine {
        &self.ballot
    }

    pub fn history(&self) -> &VotingHistory {
        &self.history
    }

    /// Register a voter and sign them straight in.
    pub async fn register(&self, registration: Registration) -> Result<(Voter, Session)> {
        let voter = self.identity.register(registration).await?;
        let session = self.sessions.create_session(voter.id, BTreeSet::new()).await?;
        Ok((voter, session))
    }

    /// Sign in with email and password. Unknown emails and wrong passwords
    /// are indistinguishable, in outcome and in time taken.
    pub async fn login_password(&self, email: &str, password: &str) -> Result<Session> {
        let voter = match email.parse::<Email>() {
            Ok(email) => self.identity.find_by_email(&email).await?,
            Err(_) => None,
        };
        if !CredentialVerifier::check_password(voter.as_ref(), password) {
            return Err(Error::InvalidCredentials);
        }
        let voter = voter.ok_or(Error::InvalidCredentials)?;
        info!("Voter {} signed in with password", voter.id);
        self.open_session(voter.id).await
    }

    /// Sign in with a live biometric assertion.
    pub async fn login_biometric(
        &self,
        email: &str,
        method: BiometricMethod,
        assertion: &Assertion,
    ) -> Result<Session> {
        let email: Email = email.parse()?;
        let voter = self
            .identity
            .find_by_email(&email)
            .await?
            .ok_or(Error::NotEnrolled)?;

        match self
            .verifier
            .verify_biometric(voter.id, method, assertion)
            .await?
        {
            Verification::Verified(method) => {
                info!("Voter {} signed in with {method}", voter.id);
                self.open_session(voter.id).await
            }
            Verification::Rejected(Rejection::NotEnrolled) => Err(Error::NotEnrolled),
            Verification::Rejected(reason) => Err(Error::BiometricRejected(reason)),
        }
    }

    /// Start a session carrying the steps the voter has already completed.
    pub async fn open_session(&self, voter_id: Id) -> Result<Session> {
        let mut steps = BTreeSet::new();
        if self.consent.has_current_consent(voter_id).await? {
            steps.insert(Step::Consent);
        }
        if !self.enrollment.enrolled_methods(voter_id).await?.is_empty() {
            steps.insert(Step::Enrollment);
        }
        self.sessions.create_session(voter_id, steps).await
    }

    pub async fn logout(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.invalidate(session_id).await
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use crate::{biometric::ExactMatcher, clock::ManualClock, store::MemoryStore};

    impl Engine {
        /// An engine over fresh in-memory storage, driven by the given clock.
        pub fn example(clock: &ManualClock) -> Self {
            Self::new(
                &Config::example(),
                Arc::new(MemoryStore::new()),
                Arc::new(clock.clone()),
                Arc::new(ExactMatcher),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    use crate::{
        clock::ManualClock,
        model::{blob::Blob, candidate::default_candidates},
    };

    #[rocket::async_test]
    async fn password_login() {
        let engine = Engine::example(&ManualClock::example());
        let (voter, _) = engine.register(Registration::example()).await.unwrap();

        let session = engine
            .login_password("A@X.com", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(session.voter_id, voter.id);

        let wrong = engine.login_password("a@x.com", "wrong horse battery").await;
        assert!(matches!(wrong, Err(Error::InvalidCredentials)));

        let unknown = engine.login_password("b@x.com", "correct horse battery").await;
        assert!(matches!(unknown, Err(Error::InvalidCredentials)));
    }

    #[rocket::async_test]
    async fn biometric_login() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let (voter, session) = engine.register(Registration::example()).await.unwrap();

        let not_enrolled = engine
            .login_biometric(
                "a@x.com",
                BiometricMethod::Face,
                &Assertion::example_face(clock.now()),
            )
            .await;
        assert!(matches!(not_enrolled, Err(Error::NotEnrolled)));

        engine.consent().record_consent(&session, None).await.unwrap();
        engine
            .enrollment()
            .enroll(&session, BiometricMethod::Face, Blob::example_face())
            .await
            .unwrap();

        let session = engine
            .login_biometric(
                "a@x.com",
                BiometricMethod::Face,
                &Assertion::example_face(clock.now()),
            )
            .await
            .unwrap();
        assert_eq!(session.voter_id, voter.id);

        let mismatch = engine
            .login_biometric(
                "a@x.com",
                BiometricMethod::Face,
                &Assertion::example_fingerprint(clock.now()),
            )
            .await;
        assert!(matches!(
            mismatch,
            Err(Error::BiometricRejected(Rejection::LowConfidenceMatch))
        ));
    }

    #[rocket::async_test]
    async fn returning_voter_keeps_completed_steps() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);
        let (_, session) = engine.register(Registration::example()).await.unwrap();
        engine.consent().record_consent(&session, None).await.unwrap();
        engine
            .enrollment()
            .enroll(&session, BiometricMethod::Fingerprint, Blob::example_fingerprint())
            .await
            .unwrap();
        engine.logout(&session.id).await.unwrap();

        let session = engine
            .login_password("a@x.com", "correct horse battery")
            .await
            .unwrap();

        assert!(session.has_completed(Step::Consent));
        assert!(session.has_completed(Step::Enrollment));
    }

    #[rocket::async_test]
    async fn logout_invalidates() {
        let engine = Engine::example(&ManualClock::example());
        let (_, session) = engine.register(Registration::example()).await.unwrap();

        engine.logout(&session.id).await.unwrap();

        assert!(engine.sessions().validate(&session.id).await.is_err());
    }

    /// Register, consent, enroll, validate, cast, then read the history back.
    #[rocket::async_test]
    async fn full_voting_scenario() {
        let clock = ManualClock::example();
        let engine = Engine::example(&clock);

        let (voter, session) = engine.register(Registration::example()).await.unwrap();
        let enroll_first = engine
            .enrollment()
            .enroll(&session, BiometricMethod::Fingerprint, Blob::example_fingerprint())
            .await;
        assert!(matches!(enroll_first, Err(Error::ConsentMissing)));

        engine.consent().record_consent(&session, Some("v1")).await.unwrap();
        engine
            .enrollment()
            .enroll(&session, BiometricMethod::Fingerprint, Blob::example_fingerprint())
            .await
            .unwrap();

        clock.advance(Duration::seconds(10));
        let token = engine
            .ballot()
            .validate_intent(
                &session,
                "c-aziz",
                BiometricMethod::Fingerprint,
                &Assertion::example_fingerprint(clock.now()),
            )
            .await
            .unwrap();
        let vote = engine.ballot().cast_vote(&session, &token).await.unwrap();

        let history = engine.history().entries_for_voter(voter.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(*history[0].vote_id, vote.id);
        assert_eq!(history[0].candidate, default_candidates()[0].name);
        assert_eq!(history[0].method, "Fingerprint");
        assert_eq!(
            engine.ballot().state(voter.id).await.unwrap(),
            VoterState::Committed
        );
    }
}
