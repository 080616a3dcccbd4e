use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::{
    error::{Error, Result},
    model::{
        consent::{ConsentRecord, NewConsent},
        enrollment::{BiometricMethod, EnrollmentRecord, NewEnrollment},
        id::Id,
        session::{Session, SessionId, Step},
        vote::{NewVote, VoteRecord},
        voter::{Email, NewVoter, Voter},
    },
};

use super::{CommitOutcome, Redemption, Store};

/// A process-local store. Every operation runs under one mutex, so each is
/// atomic by construction. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    voters: HashMap<Id, Voter>,
    voters_by_email: HashMap<Email, Id>,
    voters_by_national_id: HashMap<Vec<u8>, Id>,
    sessions: HashMap<SessionId, Session>,
    consents: HashMap<(Id, String), ConsentRecord>,
    enrollments: Vec<EnrollmentRecord>,
    votes: HashMap<Id, VoteRecord>,
    redeemed_tokens: HashMap<String, DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // No operation leaves the tables half-written before it can panic.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let mut tables = self.tables();
        if tables.voters_by_email.contains_key(&voter.email) {
            return Err(Error::DuplicateEmail);
        }
        if tables
            .voters_by_national_id
            .contains_key(&voter.national_id_hmac)
        {
            return Err(Error::DuplicateNationalId);
        }

        let voter = Voter {
            id: Id::new(),
            voter,
        };
        tables
            .voters_by_email
            .insert(voter.email.clone(), voter.id);
        tables
            .voters_by_national_id
            .insert(voter.national_id_hmac.clone(), voter.id);
        tables.voters.insert(voter.id, voter.clone());
        Ok(voter)
    }

    async fn voter_by_email(&self, email: &Email) -> Result<Option<Voter>> {
        let tables = self.tables();
        Ok(tables
            .voters_by_email
            .get(email)
            .and_then(|id| tables.voters.get(id))
            .cloned())
    }

    async fn voter_by_id(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.tables().voters.get(&id).cloned())
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        self.tables()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.tables().sessions.get(id).cloned())
    }

    async fn add_session_step(&self, id: &SessionId, step: Step) -> Result<()> {
        if let Some(session) = self.tables().sessions.get_mut(id) {
            session.completed_steps.insert(step);
        }
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<()> {
        self.tables().sessions.remove(id);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| !session.is_expired(now));
        tables.redeemed_tokens.retain(|_, expire_at| *expire_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn insert_consent(&self, consent: NewConsent) -> Result<ConsentRecord> {
        let key = (consent.voter_id, consent.policy_version.clone());
        let record = self
            .tables()
            .consents
            .entry(key)
            .or_insert_with(|| ConsentRecord {
                id: Id::new(),
                consent,
            })
            .clone();
        Ok(record)
    }

    async fn consent(&self, voter_id: Id, policy_version: &str) -> Result<Option<ConsentRecord>> {
        Ok(self
            .tables()
            .consents
            .get(&(voter_id, policy_version.to_string()))
            .cloned())
    }

    async fn replace_enrollment(&self, enrollment: NewEnrollment) -> Result<EnrollmentRecord> {
        let mut tables = self.tables();
        for previous in tables.enrollments.iter_mut().filter(|previous| {
            previous.active
                && previous.voter_id == enrollment.voter_id
                && previous.method == enrollment.method
        }) {
            previous.enrollment.active = false;
        }
        let record = EnrollmentRecord {
            id: Id::new(),
            enrollment,
        };
        tables.enrollments.push(record.clone());
        Ok(record)
    }

    async fn active_enrollment(
        &self,
        voter_id: Id,
        method: BiometricMethod,
    ) -> Result<Option<EnrollmentRecord>> {
        Ok(self
            .tables()
            .enrollments
            .iter()
            .find(|e| e.active && e.voter_id == voter_id && e.method == method)
            .cloned())
    }

    async fn active_enrollments(&self, voter_id: Id) -> Result<Vec<EnrollmentRecord>> {
        Ok(self
            .tables()
            .enrollments
            .iter()
            .filter(|e| e.active && e.voter_id == voter_id)
            .cloned()
            .collect())
    }

    async fn commit_vote(&self, redemption: Redemption, vote: NewVote) -> Result<CommitOutcome> {
        let mut tables = self.tables();
        if tables.redeemed_tokens.contains_key(&redemption.token_id) {
            return Ok(CommitOutcome::TokenSpent);
        }
        if tables.votes.contains_key(&vote.voter_id) {
            return Ok(CommitOutcome::AlreadyVoted);
        }
        tables
            .redeemed_tokens
            .insert(redemption.token_id, redemption.expire_at);
        let record = VoteRecord {
            id: Id::new(),
            vote,
        };
        tables.votes.insert(record.voter_id, record.clone());
        Ok(CommitOutcome::Committed(record))
    }

    async fn votes_for_voter(&self, voter_id: Id) -> Result<Vec<VoteRecord>> {
        // The map admits at most one vote per voter.
        Ok(self
            .tables()
            .votes
            .get(&voter_id)
            .cloned()
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;

    use crate::{
        clock::{Clock, ManualClock},
        model::{blob::Blob, enrollment::EnrollmentCore, password::PasswordHash, vote::VoteCore, voter::VoterCore},
    };

    fn new_voter(email: &str, national_id_hmac: &[u8]) -> NewVoter {
        VoterCore {
            full_name: "Amina Tazi".to_string(),
            email: email.parse().unwrap(),
            national_id_hmac: national_id_hmac.to_vec(),
            password_hash: PasswordHash::decoy().unwrap().clone(),
            created_at: ManualClock::example().now(),
        }
    }

    fn new_vote(voter_id: Id, candidate: &str) -> NewVote {
        VoteCore {
            voter_id,
            candidate_id: candidate.to_string(),
            method: BiometricMethod::Fingerprint,
            cast_at: ManualClock::example().now(),
        }
    }

    fn redemption(token_id: &str) -> Redemption {
        Redemption {
            token_id: token_id.to_string(),
            expire_at: ManualClock::example().now() + Duration::minutes(2),
        }
    }

    #[rocket::async_test]
    async fn duplicate_email_wins_over_duplicate_national_id() {
        let store = MemoryStore::new();
        store.insert_voter(new_voter("a@x.com", b"one")).await.unwrap();

        let both = store.insert_voter(new_voter("A@X.com", b"one")).await;
        assert!(matches!(both, Err(Error::DuplicateEmail)));

        let email_only = store.insert_voter(new_voter("a@x.com", b"two")).await;
        assert!(matches!(email_only, Err(Error::DuplicateEmail)));

        let national_id = store.insert_voter(new_voter("b@x.com", b"one")).await;
        assert!(matches!(national_id, Err(Error::DuplicateNationalId)));

        // Nothing was overwritten.
        let voter = store
            .voter_by_email(&"a@x.com".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(voter.national_id_hmac, b"one".to_vec());
    }

    #[rocket::async_test]
    async fn consent_is_idempotent() {
        let store = MemoryStore::new();
        let voter_id = Id::new();
        let consent = NewConsent {
            voter_id,
            policy_version: "v1".to_string(),
            consented_at: ManualClock::example().now(),
        };

        let first = store.insert_consent(consent.clone()).await.unwrap();
        let mut retry = consent.clone();
        retry.consented_at = retry.consented_at + Duration::seconds(10);
        let second = store.insert_consent(retry).await.unwrap();

        assert_eq!(first, second);

        let mut next_policy = consent;
        next_policy.policy_version = "v2".to_string();
        let third = store.insert_consent(next_policy).await.unwrap();
        assert_ne!(first.id, third.id);
    }

    #[rocket::async_test]
    async fn re_enrollment_supersedes() {
        let store = MemoryStore::new();
        let voter_id = Id::new();
        let now = ManualClock::example().now();

        let first = store
            .replace_enrollment(EnrollmentCore::new(
                voter_id,
                BiometricMethod::Fingerprint,
                Blob::example_fingerprint(),
                now,
            ))
            .await
            .unwrap();
        let second = store
            .replace_enrollment(EnrollmentCore::new(
                voter_id,
                BiometricMethod::Fingerprint,
                Blob::new(b"minutiae:updated".to_vec()),
                now,
            ))
            .await
            .unwrap();
        store
            .replace_enrollment(EnrollmentCore::new(
                voter_id,
                BiometricMethod::Face,
                Blob::example_face(),
                now,
            ))
            .await
            .unwrap();

        let active = store
            .active_enrollment(voter_id, BiometricMethod::Fingerprint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, second.id);
        assert_ne!(active.id, first.id);
        assert_eq!(store.active_enrollments(voter_id).await.unwrap().len(), 2);
        // The superseded record is kept for audit.
        assert_eq!(store.tables().enrollments.len(), 3);
    }

    #[rocket::async_test]
    async fn commit_vote_outcomes() {
        let store = MemoryStore::new();
        let voter_id = Id::new();

        let first = store
            .commit_vote(redemption("t1"), new_vote(voter_id, "c-aziz"))
            .await
            .unwrap();
        assert!(matches!(first, CommitOutcome::Committed(_)));

        let reuse = store
            .commit_vote(redemption("t1"), new_vote(voter_id, "c-aziz"))
            .await
            .unwrap();
        assert_eq!(reuse, CommitOutcome::TokenSpent);

        let second = store
            .commit_vote(redemption("t2"), new_vote(voter_id, "c-naima"))
            .await
            .unwrap();
        assert_eq!(second, CommitOutcome::AlreadyVoted);

        let votes = store.votes_for_voter(voter_id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].candidate_id, "c-aziz");
    }

    #[rocket::async_test]
    async fn refused_commit_spends_nothing() {
        let store = MemoryStore::new();
        let voter_id = Id::new();
        store
            .commit_vote(redemption("t1"), new_vote(voter_id, "c-aziz"))
            .await
            .unwrap();

        // A refused commit leaves the token unspent, so repeating it is
        // refused for the same reason rather than as a spent token.
        for _ in 0..2 {
            let outcome = store
                .commit_vote(redemption("t2"), new_vote(voter_id, "c-naima"))
                .await
                .unwrap();
            assert_eq!(outcome, CommitOutcome::AlreadyVoted);
        }
        assert!(!store.tables().redeemed_tokens.contains_key("t2"));
    }

    #[rocket::async_test]
    async fn sweeping_removes_only_expired_sessions() {
        let store = MemoryStore::new();
        let now = ManualClock::example().now();
        let short = Session::new(Id::new(), now, Duration::minutes(1), BTreeSet::new());
        let long = Session::new(Id::new(), now, Duration::minutes(30), BTreeSet::new());
        store.insert_session(&short).await.unwrap();
        store.insert_session(&long).await.unwrap();

        let removed = store
            .delete_expired_sessions(now + Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.session(&short.id).await.unwrap().is_none());
        assert!(store.session(&long.id).await.unwrap().is_some());
    }
}
