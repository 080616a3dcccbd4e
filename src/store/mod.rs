//! Storage backends. Every check-then-write the engine depends on for
//! correctness is a single atomic operation of the backend, never a read
//! followed by a separate write.

use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    model::{
        consent::{ConsentRecord, NewConsent},
        enrollment::{BiometricMethod, EnrollmentRecord, NewEnrollment},
        id::Id,
        session::{Session, SessionId, Step},
        vote::{NewVote, VoteRecord},
        voter::{Email, NewVoter, Voter},
    },
};

pub mod memory;
pub mod mongo;

pub use self::memory::MemoryStore;
pub use self::mongo::MongoStore;

/// A validation token being spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub token_id: String,
    /// After this the token is dead anyway and need not be remembered.
    pub expire_at: DateTime<Utc>,
}

/// The result of an attempt to commit a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(VoteRecord),
    /// The token had already been redeemed.
    TokenSpent,
    /// A vote by this voter already exists.
    AlreadyVoted,
}

#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Insert a voter iff neither the email nor the national ID is taken.
    /// Fails with `DuplicateEmail` in preference to `DuplicateNationalId`.
    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter>;

    async fn voter_by_email(&self, email: &Email) -> Result<Option<Voter>>;

    async fn voter_by_id(&self, id: Id) -> Result<Option<Voter>>;

    async fn insert_session(&self, session: &Session) -> Result<()>;

    async fn session(&self, id: &SessionId) -> Result<Option<Session>>;

    async fn add_session_step(&self, id: &SessionId, step: Step) -> Result<()>;

    async fn delete_session(&self, id: &SessionId) -> Result<()>;

    /// Remove sessions expired at `now`, returning how many were removed.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Insert a consent, or return the existing one for the same voter and
    /// policy version.
    async fn insert_consent(&self, consent: NewConsent) -> Result<ConsentRecord>;

    async fn consent(&self, voter_id: Id, policy_version: &str) -> Result<Option<ConsentRecord>>;

    /// Deactivate any active enrollment of the same voter and method, then
    /// insert the new one, as one unit.
    async fn replace_enrollment(&self, enrollment: NewEnrollment) -> Result<EnrollmentRecord>;

    async fn active_enrollment(
        &self,
        voter_id: Id,
        method: BiometricMethod,
    ) -> Result<Option<EnrollmentRecord>>;

    async fn active_enrollments(&self, voter_id: Id) -> Result<Vec<EnrollmentRecord>>;

    /// Redeem the token and insert the vote iff the token is unspent and the
    /// voter has no vote yet. Both writes happen or neither does.
    async fn commit_vote(&self, redemption: Redemption, vote: NewVote) -> Result<CommitOutcome>;

    /// Votes by a voter, most recent first.
    async fn votes_for_voter(&self, voter_id: Id) -> Result<Vec<VoteRecord>>;
}
