use chrono::{DateTime, Utc};
use log::{debug, info};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::FindOptions,
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;

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

mod collection;
mod errors;

pub use collection::{ensure_indexes_exist, Coll, MongoCollection, RedeemedToken};
pub use errors::{is_duplicate_key, DUPLICATE_KEY};

/// A store backed by MongoDB. Atomicity comes from unique indexes: two
/// racing writers both attempt the insert and exactly one succeeds.
/// Enrollment replacement and vote commits use transactions, so the server
/// must be a replica set member.
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connect and make sure every index the engine relies on exists.
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        ensure_indexes_exist(&db).await?;
        info!("Connected to database '{database}'");
        Ok(Self { client, db })
    }

    fn coll<T: MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let voter = Voter { id: Id::new(), voter };
        match self.coll::<Voter>().insert_one(&voter, None).await {
            Ok(_) => Ok(voter),
            Err(err) if is_duplicate_key(&err) => {
                // Report the email clash first, whichever index tripped.
                if self.voter_by_email(&voter.email).await?.is_some() {
                    Err(Error::DuplicateEmail)
                } else {
                    Err(Error::DuplicateNationalId)
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn voter_by_email(&self, email: &Email) -> Result<Option<Voter>> {
        let voter = self
            .coll::<Voter>()
            .find_one(doc! { "email": email.as_str() }, None)
            .await?;
        Ok(voter)
    }

    async fn voter_by_id(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.coll::<Voter>().find_one(id.as_doc(), None).await?)
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        self.coll::<Session>().insert_one(session, None).await?;
        Ok(())
    }

    async fn session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self
            .coll::<Session>()
            .find_one(doc! { "_id": id }, None)
            .await?)
    }

    async fn add_session_step(&self, id: &SessionId, step: Step) -> Result<()> {
        self.coll::<Session>()
            .update_one(
                doc! { "_id": id },
                doc! { "$addToSet": { "completed_steps": step } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<()> {
        self.coll::<Session>()
            .delete_one(doc! { "_id": id }, None)
            .await?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        // The TTL index gets there eventually; this makes it prompt.
        let result = self
            .coll::<Session>()
            .delete_many(
                doc! { "expires_at": { "$lte": BsonDateTime::from_chrono(now) } },
                None,
            )
            .await?;
        Ok(result.deleted_count)
    }

    async fn insert_consent(&self, consent: NewConsent) -> Result<ConsentRecord> {
        let consents = self.coll::<ConsentRecord>();
        let filter = doc! {
            "voter_id": consent.voter_id,
            "policy_version": consent.policy_version.as_str(),
        };
        if let Some(existing) = consents.find_one(filter.clone(), None).await? {
            return Ok(existing);
        }

        let record = ConsentRecord {
            id: Id::new(),
            consent,
        };
        match consents.insert_one(&record, None).await {
            Ok(_) => Ok(record),
            // A concurrent retry got there first; theirs is the record.
            Err(err) if is_duplicate_key(&err) => consents
                .find_one(filter, None)
                .await?
                .ok_or_else(|| Error::Unavailable("consent vanished after conflict".to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn consent(&self, voter_id: Id, policy_version: &str) -> Result<Option<ConsentRecord>> {
        Ok(self
            .coll::<ConsentRecord>()
            .find_one(
                doc! { "voter_id": voter_id, "policy_version": policy_version },
                None,
            )
            .await?)
    }

    async fn replace_enrollment(&self, enrollment: NewEnrollment) -> Result<EnrollmentRecord> {
        let enrollments = self.coll::<EnrollmentRecord>();
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let active = doc! {
            "voter_id": enrollment.voter_id,
            "method": enrollment.method,
            "active": true,
        };
        enrollments
            .update_many_with_session(
                active,
                doc! { "$set": { "active": false } },
                None,
                &mut session,
            )
            .await?;

        let record = EnrollmentRecord {
            id: Id::new(),
            enrollment,
        };
        enrollments
            .insert_one_with_session(&record, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(record)
    }

    async fn active_enrollment(
        &self,
        voter_id: Id,
        method: BiometricMethod,
    ) -> Result<Option<EnrollmentRecord>> {
        Ok(self
            .coll::<EnrollmentRecord>()
            .find_one(
                doc! { "voter_id": voter_id, "method": method, "active": true },
                None,
            )
            .await?)
    }

    async fn active_enrollments(&self, voter_id: Id) -> Result<Vec<EnrollmentRecord>> {
        let enrollments = self
            .coll::<EnrollmentRecord>()
            .find(doc! { "voter_id": voter_id, "active": true }, None)
            .await?
            .try_collect()
            .await?;
        Ok(enrollments)
    }

    async fn commit_vote(&self, redemption: Redemption, vote: NewVote) -> Result<CommitOutcome> {
        let token = RedeemedToken {
            token_id: redemption.token_id,
            expire_at: redemption.expire_at,
        };
        let record = VoteRecord { id: Id::new(), vote };

        // Spending the token and recording the vote land together or not at all.
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let refused = match self
            .coll::<RedeemedToken>()
            .insert_one_with_session(&token, None, &mut session)
            .await
        {
            Err(err) if is_duplicate_key(&err) => Some(CommitOutcome::TokenSpent),
            Err(err) => {
                abort(&mut session).await;
                return Err(err.into());
            }
            Ok(_) => match self
                .coll::<VoteRecord>()
                .insert_one_with_session(&record, None, &mut session)
                .await
            {
                Err(err) if is_duplicate_key(&err) => Some(CommitOutcome::AlreadyVoted),
                Err(err) => {
                    abort(&mut session).await;
                    return Err(err.into());
                }
                Ok(_) => None,
            },
        };

        match refused {
            Some(outcome) => {
                abort(&mut session).await;
                Ok(outcome)
            }
            None => {
                session.commit_transaction().await?;
                Ok(CommitOutcome::Committed(record))
            }
        }
    }

    async fn votes_for_voter(&self, voter_id: Id) -> Result<Vec<VoteRecord>> {
        let newest_first = FindOptions::builder().sort(doc! { "cast_at": -1 }).build();
        let votes = self
            .coll::<VoteRecord>()
            .find(doc! { "voter_id": voter_id }, newest_first)
            .await?
            .try_collect()
            .await?;
        Ok(votes)
    }
}

/// Roll back a transaction that hit a write error. The server has usually
/// discarded it already, so a failed abort changes nothing.
async fn abort(session: &mut ClientSession) {
    if let Err(err) = session.abort_transaction().await {
        debug!("Abort of failed transaction reported: {err}");
    }
}
