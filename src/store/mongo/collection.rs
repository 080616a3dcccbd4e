use std::ops::Deref;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Document},
    error::Error as DbError,
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};

use crate::model::{
    consent::ConsentRecord, enrollment::EnrollmentRecord, session::Session, vote::VoteRecord,
    voter::Voter,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A spent validation token, kept until it would have expired anyway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemedToken {
    #[serde(rename = "_id")]
    pub token_id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expire_at: DateTime<Utc>,
}

impl MongoCollection for Voter {
    const NAME: &'static str = "voters";
}

impl MongoCollection for Session {
    const NAME: &'static str = "sessions";
}

impl MongoCollection for ConsentRecord {
    const NAME: &'static str = "consents";
}

impl MongoCollection for EnrollmentRecord {
    const NAME: &'static str = "enrollments";
}

impl MongoCollection for VoteRecord {
    const NAME: &'static str = "votes";
}

impl MongoCollection for RedeemedToken {
    const NAME: &'static str = "redeemed_tokens";
}

fn unique_index(name: &str, keys: Document) -> IndexModel {
    let options = IndexOptions::builder()
        .name(name.to_string())
        .unique(true)
        .build();
    IndexModel::builder().keys(keys).options(options).build()
}

fn expiry_index(name: &str, field: &str) -> IndexModel {
    let options = IndexOptions::builder()
        .name(name.to_string())
        .expire_after(Duration::ZERO)
        .build();
    let mut keys = Document::new();
    keys.insert(field, 1);
    IndexModel::builder().keys(keys).options(options).build()
}

/// Ensure that all the required indexes exist on the given database.
/// The unique indexes are what make registration, consent and vote commits
/// atomic across server processes.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let voters = Coll::<Voter>::from_db(db);
    voters
        .create_index(unique_index("unique_email", doc! { "email": 1 }), None)
        .await?;
    voters
        .create_index(
            unique_index("unique_national_id", doc! { "national_id_hmac": 1 }),
            None,
        )
        .await?;

    Coll::<ConsentRecord>::from_db(db)
        .create_index(
            unique_index(
                "unique_voter_policy",
                doc! { "voter_id": 1, "policy_version": 1 },
            ),
            None,
        )
        .await?;

    // Only one active enrollment per method; superseded ones may pile up.
    let active_enrollment = IndexModel::builder()
        .keys(doc! { "voter_id": 1, "method": 1 })
        .options(
            IndexOptions::builder()
                .name("unique_active_enrollment".to_string())
                .unique(true)
                .partial_filter_expression(doc! { "active": true })
                .build(),
        )
        .build();
    Coll::<EnrollmentRecord>::from_db(db)
        .create_index(active_enrollment, None)
        .await?;

    Coll::<VoteRecord>::from_db(db)
        .create_index(unique_index("one_vote_per_voter", doc! { "voter_id": 1 }), None)
        .await?;

    Coll::<Session>::from_db(db)
        .create_index(expiry_index("session_expiry", "expires_at"), None)
        .await?;
    Coll::<RedeemedToken>::from_db(db)
        .create_index(expiry_index("redeemed_token_expiry", "expire_at"), None)
        .await?;

    Ok(())
}
