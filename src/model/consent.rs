use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::id::Id;

/// Core consent data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentCore {
    pub voter_id: Id,
    pub policy_version: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub consented_at: DateTime<Utc>,
}

/// A consent without an ID.
pub type NewConsent = ConsentCore;

/// A consent record from the database, with its unique ID.
/// Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub consent: ConsentCore,
}

impl Deref for ConsentRecord {
    type Target = ConsentCore;

    fn deref(&self) -> &Self::Target {
        &self.consent
    }
}
