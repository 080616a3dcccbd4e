use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    model::{blob::Blob, id::Id},
};

/// A biometric verification method.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometricMethod {
    Fingerprint,
    Face,
}

impl BiometricMethod {
    pub const ALL: [BiometricMethod; 2] = [Self::Fingerprint, Self::Face];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fingerprint => "fingerprint",
            Self::Face => "face",
        }
    }

    /// How the method is shown to voters.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fingerprint => "Fingerprint",
            Self::Face => "Face ID",
        }
    }
}

impl Display for BiometricMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BiometricMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fingerprint" => Ok(Self::Fingerprint),
            "face" => Ok(Self::Face),
            other => Err(Error::validation(format!(
                "Unknown biometric method '{other}'"
            ))),
        }
    }
}

impl From<BiometricMethod> for Bson {
    fn from(method: BiometricMethod) -> Self {
        Bson::String(method.as_str().to_string())
    }
}

/// Core enrollment data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentCore {
    pub voter_id: Id,
    pub method: BiometricMethod,
    /// The enrolled template, opaque to the engine.
    pub descriptor: Blob,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub enrolled_at: DateTime<Utc>,
    /// False once a later enrollment of the same method supersedes this one.
    pub active: bool,
}

impl EnrollmentCore {
    pub fn new(voter_id: Id, method: BiometricMethod, descriptor: Blob, now: DateTime<Utc>) -> Self {
        Self {
            voter_id,
            method,
            descriptor,
            enrolled_at: now,
            active: true,
        }
    }
}

/// An enrollment without an ID.
pub type NewEnrollment = EnrollmentCore;

/// An enrollment from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub enrollment: EnrollmentCore,
}

impl Deref for EnrollmentRecord {
    type Target = EnrollmentCore;

    fn deref(&self) -> &Self::Target {
        &self.enrollment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names() {
        for method in BiometricMethod::ALL {
            assert_eq!(method.as_str().parse::<BiometricMethod>().unwrap(), method);
        }
        assert!("iris".parse::<BiometricMethod>().is_err());
    }
}
