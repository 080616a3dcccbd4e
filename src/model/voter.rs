use std::fmt::{Debug, Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    error::{Error, Result},
    model::{id::Id, password::PasswordHash},
};

pub type HmacSha256 = Hmac<Sha256>;

pub const MIN_FULL_NAME_LENGTH: usize = 2;
pub const MIN_NATIONAL_ID_LENGTH: usize = 8;
pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254;

/// An email address, normalised to lowercase so that uniqueness is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Email {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let email = s.trim().to_lowercase();
        let invalid = || Error::validation(format!("'{}' is not a valid email address", s.trim()));

        if email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
        if local.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            return Err(invalid());
        }

        Ok(Self(email))
    }
}

impl TryFrom<String> for Email {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A national identity number. Only its keyed HMAC is ever stored.
#[derive(Clone, PartialEq, Eq)]
pub struct NationalId(String);

impl NationalId {
    pub fn into_hmac(self, key: &[u8]) -> Vec<u8> {
        let mut hmac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        hmac.update(self.0.as_bytes());
        hmac.finalize().into_bytes().to_vec()
    }
}

impl FromStr for NationalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim().to_uppercase();
        if id.chars().count() < MIN_NATIONAL_ID_LENGTH {
            return Err(Error::validation(format!(
                "National ID must be at least {MIN_NATIONAL_ID_LENGTH} characters"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::validation("National ID must be alphanumeric"));
        }
        Ok(Self(id))
    }
}

// Never print the raw identifier.
impl Debug for NationalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("NationalId(..)")
    }
}

/// Core voter data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    pub full_name: String,
    pub email: Email,
    /// HMAC of the national ID; unique across voters.
    pub national_id_hmac: Vec<u8>,
    pub password_hash: PasswordHash,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

/// A registration request as submitted by a client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub national_id: String,
    pub password: String,
}

/// A registration whose fields passed validation. The password is still
/// plaintext and must be hashed before storage.
pub struct ValidRegistration {
    pub full_name: String,
    pub email: Email,
    pub national_id: NationalId,
    pub password: String,
}

impl Registration {
    /// Check every field, before any store is touched.
    pub fn validate(self) -> Result<ValidRegistration> {
        let full_name = self.full_name.trim().to_string();
        if full_name.chars().count() < MIN_FULL_NAME_LENGTH {
            return Err(Error::validation(format!(
                "Full name must be at least {MIN_FULL_NAME_LENGTH} characters"
            )));
        }
        let email = self.email.parse()?;
        let national_id = self.national_id.parse()?;
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(ValidRegistration {
            full_name,
            email,
            national_id,
            password: self.password,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_case_insensitive() {
        let lower: Email = "a@x.com".parse().unwrap();
        let upper: Email = "  A@X.COM ".parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.as_str(), "a@x.com");
    }

    #[test]
    fn malformed_emails_rejected() {
        for bad in ["", "ax.com", "a@", "@x.com", "a@x", "a b@x.com", "a@x@y.com", "a@.com"] {
            assert!(bad.parse::<Email>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn national_id_hmac_is_normalised_and_keyed() {
        let a: NationalId = "id123456".parse().unwrap();
        let b: NationalId = " ID123456".parse().unwrap();
        assert_eq!(a.clone().into_hmac(b"key"), b.into_hmac(b"key"));
        assert_ne!(a.clone().into_hmac(b"key"), a.into_hmac(b"other key"));
    }

    #[test]
    fn national_id_rules() {
        assert!("ID1234".parse::<NationalId>().is_err());
        assert!("ID-123456".parse::<NationalId>().is_err());
        assert!("AB123456".parse::<NationalId>().is_ok());
    }

    #[test]
    fn registration_validation() {
        assert!(Registration::example().validate().is_ok());

        let mut short_name = Registration::example();
        short_name.full_name = " A ".to_string();
        assert!(matches!(short_name.validate(), Err(Error::Validation(_))));

        let mut short_password = Registration::example();
        short_password.password = "hunter2".to_string();
        assert!(matches!(short_password.validate(), Err(Error::Validation(_))));

        let mut bad_email = Registration::example();
        bad_email.email = "nobody".to_string();
        assert!(matches!(bad_email.validate(), Err(Error::Validation(_))));
    }
}
