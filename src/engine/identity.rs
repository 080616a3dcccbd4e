use std::sync::Arc;

use log::info;

use crate::{
    clock::Clock,
    error::Result,
    model::{
        id::Id,
        password::PasswordHash,
        voter::{Email, Registration, Voter, VoterCore},
    },
    store::Store,
};

/// Registered voters. Registration fails on a duplicate email or national
/// ID and never overwrites an existing voter.
#[derive(Clone)]
pub struct IdentityStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    hmac_secret: Arc<[u8]>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, hmac_secret: &[u8]) -> Self {
        Self {
            store,
            clock,
            hmac_secret: hmac_secret.into(),
        }
    }

    pub async fn register(&self, registration: Registration) -> Result<Voter> {
        let registration = registration.validate()?;
        let voter = VoterCore {
            full_name: registration.full_name,
            email: registration.email,
            national_id_hmac: registration.national_id.into_hmac(&self.hmac_secret),
            password_hash: PasswordHash::new(&registration.password)?,
            created_at: self.clock.now(),
        };
        let voter = self.store.insert_voter(voter).await?;
        info!("Registered voter {}", voter.id);
        Ok(voter)
    }

    pub async fn find_by_email(&self, email: &Email) -> Result<Option<Voter>> {
        self.store.voter_by_email(email).await
    }

    pub async fn find_by_id(&self, id: Id) -> Result<Option<Voter>> {
        self.store.voter_by_id(id).await
    }
}
