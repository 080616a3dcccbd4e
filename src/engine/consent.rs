use std::sync::Arc;

use log::info;

use crate::{
    clock::Clock,
    error::{Error, Result},
    model::{
        consent::{ConsentCore, ConsentRecord},
        id::Id,
        session::{Session, Step},
    },
    store::Store,
};

use super::sessions::SessionManager;

/// Append-only record of the policy versions each voter agreed to.
#[derive(Clone)]
pub struct ConsentLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    sessions: SessionManager,
    policy_version: Arc<str>,
}

impl ConsentLedger {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        sessions: SessionManager,
        policy_version: &str,
    ) -> Self {
        Self {
            store,
            clock,
            sessions,
            policy_version: policy_version.into(),
        }
    }

    /// The version voters must currently consent to.
    pub fn policy_version(&self) -> &str {
        &self.policy_version
    }

    /// Record consent to a policy version, defaulting to the current one.
    /// Repeating a consent returns the original record. Only consent to the
    /// current version completes the consent step.
    pub async fn record_consent(
        &self,
        session: &Session,
        policy_version: Option<&str>,
    ) -> Result<ConsentRecord> {
        let policy_version = policy_version.map(str::trim).unwrap_or(self.policy_version());
        if policy_version.is_empty() {
            return Err(Error::validation("Policy version must not be empty"));
        }
        self.sessions.ensure_live(session)?;

        let record = self
            .store
            .insert_consent(ConsentCore {
                voter_id: session.voter_id,
                policy_version: policy_version.to_string(),
                consented_at: self.clock.now(),
            })
            .await?;

        if record.policy_version == *self.policy_version {
            self.sessions
                .mark_step_complete(&session.id, Step::Consent)
                .await?;
        }
        info!(
            "Voter {} consented to policy {}",
            session.voter_id, record.policy_version
        );
        Ok(record)
    }

    pub async fn has_current_consent(&self, voter_id: Id) -> Result<bool> {
        Ok(self
            .store
            .consent(voter_id, &self.policy_version)
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;

    use crate::{clock::ManualClock, store::MemoryStore};

    async fn ledger() -> (ConsentLedger, SessionManager, Session, ManualClock) {
        let clock = ManualClock::example();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let sessions = SessionManager::new(
            store.clone(),
            Arc::new(clock.clone()),
            Duration::minutes(15),
            Duration::seconds(5),
        );
        let session = sessions
            .create_session(Id::new(), BTreeSet::new())
            .await
            .unwrap();
        let ledger = ConsentLedger::new(store, Arc::new(clock.clone()), sessions.clone(), "v1");
        (ledger, sessions, session, clock)
    }

    #[rocket::async_test]
    async fn current_consent_opens_gate() {
        let (ledger, sessions, session, _) = ledger().await;

        ledger.record_consent(&session, None).await.unwrap();

        assert!(ledger.has_current_consent(session.voter_id).await.unwrap());
        let session = sessions.validate(&session.id).await.unwrap();
        assert!(session.has_completed(Step::Consent));
    }

    #[rocket::async_test]
    async fn repeated_consent_is_idempotent() {
        let (ledger, _, session, clock) = ledger().await;

        let first = ledger.record_consent(&session, Some("v1")).await.unwrap();
        clock.advance(Duration::seconds(30));
        let second = ledger.record_consent(&session, Some("v1")).await.unwrap();

        assert_eq!(first, second);
    }

    #[rocket::async_test]
    async fn other_version_is_recorded_without_opening_gate() {
        let (ledger, sessions, session, _) = ledger().await;

        let record = ledger.record_consent(&session, Some("v0")).await.unwrap();

        assert_eq!(record.policy_version, "v0");
        assert!(!ledger.has_current_consent(session.voter_id).await.unwrap());
        let session = sessions.validate(&session.id).await.unwrap();
        assert!(!session.has_completed(Step::Consent));
    }

    #[rocket::async_test]
    async fn expired_session_cannot_consent() {
        let (ledger, _, session, clock) = ledger().await;
        clock.advance(Duration::minutes(15));

        let result = ledger.record_consent(&session, None).await;

        assert!(matches!(result, Err(Error::Unauthenticated)));
    }
}
