use std::sync::Arc;

use log::info;

use crate::{
    clock::Clock,
    error::{Error, Result},
    model::{
        blob::Blob,
        enrollment::{BiometricMethod, EnrollmentCore, EnrollmentRecord},
        id::Id,
        session::{Session, Step},
    },
    store::Store,
};

use super::{consent::ConsentLedger, sessions::SessionManager};

/// Enrolled biometric descriptors. Re-enrolling a method supersedes the
/// previous descriptor, which is kept inactive.
#[derive(Clone)]
pub struct EnrollmentManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    sessions: SessionManager,
    consent: ConsentLedger,
}

impl EnrollmentManager {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        sessions: SessionManager,
        consent: ConsentLedger,
    ) -> Self {
        Self {
            store,
            clock,
            sessions,
            consent,
        }
    }

    pub async fn enroll(
        &self,
        session: &Session,
        method: BiometricMethod,
        descriptor: Blob,
    ) -> Result<EnrollmentRecord> {
        if descriptor.is_empty() {
            return Err(Error::validation("Descriptor must not be empty"));
        }
        self.sessions.ensure_live(session)?;

        // A cached session may lag a consent given moments ago elsewhere;
        // the ledger is authoritative.
        if !session.has_completed(Step::Consent)
            && !self.consent.has_current_consent(session.voter_id).await?
        {
            return Err(Error::ConsentMissing);
        }

        let record = self
            .store
            .replace_enrollment(EnrollmentCore::new(
                session.voter_id,
                method,
                descriptor,
                self.clock.now(),
            ))
            .await?;
        self.sessions
            .mark_step_complete(&session.id, Step::Enrollment)
            .await?;
        info!("Voter {} enrolled {method}", session.voter_id);
        Ok(record)
    }

    pub async fn is_enrolled(&self, voter_id: Id, method: BiometricMethod) -> Result<bool> {
        Ok(self
            .store
            .active_enrollment(voter_id, method)
            .await?
            .is_some())
    }

    /// Methods with an active enrollment, in a stable order.
    pub async fn enrolled_methods(&self, voter_id: Id) -> Result<Vec<BiometricMethod>> {
        let mut methods: Vec<_> = self
            .store
            .active_enrollments(voter_id)
            .await?
            .into_iter()
            .map(|enrollment| enrollment.method)
            .collect();
        methods.sort();
        methods.dedup();
        Ok(methods)
    }
}
