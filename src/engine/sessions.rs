use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use thiserror::Error;

use crate::{
    clock::Clock,
    error::{Error, Result},
    model::{
        id::Id,
        session::{Session, SessionId, Step},
    },
    store::Store,
};

/// Why a presented session was refused.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has expired")]
    Expired,
    #[error("Session not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] Error),
}

/// Clients cannot tell an expired session from a forged one.
impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired | SessionError::NotFound => Error::Unauthenticated,
            SessionError::Store(err) => err,
        }
    }
}

struct Cached {
    session: Session,
    fetched_at: DateTime<Utc>,
}

/// Issues and checks sessions. Reads go through a small cache whose entries
/// are trusted for at most `cache_ttl`; expiry is always judged against the
/// clock, never the cache.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache_ttl: Duration,
    cache: Arc<RwLock<HashMap<SessionId, Cached>>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            cache_ttl,
            cache: Arc::default(),
        }
    }

    /// Start a session for the voter, with the given steps already done.
    pub async fn create_session(&self, voter_id: Id, steps: BTreeSet<Step>) -> Result<Session> {
        let now = self.clock.now();
        let session = Session::new(voter_id, now, self.ttl, steps);
        self.store.insert_session(&session).await?;
        self.remember(session.clone(), now);
        debug!("Opened session {:?} for voter {voter_id}", session.id);
        Ok(session)
    }

    pub async fn validate(&self, id: &SessionId) -> std::result::Result<Session, SessionError> {
        let now = self.clock.now();

        let session = match self.cached(id, now) {
            Some(session) => session,
            None => match self.store.session(id).await? {
                Some(session) => {
                    self.remember(session.clone(), now);
                    session
                }
                None => {
                    self.forget(id);
                    return Err(SessionError::NotFound);
                }
            },
        };

        if session.is_expired(now) {
            self.forget(id);
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    /// Check a session obtained earlier is still within its lifetime.
    pub fn ensure_live(&self, session: &Session) -> Result<()> {
        if session.is_expired(self.clock.now()) {
            Err(Error::Unauthenticated)
        } else {
            Ok(())
        }
    }

    pub async fn mark_step_complete(&self, id: &SessionId, step: Step) -> Result<()> {
        self.store.add_session_step(id, step).await?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get_mut(id) {
            cached.session.completed_steps.insert(step);
        }
        Ok(())
    }

    pub async fn invalidate(&self, id: &SessionId) -> Result<()> {
        self.forget(id);
        self.store.delete_session(id).await
    }

    /// Drop every expired session, returning how many were removed from the store.
    pub async fn sweep(&self) -> Result<u64> {
        let now = self.clock.now();
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, cached| !cached.session.is_expired(now));
        let removed = self.store.delete_expired_sessions(now).await?;
        if removed > 0 {
            info!("Swept {removed} expired session(s)");
        }
        Ok(removed)
    }

    fn cached(&self, id: &SessionId, now: DateTime<Utc>) -> Option<Session> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(id)
            .filter(|cached| now - cached.fetched_at < self.cache_ttl)
            .map(|cached| cached.session.clone())
    }

    fn remember(&self, session: Session, now: DateTime<Utc>) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                session.id.clone(),
                Cached {
                    session,
                    fetched_at: now,
                },
            );
    }

    fn forget(&self, id: &SessionId) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}
