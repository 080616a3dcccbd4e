use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use rocket::tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::id::Id;

/// One async lock per voter, created on demand and dropped once nobody
/// holds or waits on it. Serializes a voter's state transitions without
/// serializing different voters against each other.
#[derive(Clone, Default)]
pub struct VoterLocks {
    locks: Arc<Mutex<HashMap<Id, Weak<AsyncMutex<()>>>>>,
}

impl VoterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to this voter.
    pub async fn lock(&self, voter_id: Id) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(&voter_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(voter_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }
}
