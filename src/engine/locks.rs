use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::EventId;

/// One mutex per event. Holding the guard makes a check-then-act sequence on
/// that event's capacity and ledger rows atomic; different events never
/// contend.
#[derive(Debug, Default)]
pub(crate) struct EventLocks {
    locks: Mutex<HashMap<EventId, Arc<Mutex<()>>>>,
}

impl EventLocks {
    pub(crate) async fn lock(&self, event: EventId) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().await.entry(event).or_default().clone();
        lock.lock_owned().await
    }
}
