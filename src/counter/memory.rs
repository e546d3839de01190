use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CounterError, StockCounter};
use crate::model::{AccountId, EventId};

#[derive(Debug, Default)]
struct Keys {
    remain: HashMap<EventId, i64>,
    applied: HashMap<EventId, HashSet<AccountId>>,
}

/// In-process counter. Each primitive holds the lock for exactly one step.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    keys: Mutex<Keys>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockCounter for MemoryCounter {
    async fn seed(&self, event: EventId, total: u32) -> Result<(), CounterError> {
        let mut keys = self.keys.lock().await;
        keys.remain.insert(event, i64::from(total));
        keys.applied.remove(&event);
        Ok(())
    }

    async fn mark_applied(
        &self,
        event: EventId,
        account: AccountId,
    ) -> Result<bool, CounterError> {
        let mut keys = self.keys.lock().await;
        Ok(keys.applied.entry(event).or_default().insert(account))
    }

    async fn take(&self, event: EventId) -> Result<Option<i64>, CounterError> {
        let mut keys = self.keys.lock().await;
        Ok(keys.remain.get_mut(&event).map(|remain| {
            *remain -= 1;
            *remain
        }))
    }

    async fn rollback(&self, event: EventId, account: AccountId) -> Result<(), CounterError> {
        let mut keys = self.keys.lock().await;
        let was_applied = keys
            .applied
            .get_mut(&event)
            .is_some_and(|set| set.remove(&account));
        if was_applied {
            if let Some(remain) = keys.remain.get_mut(&event) {
                *remain += 1;
            }
        }
        Ok(())
    }

    async fn restore(&self, event: EventId) -> Result<(), CounterError> {
        if let Some(remain) = self.keys.lock().await.remain.get_mut(&event) {
            *remain += 1;
        }
        Ok(())
    }

    async fn remaining(&self, event: EventId) -> Result<Option<i64>, CounterError> {
        Ok(self.keys.lock().await.remain.get(&event).copied())
    }
}
