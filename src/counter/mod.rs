//! Fast-path collaborators: a per-event remaining-stock counter and an
//! "already applied" set.
//!
//! Every method is a single atomic primitive on the backing store. Callers
//! must never compose a read with a later write, since that reintroduces the
//! race the counter exists to avoid.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AccountId, EventId};

mod memory;
pub use memory::MemoryCounter;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisCounter;

/// Infrastructure failure of the counter store.
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("stock for event {0} was never seeded")]
    NotSeeded(EventId),
}

/// Key holding the remaining stock of an event.
pub fn remain_key(event: EventId) -> String {
    format!("coupon:{event}:remain")
}

/// Key holding the set of accounts that applied to an event.
pub fn applied_key(event: EventId) -> String {
    format!("coupon:{event}:applied")
}

#[async_trait]
pub trait StockCounter: Send + Sync {
    /// Set the remaining stock to `total` and clear the applied set.
    async fn seed(&self, event: EventId, total: u32) -> Result<(), CounterError>;

    /// Add-if-absent. Returns `true` if the account was not yet in the set.
    async fn mark_applied(&self, event: EventId, account: AccountId)
    -> Result<bool, CounterError>;

    /// Decrement-and-return. `None` if the event was never seeded.
    async fn take(&self, event: EventId) -> Result<Option<i64>, CounterError>;

    /// Undo a losing `take` together with its `mark_applied`.
    ///
    /// The increment only happens if the account is still in the applied set,
    /// so repeating a rollback never returns more stock than was taken.
    async fn rollback(&self, event: EventId, account: AccountId) -> Result<(), CounterError>;

    /// Return one unit of stock freed by a no-show. No-op if never seeded.
    async fn restore(&self, event: EventId) -> Result<(), CounterError>;

    /// Current remaining stock, `None` if never seeded.
    async fn remaining(&self, event: EventId) -> Result<Option<i64>, CounterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_event() {
        assert_eq!(remain_key(42), "coupon:42:remain");
        assert_eq!(applied_key(42), "coupon:42:applied");
    }
}
