//! Durable-tier collaborators: event capacity records, the coupon ledger and
//! the penalty ledger.
//!
//! The engine serializes every check-then-act sequence per event, so
//! implementations only need each individual call to be atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AccountId, Coupon, CouponId, Event, EventId, NewEvent, Penalty};

mod memory;
pub use memory::MemoryStore;

/// Infrastructure failure of the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} does not exist")]
    Missing { kind: &'static str, id: u64 },

    #[error("durable store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event with `remaining_coupons == total_coupons`.
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError>;

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError>;

    /// Replace an existing event wholesale.
    async fn save_event(&self, event: &Event) -> Result<(), StoreError>;

    async fn list_events(&self) -> Result<Vec<Event>, StoreError>;
}

#[async_trait]
pub trait CouponLedger: Send + Sync {
    /// Append a new entry, assigning its id.
    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon, StoreError>;

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>, StoreError>;

    /// Replace an existing entry wholesale.
    async fn save_coupon(&self, coupon: &Coupon) -> Result<(), StoreError>;

    /// The WAITING or ISSUED entry for the pair, if any.
    async fn find_open_coupon(
        &self,
        event: EventId,
        account: AccountId,
    ) -> Result<Option<Coupon>, StoreError>;

    /// All entries of an account, most recently applied first.
    async fn coupons_by_account(&self, account: AccountId) -> Result<Vec<Coupon>, StoreError>;

    /// All entries of an event, in id order.
    async fn coupons_by_event(&self, event: EventId) -> Result<Vec<Coupon>, StoreError>;

    async fn count_waiting(&self, event: EventId) -> Result<u32, StoreError>;

    /// WAITING entries of an event ordered by queue position.
    async fn waiting_coupons(&self, event: EventId) -> Result<Vec<Coupon>, StoreError>;
}

#[async_trait]
pub trait PenaltyLedger: Send + Sync {
    /// Append a new penalty, assigning its id.
    async fn insert_penalty(&self, penalty: Penalty) -> Result<Penalty, StoreError>;

    /// The active penalty ending last, if any.
    async fn active_penalty(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Penalty>, StoreError>;

    /// All penalties of an account, latest ending first.
    async fn penalties_by_account(&self, account: AccountId) -> Result<Vec<Penalty>, StoreError>;
}

/// Everything the engine needs from the durable tier.
pub trait Store: EventStore + CouponLedger + PenaltyLedger {}

impl<T: EventStore + CouponLedger + PenaltyLedger> Store for T {}
