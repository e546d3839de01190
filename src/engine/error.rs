//! Error types for admission processing.

use thiserror::Error;

use crate::counter::CounterError;
use crate::model::{AccountId, CouponId, CouponStatus, EventId};
use crate::reward::RewardError;
use crate::store::StoreError;

/// Top-level error returned by every [`Engine`](super::Engine) operation.
///
/// Business-rule violations are never retried by the engine; infrastructure
/// failures are reported as-is for the caller's own retry policy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("{0}")]
    CouponOperation(#[from] CouponOperationError),

    #[error("register failed: {0}")]
    Register(#[from] RegisterError),

    #[error("event {0} not found")]
    EventNotFound(EventId),

    #[error("reward recommendation failed: {0}")]
    Reward(#[from] RewardError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Counter(#[from] CounterError),

    /// A losing stock reservation could not be undone; stock is understated
    /// until an operator reconciles the counter.
    #[error("rollback of stock for event {event} (account {account}) failed: {source}")]
    RollbackFailed {
        event: EventId,
        account: AccountId,
        source: CounterError,
    },
}

/// Error during coupon application.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("account {0} has an active penalty")]
    ActivePenalty(AccountId),
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("event {0} is not accepting applications")]
    EventClosed(EventId),
    #[error("account {0} already holds a coupon for event {1}")]
    DuplicateApplication(AccountId, EventId),
    #[error("event {0} is sold out")]
    CouponSoldOut(EventId),
}

/// The type of coupon operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponOperation {
    Redeem,
    NoShow,
}

/// Unified error for operations on an existing coupon (redeem, no-show).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CouponOperationError {
    #[error("{0:?}: coupon {1} not found")]
    CouponNotFound(CouponOperation, CouponId),

    #[error("{0:?}: coupon {1} is {2}, expected ISSUED")]
    InvalidState(CouponOperation, CouponId, CouponStatus),

    #[error("{0:?}: event {1} of coupon {2} not found")]
    EventNotFound(CouponOperation, EventId, CouponId),
}

/// Error during event registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("event end must be after its start")]
    InvalidWindow,
}
