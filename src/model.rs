//! Core domain types for the admission engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requester identifier, supplied by the identity provider.
pub type AccountId = u64;

/// Event identifier.
pub type EventId = u64;

/// Coupon ledger entry identifier.
pub type CouponId = u64;

/// Penalty record identifier.
pub type PenaltyId = u64;

/// A command representing the possible inputs of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Claim a coupon for an event; issued or queued.
    Apply { account: AccountId, event: EventId },
    /// Consume an issued coupon.
    Redeem { coupon: CouponId },
    /// Relinquish an issued coupon; frees capacity and penalizes the account.
    NoShow {
        account: AccountId,
        coupon: CouponId,
    },
}

/// Lifecycle state of a coupon ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponStatus {
    Waiting,
    Issued,
    Redeemed,
    NoShow,
    Cancelled,
}

impl CouponStatus {
    /// Terminal states permit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Redeemed | Self::NoShow | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Issued => "ISSUED",
            Self::Redeemed => "REDEEMED",
            Self::NoShow => "NO_SHOW",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requester's claim against one event.
///
/// Transitions return a new value; the caller persists it under the event lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coupon {
    pub id: CouponId,
    pub event: EventId,
    pub account: AccountId,
    pub status: CouponStatus,
    pub applied_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub no_show_at: Option<DateTime<Utc>>,
    /// 1-based rank in the waitlist, only present while `Waiting`.
    pub queue_position: Option<u32>,
}

impl Coupon {
    /// A new entry issued at application time. The id is assigned by the ledger.
    pub fn issued(event: EventId, account: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            event,
            account,
            status: CouponStatus::Issued,
            applied_at: now,
            issued_at: Some(now),
            redeemed_at: None,
            no_show_at: None,
            queue_position: None,
        }
    }

    /// A new entry placed at the tail of the waitlist.
    pub fn waiting(
        event: EventId,
        account: AccountId,
        now: DateTime<Utc>,
        queue_position: u32,
    ) -> Self {
        Self {
            id: 0,
            event,
            account,
            status: CouponStatus::Waiting,
            applied_at: now,
            issued_at: None,
            redeemed_at: None,
            no_show_at: None,
            queue_position: Some(queue_position),
        }
    }

    /// WAITING -> ISSUED. Returns `None` from any other state.
    pub fn promoted(&self, now: DateTime<Utc>) -> Option<Self> {
        (self.status == CouponStatus::Waiting).then(|| Self {
            status: CouponStatus::Issued,
            issued_at: Some(now),
            queue_position: None,
            ..self.clone()
        })
    }

    /// ISSUED -> REDEEMED. Returns `None` from any other state.
    pub fn redeemed(&self, now: DateTime<Utc>) -> Option<Self> {
        (self.status == CouponStatus::Issued).then(|| Self {
            status: CouponStatus::Redeemed,
            redeemed_at: Some(now),
            ..self.clone()
        })
    }

    /// ISSUED -> NO_SHOW. Returns `None` from any other state.
    pub fn no_show(&self, now: DateTime<Utc>) -> Option<Self> {
        (self.status == CouponStatus::Issued).then(|| Self {
            status: CouponStatus::NoShow,
            no_show_at: Some(now),
            ..self.clone()
        })
    }

    /// Re-rank a waiting entry. Returns `None` if not waiting.
    pub fn with_queue_position(&self, position: u32) -> Option<Self> {
        (self.status == CouponStatus::Waiting).then(|| Self {
            queue_position: Some(position),
            ..self.clone()
        })
    }
}

/// Event capacity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub reward_description: String,
    pub total_coupons: u32,
    pub remaining_coupons: u32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl Event {
    /// Active iff `now` is within `[start_at, end_at)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    pub fn has_capacity(&self) -> bool {
        self.remaining_coupons > 0
    }

    /// Take one unit of capacity. Returns `None` when exhausted.
    pub fn with_issued(&self) -> Option<Self> {
        let remaining_coupons = self.remaining_coupons.checked_sub(1)?;
        Some(Self {
            remaining_coupons,
            ..self.clone()
        })
    }

    /// Return one unit of capacity, capped at `total_coupons`.
    pub fn with_released(&self) -> Self {
        Self {
            remaining_coupons: self.remaining_coupons.saturating_add(1).min(self.total_coupons),
            ..self.clone()
        }
    }

    pub fn with_reward(&self, reward_description: String) -> Self {
        Self {
            reward_description,
            ..self.clone()
        }
    }

    /// Read-time projection with the computed `active` flag.
    pub fn view(&self, now: DateTime<Utc>) -> EventView {
        EventView {
            event: self.clone(),
            active: self.is_active(now),
        }
    }
}

/// Input for registering an event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reward_description: String,
    pub total_coupons: u32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// An event annotated with whether it is currently accepting applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventView {
    pub event: Event,
    pub active: bool,
}

/// A temporary suspension of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Penalty {
    pub id: PenaltyId,
    pub account: AccountId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Penalty {
    pub fn new(account: AccountId, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            account,
            starts_at,
            ends_at,
        }
    }

    /// Active iff `now` is within `[starts_at, ends_at)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn event(total: u32, remaining: u32) -> Event {
        Event {
            id: 1,
            title: "festival".to_string(),
            description: String::new(),
            reward_description: String::new(),
            total_coupons: total,
            remaining_coupons: remaining,
            start_at: at(10),
            end_at: at(12),
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!CouponStatus::Waiting.is_terminal());
        assert!(!CouponStatus::Issued.is_terminal());
        assert!(CouponStatus::Redeemed.is_terminal());
        assert!(CouponStatus::NoShow.is_terminal());
        assert!(CouponStatus::Cancelled.is_terminal());
    }

    #[test]
    fn event_window_is_half_open() {
        let event = event(1, 1);
        assert!(!event.is_active(at(9)));
        assert!(event.is_active(at(10)));
        assert!(event.is_active(at(11)));
        assert!(!event.is_active(at(12)));
    }

    #[test]
    fn capacity_never_goes_negative() {
        let event = event(1, 1).with_issued().unwrap();
        assert_eq!(event.remaining_coupons, 0);
        assert!(event.with_issued().is_none());
    }

    #[test]
    fn release_is_capped_at_total() {
        assert_eq!(event(2, 2).with_released().remaining_coupons, 2);
        assert_eq!(event(2, 0).with_released().remaining_coupons, 1);
    }

    #[test]
    fn promotion_clears_queue_position() {
        let waiting = Coupon::waiting(1, 7, at(10), 3);
        let issued = waiting.promoted(at(11)).unwrap();
        assert_eq!(issued.status, CouponStatus::Issued);
        assert_eq!(issued.issued_at, Some(at(11)));
        assert_eq!(issued.queue_position, None);
        assert_eq!(issued.applied_at, at(10));
    }

    #[test]
    fn transitions_reject_wrong_state() {
        let waiting = Coupon::waiting(1, 7, at(10), 1);
        assert!(waiting.redeemed(at(11)).is_none());
        assert!(waiting.no_show(at(11)).is_none());

        let redeemed = Coupon::issued(1, 7, at(10)).redeemed(at(11)).unwrap();
        assert!(redeemed.redeemed(at(11)).is_none());
        assert!(redeemed.promoted(at(11)).is_none());
        assert!(redeemed.with_queue_position(1).is_none());
    }

    #[test]
    fn penalty_window_is_half_open() {
        let penalty = Penalty::new(7, at(10), at(12));
        assert!(!penalty.is_active(at(9)));
        assert!(penalty.is_active(at(10)));
        assert!(!penalty.is_active(at(12)));
    }
}
