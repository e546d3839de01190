//! Waitlist promotion. Callers must hold the event lock.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{Coupon, Event};
use crate::store::{CouponLedger, EventStore, Store, StoreError};

/// Issue freed capacity to waiting entries in queue order, then renumber the
/// remaining tail contiguously from 1.
///
/// Returns the promoted entries. The event is saved only if its capacity changed.
pub(super) async fn promote(
    store: &dyn Store,
    mut event: Event,
    now: DateTime<Utc>,
) -> Result<Vec<Coupon>, StoreError> {
    let waiting = store.waiting_coupons(event.id).await?;
    if waiting.is_empty() || !event.has_capacity() {
        return Ok(Vec::new());
    }

    let mut queue = waiting.into_iter().peekable();
    let mut promoted = Vec::new();

    while queue.peek().is_some() {
        let Some(next) = event.with_issued() else {
            break;
        };
        let Some(issued) = queue.next().and_then(|head| head.promoted(now)) else {
            continue;
        };
        store.save_coupon(&issued).await?;
        debug!(
            event = event.id,
            coupon = issued.id,
            account = issued.account,
            "waiting coupon promoted"
        );
        event = next;
        promoted.push(issued);
    }

    if !promoted.is_empty() {
        store.save_event(&event).await?;
    }

    for (rank, coupon) in queue.enumerate() {
        let position = u32::try_from(rank + 1).unwrap_or(u32::MAX);
        if coupon.queue_position == Some(position) {
            continue;
        }
        if let Some(renumbered) = coupon.with_queue_position(position) {
            store.save_coupon(&renumbered).await?;
        }
    }

    Ok(promoted)
}
