use std::cmp::Reverse;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CouponLedger, EventStore, PenaltyLedger, StoreError};
use crate::model::{
    AccountId, Coupon, CouponId, CouponStatus, Event, EventId, NewEvent, Penalty, PenaltyId,
};

#[derive(Debug, Default)]
struct Tables {
    events: BTreeMap<EventId, Event>,
    coupons: BTreeMap<CouponId, Coupon>,
    penalties: BTreeMap<PenaltyId, Penalty>,
    next_event: EventId,
    next_coupon: CouponId,
    next_penalty: PenaltyId,
}

/// In-process store. Ids start at 1 and are assigned in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_event += 1;
        let event = Event {
            id: tables.next_event,
            title: event.title,
            description: event.description,
            reward_description: event.reward_description,
            total_coupons: event.total_coupons,
            remaining_coupons: event.total_coupons,
            start_at: event.start_at,
            end_at: event.end_at,
        };
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn save_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let slot = tables.events.get_mut(&event.id).ok_or(StoreError::Missing {
            kind: "event",
            id: event.id,
        })?;
        *slot = event.clone();
        Ok(())
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        Ok(self.tables.read().await.events.values().cloned().collect())
    }
}

#[async_trait]
impl CouponLedger for MemoryStore {
    async fn insert_coupon(&self, mut coupon: Coupon) -> Result<Coupon, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_coupon += 1;
        coupon.id = tables.next_coupon;
        tables.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>, StoreError> {
        Ok(self.tables.read().await.coupons.get(&id).cloned())
    }

    async fn save_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .coupons
            .get_mut(&coupon.id)
            .ok_or(StoreError::Missing {
                kind: "coupon",
                id: coupon.id,
            })?;
        *slot = coupon.clone();
        Ok(())
    }

    async fn find_open_coupon(
        &self,
        event: EventId,
        account: AccountId,
    ) -> Result<Option<Coupon>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .coupons
            .values()
            .find(|c| c.event == event && c.account == account && !c.status.is_terminal())
            .cloned())
    }

    async fn coupons_by_account(&self, account: AccountId) -> Result<Vec<Coupon>, StoreError> {
        let tables = self.tables.read().await;
        let mut coupons: Vec<_> = tables
            .coupons
            .values()
            .filter(|c| c.account == account)
            .cloned()
            .collect();
        coupons.sort_by_key(|c| Reverse((c.applied_at, c.id)));
        Ok(coupons)
    }

    async fn coupons_by_event(&self, event: EventId) -> Result<Vec<Coupon>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .coupons
            .values()
            .filter(|c| c.event == event)
            .cloned()
            .collect())
    }

    async fn count_waiting(&self, event: EventId) -> Result<u32, StoreError> {
        let count = self
            .tables
            .read()
            .await
            .coupons
            .values()
            .filter(|c| c.event == event && c.status == CouponStatus::Waiting)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn waiting_coupons(&self, event: EventId) -> Result<Vec<Coupon>, StoreError> {
        let tables = self.tables.read().await;
        let mut waiting: Vec<_> = tables
            .coupons
            .values()
            .filter(|c| c.event == event && c.status == CouponStatus::Waiting)
            .cloned()
            .collect();
        waiting.sort_by_key(|c| (c.queue_position, c.id));
        Ok(waiting)
    }
}

#[async_trait]
impl PenaltyLedger for MemoryStore {
    async fn insert_penalty(&self, mut penalty: Penalty) -> Result<Penalty, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_penalty += 1;
        penalty.id = tables.next_penalty;
        tables.penalties.insert(penalty.id, penalty.clone());
        Ok(penalty)
    }

    async fn active_penalty(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Penalty>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .penalties
            .values()
            .filter(|p| p.account == account && p.is_active(now))
            .max_by_key(|p| p.ends_at)
            .cloned())
    }

    async fn penalties_by_account(&self, account: AccountId) -> Result<Vec<Penalty>, StoreError> {
        let tables = self.tables.read().await;
        let mut penalties: Vec<_> = tables
            .penalties
            .values()
            .filter(|p| p.account == account)
            .cloned()
            .collect();
        penalties.sort_by_key(|p| Reverse((p.ends_at, p.id)));
        Ok(penalties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn new_event(total: u32) -> NewEvent {
        NewEvent {
            title: "festival".to_string(),
            description: String::new(),
            reward_description: String::new(),
            total_coupons: total,
            start_at: now(),
            end_at: now() + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn insert_event_assigns_ids_and_full_capacity() {
        let store = MemoryStore::new();
        let first = store.insert_event(new_event(3)).await.unwrap();
        let second = store.insert_event(new_event(5)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.remaining_coupons, 5);
        assert_eq!(store.get_event(2).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn save_unknown_rows_fails() {
        let store = MemoryStore::new();
        let coupon = Coupon::issued(1, 1, now());
        assert!(matches!(
            store.save_coupon(&coupon).await,
            Err(StoreError::Missing { kind: "coupon", .. })
        ));
    }

    #[tokio::test]
    async fn find_open_coupon_ignores_terminal_entries() {
        let store = MemoryStore::new();
        let coupon = store
            .insert_coupon(Coupon::issued(1, 7, now()))
            .await
            .unwrap();
        store
            .save_coupon(&coupon.redeemed(now()).unwrap())
            .await
            .unwrap();

        assert_eq!(store.find_open_coupon(1, 7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn waiting_coupons_are_ordered_by_queue_position() {
        let store = MemoryStore::new();
        store
            .insert_coupon(Coupon::waiting(1, 7, now(), 2))
            .await
            .unwrap();
        store
            .insert_coupon(Coupon::waiting(1, 8, now(), 1))
            .await
            .unwrap();
        store
            .insert_coupon(Coupon::waiting(2, 9, now(), 1))
            .await
            .unwrap();

        let accounts: Vec<_> = store
            .waiting_coupons(1)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.account)
            .collect();
        assert_eq!(accounts, vec![8, 7]);
        assert_eq!(store.count_waiting(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn coupons_by_account_most_recent_first() {
        let store = MemoryStore::new();
        store
            .insert_coupon(Coupon::issued(1, 7, now()))
            .await
            .unwrap();
        store
            .insert_coupon(Coupon::issued(2, 7, now() + Duration::hours(1)))
            .await
            .unwrap();

        let events: Vec<_> = store
            .coupons_by_account(7)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.event)
            .collect();
        assert_eq!(events, vec![2, 1]);
    }

    #[tokio::test]
    async fn active_penalty_respects_window() {
        let store = MemoryStore::new();
        store
            .insert_penalty(Penalty::new(7, now(), now() + Duration::days(1)))
            .await
            .unwrap();

        assert!(store.active_penalty(7, now()).await.unwrap().is_some());
        assert!(
            store
                .active_penalty(7, now() + Duration::days(1))
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.active_penalty(8, now()).await.unwrap().is_none());
    }
}
