//! Coupon admission engine.
//!
//! The engine hands out a fixed number of coupons per event to competing
//! accounts. Applications beyond the stock are queued on a waitlist; a no-show
//! returns capacity, penalizes the account and promotes the waitlist head.
//! Commands can also be fed as an async stream.

use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::counter::{CounterError, MemoryCounter, StockCounter};
use crate::model::{
    AccountId, Command, Coupon, CouponId, CouponStatus, Event, EventId, EventView, NewEvent,
    Penalty,
};
use crate::reward::{RewardAdvisor, RewardError, RewardProfile, RewardRequest};
use crate::store::{CouponLedger, EventStore, MemoryStore, PenaltyLedger, Store};

mod error;
pub use error::{
    ApplyError, CouponOperation, CouponOperationError, EngineError, RegisterError,
};

mod locks;
use locks::EventLocks;

mod waitlist;

/// Length of the suspension imposed by a no-show.
pub const PENALTY_MONTHS: u32 = 6;

/// How `apply_for_coupon` decides between issuing and not issuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionMode {
    /// Capacity record and ledger under a per-event lock; sold-out
    /// applications join the waitlist.
    #[default]
    Durable,
    /// Shared stock counter and applied set; sold-out applications are
    /// rejected with `CouponSoldOut` and no waitlist exists.
    FastPath,
}

/// Outcome of a successful application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub coupon: Coupon,
    /// `true` if issued immediately, `false` if queued.
    pub issued: bool,
}

/// The admission engine.
///
/// Sole writer of coupon status transitions and of event capacity.
pub struct Engine {
    store: Arc<dyn Store>,
    counter: Arc<dyn StockCounter>,
    clock: Arc<dyn Clock>,
    mode: AdmissionMode,
    locks: EventLocks,
}

/// Builder for [`Engine`]. Unset collaborators default to in-memory ones and
/// the system clock.
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn Store>>,
    counter: Option<Arc<dyn StockCounter>>,
    clock: Option<Arc<dyn Clock>>,
    mode: AdmissionMode,
}

impl EngineBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn counter(mut self, counter: Arc<dyn StockCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn mode(mut self, mode: AdmissionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            counter: self.counter.unwrap_or_else(|| Arc::new(MemoryCounter::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            mode: self.mode,
            locks: EventLocks::default(),
        }
    }
}

/// Public API
impl Engine {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    /// Run the engine with the given command stream
    pub async fn run(&self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            // a failed command must not stop the engine; the outcome is logged
            let _ = self.execute(command).await;
        }
    }

    /// Execute a single command and log its outcome.
    pub async fn execute(&self, command: Command) -> Result<(), EngineError> {
        match &command {
            Command::Apply { account, event } => {
                let result = self
                    .apply_for_coupon(*account, *event)
                    .await
                    .map(|admission| admission.coupon);
                Self::log_result("apply", &command, &result);
                result?;
            }
            Command::Redeem { coupon } => {
                let result = self.redeem_coupon(*coupon).await;
                Self::log_result("redeem", &command, &result);
                result?;
            }
            Command::NoShow { account, coupon } => {
                let result = self.mark_no_show(*account, *coupon).await;
                Self::log_result("no-show", &command, &result);
                result?;
            }
        }
        Ok(())
    }

    /// Store a new event with full capacity. In fast-path mode the stock
    /// counter is seeded with `total_coupons`.
    pub async fn register_event(&self, event: NewEvent) -> Result<Event, EngineError> {
        if event.end_at <= event.start_at {
            return Err(RegisterError::InvalidWindow.into());
        }
        let event = self.store.insert_event(event).await?;
        if self.mode == AdmissionMode::FastPath {
            self.counter.seed(event.id, event.total_coupons).await?;
        }
        info!(
            event = event.id,
            total = event.total_coupons,
            "event registered"
        );
        Ok(event)
    }

    /// Claim a coupon for `event` on behalf of `account`.
    ///
    /// Checks, first failure wins: active penalty, event exists, event open,
    /// no open claim. A repeated application while waiting returns the
    /// existing entry unchanged.
    pub async fn apply_for_coupon(
        &self,
        account: AccountId,
        event: EventId,
    ) -> Result<Admission, EngineError> {
        match self.mode {
            AdmissionMode::Durable => self.apply_durable(account, event).await,
            AdmissionMode::FastPath => self.apply_fast_path(account, event).await,
        }
    }

    /// ISSUED -> REDEEMED. Capacity is not returned.
    pub async fn redeem_coupon(&self, coupon: CouponId) -> Result<Coupon, EngineError> {
        use CouponOperation::Redeem;

        let now = self.clock.now();
        let (_guard, current) = self.lock_coupon(Redeem, coupon).await?;

        let redeemed = current
            .redeemed(now)
            .ok_or(CouponOperationError::InvalidState(Redeem, coupon, current.status))?;
        self.store.save_coupon(&redeemed).await?;

        Ok(redeemed)
    }

    /// ISSUED -> NO_SHOW: return capacity, penalize `account` for
    /// [`PENALTY_MONTHS`], and promote the waitlist.
    pub async fn mark_no_show(
        &self,
        account: AccountId,
        coupon: CouponId,
    ) -> Result<Coupon, EngineError> {
        use CouponOperation::NoShow;

        let now = self.clock.now();
        let (_guard, current) = self.lock_coupon(NoShow, coupon).await?;

        let no_show = current
            .no_show(now)
            .ok_or(CouponOperationError::InvalidState(NoShow, coupon, current.status))?;

        match self.mode {
            AdmissionMode::Durable => {
                let event = self
                    .store
                    .get_event(no_show.event)
                    .await?
                    .ok_or(CouponOperationError::EventNotFound(NoShow, no_show.event, coupon))?;
                self.store.save_coupon(&no_show).await?;

                let event = event.with_released();
                self.store.save_event(&event).await?;
                self.impose_penalty(account, now).await?;
                waitlist::promote(self.store.as_ref(), event, now).await?;
            }
            AdmissionMode::FastPath => {
                self.store.save_coupon(&no_show).await?;
                self.counter.restore(no_show.event).await?;
                self.impose_penalty(account, now).await?;
            }
        }

        Ok(no_show)
    }

    /// Issue any free capacity of `event` to its waitlist, in queue order.
    pub async fn promote_waitlist(&self, event: EventId) -> Result<Vec<Coupon>, EngineError> {
        let _guard = self.locks.lock(event).await;
        let record = self
            .store
            .get_event(event)
            .await?
            .ok_or(EngineError::EventNotFound(event))?;
        Ok(waitlist::promote(self.store.as_ref(), record, self.clock.now()).await?)
    }

    /// All coupons of an account, most recently applied first.
    pub async fn list_coupons(&self, account: AccountId) -> Result<Vec<Coupon>, EngineError> {
        Ok(self.store.coupons_by_account(account).await?)
    }

    /// All coupons of an event, in id order.
    pub async fn event_coupons(&self, event: EventId) -> Result<Vec<Coupon>, EngineError> {
        Ok(self.store.coupons_by_event(event).await?)
    }

    /// All events by start time, flagged active or not as of now.
    ///
    /// In fast-path mode remaining capacity is read from the stock counter.
    pub async fn list_events(&self) -> Result<Vec<EventView>, EngineError> {
        let now = self.clock.now();
        let mut events = self.store.list_events().await?;
        events.sort_by_key(|e| (e.start_at, e.id));

        let mut views = Vec::with_capacity(events.len());
        for mut event in events {
            if self.mode == AdmissionMode::FastPath {
                if let Some(remain) = self.counter.remaining(event.id).await? {
                    event.remaining_coupons = u32::try_from(remain.max(0))
                        .unwrap_or(u32::MAX)
                        .min(event.total_coupons);
                }
            }
            views.push(event.view(now));
        }
        Ok(views)
    }

    /// All penalties of an account, latest ending first.
    pub async fn list_penalties(&self, account: AccountId) -> Result<Vec<Penalty>, EngineError> {
        Ok(self.store.penalties_by_account(account).await?)
    }

    pub async fn active_penalty(&self, account: AccountId) -> Result<Option<Penalty>, EngineError> {
        Ok(self.store.active_penalty(account, self.clock.now()).await?)
    }

    /// Ask the advisor for a reward and store it, truncated to a whole
    /// number, as the event's reward description.
    pub async fn apply_reward_recommendation(
        &self,
        event: EventId,
        advisor: &dyn RewardAdvisor,
        profile: &RewardProfile,
    ) -> Result<Event, EngineError> {
        let record = self
            .store
            .get_event(event)
            .await?
            .ok_or(EngineError::EventNotFound(event))?;
        let request = RewardRequest::new(&record, profile, self.clock.now());

        let reward = advisor.recommend(&request).await?;
        if !reward.is_finite() || reward < 0.0 || reward >= i64::MAX as f64 {
            return Err(RewardError::InvalidValue(reward).into());
        }

        let _guard = self.locks.lock(event).await;
        let current = self
            .store
            .get_event(event)
            .await?
            .ok_or(EngineError::EventNotFound(event))?;
        let updated = current.with_reward((reward.trunc() as i64).to_string());
        self.store.save_event(&updated).await?;

        info!(event, reward = %updated.reward_description, "reward applied");
        Ok(updated)
    }
}

/// Private API
impl Engine {
    /// Small helper to log `execute` results
    fn log_result(kind: &str, command: &Command, result: &Result<Coupon, EngineError>) {
        match result {
            Ok(coupon) => {
                info!(
                    ?command,
                    coupon = coupon.id,
                    status = %coupon.status,
                    "{kind} applied"
                );
            }
            Err(e) if e.is_infrastructure() => {
                warn!(?command, reason = %e, "{kind} failed");
            }
            Err(e) => {
                info!(?command, reason = %e, "{kind} skipped");
            }
        }
    }

    async fn ensure_no_penalty(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.store.active_penalty(account, now).await?.is_some() {
            return Err(ApplyError::ActivePenalty(account).into());
        }
        Ok(())
    }

    /// Load an event that is currently accepting applications.
    async fn open_event(&self, event: EventId, now: DateTime<Utc>) -> Result<Event, EngineError> {
        let record = self
            .store
            .get_event(event)
            .await?
            .ok_or(ApplyError::EventNotFound(event))?;
        if !record.is_active(now) {
            return Err(ApplyError::EventClosed(event).into());
        }
        Ok(record)
    }

    /// Find a coupon, take its event lock and re-read it under the lock.
    async fn lock_coupon(
        &self,
        operation: CouponOperation,
        coupon: CouponId,
    ) -> Result<(tokio::sync::OwnedMutexGuard<()>, Coupon), EngineError> {
        let not_found = CouponOperationError::CouponNotFound(operation, coupon);
        let event = self
            .store
            .get_coupon(coupon)
            .await?
            .ok_or(not_found.clone())?
            .event;

        let guard = self.locks.lock(event).await;
        let current = self.store.get_coupon(coupon).await?.ok_or(not_found)?;
        Ok((guard, current))
    }

    async fn impose_penalty(&self, account: AccountId, now: DateTime<Utc>) -> Result<(), EngineError> {
        let ends_at = now
            .checked_add_months(Months::new(PENALTY_MONTHS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let penalty = self
            .store
            .insert_penalty(Penalty::new(account, now, ends_at))
            .await?;
        info!(account, penalty = penalty.id, until = %ends_at, "penalty imposed");
        Ok(())
    }

    /// Apply under the event lock: check penalty and remaining, decide, then write.
    ///
    /// The penalty read must happen under the guard; a no-show on the same
    /// event imposes its penalty while holding it.
    async fn apply_durable(
        &self,
        account: AccountId,
        event: EventId,
    ) -> Result<Admission, EngineError> {
        let _guard = self.locks.lock(event).await;
        let now = self.clock.now();
        self.ensure_no_penalty(account, now).await?;
        let record = self.open_event(event, now).await?;

        if let Some(existing) = self.store.find_open_coupon(event, account).await? {
            if existing.status == CouponStatus::Waiting {
                return Ok(Admission {
                    coupon: existing,
                    issued: false,
                });
            }
            return Err(ApplyError::DuplicateApplication(account, event).into());
        }

        match record.with_issued() {
            Some(updated) => {
                // capacity first: a failed ledger write leaves stock understated, never oversold
                self.store.save_event(&updated).await?;
                let coupon = self
                    .store
                    .insert_coupon(Coupon::issued(event, account, now))
                    .await?;
                Ok(Admission {
                    coupon,
                    issued: true,
                })
            }
            None => {
                let position = self.store.count_waiting(event).await?.saturating_add(1);
                let coupon = self
                    .store
                    .insert_coupon(Coupon::waiting(event, account, now, position))
                    .await?;
                Ok(Admission {
                    coupon,
                    issued: false,
                })
            }
        }
    }

    /// Apply against the shared counter; the ledger row is written only after
    /// stock was reserved.
    async fn apply_fast_path(
        &self,
        account: AccountId,
        event: EventId,
    ) -> Result<Admission, EngineError> {
        let now = self.clock.now();
        self.ensure_no_penalty(account, now).await?;
        self.open_event(event, now).await?;

        if !self.counter.mark_applied(event, account).await? {
            return Err(ApplyError::DuplicateApplication(account, event).into());
        }

        let remain = match self.counter.take(event).await? {
            Some(remain) => remain,
            None => {
                self.rollback(event, account).await?;
                return Err(CounterError::NotSeeded(event).into());
            }
        };

        if remain < 0 {
            self.rollback(event, account).await?;
            return Err(ApplyError::CouponSoldOut(event).into());
        }

        match self
            .store
            .insert_coupon(Coupon::issued(event, account, now))
            .await
        {
            Ok(coupon) => Ok(Admission {
                coupon,
                issued: true,
            }),
            Err(e) => {
                self.rollback(event, account).await?;
                Err(e.into())
            }
        }
    }

    async fn rollback(&self, event: EventId, account: AccountId) -> Result<(), EngineError> {
        self.counter.rollback(event, account).await.map_err(|source| {
            warn!(event, account, error = %source, "stock rollback failed");
            EngineError::RollbackFailed {
                event,
                account,
                source,
            }
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineError {
    /// Store or counter faults, as opposed to business-rule violations.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Counter(_) | Self::RollbackFailed { .. } | Self::Reward(_)
        )
    }
}
