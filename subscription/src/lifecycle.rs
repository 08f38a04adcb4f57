//! Subscription state machine.
//!
//! ```text
//!            payment                 cancel
//!   trial ───────────▶ active ───────────────▶ cancelled
//!     │                 │  ▲ renewal                │
//!     │ sweep           │  └──┘                     │ sweep
//!     ▼                 ▼ sweep                     ▼
//!   expired ◀───────────┴───────────────────── expired
//!     │
//!     └──── payment ───▶ active (fresh period)
//! ```
//!
//! Time-based transitions (to `expired`) happen only in the sweep. Request
//! paths read the timestamps instead, so a record whose end instant has
//! passed never grants access even before it is swept.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use tutorug_core::{Clock, RetryPolicy, StoreError, UserId, UserLocks};

use crate::error::{Result, SubscriptionError};
use crate::store::SubscriptionStore;
use crate::types::{
    PaymentRecord, Plan, SubscriptionRecord, SubscriptionStatus, SubscriptionView,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub trial_days: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            trial_days: 7,
        }
    }
}

/// End of one `plan` period starting at `start`, in calendar months.
///
/// A start day missing from the target month clamps to its last day, so
/// Jan 31 plus one month is Feb 28 (or 29).
pub fn period_end(start: DateTime<Utc>, plan: &Plan) -> Result<DateTime<Utc>> {
    start
        .checked_add_months(Months::new(plan.duration_months))
        .ok_or_else(|| {
            SubscriptionError::InvalidInput(format!("{} period from {start} is out of range", plan.id))
        })
}

/// Statuses reachable from `from` in one step.
pub fn allowed_transitions(from: SubscriptionStatus) -> &'static [SubscriptionStatus] {
    use SubscriptionStatus::*;
    match from {
        Trial => &[Active, Expired],
        Active => &[Active, Cancelled, Expired],
        Cancelled => &[Active, Expired],
        Expired => &[Active],
    }
}

/// Validate a status change. Staying in the same status is always allowed.
pub fn validate_transition(from: SubscriptionStatus, to: SubscriptionStatus) -> Result<()> {
    if from == to || allowed_transitions(from).contains(&to) {
        return Ok(());
    }
    Err(SubscriptionError::InvalidTransition { from, to })
}

/// Apply a confirmed payment for `plan` to `record`.
///
/// An active, unexpired subscription is extended from its current end; any
/// other state starts a fresh period at `now`.
pub fn apply_payment(
    record: &mut SubscriptionRecord,
    plan: &Plan,
    now: DateTime<Utc>,
) -> Result<()> {
    match (record.status, record.period_end_at) {
        (SubscriptionStatus::Active, Some(end)) if end > now => {
            record.period_end_at = Some(period_end(end, plan)?);
        }
        (status, _) => {
            validate_transition(status, SubscriptionStatus::Active)?;
            record.period_start_at = Some(now);
            record.period_end_at = Some(period_end(now, plan)?);
        }
    }

    record.status = SubscriptionStatus::Active;
    record.plan = Some(plan.id);
    record.ever_paid = true;
    record.cancelled_at = None;
    record.last_renewal_reminder_on = None;
    record.updated_at = now;
    Ok(())
}

/// Which reminder a sweep is claiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reminder {
    TrialEnding,
    Renewal,
}

/// Owns every subscription state change.
pub struct SubscriptionLifecycle {
    config: LifecycleConfig,
    store: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<UserLocks>,
    retry: RetryPolicy,
}

impl SubscriptionLifecycle {
    pub fn new(
        config: LifecycleConfig,
        store: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            locks: Arc::new(UserLocks::new()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create the trial subscription for a new account.
    ///
    /// Idempotent: an existing record is returned unchanged.
    pub async fn start_trial(&self, user: &UserId) -> Result<SubscriptionRecord> {
        let _guard = self.locks.lock(user).await;

        if let Some(existing) = self.store.load(user).await? {
            return Ok(existing.value);
        }

        let now = self.clock.now();
        let record = SubscriptionRecord::new_trial(
            user.clone(),
            now,
            now + Duration::days(self.config.trial_days),
        );
        match self.store.save(&record, None).await {
            Ok(_) => {}
            // Created by another process between load and save
            Err(e) if e.is_conflict() => {
                return self
                    .store
                    .load(user)
                    .await?
                    .map(|v| v.value)
                    .ok_or_else(|| SubscriptionError::NotFound(user.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!(user_id = %user, trial_end_at = %record.trial_end_at.unwrap_or(now), "Trial started");
        Ok(record)
    }

    /// Activate or renew `user` on `plan` after a verified payment.
    ///
    /// Prefer [`activate_with_payment`](Self::activate_with_payment) when a
    /// payment record exists, so the payment and the activation commit
    /// together.
    pub async fn confirm_payment(&self, user: &UserId, plan: &Plan) -> Result<SubscriptionRecord> {
        let (_, record) = self
            .mutate(user, true, |record, now| {
                apply_payment(record, plan, now)?;
                Ok(true)
            })
            .await?;

        info!(
            user_id = %user,
            plan = %plan.id,
            period_end_at = ?record.period_end_at,
            "Subscription activated"
        );
        Ok(record)
    }

    /// Activate the subscription a pending payment pays for, marking the
    /// payment completed in the same store write.
    ///
    /// Returns [`StoreError::PreconditionFailed`] (wrapped) if the payment
    /// was completed or failed in the meantime.
    pub async fn activate_with_payment(
        &self,
        payment: &PaymentRecord,
        gateway_tx_id: Option<&str>,
    ) -> Result<SubscriptionRecord> {
        let user = &payment.user_id;
        let plan = payment.plan.plan();
        let _guard = self.locks.lock(user).await;

        for attempt in 1..=self.retry.max_attempts {
            let now = self.clock.now();
            let (mut record, expected) = match self.store.load(user).await? {
                Some(v) => (v.value, Some(v.version)),
                None => (SubscriptionRecord::without_trial(user.clone(), now), None),
            };

            apply_payment(&mut record, plan, now)?;

            match self
                .store
                .complete_payment(&payment.tx_ref, gateway_tx_id, now, &record, expected)
                .await
            {
                Ok(_) => {
                    info!(
                        user_id = %user,
                        plan = %plan.id,
                        tx_ref = %payment.tx_ref,
                        period_end_at = ?record.period_end_at,
                        "Subscription activated"
                    );
                    return Ok(record);
                }
                Err(e) if e.is_conflict() => {
                    debug!(user_id = %user, attempt, "Subscription version conflict, retrying");
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SubscriptionError::ConcurrencyConflict {
            user_id: user.to_string(),
            attempts: self.retry.max_attempts,
        })
    }

    /// Cancel an active subscription. Access continues until the current
    /// period ends; cancelling twice is a no-op.
    pub async fn cancel_subscription(&self, user: &UserId) -> Result<SubscriptionRecord> {
        let (changed, record) = self
            .mutate(user, false, |record, now| {
                if record.status == SubscriptionStatus::Cancelled {
                    return Ok(false);
                }
                let from = record.effective_status(now);
                if from != SubscriptionStatus::Active {
                    return Err(SubscriptionError::InvalidTransition {
                        from,
                        to: SubscriptionStatus::Cancelled,
                    });
                }
                record.status = SubscriptionStatus::Cancelled;
                record.cancelled_at = Some(now);
                record.updated_at = now;
                Ok(true)
            })
            .await?;

        if changed {
            info!(user_id = %user, access_until = ?record.period_end_at, "Subscription cancelled");
        }
        Ok(record)
    }

    /// Whether `user` may use paid features right now. Never writes.
    pub async fn has_access(&self, user: &UserId) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .store
            .load(user)
            .await?
            .is_some_and(|v| v.value.has_access_at(now)))
    }

    pub async fn get(&self, user: &UserId) -> Result<Option<SubscriptionRecord>> {
        Ok(self.store.load(user).await?.map(|v| v.value))
    }

    pub async fn view(&self, user: &UserId) -> Result<SubscriptionView> {
        let now = self.clock.now();
        Ok(match self.store.load(user).await? {
            Some(v) => SubscriptionView::of(&v.value, now),
            None => SubscriptionView::none(),
        })
    }

    /// Sweep step for one user: expire the record if its end has passed.
    ///
    /// Re-checked under the user's lock so a payment that landed after the
    /// sweep listed candidates is respected. Returns the record if it was
    /// changed.
    pub async fn expire_if_due(&self, user: &UserId) -> Result<Option<SubscriptionRecord>> {
        let (changed, record) = self
            .mutate(user, false, |record, now| {
                if !record.due_for_expiry(now) {
                    return Ok(false);
                }
                validate_transition(record.status, SubscriptionStatus::Expired)?;
                record.status = SubscriptionStatus::Expired;
                record.updated_at = now;
                Ok(true)
            })
            .await?;

        Ok(changed.then_some(record))
    }

    /// Claim today's reminder for `user` if one is due.
    ///
    /// Returns the record when the caller should send the reminder; at most
    /// one claim succeeds per user, kind and UTC day.
    pub async fn claim_reminder(
        &self,
        user: &UserId,
        kind: Reminder,
        lookahead: Duration,
    ) -> Result<Option<SubscriptionRecord>> {
        let (changed, record) = self
            .mutate(user, false, |record, now| {
                let today = now.date_naive();
                let (status, end, last) = match kind {
                    Reminder::TrialEnding => (
                        SubscriptionStatus::Trial,
                        record.trial_end_at,
                        &mut record.last_trial_reminder_on,
                    ),
                    Reminder::Renewal => (
                        SubscriptionStatus::Active,
                        record.period_end_at,
                        &mut record.last_renewal_reminder_on,
                    ),
                };
                if record.status != status || !due_within(end, now, lookahead, *last, today) {
                    return Ok(false);
                }
                *last = Some(today);
                Ok(true)
            })
            .await?;

        Ok(changed.then_some(record))
    }

    /// Serialized read-modify-write of one user's subscription.
    ///
    /// `f` returns whether it changed the record; unchanged records are not
    /// written. A missing record is created only when `create` is set.
    async fn mutate<F>(&self, user: &UserId, create: bool, mut f: F) -> Result<(bool, SubscriptionRecord)>
    where
        F: FnMut(&mut SubscriptionRecord, DateTime<Utc>) -> Result<bool>,
    {
        let _guard = self.locks.lock(user).await;

        for attempt in 1..=self.retry.max_attempts {
            let now = self.clock.now();
            let (mut record, expected) = match self.store.load(user).await? {
                Some(v) => (v.value, Some(v.version)),
                None if create => (SubscriptionRecord::without_trial(user.clone(), now), None),
                None => return Err(SubscriptionError::NotFound(user.to_string())),
            };

            if !f(&mut record, now)? {
                return Ok((false, record));
            }

            match self.store.save(&record, expected).await {
                Ok(_) => return Ok((true, record)),
                Err(StoreError::Conflict { .. }) => {
                    debug!(user_id = %user, attempt, "Subscription version conflict, retrying");
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SubscriptionError::ConcurrencyConflict {
            user_id: user.to_string(),
            attempts: self.retry.max_attempts,
        })
    }
}

fn due_within(
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookahead: Duration,
    last_sent: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    end.is_some_and(|end| end > now && end <= now + lookahead) && last_sent != Some(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySubscriptionStore;
    use crate::types::PlanId;
    use chrono::TimeZone;
    use tutorug_core::ManualClock;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap()
    }

    fn setup() -> (SubscriptionLifecycle, Arc<ManualClock>, UserId) {
        let clock = Arc::new(ManualClock::new(t0()));
        let lifecycle = SubscriptionLifecycle::new(
            LifecycleConfig::default(),
            Arc::new(InMemorySubscriptionStore::new()),
            clock.clone(),
        );
        (lifecycle, clock, UserId::parse("learner-1").unwrap())
    }

    #[test]
    fn test_transition_table() {
        use SubscriptionStatus::*;
        assert!(validate_transition(Trial, Active).is_ok());
        assert!(validate_transition(Expired, Active).is_ok());
        assert!(validate_transition(Cancelled, Cancelled).is_ok());
        assert!(validate_transition(Trial, Cancelled).is_err());
        assert!(validate_transition(Expired, Cancelled).is_err());
        assert!(validate_transition(Expired, Trial).is_err());
    }

    #[test]
    fn test_periods_follow_calendar_months() {
        let at = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();

        let monthly = PlanId::Monthly.plan();
        assert_eq!(period_end(at(2025, 3, 10), monthly).unwrap(), at(2025, 4, 10));
        assert_eq!(period_end(at(2025, 1, 31), monthly).unwrap(), at(2025, 2, 28));
        assert_eq!(period_end(at(2024, 1, 31), monthly).unwrap(), at(2024, 2, 29));

        let annual = PlanId::Annual.plan();
        assert_eq!(period_end(at(2025, 2, 11), annual).unwrap(), at(2026, 2, 11));
        assert_eq!(period_end(at(2024, 2, 29), annual).unwrap(), at(2025, 2, 28));
    }

    #[tokio::test]
    async fn test_trial_grants_access_until_end() {
        let (lifecycle, clock, user) = setup();
        let record = lifecycle.start_trial(&user).await.unwrap();
        assert_eq!(record.trial_end_at, Some(t0() + Duration::days(7)));
        assert!(lifecycle.has_access(&user).await.unwrap());

        clock.advance(Duration::days(7));
        assert!(!lifecycle.has_access(&user).await.unwrap());
        // Not mutated by the read
        assert_eq!(
            lifecycle.get(&user).await.unwrap().unwrap().status,
            SubscriptionStatus::Trial
        );
    }

    #[tokio::test]
    async fn test_start_trial_is_idempotent() {
        let (lifecycle, clock, user) = setup();
        lifecycle.start_trial(&user).await.unwrap();
        clock.advance(Duration::days(2));
        let again = lifecycle.start_trial(&user).await.unwrap();
        assert_eq!(again.trial_end_at, Some(t0() + Duration::days(7)));
    }

    #[tokio::test]
    async fn test_early_renewal_extends_from_period_end() {
        let (lifecycle, clock, user) = setup();
        lifecycle.start_trial(&user).await.unwrap();

        // Paid on day 0 with a 20-day period end
        lifecycle
            .confirm_payment(&user, PlanId::Monthly.plan())
            .await
            .unwrap();
        let store = lifecycle.store().clone();
        let mut v = store.load(&user).await.unwrap().unwrap();
        v.value.period_end_at = Some(t0() + Duration::days(20));
        store.save(&v.value, Some(v.version)).await.unwrap();

        clock.advance(Duration::days(10));
        let renewed = lifecycle
            .confirm_payment(&user, PlanId::Monthly.plan())
            .await
            .unwrap();
        assert_eq!(renewed.period_end_at, Some(t0() + Duration::days(48)));
        assert_eq!(renewed.period_start_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_expired_resubscribe_starts_fresh() {
        let (lifecycle, clock, user) = setup();
        lifecycle.start_trial(&user).await.unwrap();
        clock.advance(Duration::days(8));
        lifecycle.expire_if_due(&user).await.unwrap().unwrap();

        let record = lifecycle
            .confirm_payment(&user, PlanId::Annual.plan())
            .await
            .unwrap();
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.period_start_at, Some(clock.now()));
        assert_eq!(record.period_end_at, Some(clock.now() + Duration::days(365)));
    }

    #[tokio::test]
    async fn test_cancel_keeps_access_until_period_end() {
        let (lifecycle, clock, user) = setup();
        lifecycle.start_trial(&user).await.unwrap();
        lifecycle
            .confirm_payment(&user, PlanId::Monthly.plan())
            .await
            .unwrap();

        let cancelled = lifecycle.cancel_subscription(&user).await.unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        // Feb 3 to Mar 3
        assert_eq!(cancelled.period_end_at, Some(t0() + Duration::days(28)));

        // Second cancel is a no-op
        let again = lifecycle.cancel_subscription(&user).await.unwrap();
        assert_eq!(again.cancelled_at, cancelled.cancelled_at);

        clock.advance(Duration::days(28) - Duration::seconds(1));
        assert!(lifecycle.has_access(&user).await.unwrap());
        clock.advance(Duration::seconds(1));
        assert!(!lifecycle.has_access(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_cannot_cancel_trial() {
        let (lifecycle, _clock, user) = setup();
        lifecycle.start_trial(&user).await.unwrap();
        let err = lifecycle.cancel_subscription(&user).await.unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::InvalidTransition {
                from: SubscriptionStatus::Trial,
                to: SubscriptionStatus::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn test_expire_if_due_is_idempotent() {
        let (lifecycle, clock, user) = setup();
        lifecycle.start_trial(&user).await.unwrap();

        assert!(lifecycle.expire_if_due(&user).await.unwrap().is_none());
        clock.advance(Duration::days(7) + Duration::seconds(1));
        assert!(lifecycle.expire_if_due(&user).await.unwrap().is_some());
        assert!(lifecycle.expire_if_due(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reminder_claimed_once_per_day() {
        let (lifecycle, clock, user) = setup();
        lifecycle.start_trial(&user).await.unwrap();
        let lookahead = Duration::days(3);

        // 7 days left: outside the window
        assert!(lifecycle
            .claim_reminder(&user, Reminder::TrialEnding, lookahead)
            .await
            .unwrap()
            .is_none());

        clock.advance(Duration::days(5));
        assert!(lifecycle
            .claim_reminder(&user, Reminder::TrialEnding, lookahead)
            .await
            .unwrap()
            .is_some());
        clock.advance(Duration::hours(2));
        assert!(lifecycle
            .claim_reminder(&user, Reminder::TrialEnding, lookahead)
            .await
            .unwrap()
            .is_none());

        clock.advance(Duration::days(1));
        assert!(lifecycle
            .claim_reminder(&user, Reminder::TrialEnding, lookahead)
            .await
            .unwrap()
            .is_some());

        // Not a renewal candidate
        assert!(lifecycle
            .claim_reminder(&user, Reminder::Renewal, lookahead)
            .await
            .unwrap()
            .is_none());
    }
}
