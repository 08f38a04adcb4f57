//! Scheduled sweeps over all subscriptions.
//!
//! Each sweep lists candidates without locks, then re-checks and updates
//! every user under that user's lock through the lifecycle. Running a sweep
//! twice (or two copies at once) changes nothing the second time.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use notify::{Notification, NotificationSink};

use crate::error::Result;
use crate::lifecycle::{Reminder, SubscriptionLifecycle};
use crate::types::SubscriptionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// How far ahead of trial end reminders start
    pub trial_reminder_days: i64,
    /// How far ahead of period end renewal reminders start
    pub renewal_reminder_days: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            trial_reminder_days: 3,
            renewal_reminder_days: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub updated: usize,
    /// Per-user failures; the sweep continues past them
    pub failed: usize,
    /// Idle per-user locks released after the sweep
    pub locks_pruned: usize,
}

pub struct SubscriptionSweeper {
    lifecycle: Arc<SubscriptionLifecycle>,
    notifier: Arc<dyn NotificationSink>,
    config: SweepConfig,
}

impl SubscriptionSweeper {
    pub fn new(
        lifecycle: Arc<SubscriptionLifecycle>,
        notifier: Arc<dyn NotificationSink>,
        config: SweepConfig,
    ) -> Self {
        Self {
            lifecycle,
            notifier,
            config,
        }
    }

    /// Expire active/cancelled subscriptions past their period end and
    /// unpaid trials past their trial end.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let now = self.lifecycle.now();
        let candidates = self
            .lifecycle
            .store()
            .list_by_status(&[
                SubscriptionStatus::Trial,
                SubscriptionStatus::Active,
                SubscriptionStatus::Cancelled,
            ])
            .await?;

        let mut report = SweepReport::default();
        for record in candidates.iter().filter(|r| r.due_for_expiry(now)) {
            report.examined += 1;
            match self.lifecycle.expire_if_due(&record.user_id).await {
                Ok(Some(expired)) => {
                    report.updated += 1;
                    info!(user_id = %expired.user_id, "Subscription expired");
                    // Unpaid trials get the trial-ending reminders instead
                    if expired.ever_paid {
                        self.notifier
                            .notify(&expired.user_id, Notification::SubscriptionExpired)
                            .await;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(user_id = %record.user_id, error = %e, "Failed to expire subscription");
                }
            }
        }

        report.locks_pruned = self.lifecycle.locks().prune();

        if report.updated > 0 || report.failed > 0 {
            info!(
                expired = report.updated,
                failed = report.failed,
                "Subscription sweep complete"
            );
        }
        Ok(report)
    }

    /// Remind trial users whose trial ends within the lookahead, at most
    /// once per user per UTC day.
    pub async fn send_trial_reminders(&self) -> Result<SweepReport> {
        self.remind(
            SubscriptionStatus::Trial,
            Reminder::TrialEnding,
            Duration::days(self.config.trial_reminder_days),
        )
        .await
    }

    /// Remind active subscribers whose period ends within the lookahead.
    pub async fn send_renewal_reminders(&self) -> Result<SweepReport> {
        self.remind(
            SubscriptionStatus::Active,
            Reminder::Renewal,
            Duration::days(self.config.renewal_reminder_days),
        )
        .await
    }

    async fn remind(
        &self,
        status: SubscriptionStatus,
        kind: Reminder,
        lookahead: Duration,
    ) -> Result<SweepReport> {
        let now = self.lifecycle.now();
        let candidates = self.lifecycle.store().list_by_status(&[status]).await?;

        let mut report = SweepReport::default();
        for record in candidates {
            let end = match kind {
                Reminder::TrialEnding => record.trial_end_at,
                Reminder::Renewal => record.period_end_at,
            };
            if !end.is_some_and(|end| end > now && end <= now + lookahead) {
                continue;
            }
            report.examined += 1;

            let claimed = match self
                .lifecycle
                .claim_reminder(&record.user_id, kind, lookahead)
                .await
            {
                Ok(Some(claimed)) => claimed,
                Ok(None) => continue,
                Err(e) => {
                    report.failed += 1;
                    warn!(user_id = %record.user_id, error = %e, "Failed to claim reminder");
                    continue;
                }
            };

            let notification = match kind {
                Reminder::TrialEnding => {
                    let Some(trial_end_at) = claimed.trial_end_at else {
                        continue;
                    };
                    let secs = (trial_end_at - now).num_seconds();
                    Notification::TrialEnding {
                        trial_end_at,
                        days_left: (secs + 86_399) / 86_400,
                    }
                }
                Reminder::Renewal => {
                    let Some(period_end_at) = claimed.period_end_at else {
                        continue;
                    };
                    Notification::RenewalReminder { period_end_at }
                }
            };

            self.notifier.notify(&claimed.user_id, notification).await;
            report.updated += 1;
        }

        if report.updated > 0 {
            info!(kind = ?kind, sent = report.updated, "Reminders sent");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleConfig;
    use crate::store::InMemorySubscriptionStore;
    use crate::types::PlanId;
    use chrono::{DateTime, TimeZone, Utc};
    use notify::RecordingSink;
    use tutorug_core::{ManualClock, UserId};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 6, 0, 0).unwrap()
    }

    struct Fixture {
        lifecycle: Arc<SubscriptionLifecycle>,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
        sweeper: SubscriptionSweeper,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let lifecycle = Arc::new(SubscriptionLifecycle::new(
            LifecycleConfig::default(),
            Arc::new(InMemorySubscriptionStore::new()),
            clock.clone(),
        ));
        let sink = Arc::new(RecordingSink::new());
        let sweeper = SubscriptionSweeper::new(lifecycle.clone(), sink.clone(), SweepConfig::default());
        Fixture {
            lifecycle,
            clock,
            sink,
            sweeper,
        }
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_sweep_releases_idle_locks() {
        let f = fixture();
        for id in ["l1", "l2", "l3"] {
            f.lifecycle.start_trial(&user(id)).await.unwrap();
        }
        assert_eq!(f.lifecycle.locks().len(), 3);

        let report = f.sweeper.sweep_expired().await.unwrap();
        assert_eq!(report.locks_pruned, 3);
        assert!(f.lifecycle.locks().is_empty());
    }

    #[tokio::test]
    async fn test_paid_trial_survives_trial_end_sweep() {
        let f = fixture();
        let u = user("paid");
        f.lifecycle.start_trial(&u).await.unwrap();

        f.clock.advance(Duration::days(6));
        let active = f
            .lifecycle
            .confirm_payment(&u, PlanId::Monthly.plan())
            .await
            .unwrap();
        // May 7 to Jun 7
        assert_eq!(active.period_end_at, Some(t0() + Duration::days(37)));

        f.clock.advance(Duration::days(2));
        let report = f.sweeper.sweep_expired().await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(
            f.lifecycle.get(&u).await.unwrap().unwrap().status,
            SubscriptionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_sweep_expires_and_is_idempotent() {
        let f = fixture();
        let trial = user("trial");
        let cancelled = user("cancelled");
        f.lifecycle.start_trial(&trial).await.unwrap();
        f.lifecycle.start_trial(&cancelled).await.unwrap();
        f.lifecycle
            .confirm_payment(&cancelled, PlanId::Monthly.plan())
            .await
            .unwrap();
        f.lifecycle.cancel_subscription(&cancelled).await.unwrap();

        f.clock.advance(Duration::days(32));
        let first = f.sweeper.sweep_expired().await.unwrap();
        assert_eq!(first.updated, 2);
        let second = f.sweeper.sweep_expired().await.unwrap();
        assert_eq!(second.updated, 0);

        for u in [&trial, &cancelled] {
            assert_eq!(
                f.lifecycle.get(u).await.unwrap().unwrap().status,
                SubscriptionStatus::Expired
            );
        }
        // Only the former subscriber hears about it
        assert_eq!(f.sink.sent_to(&cancelled).await, vec![Notification::SubscriptionExpired]);
        assert!(f.sink.sent_to(&trial).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_expire_once() {
        let f = fixture();
        for i in 0..10 {
            f.lifecycle.start_trial(&user(&format!("u{i}"))).await.unwrap();
        }
        f.clock.advance(Duration::days(8));

        let (a, b) = tokio::join!(f.sweeper.sweep_expired(), f.sweeper.sweep_expired());
        assert_eq!(a.unwrap().updated + b.unwrap().updated, 10);
    }

    #[tokio::test]
    async fn test_trial_reminders_once_per_day() {
        let f = fixture();
        let u = user("reminded");
        f.lifecycle.start_trial(&u).await.unwrap();

        f.clock.advance(Duration::days(5));
        assert_eq!(f.sweeper.send_trial_reminders().await.unwrap().updated, 1);
        assert_eq!(f.sweeper.send_trial_reminders().await.unwrap().updated, 0);

        f.clock.advance(Duration::days(1));
        assert_eq!(f.sweeper.send_trial_reminders().await.unwrap().updated, 1);

        let sent = f.sink.sent_to(&u).await;
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], Notification::TrialEnding { days_left: 2, .. }));
        assert!(matches!(sent[1], Notification::TrialEnding { days_left: 1, .. }));
    }

    #[tokio::test]
    async fn test_renewal_reminder_for_active_only() {
        let f = fixture();
        let u = user("subscriber");
        f.lifecycle.start_trial(&u).await.unwrap();
        f.lifecycle
            .confirm_payment(&u, PlanId::Monthly.plan())
            .await
            .unwrap();

        f.clock.advance(Duration::days(28));
        assert_eq!(f.sweeper.send_renewal_reminders().await.unwrap().updated, 1);
        assert_eq!(f.sweeper.send_trial_reminders().await.unwrap().updated, 0);
        assert!(matches!(
            f.sink.sent_to(&u).await[0],
            Notification::RenewalReminder { .. }
        ));
    }
}
