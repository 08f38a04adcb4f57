//! Background jobs
//!
//! Periodic subscription maintenance. Each job owns one loop on the tokio
//! runtime and never exits; failures are logged and retried on the next
//! tick.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use reputation::ReputationEngine;
use subscription::SubscriptionSweeper;

/// Expire trials and paid periods that have run out, then release the
/// per-user locks nobody is holding.
pub fn spawn_subscription_sweep_task(
    sweeper: Arc<SubscriptionSweeper>,
    reputation: Arc<ReputationEngine>,
    interval: Duration,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            run_subscription_sweep(&sweeper, &reputation).await;
        }
    });

    info!(
        interval_secs = interval.as_secs(),
        "Subscription sweep task started"
    );
}

/// One tick of the subscription sweep task.
pub async fn run_subscription_sweep(sweeper: &SubscriptionSweeper, reputation: &ReputationEngine) {
    match sweeper.sweep_expired().await {
        Ok(report) if report.updated > 0 || report.failed > 0 => info!(
            examined = report.examined,
            expired = report.updated,
            failed = report.failed,
            "Subscription sweep finished"
        ),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Subscription sweep failed"),
    }

    let pruned = reputation.locks().prune();
    if pruned > 0 {
        debug!(pruned, "Released idle reputation locks");
    }
}

/// Send trial-ending and renewal reminders.
pub fn spawn_reminder_task(sweeper: Arc<SubscriptionSweeper>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match sweeper.send_trial_reminders().await {
                Ok(report) => info!(
                    examined = report.examined,
                    sent = report.updated,
                    failed = report.failed,
                    "Trial reminders sent"
                ),
                Err(e) => error!(error = %e, "Trial reminder run failed"),
            }

            match sweeper.send_renewal_reminders().await {
                Ok(report) => info!(
                    examined = report.examined,
                    sent = report.updated,
                    failed = report.failed,
                    "Renewal reminders sent"
                ),
                Err(e) => error!(error = %e, "Renewal reminder run failed"),
            }
        }
    });

    info!(interval_secs = interval.as_secs(), "Reminder task started");
}
