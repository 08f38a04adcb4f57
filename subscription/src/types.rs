//! Subscription, plan and payment records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tutorug_core::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 4] = [Self::Trial, Self::Active, Self::Expired, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown subscription status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Monthly,
    Annual,
}

impl PlanId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }

    pub fn plan(&self) -> &'static Plan {
        match self {
            Self::Monthly => &PLANS[0],
            Self::Annual => &PLANS[1],
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "annual" => Ok(Self::Annual),
            other => Err(format!("unknown plan: {other}")),
        }
    }
}

/// A purchasable plan. Amounts are whole Uganda shillings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub name: &'static str,
    pub amount: u64,
    pub currency: &'static str,
    pub duration_months: u32,
    pub description: &'static str,
}

pub static PLANS: [Plan; 2] = [
    Plan {
        id: PlanId::Monthly,
        name: "Monthly Plan",
        amount: 25_000,
        currency: "UGX",
        duration_months: 1,
        description: "Full access for 1 month",
    },
    Plan {
        id: PlanId::Annual,
        name: "Annual Plan",
        amount: 250_000,
        currency: "UGX",
        duration_months: 12,
        description: "Full access for 12 months (2 months free!)",
    },
];

/// One subscription per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub user_id: UserId,
    pub status: SubscriptionStatus,
    /// `None` until a plan is bought
    pub plan: Option<PlanId>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub period_start_at: Option<DateTime<Utc>>,
    pub period_end_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Set by the first confirmed payment, never cleared
    pub ever_paid: bool,
    pub last_trial_reminder_on: Option<NaiveDate>,
    pub last_renewal_reminder_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn new_trial(user_id: UserId, now: DateTime<Utc>, trial_end_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: SubscriptionStatus::Trial,
            plan: None,
            trial_end_at: Some(trial_end_at),
            period_start_at: None,
            period_end_at: None,
            cancelled_at: None,
            ever_paid: false,
            last_trial_reminder_on: None,
            last_renewal_reminder_on: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record for a user who never had a trial (created by a first payment).
    pub fn without_trial(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            status: SubscriptionStatus::Expired,
            trial_end_at: None,
            ..Self::new_trial(user_id, now, now)
        }
    }

    /// The instant access ends for the stored status, if any.
    pub fn access_ends_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SubscriptionStatus::Trial => self.trial_end_at,
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled => self.period_end_at,
            SubscriptionStatus::Expired => None,
        }
    }

    /// Access check on timestamps; a stale status never grants access
    /// past its end instant.
    pub fn has_access_at(&self, now: DateTime<Utc>) -> bool {
        self.access_ends_at().is_some_and(|end| now < end)
    }

    /// Status as of `now`, treating a passed end instant as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        match self.status {
            SubscriptionStatus::Expired => SubscriptionStatus::Expired,
            status if self.has_access_at(now) => status,
            _ => SubscriptionStatus::Expired,
        }
    }

    /// Whether the sweep should flip this record to expired.
    pub fn due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled => {
                self.period_end_at.is_some_and(|end| end < now)
            }
            SubscriptionStatus::Trial => {
                !self.ever_paid && self.trial_end_at.is_some_and(|end| end < now)
            }
            SubscriptionStatus::Expired => false,
        }
    }
}

/// Read model returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub status: SubscriptionStatus,
    pub effective_status: SubscriptionStatus,
    pub plan: Option<PlanId>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub period_end_at: Option<DateTime<Utc>>,
    pub has_access: bool,
    /// Whole days of access left, rounded up
    pub days_remaining: i64,
}

impl SubscriptionView {
    pub fn of(record: &SubscriptionRecord, now: DateTime<Utc>) -> Self {
        let has_access = record.has_access_at(now);
        let days_remaining = match record.access_ends_at() {
            Some(end) if has_access => {
                let secs = (end - now).num_seconds();
                (secs + 86_399) / 86_400
            }
            _ => 0,
        };

        Self {
            status: record.status,
            effective_status: record.effective_status(now),
            plan: record.plan,
            trial_end_at: record.trial_end_at,
            period_end_at: record.period_end_at,
            has_access,
            days_remaining,
        }
    }

    /// View for a user with no subscription record.
    pub fn none() -> Self {
        Self {
            status: SubscriptionStatus::Expired,
            effective_status: SubscriptionStatus::Expired,
            plan: None,
            trial_end_at: None,
            period_end_at: None,
            has_access: false,
            days_remaining: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Our transaction reference, sent to the gateway
    pub tx_ref: String,
    pub user_id: UserId,
    pub plan: PlanId,
    pub amount: u64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Gateway-side transaction id, known after verification
    pub gateway_tx_id: Option<String>,
    pub payment_link: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn pending(tx_ref: String, user_id: UserId, plan: &Plan, now: DateTime<Utc>) -> Self {
        Self {
            tx_ref,
            user_id,
            plan: plan.id,
            amount: plan.amount,
            currency: plan.currency.to_string(),
            status: PaymentStatus::Pending,
            gateway_tx_id: None,
            payment_link: None,
            failure_reason: None,
            created_at: now,
            completed_at: None,
        }
    }
}
