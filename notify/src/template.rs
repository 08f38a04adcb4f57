//! Notification catalogue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatcher::Contact;
use crate::email::EmailMessage;

const SITE: &str = "tutoruganda.com";

/// Every message the platform sends to learners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum Notification {
    Welcome {
        trial_days: i64,
    },
    TrialEnding {
        trial_end_at: DateTime<Utc>,
        days_left: i64,
    },
    SubscriptionConfirmed {
        plan_name: String,
        period_end_at: DateTime<Utc>,
    },
    RenewalReminder {
        period_end_at: DateTime<Utc>,
    },
    SubscriptionExpired,
    CancellationConfirmed {
        access_until: DateTime<Utc>,
    },
    AchievementUnlocked {
        title: String,
    },
}

fn long_date(at: &DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

impl Notification {
    /// Stable template identifier (used in logs and provider metadata).
    pub fn template_id(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::TrialEnding { .. } => "trial_ending",
            Self::SubscriptionConfirmed { .. } => "subscription_confirmed",
            Self::RenewalReminder { .. } => "renewal_reminder",
            Self::SubscriptionExpired => "subscription_expired",
            Self::CancellationConfirmed { .. } => "cancellation_confirmed",
            Self::AchievementUnlocked { .. } => "achievement_unlocked",
        }
    }

    pub fn sms_text(&self, contact: &Contact) -> String {
        let name = &contact.first_name;
        match self {
            Self::Welcome { trial_days } => format!(
                "Welcome to TutorUG, {name}! Your {trial_days}-day free trial starts now. \
                 Access Mathematics, Physics, Chemistry & more at {SITE}"
            ),
            Self::TrialEnding { trial_end_at, days_left } => format!(
                "Hi {name}, your TutorUG free trial ends in {days_left} day(s) on {}. \
                 Subscribe to keep learning: {SITE}/subscribe",
                long_date(trial_end_at)
            ),
            Self::SubscriptionConfirmed { plan_name, period_end_at } => format!(
                "Payment confirmed! Your {plan_name} is now active until {}. \
                 Thank you for choosing TutorUG!",
                long_date(period_end_at)
            ),
            Self::RenewalReminder { period_end_at } => format!(
                "Reminder: your TutorUG subscription expires on {}. \
                 Renew now to keep learning! {SITE}/subscribe",
                long_date(period_end_at)
            ),
            Self::SubscriptionExpired => format!(
                "Your TutorUG subscription has expired. Renew today to continue \
                 your learning journey! {SITE}/subscribe"
            ),
            Self::CancellationConfirmed { access_until } => format!(
                "Subscription cancelled. You'll have access until {}. \
                 You can resubscribe anytime at {SITE}",
                long_date(access_until)
            ),
            Self::AchievementUnlocked { title } => format!(
                "Congratulations {name}! You've earned: \"{title}\". Keep up the great work! #TutorUG"
            ),
        }
    }

    pub fn email(&self, contact: &Contact, to: &str) -> EmailMessage {
        let subject = match self {
            Self::Welcome { .. } => "Welcome to TutorUG".to_string(),
            Self::TrialEnding { days_left, .. } => {
                format!("Your TutorUG trial ends in {days_left} day(s)")
            }
            Self::SubscriptionConfirmed { .. } => "Your TutorUG subscription is active".to_string(),
            Self::RenewalReminder { .. } => "Your TutorUG subscription is about to expire".to_string(),
            Self::SubscriptionExpired => "Your TutorUG subscription has expired".to_string(),
            Self::CancellationConfirmed { .. } => "Subscription cancelled".to_string(),
            Self::AchievementUnlocked { title } => format!("Achievement unlocked: {title}"),
        };

        let text = format!(
            "Hello {},\n\n{}\n\nThe TutorUG team\n",
            contact.first_name,
            self.sms_text(contact)
        );

        EmailMessage {
            to: to.to_string(),
            subject,
            text,
        }
    }
}
