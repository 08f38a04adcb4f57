//! Subscription - trial, paid and cancelled access for TutorUG learners
//!
//! ```text
//! ┌────────────────┐   ┌───────────────────────┐   ┌────────────────────┐
//! │ BillingService │──▶│ SubscriptionLifecycle │◀──│ SubscriptionSweeper│
//! │ checkout,      │   │ state machine,        │   │ expiry, reminders  │
//! │ verify, webhook│   │ per-user locking      │   └────────────────────┘
//! └───────┬────────┘   └───────────┬───────────┘
//!         │                        │
//!         ▼                        ▼
//!   PaymentGateway         SubscriptionStore
//!   (Flutterwave)          (in-memory / MongoDB)
//! ```
//!
//! Access is always decided from timestamps; only the sweeper writes the
//! `expired` status.

pub mod billing;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod mock;
pub mod store;
pub mod sweep;
pub mod types;
pub mod webhook;

pub use billing::{BillingConfig, BillingService, PaymentInitiation, PaymentOutcome, WebhookOutcome};
pub use error::{Result, SubscriptionError};
pub use gateway::{
    Charge, ChargeRequest, Customer, FlutterwaveConfig, FlutterwaveGateway, GatewayError,
    PaymentGateway, Verification,
};
pub use lifecycle::{
    allowed_transitions, apply_payment, period_end, validate_transition, LifecycleConfig,
    Reminder, SubscriptionLifecycle,
};
pub use mock::MockGateway;
pub use store::{InMemorySubscriptionStore, SubscriptionStore};
pub use sweep::{SubscriptionSweeper, SweepConfig, SweepReport};
pub use types::{
    PaymentRecord, PaymentStatus, Plan, PlanId, SubscriptionRecord, SubscriptionStatus,
    SubscriptionView, PLANS,
};
pub use webhook::{sign, verify_signature, WebhookEvent, SIGNATURE_HEADERS};
