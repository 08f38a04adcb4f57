//! Billing - plan purchase, payment verification and webhooks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use notify::{ContactDirectory, Notification, NotificationSink};
use tutorug_core::{StoreError, UserId};

use crate::error::{Result, SubscriptionError};
use crate::gateway::{ChargeRequest, Customer, PaymentGateway, Verification};
use crate::lifecycle::SubscriptionLifecycle;
use crate::types::{
    PaymentRecord, PaymentStatus, Plan, PlanId, SubscriptionRecord, SubscriptionView, PLANS,
};
use crate::webhook::{verify_signature, WebhookEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Shared secret for webhook signatures; webhooks are refused without it
    pub webhook_secret: Option<String>,
    /// Where the gateway sends the user after checkout
    pub redirect_url: String,
    /// Domain used for placeholder customer emails
    pub fallback_email_domain: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            redirect_url: "http://localhost:3000/payment/success".to_string(),
            fallback_email_domain: "tutorug.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    pub tx_ref: String,
    pub payment_url: String,
    pub plan: PlanId,
    pub amount: u64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Payment verified and the subscription activated or renewed
    Activated { subscription: SubscriptionRecord },
    /// Payment was already applied by an earlier verification
    AlreadyApplied { subscription: Option<SubscriptionRecord> },
    /// Gateway has not settled the charge yet; the payment stays pending
    Pending { status: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed { payment: PaymentOutcome },
    /// Authentic event we do not act on
    Ignored { event: String },
}

pub struct BillingService {
    lifecycle: Arc<SubscriptionLifecycle>,
    gateway: Arc<dyn PaymentGateway>,
    contacts: Arc<dyn ContactDirectory>,
    notifier: Arc<dyn NotificationSink>,
    config: BillingConfig,
}

impl BillingService {
    pub fn new(
        lifecycle: Arc<SubscriptionLifecycle>,
        gateway: Arc<dyn PaymentGateway>,
        contacts: Arc<dyn ContactDirectory>,
        notifier: Arc<dyn NotificationSink>,
        config: BillingConfig,
    ) -> Self {
        Self {
            lifecycle,
            gateway,
            contacts,
            notifier,
            config,
        }
    }

    pub fn lifecycle(&self) -> &Arc<SubscriptionLifecycle> {
        &self.lifecycle
    }

    pub fn plans(&self) -> &'static [Plan] {
        &PLANS
    }

    pub async fn subscription_status(&self, user: &UserId) -> Result<SubscriptionView> {
        self.lifecycle.view(user).await
    }

    /// Start a checkout for `plan`.
    ///
    /// Active subscribers may pay early; the renewal then extends from the
    /// current period end.
    ///
    /// The pending payment is recorded before the gateway is called so a
    /// webhook can never arrive for a reference we do not know.
    pub async fn initiate_payment(&self, user: &UserId, plan: PlanId) -> Result<PaymentInitiation> {
        let now = self.lifecycle.now();
        let plan = plan.plan();
        let contact = self
            .contacts
            .contact(user)
            .await
            .map_err(|e| SubscriptionError::InvalidInput(format!("contact lookup failed: {e}")))?
            .ok_or_else(|| SubscriptionError::InvalidInput(format!("no contact details for {user}")))?;

        let email = match (&contact.email, &contact.phone) {
            (Some(email), _) => email.clone(),
            (None, Some(phone)) => format!("{}@{}", phone, self.config.fallback_email_domain),
            (None, None) => {
                return Err(SubscriptionError::InvalidInput(
                    "a phone number or email is required to pay".into(),
                ))
            }
        };

        let tx_ref = format!("TUG-{}-{}", now.timestamp_millis(), user);
        let payment = PaymentRecord::pending(tx_ref.clone(), user.clone(), plan, now);
        self.lifecycle.store().insert_payment(&payment).await?;

        let request = ChargeRequest {
            tx_ref: tx_ref.clone(),
            amount: plan.amount,
            currency: plan.currency.to_string(),
            customer: Customer {
                email,
                phone: contact.phone.clone(),
                name: contact.first_name.clone(),
            },
            redirect_url: self.config.redirect_url.clone(),
            title: "TutorUG Subscription".to_string(),
            description: plan.name.to_string(),
        };

        let charge = match self.gateway.create_charge(&request).await {
            Ok(charge) => charge,
            Err(e) => {
                warn!(user_id = %user, tx_ref = %tx_ref, error = %e, "Payment initiation failed");
                if let Err(store_err) = self
                    .lifecycle
                    .store()
                    .fail_payment(&tx_ref, &format!("gateway error: {e}"))
                    .await
                {
                    warn!(tx_ref = %tx_ref, error = %store_err, "Failed to mark payment failed");
                }
                return Err(e.into());
            }
        };

        self.lifecycle
            .store()
            .set_payment_link(&tx_ref, &charge.payment_url)
            .await?;

        info!(
            user_id = %user,
            tx_ref = %tx_ref,
            plan = %plan.id,
            amount = plan.amount,
            gateway = self.gateway.id(),
            "Payment initiated"
        );

        Ok(PaymentInitiation {
            tx_ref,
            payment_url: charge.payment_url,
            plan: plan.id,
            amount: plan.amount,
            currency: plan.currency.to_string(),
        })
    }

    /// Verify a payment with the gateway and apply it.
    ///
    /// Gateway errors and unsettled charges leave the payment pending, so a
    /// later verification or the completion webhook can still apply it.
    pub async fn verify_payment(&self, tx_ref: &str) -> Result<PaymentOutcome> {
        let payment = self.find_payment(tx_ref).await?;

        match payment.status {
            PaymentStatus::Completed => return self.already_applied(&payment).await,
            PaymentStatus::Failed => {
                return Ok(PaymentOutcome::Failed {
                    reason: payment
                        .failure_reason
                        .unwrap_or_else(|| "payment failed".to_string()),
                })
            }
            PaymentStatus::Pending => {}
        }

        let verification = self.gateway.verify(tx_ref).await?;

        match assess(&verification, &payment) {
            Assessment::Settled => {}
            Assessment::Unsettled => {
                debug!(tx_ref, status = %verification.status, "Payment not settled yet");
                return Ok(PaymentOutcome::Pending {
                    status: verification.status,
                });
            }
            Assessment::Rejected(reason) => {
                match self.lifecycle.store().fail_payment(tx_ref, &reason).await {
                    Ok(()) => {}
                    // Completed concurrently by another verification
                    Err(StoreError::PreconditionFailed(_)) => {
                        return self.already_applied(&payment).await
                    }
                    Err(e) => return Err(e.into()),
                }
                warn!(tx_ref, user_id = %payment.user_id, reason = %reason, "Payment verification failed");
                return Ok(PaymentOutcome::Failed { reason });
            }
        }

        let subscription = match self
            .lifecycle
            .activate_with_payment(&payment, verification.gateway_tx_id.as_deref())
            .await
        {
            Ok(record) => record,
            Err(SubscriptionError::Store(StoreError::PreconditionFailed(_))) => {
                return self.already_applied(&payment).await
            }
            Err(e) => return Err(e),
        };

        if let Some(period_end_at) = subscription.period_end_at {
            self.notifier
                .notify(
                    &payment.user_id,
                    Notification::SubscriptionConfirmed {
                        plan_name: payment.plan.plan().name.to_string(),
                        period_end_at,
                    },
                )
                .await;
        }

        Ok(PaymentOutcome::Activated { subscription })
    }

    /// Authenticate and apply a gateway webhook.
    ///
    /// The signature is checked against the raw body before anything is
    /// parsed or any state is read.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SubscriptionError::WebhookNotConfigured)?;

        let signature = signature.ok_or(SubscriptionError::InvalidSignature)?;
        if !verify_signature(secret, body, signature) {
            warn!("Rejected webhook with invalid signature");
            return Err(SubscriptionError::InvalidSignature);
        }

        let event = WebhookEvent::parse(body)?;
        let Some(tx_ref) = event.completed_tx_ref() else {
            info!(event = %event.event, status = %event.data.status, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        };

        let payment = self.verify_payment(tx_ref).await?;
        Ok(WebhookOutcome::Processed { payment })
    }

    /// Cancel and send the confirmation.
    pub async fn cancel(&self, user: &UserId) -> Result<SubscriptionRecord> {
        let before = self.lifecycle.get(user).await?;
        let record = self.lifecycle.cancel_subscription(user).await?;

        let newly_cancelled = before.is_some_and(|b| b.cancelled_at != record.cancelled_at);
        if let (true, Some(access_until)) = (newly_cancelled, record.period_end_at) {
            self.notifier
                .notify(user, Notification::CancellationConfirmed { access_until })
                .await;
        }
        Ok(record)
    }

    pub async fn payment_history(&self, user: &UserId, limit: usize) -> Result<Vec<PaymentRecord>> {
        Ok(self.lifecycle.store().payments_for(user, limit).await?)
    }

    /// Payment lookup; only the owner may see it.
    pub async fn payment_for_user(&self, user: &UserId, tx_ref: &str) -> Result<PaymentRecord> {
        let payment = self.find_payment(tx_ref).await?;
        if &payment.user_id != user {
            return Err(SubscriptionError::PaymentNotFound(tx_ref.to_string()));
        }
        Ok(payment)
    }

    async fn find_payment(&self, tx_ref: &str) -> Result<PaymentRecord> {
        self.lifecycle
            .store()
            .find_payment(tx_ref)
            .await?
            .ok_or_else(|| SubscriptionError::PaymentNotFound(tx_ref.to_string()))
    }

    async fn already_applied(&self, payment: &PaymentRecord) -> Result<PaymentOutcome> {
        Ok(PaymentOutcome::AlreadyApplied {
            subscription: self.lifecycle.get(&payment.user_id).await?,
        })
    }
}

/// Gateway statuses after which a charge can never succeed.
const TERMINAL_FAILURES: [&str; 3] = ["failed", "cancelled", "error"];

enum Assessment {
    Settled,
    /// Still waiting on the payer, e.g. an unapproved mobile-money prompt
    Unsettled,
    Rejected(String),
}

fn assess(verification: &Verification, payment: &PaymentRecord) -> Assessment {
    if !verification.succeeded {
        let status = verification.status.to_ascii_lowercase();
        if TERMINAL_FAILURES.contains(&status.as_str()) {
            return Assessment::Rejected(format!("gateway status: {}", verification.status));
        }
        return Assessment::Unsettled;
    }
    if verification.currency != payment.currency {
        return Assessment::Rejected(format!(
            "currency mismatch: expected {}, got {}",
            payment.currency, verification.currency
        ));
    }
    if verification.amount < payment.amount as f64 {
        return Assessment::Rejected(format!(
            "amount mismatch: expected {}, got {}",
            payment.amount, verification.amount
        ));
    }
    Assessment::Settled
}
