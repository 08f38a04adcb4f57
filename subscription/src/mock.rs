//! Scriptable payment gateway for tests and dev mode.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

use crate::gateway::{Charge, ChargeRequest, GatewayError, PaymentGateway, Verification};

/// Gateway that approves every charge unless told otherwise.
#[derive(Default)]
pub struct MockGateway {
    charges: RwLock<HashMap<String, ChargeRequest>>,
    verdicts: RwLock<HashMap<String, Verification>>,
    fail_next_verify: RwLock<bool>,
    verify_calls: AtomicU32,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the verification result for `tx_ref`.
    pub async fn set_verification(&self, tx_ref: &str, verification: Verification) {
        self.verdicts
            .write()
            .await
            .insert(tx_ref.to_string(), verification);
    }

    /// Make the next `verify` call fail with a network error.
    pub async fn fail_next_verify(&self) {
        *self.fail_next_verify.write().await = true;
    }

    pub fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub async fn charge(&self, tx_ref: &str) -> Option<ChargeRequest> {
        self.charges.read().await.get(tx_ref).cloned()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn id(&self) -> &str {
        "mock"
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        self.charges
            .write()
            .await
            .insert(request.tx_ref.clone(), request.clone());
        Ok(Charge {
            tx_ref: request.tx_ref.clone(),
            payment_url: format!("https://checkout.example/pay/{}", request.tx_ref),
        })
    }

    async fn verify(&self, tx_ref: &str) -> Result<Verification, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut fail = self.fail_next_verify.write().await;
            if *fail {
                *fail = false;
                return Err(GatewayError::Network("simulated timeout".into()));
            }
        }

        if let Some(v) = self.verdicts.read().await.get(tx_ref) {
            return Ok(v.clone());
        }

        let charges = self.charges.read().await;
        let charge = charges
            .get(tx_ref)
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                message: format!("No transaction was found for {tx_ref}"),
            })?;
        Ok(Verification {
            succeeded: true,
            status: "successful".to_string(),
            amount: charge.amount as f64,
            currency: charge.currency.clone(),
            gateway_tx_id: Some(format!("mock-{tx_ref}")),
        })
    }
}
