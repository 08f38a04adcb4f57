//! Plans, checkout, verification and the gateway webhook

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use subscription::{PlanId, SIGNATURE_HEADERS};

use super::{auth_header, json_response, ok, parse_query, read_body, read_json};
use crate::server::{AppState, BoxBody};
use crate::types::{Result, TutorugError};

/// Payment history page size cap
const MAX_HISTORY: usize = 100;

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub plan: String,
}

/// GET /api/payments/plans
pub fn handle_plans(state: Arc<AppState>) -> Result<Response<BoxBody>> {
    ok(&serde_json::json!({ "plans": state.billing.plans() }))
}

/// POST /api/payments/initiate
pub async fn handle_initiate(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    let body: InitiateRequest = read_json(req, state.args.max_body_bytes).await?;
    let plan: PlanId = body.plan.parse().map_err(TutorugError::InvalidInput)?;

    let initiation = state.billing.initiate_payment(&user, plan).await?;
    info!(user_id = %user, tx_ref = %initiation.tx_ref, plan = %plan, "Checkout started");
    Ok(json_response(StatusCode::CREATED, &initiation))
}

/// GET /api/payments/verify/{tx_ref}
///
/// Only the payer may verify; anyone else sees a 404.
pub async fn handle_verify(
    req: Request<Incoming>,
    state: Arc<AppState>,
    tx_ref: &str,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    state.billing.payment_for_user(&user, tx_ref).await?;
    ok(&state.billing.verify_payment(tx_ref).await?)
}

/// GET /api/payments/history?limit=
pub async fn handle_history(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    let limit = parse_query(req.uri(), "limit", 20usize)?.clamp(1, MAX_HISTORY);
    let payments = state.billing.payment_history(&user, limit).await?;
    ok(&serde_json::json!({ "payments": payments }))
}

/// POST /api/payments/webhook
///
/// Unauthenticated; the gateway signature is the credential.
pub async fn handle_webhook(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = read_body(req, state.args.max_body_bytes).await?;
    ok(&state
        .billing
        .handle_webhook(&body, signature.as_deref())
        .await?)
}
