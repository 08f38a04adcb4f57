//! Subscription status and cancellation

use hyper::body::Incoming;
use hyper::{Request, Response};
use std::sync::Arc;

use subscription::SubscriptionView;

use super::{auth_header, ok};
use crate::server::{AppState, BoxBody};
use crate::types::Result;

/// GET /api/subscription
pub async fn handle_status(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    ok(&state.billing.subscription_status(&user).await?)
}

/// POST /api/subscription/cancel
///
/// Access continues until the end of the paid period.
pub async fn handle_cancel(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    let record = state.billing.cancel(&user).await?;
    ok(&SubscriptionView::of(&record, state.billing.lifecycle().now()))
}
