//! First sign-in: contact details and the free trial

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use notify::{format_ug_phone, Contact, Notification};
use subscription::SubscriptionView;

use super::{auth_header, json_response, read_json};
use crate::server::{AppState, BoxBody};
use crate::types::{Result, TutorugError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    pub first_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl OnboardingRequest {
    fn into_contact(self) -> Result<Contact> {
        let first_name = self.first_name.trim().to_string();
        if first_name.is_empty() {
            return Err(TutorugError::InvalidInput("firstName is required".into()));
        }

        let phone = match self.phone.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                format_ug_phone(raw).map_err(|e| TutorugError::InvalidInput(e.to_string()))?,
            ),
            _ => None,
        };

        let email = match self.email.map(|e| e.trim().to_string()) {
            Some(e) if e.is_empty() => None,
            Some(e) if !e.contains('@') => {
                return Err(TutorugError::InvalidInput(format!("Invalid email: {}", e)))
            }
            other => other,
        };

        if phone.is_none() && email.is_none() {
            return Err(TutorugError::InvalidInput(
                "a phone number or email is required".into(),
            ));
        }

        Ok(Contact {
            first_name,
            phone,
            email,
        })
    }
}

/// POST /api/onboarding
///
/// Saves contact details and starts the trial. Repeating the call updates
/// the contact and leaves an existing subscription untouched.
pub async fn handle_onboarding(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    let contact = read_json::<OnboardingRequest>(req, state.args.max_body_bytes)
        .await?
        .into_contact()?;

    state.profiles.upsert_contact(&user, contact).await?;

    let lifecycle = state.billing.lifecycle();
    let is_new = lifecycle.get(&user).await?.is_none();
    let record = lifecycle.start_trial(&user).await?;

    if is_new {
        info!(user_id = %user, "New learner onboarded");
        state
            .notifier
            .notify(
                &user,
                Notification::Welcome {
                    trial_days: lifecycle.config().trial_days,
                },
            )
            .await;
    }

    let status = if is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok(json_response(
        status,
        &SubscriptionView::of(&record, lifecycle.now()),
    ))
}
