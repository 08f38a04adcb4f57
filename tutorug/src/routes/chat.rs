//! AI tutor chat sessions
//!
//! Starting, reading and asking need an active trial or subscription.

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use tutor_agent::{SessionKind, TutorContext};

use super::{auth_header, json_response, ok, parse_query, read_json, read_optional_json};
use crate::server::{AppState, BoxBody};
use crate::types::Result;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    #[serde(default)]
    pub kind: SessionKind,
    pub title: Option<String>,
    #[serde(default)]
    pub context: TutorContext,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionRequest {
    pub rating: Option<u8>,
}

/// POST /api/chat/sessions
pub async fn handle_start(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authorize(auth_header(&req)).await?;
    let body: StartSessionRequest = read_json(req, state.args.max_body_bytes).await?;
    let session = state
        .tutor
        .start_session(&user, body.kind, body.title, body.context)
        .await?;
    Ok(json_response(StatusCode::CREATED, &session))
}

/// GET /api/chat/sessions?active=true
pub async fn handle_list(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authorize(auth_header(&req)).await?;
    let active_only = parse_query(req.uri(), "active", false)?;
    let sessions = state.tutor.sessions(&user, active_only).await?;
    ok(&serde_json::json!({ "sessions": sessions }))
}

/// GET /api/chat/sessions/{id}
pub async fn handle_history(
    req: Request<Incoming>,
    state: Arc<AppState>,
    session_id: &str,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authorize(auth_header(&req)).await?;
    ok(&state.tutor.history(&user, session_id).await?)
}

/// POST /api/chat/sessions/{id}/messages
pub async fn handle_ask(
    req: Request<Incoming>,
    state: Arc<AppState>,
    session_id: &str,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authorize(auth_header(&req)).await?;
    let body: AskRequest = read_json(req, state.args.max_body_bytes).await?;
    ok(&state.tutor.ask(&user, session_id, &body.message).await?)
}

/// POST /api/chat/sessions/{id}/end
///
/// Ending does not need an active subscription, so a learner whose access
/// lapsed can still close and rate a session.
pub async fn handle_end(
    req: Request<Incoming>,
    state: Arc<AppState>,
    session_id: &str,
) -> Result<Response<BoxBody>> {
    let user = state.gate.authenticate(auth_header(&req))?;
    let body: EndSessionRequest = read_optional_json(req, state.args.max_body_bytes).await?;
    ok(&state.tutor.end_session(&user, session_id, body.rating).await?)
}
