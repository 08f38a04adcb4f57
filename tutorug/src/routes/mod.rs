//! HTTP routes for TutorUG
//!
//! Handlers return [`Result`]; the server turns errors into JSON bodies with
//! the status from [`TutorugError::status_code`].

pub mod chat;
pub mod health;
pub mod onboarding;
pub mod payment;
pub mod reputation;
pub mod subscription;

pub use health::health_check;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Request, Response, StatusCode, Uri};
use serde::{de::DeserializeOwned, Serialize};

use crate::server::BoxBody;
use crate::types::{Result, TutorugError};

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn with_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, verif-hash"),
    );
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    with_cors(headers);
    response
}

pub fn ok<T: Serialize>(body: &T) -> Result<Response<BoxBody>> {
    Ok(json_response(StatusCode::OK, body))
}

pub fn error_response(err: &TutorugError) -> Response<BoxBody> {
    json_response(err.status_code(), &err.to_json())
}

pub fn cors_preflight() -> Response<BoxBody> {
    let mut response = Response::new(full_body(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    with_cors(headers);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

/// Bearer credentials, if any.
pub fn auth_header<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
}

/// Collect the request body, refusing anything over `limit` bytes.
pub async fn read_body(req: Request<Incoming>, limit: usize) -> Result<Bytes> {
    let collected = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                TutorugError::PayloadTooLarge(limit)
            } else {
                TutorugError::InvalidInput(format!("Failed to read body: {}", e))
            }
        })?;
    Ok(collected.to_bytes())
}

pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>, limit: usize) -> Result<T> {
    let body = read_body(req, limit).await?;
    serde_json::from_slice(&body)
        .map_err(|e| TutorugError::InvalidInput(format!("Invalid JSON: {}", e)))
}

/// Like [`read_json`], but an empty body yields `T::default()`.
pub async fn read_optional_json<T: DeserializeOwned + Default>(
    req: Request<Incoming>,
    limit: usize,
) -> Result<T> {
    let body = read_body(req, limit).await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&body)
        .map_err(|e| TutorugError::InvalidInput(format!("Invalid JSON: {}", e)))
}

/// Raw value of a query parameter. Values are not percent-decoded.
pub fn query_param<'a>(uri: &'a Uri, name: &str) -> Option<&'a str> {
    uri.query()?
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Parse an optional query parameter, falling back to `default`.
pub fn parse_query<T: std::str::FromStr>(uri: &Uri, name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match query_param(uri, name) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| TutorugError::InvalidInput(format!("Invalid {}: {}", name, e))),
    }
}
