//! JWT token handling
//!
//! Tokens are issued by the login service and carry the user id. They are
//! signed with HS256 using the shared `JWT_SECRET`.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use tutorug_core::UserId;

use crate::config::MIN_JWT_SECRET_LEN;
use crate::types::TutorugError;

/// Lifetime of tokens issued by the login service
pub const TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_seconds: i64,
}

impl JwtValidator {
    /// Returns an error if the secret is empty or too short.
    pub fn new(secret: &str, expiry_seconds: i64) -> Result<Self, TutorugError> {
        if secret.is_empty() {
            return Err(TutorugError::Config("JWT_SECRET is empty".into()));
        }
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(TutorugError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        })
    }

    /// Issue a token for `user`. Used by tooling and tests; production
    /// tokens come from the login service.
    pub fn generate_token(
        &self,
        user: &UserId,
        phone_number: Option<String>,
    ) -> Result<String, TutorugError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: user.to_string(),
            phone_number,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| TutorugError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify a token and return the user it names.
    pub fn verify_token(&self, token: &str) -> Result<UserId, TutorugError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(
            |err| {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Invalid token",
                };
                TutorugError::Unauthenticated(reason.into())
            },
        )?;

        UserId::parse(data.claims.user_id)
            .map_err(|e| TutorugError::Unauthenticated(format!("Invalid token subject: {}", e)))
    }
}

/// Extract token from an Authorization header of the form `Bearer <token>`.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new("test-secret-that-is-at-least-32-characters-long", 3600).unwrap()
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();
        let user = UserId::parse("user-123").unwrap();

        let token = validator
            .generate_token(&user, Some("+256700000001".into()))
            .unwrap();
        assert_eq!(validator.verify_token(&token).unwrap(), user);
    }

    #[test]
    fn test_invalid_token() {
        let err = test_validator().verify_token("invalid-token").unwrap_err();
        assert!(matches!(err, TutorugError::Unauthenticated(_)));
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtValidator::new("different-secret-that-is-at-least-32-characters", 3600)
            .unwrap();
        let token = test_validator()
            .generate_token(&UserId::parse("user-123").unwrap(), None)
            .unwrap();
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let validator =
            JwtValidator::new("test-secret-that-is-at-least-32-characters-long", -3600).unwrap();
        let token = validator
            .generate_token(&UserId::parse("user-123").unwrap(), None)
            .unwrap();
        let err = validator.verify_token(&token).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short", 3600).is_err());
        assert!(JwtValidator::new("", 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long", 3600).is_ok());
    }
}
