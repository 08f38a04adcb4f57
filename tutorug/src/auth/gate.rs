//! Access control gate
//!
//! Every protected request passes through [`AccessGate`]: the bearer token
//! identifies the user, and paid features additionally need a trial or paid
//! period covering the current instant.

use std::sync::Arc;
use tracing::debug;

use subscription::SubscriptionLifecycle;
use tutorug_core::UserId;

use crate::auth::jwt::{extract_token_from_header, JwtValidator};
use crate::types::{Result, TutorugError};

pub struct AccessGate {
    jwt: JwtValidator,
    lifecycle: Arc<SubscriptionLifecycle>,
}

impl AccessGate {
    pub fn new(jwt: JwtValidator, lifecycle: Arc<SubscriptionLifecycle>) -> Self {
        Self { jwt, lifecycle }
    }

    pub fn jwt(&self) -> &JwtValidator {
        &self.jwt
    }

    /// Identify the caller from the Authorization header.
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<UserId> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| TutorugError::Unauthenticated("Missing bearer token".into()))?;
        self.jwt.verify_token(token)
    }

    /// Fail with `SubscriptionRequired` unless `user` has access now.
    pub async fn require_access(&self, user: &UserId) -> Result<()> {
        if self.lifecycle.has_access(user).await? {
            Ok(())
        } else {
            debug!(user_id = %user, "Access denied: no active trial or subscription");
            Err(TutorugError::SubscriptionRequired)
        }
    }

    /// Authenticate, then require access to paid features.
    pub async fn authorize(&self, auth_header: Option<&str>) -> Result<UserId> {
        let user = self.authenticate(auth_header)?;
        self.require_access(&user).await?;
        Ok(user)
    }
}

/// Fail with `Forbidden` unless `owner` is the caller.
pub fn require_owner(caller: &UserId, owner: &UserId, what: &str) -> Result<()> {
    if caller == owner {
        Ok(())
    } else {
        Err(TutorugError::Forbidden(format!("{} belongs to another user", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use subscription::{InMemorySubscriptionStore, LifecycleConfig};
    use tutorug_core::ManualClock;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    fn gate() -> (AccessGate, Arc<SubscriptionLifecycle>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap(),
        ));
        let lifecycle = Arc::new(SubscriptionLifecycle::new(
            LifecycleConfig::default(),
            Arc::new(InMemorySubscriptionStore::new()),
            clock.clone(),
        ));
        let gate = AccessGate::new(JwtValidator::new(SECRET, 3600).unwrap(), lifecycle.clone());
        (gate, lifecycle, clock)
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let (gate, _, _) = gate();
        let err = gate.authorize(None).await.unwrap_err();
        assert!(matches!(err, TutorugError::Unauthenticated(_)));

        let err = gate.authorize(Some("Bearer garbage")).await.unwrap_err();
        assert!(matches!(err, TutorugError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_trial_grants_access_until_it_ends() {
        let (gate, lifecycle, clock) = gate();
        let user = UserId::parse("student-1").unwrap();
        let header = format!("Bearer {}", gate.jwt().generate_token(&user, None).unwrap());

        let err = gate.authorize(Some(&header)).await.unwrap_err();
        assert!(matches!(err, TutorugError::SubscriptionRequired));

        lifecycle.start_trial(&user).await.unwrap();
        assert_eq!(gate.authorize(Some(&header)).await.unwrap(), user);

        clock.advance(Duration::days(7));
        let err = gate.authorize(Some(&header)).await.unwrap_err();
        assert!(matches!(err, TutorugError::SubscriptionRequired));
    }

    #[test]
    fn test_require_owner() {
        let a = UserId::parse("a").unwrap();
        let b = UserId::parse("b").unwrap();
        assert!(require_owner(&a, &a, "payment").is_ok());
        assert!(matches!(
            require_owner(&a, &b, "payment"),
            Err(TutorugError::Forbidden(_))
        ));
    }
}
