//! Authentication gate.
//!
//! Auth only guards entry to the review surfaces (listing, viewing,
//! uploading); it is not part of the conversion or review logic. A caller
//! that is not signed in gets [`ReviewError::NotAuthenticated`] carrying the
//! location to continue at once sign-in succeeds.

use crate::error::ReviewError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Environment variable holding the CLI's access token.
pub const AUTH_TOKEN_ENV: &str = "RESUME_REVIEW_TOKEN";

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    async fn sign_in(&self) -> Result<(), ReviewError>;

    async fn sign_out(&self) -> Result<(), ReviewError>;
}

/// Fail with `NotAuthenticated { next }` unless signed in.
pub fn require_auth(auth: &dyn AuthProvider, next: &str) -> Result<(), ReviewError> {
    if auth.is_authenticated() {
        Ok(())
    } else {
        debug!("Not authenticated, continue at {}", next);
        Err(ReviewError::NotAuthenticated {
            next: next.to_string(),
        })
    }
}

/// Authentication backed by a fixed token.
///
/// `sign_in` succeeds only when a non-empty token was supplied.
pub struct StaticAuth {
    token: Option<String>,
    signed_in: AtomicBool,
}

impl StaticAuth {
    /// Signed in from the start when `token` is present.
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        let signed_in = AtomicBool::new(token.is_some());
        Self { token, signed_in }
    }

    /// Read the token from [`AUTH_TOKEN_ENV`].
    pub fn from_env() -> Self {
        Self::new(std::env::var(AUTH_TOKEN_ENV).ok())
    }

    /// No token required; always signed in.
    pub fn open() -> Self {
        Self::new(Some("local".to_string()))
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    fn is_authenticated(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    async fn sign_in(&self) -> Result<(), ReviewError> {
        if self.token.is_none() {
            return Err(ReviewError::InvalidConfig(format!(
                "{AUTH_TOKEN_ENV} is not set; cannot sign in"
            )));
        }
        self.signed_in.store(true, Ordering::SeqCst);
        info!("Signed in");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ReviewError> {
        self.signed_in.store(false, Ordering::SeqCst);
        info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_follows_sign_in_state() {
        let auth = StaticAuth::new(Some("t0k3n".into()));
        assert!(require_auth(&auth, "/").is_ok());

        auth.sign_out().await.unwrap();
        match require_auth(&auth, "/resume/7") {
            Err(ReviewError::NotAuthenticated { next }) => assert_eq!(next, "/resume/7"),
            other => panic!("expected NotAuthenticated, got {other:?}"),
        }

        auth.sign_in().await.unwrap();
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn blank_token_cannot_sign_in() {
        let auth = StaticAuth::new(Some("  ".into()));
        assert!(!auth.is_authenticated());
        assert!(auth.sign_in().await.is_err());
    }
}
