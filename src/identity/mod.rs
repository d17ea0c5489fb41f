//! Authentication contract consumed by the ledger service.
//!
//! The identity provider only knows emails and credentials. Roles live on the
//! member row and are resolved by the service after sign-in.

mod local;

pub use local::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// An authenticated session handed out by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Session is not active")]
    UnknownSession,

    #[error("Identity backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register credentials and open a session for them.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError>;

    /// End a session. Ending an unknown or already ended session is not an error.
    async fn sign_out(&self, token: &str) -> Result<(), IdentityError>;

    /// Start a password reset. Succeeds for unknown emails too, so callers
    /// cannot probe which addresses are registered.
    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    /// Look up a live session by token.
    async fn resolve(&self, token: &str) -> Result<AuthSession, IdentityError>;
}
