use anyhow::Context;
use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::normalize_email;

use super::{AuthSession, IdentityError, IdentityProvider};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Identity provider backed by the same SQLite database as the ledger.
/// Passwords are stored as argon2id PHC strings; sessions are opaque tokens.
pub struct LocalIdentityProvider {
    pool: SqlitePool,
}

impl LocalIdentityProvider {
    /// The `auth_*` tables must already exist (see `Repository::migrate`).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn open_session(&self, email: &str) -> Result<AuthSession, IdentityError> {
        let session = AuthSession {
            token: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO auth_sessions (token, email, created_at) VALUES (?, ?, ?)")
            .bind(&session.token)
            .bind(&session.email)
            .bind(session.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to open session")?;

        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let email = normalize_email(email);
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword(MIN_PASSWORD_LEN));
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .context("Password hashing task failed")??;

        let inserted = sqlx::query(
            "INSERT INTO auth_users (email, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(&email)
        .bind(&hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(IdentityError::EmailTaken(email));
            }
            Err(e) => return Err(anyhow::Error::from(e).context("Failed to store credentials").into()),
        }

        debug!(%email, "credentials registered");
        self.open_session(&email).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let email = normalize_email(email);

        let row = sqlx::query("SELECT password_hash FROM auth_users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch credentials")?;

        let Some(row) = row else {
            return Err(IdentityError::InvalidCredentials);
        };
        let stored: String = row.get("password_hash");

        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .context("Password verification task failed")??;

        if !valid {
            return Err(IdentityError::InvalidCredentials);
        }

        self.open_session(&email).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("Failed to end session")?;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let email = normalize_email(email);

        let known = sqlx::query("SELECT 1 FROM auth_users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up credentials")?
            .is_some();

        if !known {
            debug!(%email, "password reset requested for unknown email");
            return Ok(());
        }

        sqlx::query("INSERT INTO password_resets (token, email, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4().simple().to_string())
            .bind(&email)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to record password reset")?;

        info!(%email, "password reset requested");
        Ok(())
    }

    async fn resolve(&self, token: &str) -> Result<AuthSession, IdentityError> {
        let row = sqlx::query("SELECT token, email, created_at FROM auth_sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch session")?;

        let Some(row) = row else {
            return Err(IdentityError::UnknownSession);
        };
        let created_at_str: String = row.get("created_at");

        Ok(AuthSession {
            token: row.get("token"),
            email: row.get("email"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid session timestamp")?
                .with_timezone(&Utc),
        })
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| anyhow::anyhow!("Stored password hash is malformed: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
