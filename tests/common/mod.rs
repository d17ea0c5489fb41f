// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use coopledger::application::{LedgerService, Session};
use coopledger::domain::Member;
use tempfile::TempDir;

pub const PASSWORD: &str = "correct-horse";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Register a member and sign them in.
pub async fn member_session(
    service: &LedgerService,
    name: &str,
    email: &str,
) -> Result<(Member, Session)> {
    let member = service.register(name, email, PASSWORD).await?;
    let session = service.sign_in(email, PASSWORD).await?;
    Ok((member, session))
}

/// Seed the admin account and sign in as it.
pub async fn admin_session(service: &LedgerService) -> Result<Session> {
    service
        .bootstrap_admin("Treasurer", "treasurer@coop.test", PASSWORD)
        .await?;
    Ok(service.sign_in("treasurer@coop.test", PASSWORD).await?)
}

/// Naira to kobo.
pub fn naira(amount: i64) -> i64 {
    amount * 100
}
