mod common;

use anyhow::Result;
use coopledger::application::{AppError, ErrorKind};
use coopledger::domain::Role;

use common::{PASSWORD, admin_session, member_session, test_service};

#[tokio::test]
async fn test_register_creates_member_with_zero_balances() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let member = service
        .register("  Ada Obi ", "Ada@Coop.Test", PASSWORD)
        .await?;
    assert_eq!(member.name, "Ada Obi");
    assert_eq!(member.email, "ada@coop.test");
    assert_eq!(member.role, Role::Member);
    assert_eq!(member.savings_balance, 0);
    assert_eq!(member.loan_balance, 0);

    // Sign-in is case-insensitive on the email
    let session = service.sign_in("ADA@coop.test", PASSWORD).await?;
    assert_eq!(session.member_id, member.id);
    assert!(!session.is_admin());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_email_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.register("Ada Obi", "ada@coop.test", PASSWORD).await?;

    let err = service
        .register("Another Ada", "ada@coop.test", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmailAlreadyRegistered(_)));

    Ok(())
}

#[tokio::test]
async fn test_registration_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service.register("", "ada@coop.test", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::MissingField("name")));

    let err = service.register("Ada", "   ", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::MissingField("email")));

    let err = service.register("Ada", "not-an-email", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidEmail(_)));

    let err = service.register("Ada", "ada@coop.test", "").await.unwrap_err();
    assert!(matches!(err, AppError::MissingField("password")));

    let err = service.register("Ada", "ada@coop.test", "abc").await.unwrap_err();
    assert!(matches!(err, AppError::WeakPassword(_)));
    assert_eq!(err.kind(), ErrorKind::Auth);

    // Nothing was created along the way
    service.register("Ada", "ada@coop.test", PASSWORD).await?;

    Ok(())
}

#[tokio::test]
async fn test_bad_credentials() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.register("Ada Obi", "ada@coop.test", PASSWORD).await?;

    let err = service.sign_in("ada@coop.test", "wrong-password").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    let err = service.sign_in("nobody@coop.test", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    Ok(())
}

#[tokio::test]
async fn test_sign_out_ends_session() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (member, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let resumed = service.resume(&session.token).await?;
    assert_eq!(resumed.member_id, member.id);

    service.sign_out(&session).await?;
    let err = service.resume(&session.token).await.unwrap_err();
    assert!(matches!(err, AppError::NotAuthenticated));

    // Signing out twice is harmless
    service.sign_out(&session).await?;

    Ok(())
}

#[tokio::test]
async fn test_password_reset_does_not_reveal_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.register("Ada Obi", "ada@coop.test", PASSWORD).await?;

    service.request_password_reset("ada@coop.test").await?;
    service.request_password_reset("nobody@coop.test").await?;

    let err = service.request_password_reset("").await.unwrap_err();
    assert!(matches!(err, AppError::MissingField("email")));

    Ok(())
}

#[tokio::test]
async fn test_bootstrap_admin_only_once() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let admin = admin_session(&service).await?;
    assert!(admin.is_admin());
    assert_eq!(admin.role, Role::Admin);

    let err = service
        .bootstrap_admin("Second", "second@coop.test", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AdminOnly));

    // The refused account was not created as a member either
    let err = service.sign_in("second@coop.test", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    Ok(())
}

#[tokio::test]
async fn test_admin_views_require_admin_role() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    assert!(matches!(
        service.list_members(&session).await.unwrap_err(),
        AppError::AdminOnly
    ));
    assert!(matches!(
        service.list_all_savings_transactions(&session).await.unwrap_err(),
        AppError::AdminOnly
    ));
    assert!(matches!(
        service.list_all_loan_transactions(&session).await.unwrap_err(),
        AppError::AdminOnly
    ));
    assert!(matches!(
        service.list_all_loan_applications(&session).await.unwrap_err(),
        AppError::AdminOnly
    ));
    assert!(matches!(
        service.check_integrity(&session).await.unwrap_err(),
        AppError::AdminOnly
    ));

    Ok(())
}
