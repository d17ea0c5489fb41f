mod common;

use anyhow::Result;
use coopledger::application::AppError;
use coopledger::domain::{LoanAction, LoanStatus};
use uuid::Uuid;

use common::{admin_session, member_session, naira, test_service};

#[tokio::test]
async fn test_approved_loan_credits_member() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;
    let (member, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let applied = service.apply_for_loan(&session, naira(20000), None).await?;
    assert_eq!(applied.application.status, LoanStatus::Pending);
    assert_eq!(service.dashboard(&session).await?.loan_balance, 0);

    let decided = service
        .approve_loan(&admin, applied.application.id)
        .await?;
    assert_eq!(decided.application.status, LoanStatus::Approved);
    assert!(decided.application.decided_at.is_some());
    assert_eq!(decided.record.action, LoanAction::Approved);
    assert_eq!(decided.member.id, member.id);
    assert_eq!(decided.member.loan_balance, naira(20000));

    assert_eq!(service.dashboard(&session).await?.loan_balance, naira(20000));

    let records = service.list_loan_transactions(&session).await?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].action, LoanAction::Approved);
    assert_eq!(records[1].action, LoanAction::Applied);
    assert!(
        records
            .iter()
            .all(|r| r.application_id == Some(applied.application.id))
    );

    Ok(())
}

#[tokio::test]
async fn test_rejected_loan_leaves_balance_untouched() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let applied = service.apply_for_loan(&session, naira(10000), None).await?;
    let decided = service.reject_loan(&admin, applied.application.id).await?;

    assert_eq!(decided.application.status, LoanStatus::Rejected);
    assert_eq!(decided.record.action, LoanAction::Rejected);
    assert_eq!(decided.member.loan_balance, 0);

    let applications = service.list_loan_applications(&session).await?;
    assert_eq!(applications.len(), 1);
    assert_eq!(applications[0].status, LoanStatus::Rejected);

    Ok(())
}

#[tokio::test]
async fn test_decided_application_cannot_be_decided_again() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let applied = service.apply_for_loan(&session, naira(20000), None).await?;
    let id = applied.application.id;
    service.approve_loan(&admin, id).await?;

    let err = service.approve_loan(&admin, id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::LoanNotPending { status: LoanStatus::Approved, .. }
    ));

    let err = service.reject_loan(&admin, id).await.unwrap_err();
    assert!(matches!(err, AppError::LoanNotPending { .. }));

    // Credited exactly once, one decision record
    assert_eq!(service.dashboard(&session).await?.loan_balance, naira(20000));
    assert_eq!(service.list_loan_transactions(&session).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_members_cannot_decide_loans() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let applied = service.apply_for_loan(&session, naira(5000), None).await?;

    let err = service
        .approve_loan(&session, applied.application.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AdminOnly));

    let application = service.get_loan_application(applied.application.id).await?;
    assert_eq!(application.status, LoanStatus::Pending);
    assert_eq!(service.dashboard(&session).await?.loan_balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_unknown_application() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;

    let err = service
        .approve_loan(&admin, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LoanApplicationNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_loan_amount_must_be_positive() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let err = service.apply_for_loan(&session, 0, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));
    assert!(service.list_loan_applications(&session).await?.is_empty());
    assert!(service.list_loan_transactions(&session).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_loan_request_key_applies_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let first = service
        .apply_for_loan(&session, naira(15000), Some("loan-1".into()))
        .await?;
    let again = service
        .apply_for_loan(&session, naira(15000), Some("loan-1".into()))
        .await?;

    assert!(again.replayed);
    assert_eq!(first.application.id, again.application.id);
    assert_eq!(service.list_loan_applications(&session).await?.len(), 1);

    let err = service
        .apply_for_loan(&session, naira(99), Some("loan-1".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RequestKeyReused(_)));

    Ok(())
}

#[tokio::test]
async fn test_no_limit_relative_to_savings() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let applied = service
        .apply_for_loan(&session, naira(1_000_000), None)
        .await?;
    let decided = service.approve_loan(&admin, applied.application.id).await?;
    assert_eq!(decided.member.loan_balance, naira(1_000_000));
    assert_eq!(decided.member.savings_balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_approval_past_balance_limit_refused() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let large = service.apply_for_loan(&session, i64::MAX - 10, None).await?;
    let small = service.apply_for_loan(&session, 100, None).await?;
    service.approve_loan(&admin, large.application.id).await?;

    let err = service
        .approve_loan(&admin, small.application.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BalanceLimit { amount: 100, .. }));

    // Still pending, balance intact, and every member view still loads
    let application = service.get_loan_application(small.application.id).await?;
    assert_eq!(application.status, LoanStatus::Pending);
    assert_eq!(service.dashboard(&session).await?.loan_balance, i64::MAX - 10);
    assert_eq!(service.list_members(&admin).await?.len(), 2);
    assert!(service.check_integrity(&admin).await?.is_healthy());
    service.sign_in("ada@coop.test", common::PASSWORD).await?;

    // Rejecting it is still possible
    service.reject_loan(&admin, small.application.id).await?;

    Ok(())
}
