mod common;

use std::sync::Arc;

use anyhow::Result;
use coopledger::application::AppError;
use coopledger::domain::Role;

use common::{PASSWORD, admin_session, member_session, naira, test_service};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;
    service.deposit(&session, naira(5000), None).await?;

    let service = Arc::new(service);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            service.withdraw(&session, naira(1000), None).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(service.dashboard(&session).await?.savings_balance, 0);
    assert_eq!(service.list_savings_transactions(&session).await?.len(), 6);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_approvals_credit_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;
    let applied = service.apply_for_loan(&session, naira(20000), None).await?;
    let id = applied.application.id;

    let service = Arc::new(service);
    let mut handles = Vec::new();
    for i in 0..6 {
        let service = Arc::clone(&service);
        let admin = admin.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service.approve_loan(&admin, id).await
            } else {
                service.reject_loan(&admin, id).await
            }
        }));
    }

    let mut decided = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => decided += 1,
            Err(AppError::LoanNotPending { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(decided, 1);

    let application = service.get_loan_application(id).await?;
    let expected = if application.status == coopledger::domain::LoanStatus::Approved {
        naira(20000)
    } else {
        0
    };
    assert_eq!(service.dashboard(&session).await?.loan_balance, expected);

    // Applied plus exactly one decision
    assert_eq!(service.list_loan_transactions(&session).await?.len(), 2);
    assert!(service.check_integrity(&admin).await?.is_healthy());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_deposits_with_same_key_apply_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let service = Arc::new(service);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            service
                .deposit(&session, naira(2500), Some("payday".into()))
                .await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    assert_eq!(service.dashboard(&session).await?.savings_balance, naira(2500));
    assert_eq!(service.list_savings_transactions(&session).await?.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_admin_bootstrap_creates_one_admin() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let service = Arc::new(service);
    let mut handles = Vec::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let email = format!("admin{}@coop.test", i);
            service
                .bootstrap_admin(&format!("Admin {}", i), &email, PASSWORD)
                .await
                .map(|member| member.email)
        }));
    }

    let mut created = Vec::new();
    for handle in handles {
        match handle.await? {
            Ok(email) => created.push(email),
            Err(AppError::AdminOnly) => {}
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(created.len(), 1);

    let admin = service.sign_in(&created[0], PASSWORD).await?;
    let members = service.list_members(&admin).await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, Role::Admin);

    // Refused bootstraps leave no usable credentials behind
    for i in 0..4 {
        let email = format!("admin{}@coop.test", i);
        if email != created[0] {
            let err = service.sign_in(&email, PASSWORD).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
        }
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_integrity_check_consistent_during_writes() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let admin = admin_session(&service).await?;
    let (_, session) = member_session(&service, "Ada Obi", "ada@coop.test").await?;

    let service = Arc::new(service);
    let writer = {
        let service = Arc::clone(&service);
        let session = session.clone();
        tokio::spawn(async move {
            for _ in 0..40 {
                service.deposit(&session, naira(100), None).await?;
                service.withdraw(&session, naira(50), None).await?;
            }
            Ok::<_, AppError>(())
        })
    };

    for _ in 0..20 {
        let report = service.check_integrity(&admin).await?;
        assert!(report.is_healthy(), "issues: {:?}", report.issues);
    }

    writer.await??;
    assert_eq!(service.dashboard(&session).await?.savings_balance, naira(2000));
    assert!(service.check_integrity(&admin).await?.is_healthy());

    Ok(())
}
