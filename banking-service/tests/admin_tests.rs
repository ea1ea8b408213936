//! Admin oversight and role checks

mod common;

use banking_service::ServiceError;
use chrono::Duration;
use common::{test_bank, PASSWORD, ROOT};
use ledger_core::TransactionFilter;
use rust_decimal::Decimal;
use security::{Role, SecurityEventType};

#[tokio::test]
async fn test_user_credential_cannot_reach_admin() {
    let bank = test_bank().await;
    bank.signup("alice").await;

    let token = bank
        .service
        .authenticate("alice", PASSWORD, None, None)
        .await
        .unwrap();
    assert!(token.role.is_none());
    assert!(matches!(
        bank.service.authorize_admin(&token.access_token),
        Err(ServiceError::PermissionDenied(_))
    ));

    let result = bank
        .service
        .authenticate_admin("alice", PASSWORD, None, Some("192.0.2.1"))
        .await;
    assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));

    // A superadmin's user credential carries no admin rights either
    let token = bank.service.authenticate(ROOT, PASSWORD, None, None).await.unwrap();
    assert!(bank.service.authorize_admin(&token.access_token).is_err());

    let root = bank.root().await;
    let log = bank.service.admin_security_log(&root, 0, Some(100)).unwrap();
    assert!(log
        .items
        .iter()
        .any(|entry| entry.event.event_type == SecurityEventType::AdminLoginDenied));
}

#[tokio::test]
async fn test_admin_hierarchy() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let root = bank.root().await;

    let created = bank
        .service
        .admin_create_admin(&root, "operator", PASSWORD)
        .await
        .unwrap();
    assert_eq!(created.role, Role::Admin);
    bank.service
        .admin_create_admin(&root, "auditor", PASSWORD)
        .await
        .unwrap();

    let operator = bank.admin_login("operator").await;
    assert_eq!(operator.role(), Role::Admin);

    // Regular users are fair game
    bank.service
        .admin_lock_user(&operator, "alice", 10)
        .await
        .unwrap();

    // Peers and superadmins are not
    for target in ["auditor", ROOT] {
        let result = bank.service.admin_lock_user(&operator, target, 10).await;
        assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));
        let result = bank.service.admin_reset_password(&operator, target).await;
        assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));
    }

    // Superadmin-only operations
    let result = bank
        .service
        .admin_create_admin(&operator, "intruder", PASSWORD)
        .await;
    assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));
    assert!(bank.service.ledger().find_account("intruder").unwrap().is_none());

    let result = bank.service.admin_reset_test_data(&operator).await;
    assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));

    // Superadmin can manage admins
    bank.service
        .admin_lock_user(&root, "auditor", 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_password_reset_issues_working_temporary_password() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let root = bank.root().await;

    let temporary = bank
        .service
        .admin_reset_password(&root, "alice")
        .await
        .unwrap();
    assert_eq!(temporary.len(), bank.service.config().auth.temp_password_length);

    let result = bank.service.authenticate("alice", PASSWORD, None, None).await;
    assert!(matches!(result, Err(ServiceError::InvalidCredentials)));

    let token = bank
        .service
        .authenticate("alice", &temporary, None, None)
        .await
        .unwrap();
    let alice = bank.service.authorize(&token.access_token).unwrap();

    // The owner replaces it with their own
    bank.service
        .change_password(&alice, &temporary, "N3w!passw0rd")
        .await
        .unwrap();
    bank.service
        .authenticate("alice", "N3w!passw0rd", None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_transaction_review_and_dashboard() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let bob = bank.signup("bob").await;
    let alice = bank.login("alice").await;
    let root = bank.root().await;

    bank.service
        .deposit(&alice, Decimal::new(2_000_000, 2))
        .await
        .unwrap();
    let big = bank
        .service
        .transfer(&alice, &bob.account_number, Decimal::new(1_500_000, 2))
        .await
        .unwrap();
    bank.service
        .withdraw(&alice, Decimal::new(1000, 2))
        .await
        .unwrap();

    let all = bank
        .service
        .admin_list_transactions(&root, TransactionFilter::All, 0, None)
        .unwrap();
    assert_eq!(all.total, 4);

    let large = bank
        .service
        .admin_list_transactions(
            &root,
            TransactionFilter::LargeAmount(Decimal::new(10_000, 0)),
            0,
            None,
        )
        .unwrap();
    assert_eq!(large.total, 3);

    bank.service
        .admin_flag_transaction(&root, big.sent.id, true)
        .await
        .unwrap();
    let flagged = bank
        .service
        .admin_list_transactions(&root, TransactionFilter::Flagged, 0, None)
        .unwrap();
    assert_eq!(flagged.total, 1);
    assert_eq!(flagged.items[0].id, big.sent.id);

    bank.service
        .admin_flag_transaction(&root, big.sent.id, false)
        .await
        .unwrap();

    let result = bank.service.admin_list_transactions(
        &root,
        TransactionFilter::LargeAmount(Decimal::ZERO),
        0,
        None,
    );
    assert!(matches!(result, Err(ServiceError::Validation(_))));

    let stats = bank.service.admin_dashboard(&root).unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.transactions_today, 4);

    let detail = bank.service.admin_user_detail(&root, "alice").unwrap();
    assert_eq!(detail.summary.balance, Decimal::new(499_000, 2));
    assert_eq!(detail.last_login_source.as_deref(), Some("10.0.0.1"));
    assert_eq!(detail.recent_transactions.len(), 3);
}

#[tokio::test]
async fn test_user_listing_and_detail() {
    let bank = test_bank().await;
    for name in ["alice", "bob", "carol"] {
        bank.signup(name).await;
    }
    let root = bank.root().await;

    bank.service
        .authenticate("bob", "Wr0ng!pass", None, None)
        .await
        .unwrap_err();

    let page = bank.service.admin_list_users(&root, 0, Some(2)).unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 2);

    let page = bank.service.admin_list_users(&root, 1, Some(2)).unwrap();
    assert_eq!(page.items.len(), 2);

    let result = bank.service.admin_list_users(&root, 0, Some(1000));
    assert!(matches!(result, Err(ServiceError::Validation(_))));

    let detail = bank.service.admin_user_detail(&root, "bob").unwrap();
    assert_eq!(detail.failed_attempts_24h, 1);
    assert!(!detail.summary.is_locked);
    assert!(!detail.summary.two_factor_enabled);
}

#[tokio::test]
async fn test_security_log_purge_keeps_chain_verifiable() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let root = bank.root().await;

    bank.service
        .authenticate("alice", "Wr0ng!pass", None, None)
        .await
        .unwrap_err();
    bank.service
        .admin_lock_user(&root, "alice", 5)
        .await
        .unwrap();

    bank.clock.advance(Duration::days(40));
    let root = bank.root().await;

    let report = bank.service.admin_purge_logs(&root, None).unwrap();
    assert!(report.attempts_removed >= 1);
    assert!(report.log_entries_removed >= 3);

    assert!(bank.service.admin_verify_security_log(&root).unwrap() >= 1);

    let log = bank.service.admin_security_log(&root, 0, None).unwrap();
    assert_eq!(log.items[0].event.event_type, SecurityEventType::LogsPurged);
    assert!(log
        .items
        .iter()
        .all(|entry| entry.timestamp >= bank.now() - Duration::days(30)));

    let result = bank.service.admin_purge_logs(&root, Some(0));
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn test_reset_test_data() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let alice = bank.login("alice").await;
    let root = bank.root().await;

    bank.service
        .deposit(&alice, Decimal::new(5000, 2))
        .await
        .unwrap();

    let report = bank.service.admin_reset_test_data(&root).await.unwrap();
    assert_eq!(report.transactions_removed, 1);
    assert_eq!(report.accounts_reset, 1);

    assert_eq!(bank.service.balance(&alice).unwrap(), Decimal::ZERO);
    assert!(bank.service.list_transactions(&alice, 100).unwrap().is_empty());
    assert!(bank.service.ledger().check_balance_invariant("alice").unwrap());
}

#[tokio::test]
async fn test_credentials_expire() {
    let bank = test_bank().await;
    bank.signup("alice").await;

    let user = bank
        .service
        .authenticate("alice", PASSWORD, None, None)
        .await
        .unwrap();
    let admin = bank
        .service
        .authenticate_admin(ROOT, PASSWORD, None, None)
        .await
        .unwrap();
    assert_eq!(admin.role, Some(Role::SuperAdmin));
    assert_eq!(admin.expires_at, bank.now() + Duration::minutes(15));

    bank.clock.advance(Duration::minutes(16));
    assert!(matches!(
        bank.service.authorize_admin(&admin.access_token),
        Err(ServiceError::AuthenticationFailure)
    ));
    assert!(bank.service.authorize(&user.access_token).is_ok());

    bank.clock.advance(Duration::minutes(15));
    assert!(matches!(
        bank.service.authorize(&user.access_token),
        Err(ServiceError::AuthenticationFailure)
    ));

    assert!(matches!(
        bank.service.authorize("not-a-token"),
        Err(ServiceError::AuthenticationFailure)
    ));
}
