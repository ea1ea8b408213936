//! End-to-end account scenarios

mod common;

use banking_service::ServiceError;
use chrono::Duration;
use common::{test_bank, PASSWORD};
use ledger_core::TransactionKind;
use rust_decimal::Decimal;

#[tokio::test]
async fn test_deposit_into_empty_account() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let alice = bank.login("alice").await;

    let tx = bank
        .service
        .deposit(&alice, Decimal::new(10000, 2))
        .await
        .unwrap();
    assert_eq!(tx.kind, TransactionKind::Deposit);
    assert_eq!(tx.balance_after, Decimal::new(10000, 2));

    assert_eq!(bank.service.balance(&alice).unwrap(), Decimal::new(10000, 2));
    let history = bank.service.list_transactions(&alice, 100).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].description, "Deposit: $100.00");
}

#[tokio::test]
async fn test_withdraw_more_than_balance() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let alice = bank.login("alice").await;
    bank.service
        .deposit(&alice, Decimal::new(10000, 2))
        .await
        .unwrap();

    let result = bank.service.withdraw(&alice, Decimal::new(15000, 2)).await;
    assert!(matches!(
        result,
        Err(ServiceError::InsufficientFunds { available, requested })
            if available == Decimal::new(10000, 2) && requested == Decimal::new(15000, 2)
    ));

    assert_eq!(bank.service.balance(&alice).unwrap(), Decimal::new(10000, 2));
    assert_eq!(bank.service.list_transactions(&alice, 100).unwrap().len(), 1);
}

#[tokio::test]
async fn test_transfer_between_accounts() {
    let bank = test_bank().await;
    let a = bank.signup("alice").await;
    let b = bank.signup("bob").await;
    let alice = bank.login("alice").await;
    let bob = bank.login("bob").await;

    bank.service
        .deposit(&alice, Decimal::new(15000, 2))
        .await
        .unwrap();

    // Separators and case do not matter when addressing an account
    let target = b.account_number.replace('-', " ").to_lowercase();
    let receipt = bank
        .service
        .transfer(&alice, &target, Decimal::new(5000, 2))
        .await
        .unwrap();

    assert_eq!(bank.service.balance(&alice).unwrap(), Decimal::new(10000, 2));
    assert_eq!(bank.service.balance(&bob).unwrap(), Decimal::new(5000, 2));

    assert_eq!(receipt.sent.kind, TransactionKind::TransferSent);
    assert_eq!(receipt.sent.counterparty.as_deref(), Some(b.account_number.as_str()));
    assert_eq!(receipt.received.kind, TransactionKind::TransferReceived);
    assert_eq!(receipt.received.counterparty.as_deref(), Some(a.account_number.as_str()));

    let alice_history = bank.service.list_transactions(&alice, 100).unwrap();
    assert_eq!(alice_history[0].kind, TransactionKind::TransferSent);
    assert_eq!(alice_history[0].amount, Decimal::new(-5000, 2));

    let bob_history = bank.service.list_transactions(&bob, 100).unwrap();
    assert_eq!(bob_history.len(), 1);
    assert_eq!(bob_history[0].kind, TransactionKind::TransferReceived);

    let ledger = bank.service.ledger();
    assert!(ledger.check_balance_invariant("alice").unwrap());
    assert!(ledger.check_balance_invariant("bob").unwrap());
}

#[tokio::test]
async fn test_sixth_login_rejected_after_five_failures() {
    let bank = test_bank().await;
    bank.signup("xavier").await;

    for _ in 0..5 {
        let result = bank
            .service
            .authenticate("xavier", "Wr0ng!pass", None, Some("203.0.113.9"))
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidCredentials)));
    }

    // Correct password, still rejected before the password is checked
    let result = bank
        .service
        .authenticate("xavier", PASSWORD, None, Some("203.0.113.9"))
        .await;
    match result {
        Err(ServiceError::AccountLocked { until }) => {
            assert_eq!(until, bank.now() + Duration::minutes(5));
        }
        other => panic!("expected lock, got {:?}", other),
    }
}

#[tokio::test]
async fn test_enrollment_then_login_needs_code() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let alice = bank.login("alice").await;

    let enrollment = bank.service.begin_enrollment(&alice).unwrap();
    assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));

    // Pending secret is not persisted
    assert!(!bank.service.two_factor_status(&alice).unwrap());
    assert!(bank.service.me(&alice).unwrap().totp_secret.is_none());

    let code = bank.code(&enrollment.secret);
    bank.service
        .confirm_enrollment(&alice, &enrollment.secret, &code)
        .await
        .unwrap();
    assert_eq!(
        bank.service.me(&alice).unwrap().totp_secret.as_deref(),
        Some(enrollment.secret.as_str())
    );

    let result = bank.service.authenticate("alice", PASSWORD, None, None).await;
    assert!(matches!(result, Err(ServiceError::TwoFactorRequired)));

    let token = bank
        .service
        .authenticate("alice", PASSWORD, Some(&code), None)
        .await
        .unwrap();
    assert_eq!(bank.service.authorize(&token.access_token).unwrap(), alice);
}
