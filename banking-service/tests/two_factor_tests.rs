//! Two-factor enrollment and code tolerance

mod common;

use banking_service::ServiceError;
use chrono::Duration;
use common::{test_bank, PASSWORD};

#[tokio::test]
async fn test_code_tolerance_window() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let alice = bank.login("alice").await;

    let enrollment = bank.service.begin_enrollment(&alice).unwrap();
    let secret = enrollment.secret;
    bank.service
        .confirm_enrollment(&alice, &secret, &bank.code(&secret))
        .await
        .unwrap();

    let now = bank.now();

    // One step either side is accepted
    for offset in [-30, 0, 30] {
        let code = bank.code_at(&secret, now + Duration::seconds(offset));
        bank.service
            .authenticate("alice", PASSWORD, Some(&code), None)
            .await
            .unwrap();
    }

    let stale = bank.code_at(&secret, now - Duration::seconds(60));
    let result = bank
        .service
        .authenticate("alice", PASSWORD, Some(&stale), None)
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidOtp)));
}

#[tokio::test]
async fn test_abandoned_enrollment_leaves_nothing() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let alice = bank.login("alice").await;

    let first = bank.service.begin_enrollment(&alice).unwrap();
    let second = bank.service.begin_enrollment(&alice).unwrap();
    assert_ne!(first.secret, second.secret);

    // Wrong code for the pending secret
    let valid: u32 = bank.code(&second.secret).parse().unwrap();
    let wrong = format!("{:06}", (valid + 500_000) % 1_000_000);
    let result = bank
        .service
        .confirm_enrollment(&alice, &second.secret, &wrong)
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidOtp)));
    assert!(!bank.service.two_factor_status(&alice).unwrap());

    // Logging in still needs no code
    bank.login("alice").await;
}

#[tokio::test]
async fn test_enrollment_state_transitions() {
    let bank = test_bank().await;
    bank.signup("alice").await;
    let alice = bank.login("alice").await;

    let result = bank.service.disable_two_factor(&alice, "123456").await;
    assert!(matches!(result, Err(ServiceError::NotEnabled)));

    let enrollment = bank.service.begin_enrollment(&alice).unwrap();
    let code = bank.code(&enrollment.secret);
    bank.service
        .confirm_enrollment(&alice, &enrollment.secret, &code)
        .await
        .unwrap();

    assert!(matches!(
        bank.service.begin_enrollment(&alice),
        Err(ServiceError::AlreadyEnabled)
    ));
    let result = bank
        .service
        .confirm_enrollment(&alice, &enrollment.secret, &code)
        .await;
    assert!(matches!(result, Err(ServiceError::AlreadyEnabled)));

    let stale = bank.code_at(&enrollment.secret, bank.now() - Duration::minutes(5));
    let result = bank.service.disable_two_factor(&alice, &stale).await;
    assert!(matches!(result, Err(ServiceError::InvalidOtp)));
    assert!(bank.service.two_factor_status(&alice).unwrap());

    bank.service.disable_two_factor(&alice, &code).await.unwrap();
    assert!(!bank.service.two_factor_status(&alice).unwrap());
    bank.login("alice").await;
}

#[tokio::test]
async fn test_admin_login_requires_enrolled_second_factor() {
    let bank = test_bank().await;
    let root = bank.root().await;

    let mut settings = bank.service.admin_settings(&root).unwrap();
    settings.require_admin_2fa = true;
    bank.service.admin_update_settings(&root, settings).unwrap();

    let result = bank
        .service
        .authenticate_admin("root", PASSWORD, None, None)
        .await;
    assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));

    // Enrollment goes through the user credential flow
    let token = bank
        .service
        .authenticate("root", PASSWORD, None, None)
        .await
        .unwrap();
    let identity = bank.service.authorize(&token.access_token).unwrap();
    let enrollment = bank.service.begin_enrollment(&identity).unwrap();
    let code = bank.code(&enrollment.secret);
    bank.service
        .confirm_enrollment(&identity, &enrollment.secret, &code)
        .await
        .unwrap();

    let token = bank
        .service
        .authenticate_admin("root", PASSWORD, Some(&code), None)
        .await
        .unwrap();
    assert!(bank.service.authorize_admin(&token.access_token).is_ok());
}
