//! Shared fixtures for the service integration tests

#![allow(dead_code)]

use banking_service::{BankingService, BootstrapAdmin, Identity, Primitives, ServiceConfig};
use chrono::{DateTime, TimeZone, Utc};
use ledger_core::{Account, Ledger};
use security::{Argon2PasswordHasher, Clock, JwtTokenSigner, ManualClock, OtpProvider, TotpProvider};
use std::sync::Arc;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "Str0ng!pass";
pub const ROOT: &str = "root";

pub struct TestBank {
    pub service: BankingService,
    pub clock: Arc<ManualClock>,
    _temp: tempfile::TempDir,
}

/// Step-aligned start so TOTP windows are predictable
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub async fn test_bank() -> TestBank {
    let temp = tempfile::tempdir().unwrap();
    let mut config = ServiceConfig::new(temp.path(), SECRET);
    config.ledger.rocksdb.sync_writes = false;
    config.bootstrap = Some(BootstrapAdmin {
        username: ROOT.to_string(),
        password: PASSWORD.to_string(),
    });

    let clock = Arc::new(ManualClock::new(start_time()));
    let ledger = Ledger::open_with_clock(config.ledger.clone(), clock.clone())
        .await
        .unwrap();

    // Cheap Argon2 parameters keep the suite fast
    let primitives = Primitives {
        hasher: Arc::new(Argon2PasswordHasher::with_cost(1024, 1, 1).unwrap()),
        signer: Arc::new(JwtTokenSigner::new(SECRET.as_bytes(), config.auth.issuer.clone())),
        otp: Arc::new(TotpProvider::default()),
    };

    let service = BankingService::with_components(Arc::new(ledger), config, primitives).unwrap();
    service.bootstrap_superadmin().await.unwrap();

    TestBank {
        service,
        clock,
        _temp: temp,
    }
}

impl TestBank {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn signup(&self, username: &str) -> Account {
        self.service.create_account(username, PASSWORD).await.unwrap()
    }

    /// Log in with the fixture password and resolve the issued credential
    pub async fn login(&self, username: &str) -> Identity {
        let token = self
            .service
            .authenticate(username, PASSWORD, None, Some("10.0.0.1"))
            .await
            .unwrap();
        self.service.authorize(&token.access_token).unwrap()
    }

    pub async fn admin_login(&self, username: &str) -> Identity {
        let token = self
            .service
            .authenticate_admin(username, PASSWORD, None, Some("10.0.0.2"))
            .await
            .unwrap();
        self.service.authorize_admin(&token.access_token).unwrap()
    }

    pub async fn root(&self) -> Identity {
        self.admin_login(ROOT).await
    }

    /// Current one-time code for `secret`
    pub fn code(&self, secret: &str) -> String {
        TotpProvider::default().code_at(secret, self.now()).unwrap()
    }

    pub fn code_at(&self, secret: &str, at: DateTime<Utc>) -> String {
        TotpProvider::default().code_at(secret, at).unwrap()
    }
}
