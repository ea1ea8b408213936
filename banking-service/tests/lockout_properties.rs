//! Property-based tests for the login pipeline's lockout behavior
//!
//! Random sequences of failed logins, successful logins and waits are played
//! against the service and against a small in-memory model built on the
//! same tier policy. Every response must agree with the model.

mod common;

use banking_service::ServiceError;
use chrono::{DateTime, Duration, Utc};
use common::{test_bank, PASSWORD};
use proptest::prelude::*;
use security::LockoutPolicy;

#[derive(Debug, Clone)]
enum Step {
    Fail,
    Login,
    Wait(i64),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => Just(Step::Fail),
        1 => Just(Step::Login),
        2 => (1i64..1_200).prop_map(Step::Wait),
    ]
}

/// Expected lock state of one username
struct Model {
    policy: LockoutPolicy,
    failures: Vec<DateTime<Utc>>,
    lock_until: Option<DateTime<Utc>>,
}

impl Model {
    fn locked(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lock_until.filter(|until| *until > now)
    }

    fn fail(&mut self, now: DateTime<Utc>) {
        self.failures.push(now);
        if let Some(decision) = self.policy.evaluate(now, &self.failures) {
            if self.lock_until.map_or(true, |current| current < decision.until) {
                self.lock_until = Some(decision.until);
            }
        }
    }

    fn succeed(&mut self) {
        self.failures.clear();
        self.lock_until = None;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: every login outcome matches the tier model
    #[test]
    fn prop_login_outcomes_follow_tiers(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let bank = test_bank().await;
            bank.signup("alice").await;

            let mut model = Model {
                policy: bank.service.ledger().settings().unwrap().lockout_policy(),
                failures: Vec::new(),
                lock_until: None,
            };

            for step in &steps {
                let now = bank.now();
                match step {
                    Step::Fail => {
                        let was_locked = model.locked(now).is_some();
                        let result = bank
                            .service
                            .authenticate("alice", "Wr0ng!pass", None, None)
                            .await;
                        model.fail(now);

                        match result {
                            Err(ServiceError::AccountLocked { until }) => {
                                prop_assert!(was_locked);
                                prop_assert_eq!(Some(until), model.lock_until);
                            }
                            Err(ServiceError::InvalidCredentials) => prop_assert!(!was_locked),
                            other => prop_assert!(false, "unexpected {:?}", other),
                        }
                    }
                    Step::Login => {
                        let result = bank.service.authenticate("alice", PASSWORD, None, None).await;
                        if model.locked(now).is_some() {
                            model.fail(now);
                            match result {
                                Err(ServiceError::AccountLocked { until }) => {
                                    prop_assert_eq!(Some(until), model.lock_until);
                                }
                                other => prop_assert!(false, "expected lock, got {:?}", other),
                            }
                        } else {
                            prop_assert!(result.is_ok(), "{:?}", result);
                            model.succeed();
                        }
                    }
                    Step::Wait(seconds) => bank.clock.advance(Duration::seconds(*seconds)),
                }

                // Keep attempts in distinct instants
                bank.clock.advance(Duration::seconds(1));

                let account = bank.service.ledger().account("alice").unwrap();
                let now = bank.now();
                prop_assert_eq!(account.lock_state(now).is_locked(), model.locked(now).is_some());
            }

            Ok(())
        })?;
    }
}
