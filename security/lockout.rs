//! Brute-force lockout tiers
//!
//! Lock decisions are derived from the timestamps of recent failed logins:
//! - each tier counts failures in its own trailing window
//! - tiers are evaluated in order and the first match wins
//! - a tier may carry an exclusive upper bound so heavier tiers take over
//!
//! Default tiers:
//!
//! | window | fires when        | lock     |
//! |--------|-------------------|----------|
//! | 15 min | 5 <= n < 10       | 5 min    |
//! | 30 min | 10 <= n < 15      | 60 min   |
//! | 24 h   | n >= 15           | 1440 min |
//!
//! A failure at exactly `now - window` is outside the window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lock state of a username, derived lazily from `lock_until`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    /// No lock, or the lock has expired
    Unlocked,
    /// Locked until the given instant
    Locked {
        /// Lock expiry
        until: DateTime<Utc>,
    },
}

impl LockState {
    /// Interpret a stored lock timestamp at `now`
    pub fn at(lock_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match lock_until {
            Some(until) if until > now => LockState::Locked { until },
            _ => LockState::Unlocked,
        }
    }

    /// True while locked
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked { .. })
    }
}

/// One escalation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutTier {
    /// Trailing window failures are counted in
    pub window: Duration,

    /// Minimum failures in the window
    pub threshold: u32,

    /// Exclusive upper bound on failures in the window
    pub below: Option<u32>,

    /// Lock length once the tier fires
    pub lock_for: Duration,
}

impl LockoutTier {
    fn matches(&self, failures: u32) -> bool {
        failures >= self.threshold && self.below.map_or(true, |bound| failures < bound)
    }
}

/// A fired tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockDecision {
    /// Index of the tier that fired (0-based)
    pub tier: usize,

    /// Failures counted in that tier's window
    pub failures: u32,

    /// Lock length
    pub lock_for: Duration,

    /// Lock expiry
    pub until: DateTime<Utc>,
}

/// Ordered set of lockout tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutPolicy {
    tiers: Vec<LockoutTier>,
}

impl LockoutPolicy {
    /// Default tiers with a custom first tier threshold and lock length
    pub fn tiered(first_threshold: u32, first_lock_minutes: i64) -> Self {
        Self {
            tiers: vec![
                LockoutTier {
                    window: Duration::minutes(15),
                    threshold: first_threshold,
                    below: Some(10),
                    lock_for: Duration::minutes(first_lock_minutes),
                },
                LockoutTier {
                    window: Duration::minutes(30),
                    threshold: 10,
                    below: Some(15),
                    lock_for: Duration::minutes(60),
                },
                LockoutTier {
                    window: Duration::hours(24),
                    threshold: 15,
                    below: None,
                    lock_for: Duration::minutes(1440),
                },
            ],
        }
    }

    /// Tiers in evaluation order
    pub fn tiers(&self) -> &[LockoutTier] {
        &self.tiers
    }

    /// Longest window any tier looks at
    pub fn horizon(&self) -> Duration {
        self.tiers
            .iter()
            .map(|t| t.window)
            .max()
            .unwrap_or_else(Duration::zero)
    }

    /// Decide whether the failures seen so far lock the account
    pub fn evaluate(&self, now: DateTime<Utc>, failures: &[DateTime<Utc>]) -> Option<LockDecision> {
        self.tiers.iter().enumerate().find_map(|(index, tier)| {
            let count = count_within(failures, now, tier.window);
            tier.matches(count).then(|| LockDecision {
                tier: index,
                failures: count,
                lock_for: tier.lock_for,
                until: now + tier.lock_for,
            })
        })
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::tiered(5, 5)
    }
}

/// Number of timestamps in `(now - window, now]`
pub fn count_within(timestamps: &[DateTime<Utc>], now: DateTime<Utc>, window: Duration) -> u32 {
    let cutoff = now - window;
    timestamps
        .iter()
        .filter(|&&ts| ts > cutoff && ts <= now)
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failures_minutes_ago(now: DateTime<Utc>, minutes: &[i64]) -> Vec<DateTime<Utc>> {
        minutes.iter().map(|m| now - Duration::minutes(*m)).collect()
    }

    fn burst(now: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        (0..n).map(|i| now - Duration::seconds(i as i64 * 10)).collect()
    }

    #[test]
    fn test_first_tier_fires_at_exactly_five() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        assert_eq!(policy.evaluate(now, &burst(now, 4)), None);

        let decision = policy.evaluate(now, &burst(now, 5)).unwrap();
        assert_eq!(decision.tier, 0);
        assert_eq!(decision.failures, 5);
        assert_eq!(decision.until, now + Duration::minutes(5));
    }

    #[test]
    fn test_first_tier_upper_bound() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        assert_eq!(policy.evaluate(now, &burst(now, 9)).unwrap().tier, 0);

        // Ten in 15 minutes falls through to the 30 minute tier
        let decision = policy.evaluate(now, &burst(now, 10)).unwrap();
        assert_eq!(decision.tier, 1);
        assert_eq!(decision.lock_for, Duration::minutes(60));
    }

    #[test]
    fn test_second_tier_from_older_failures() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        // Three in the last 15 minutes, seven more between 16 and 29 minutes ago
        let failures = failures_minutes_ago(now, &[1, 2, 3, 16, 18, 20, 22, 24, 26, 29]);
        let decision = policy.evaluate(now, &failures).unwrap();
        assert_eq!(decision.tier, 1);
        assert_eq!(decision.failures, 10);

        let nine = failures_minutes_ago(now, &[1, 2, 3, 16, 18, 20, 22, 24, 26]);
        assert_eq!(policy.evaluate(now, &nine), None);
    }

    #[test]
    fn test_third_tier() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        assert_eq!(policy.evaluate(now, &burst(now, 14)).unwrap().tier, 1);

        let decision = policy.evaluate(now, &burst(now, 15)).unwrap();
        assert_eq!(decision.tier, 2);
        assert_eq!(decision.until, now + Duration::minutes(1440));

        // Fifteen spread over the day, never more than one per hour
        let spread: Vec<_> = (0..15).map(|h| now - Duration::hours(h) - Duration::minutes(1)).collect();
        let decision = policy.evaluate(now, &spread).unwrap();
        assert_eq!(decision.tier, 2);

        let fourteen: Vec<_> = spread[..14].to_vec();
        assert_eq!(policy.evaluate(now, &fourteen), None);
    }

    #[test]
    fn test_window_edge_is_exclusive() {
        let now = Utc::now();
        let ts = vec![now - Duration::minutes(15)];
        assert_eq!(count_within(&ts, now, Duration::minutes(15)), 0);

        let ts = vec![now - Duration::minutes(15) + Duration::seconds(1)];
        assert_eq!(count_within(&ts, now, Duration::minutes(15)), 1);
    }

    #[test]
    fn test_custom_first_tier() {
        let policy = LockoutPolicy::tiered(3, 20);
        let now = Utc::now();

        assert_eq!(policy.evaluate(now, &burst(now, 2)), None);
        let decision = policy.evaluate(now, &burst(now, 3)).unwrap();
        assert_eq!(decision.lock_for, Duration::minutes(20));
    }

    #[test]
    fn test_lock_state_expiry_is_lazy() {
        let now = Utc::now();
        assert_eq!(LockState::at(None, now), LockState::Unlocked);
        assert_eq!(LockState::at(Some(now - Duration::seconds(1)), now), LockState::Unlocked);
        assert_eq!(LockState::at(Some(now), now), LockState::Unlocked);

        let until = now + Duration::minutes(5);
        assert!(LockState::at(Some(until), now).is_locked());
    }

    #[test]
    fn test_horizon() {
        assert_eq!(LockoutPolicy::default().horizon(), Duration::hours(24));
    }

    proptest::proptest! {
        #[test]
        fn prop_no_lock_below_first_threshold(offsets in proptest::collection::vec(0i64..172_800, 0..5)) {
            let policy = LockoutPolicy::default();
            let now = Utc::now();
            let failures: Vec<_> = offsets.iter().map(|s| now - Duration::seconds(*s)).collect();
            proptest::prop_assert_eq!(policy.evaluate(now, &failures), None);
        }

        #[test]
        fn prop_lock_length_matches_tier(count in 5usize..40) {
            let policy = LockoutPolicy::default();
            let now = Utc::now();
            let decision = policy.evaluate(now, &burst(now, count)).unwrap();
            let expected = policy.tiers()[decision.tier].lock_for;
            proptest::prop_assert_eq!(decision.until - now, expected);
        }
    }
}
