use crate::config::GuardConfig;
use crate::domain::validation::cvv_valid;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::warn;

/// Checks a verification code for a card or token.
pub trait CodeVerifier: Send + Sync {
    fn verify(&self, key: &str, code: &str) -> bool;
}

/// Accepts any code of the right shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatVerifier;

impl CodeVerifier for FormatVerifier {
    fn verify(&self, _key: &str, code: &str) -> bool {
        cvv_valid(code)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct AttemptCounter {
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

/// Rate limit on verification-code attempts, keyed by token id or card number.
///
/// Failures accumulate per key. Reaching the threshold locks the key for the
/// configured duration; a success clears the counter.
pub struct VerificationGuard {
    verifier: Box<dyn CodeVerifier>,
    max_failures: u32,
    lockout: Duration,
    counters: Mutex<HashMap<String, AttemptCounter>>,
}

impl VerificationGuard {
    pub fn new(verifier: Box<dyn CodeVerifier>, config: &GuardConfig) -> Self {
        Self {
            verifier,
            max_failures: config.max_failed_attempts.max(1),
            lockout: Duration::seconds(config.lockout_secs as i64),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, key: &str, code: &str) -> Result<()> {
        self.check_at(key, code, Utc::now()).await
    }

    /// Same as [`VerificationGuard::check`] with an explicit clock reading.
    pub async fn check_at(&self, key: &str, code: &str, now: DateTime<Utc>) -> Result<()> {
        let mut counters = self.counters.lock().await;

        if let Some(counter) = counters.get(key)
            && let Some(until) = counter.locked_until
            && now < until
        {
            let remaining = (until - now).num_seconds().max(1);
            return Err(PaymentError::RateLimited(format!(
                "Too many failed attempts. Try again in {} seconds",
                remaining
            )));
        }

        if self.verifier.verify(key, code) {
            counters.remove(key);
            return Ok(());
        }

        let counter = counters.entry(key.to_string()).or_default();
        if counter.locked_until.is_some() {
            // lock expired: start a fresh window
            *counter = AttemptCounter::default();
        }
        counter.failures += 1;

        if counter.failures >= self.max_failures {
            counter.locked_until = Some(now + self.lockout);
            warn!(failures = counter.failures, "verification locked after repeated failures");
            return Err(PaymentError::RateLimited(format!(
                "Too many failed attempts. Locked for {}",
                lockout_label(self.lockout)
            )));
        }

        Err(PaymentError::ValidationError(format!(
            "Invalid CVV. {} attempts remaining",
            self.max_failures - counter.failures
        )))
    }

    /// Failures recorded against `key` in the current window.
    pub async fn failures(&self, key: &str) -> u32 {
        let counters = self.counters.lock().await;
        counters.get(key).map_or(0, |counter| counter.failures)
    }
}

/// Whole minutes when the lockout divides evenly, seconds otherwise.
fn lockout_label(lockout: Duration) -> String {
    let seconds = lockout.num_seconds().max(1);
    let (count, unit) = if seconds % 60 == 0 {
        (seconds / 60, "minute")
    } else {
        (seconds, "second")
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{} {}{}", count, unit, plural)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "4111111111111111";

    fn guard() -> VerificationGuard {
        VerificationGuard::new(Box::new(FormatVerifier), &GuardConfig::default())
    }

    #[tokio::test]
    async fn test_valid_code_passes() {
        let guard = guard();
        assert!(guard.check(KEY, "123").await.is_ok());
        assert_eq!(guard.failures(KEY).await, 0);
    }

    #[tokio::test]
    async fn test_failures_count_down() {
        let guard = guard();
        match guard.check(KEY, "1").await {
            Err(PaymentError::ValidationError(message)) => {
                assert_eq!(message, "Invalid CVV. 2 attempts remaining")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(guard.failures(KEY).await, 1);
    }

    #[tokio::test]
    async fn test_lock_after_three_failures() {
        let guard = guard();
        let start = Utc::now();
        for _ in 0..2 {
            assert!(matches!(
                guard.check_at(KEY, "x", start).await,
                Err(PaymentError::ValidationError(_))
            ));
        }
        assert!(matches!(
            guard.check_at(KEY, "x", start).await,
            Err(PaymentError::RateLimited(_))
        ));

        // A correct code is still refused while locked.
        let later = start + Duration::seconds(60);
        match guard.check_at(KEY, "123", later).await {
            Err(PaymentError::RateLimited(message)) => {
                assert_eq!(message, "Too many failed attempts. Try again in 240 seconds")
            }
            other => panic!("unexpected {:?}", other),
        }

        let expired = start + Duration::seconds(301);
        assert!(guard.check_at(KEY, "123", expired).await.is_ok());
        assert_eq!(guard.failures(KEY).await, 0);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let guard = guard();
        guard.check(KEY, "1").await.unwrap_err();
        guard.check(KEY, "1").await.unwrap_err();
        guard.check(KEY, "123").await.unwrap();
        assert_eq!(guard.failures(KEY).await, 0);

        // Two more failures do not lock since the window restarted.
        guard.check(KEY, "1").await.unwrap_err();
        assert!(matches!(
            guard.check(KEY, "1").await,
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let guard = guard();
        for _ in 0..3 {
            guard.check("token-a", "1").await.unwrap_err();
        }
        assert!(guard.check("token-b", "123").await.is_ok());
        assert!(matches!(
            guard.check("token-a", "123").await,
            Err(PaymentError::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_message_names_the_duration() {
        async fn lock_message(lockout_secs: u64) -> String {
            let config = GuardConfig {
                max_failed_attempts: 1,
                lockout_secs,
            };
            let guard = VerificationGuard::new(Box::new(FormatVerifier), &config);
            match guard.check(KEY, "x").await {
                Err(PaymentError::RateLimited(message)) => message,
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(lock_message(300).await, "Too many failed attempts. Locked for 5 minutes");
        assert_eq!(lock_message(60).await, "Too many failed attempts. Locked for 1 minute");
        assert_eq!(lock_message(90).await, "Too many failed attempts. Locked for 90 seconds");
        assert_eq!(lock_message(30).await, "Too many failed attempts. Locked for 30 seconds");
    }

    #[tokio::test]
    async fn test_failure_after_lock_expiry_starts_fresh_window() {
        let guard = guard();
        let start = Utc::now();
        for _ in 0..3 {
            guard.check_at(KEY, "x", start).await.unwrap_err();
        }
        let expired = start + Duration::seconds(400);
        assert!(matches!(
            guard.check_at(KEY, "x", expired).await,
            Err(PaymentError::ValidationError(_))
        ));
        assert_eq!(guard.failures(KEY).await, 1);
    }
}
