//! Bounded polling policy.
//!
//! Address assignment on the provider side can take a while; the convergence
//! loop polls on a fixed interval and gives up after a bounded number of
//! attempts rather than hanging forever.

use std::time::Duration;

/// Bound for a polling loop: how many cycles to run and how long to pause
/// between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of polling cycles before giving up
    pub max_attempts: u32,
    /// Fixed pause between cycles
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 60 x 5s gives the provider five minutes to assign addresses
        Self {
            max_attempts: 60,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit bounds
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Create a policy with a custom attempt bound and the default delay
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.max_attempts > 0);
        assert!(policy.delay > Duration::ZERO);
    }

    #[test]
    fn with_max_attempts_keeps_default_delay() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, RetryPolicy::default().delay);
    }
}
