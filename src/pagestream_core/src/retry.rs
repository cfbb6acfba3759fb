//! Retry cap for failed page fetches.
//!
//! There is no backoff timer. A failed page becomes eligible again only when
//! something requests it again, and only while it is under the cap. Eviction
//! drops the record and with it the failure count.

/// Caps how many times a single page is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a page with `failures` recorded failures may be fetched again.
    #[inline]
    pub fn allows(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }

    /// Whether `failures` has reached the cap.
    #[inline]
    pub fn is_exhausted(&self, failures: u32) -> bool {
        !self.allows(failures)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cap_is_three() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.allows(0));
        assert!(policy.allows(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(7));
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy::new(1);
        assert!(policy.allows(0));
        assert!(policy.is_exhausted(1));
    }
}
