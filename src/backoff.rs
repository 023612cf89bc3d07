//! Exponential backoff policy for failed jobs.
//!
//! The delay before a failed job becomes eligible again is `base^attempts`
//! seconds, where `attempts` is the count after the failing attempt was
//! recorded. The first retry after one failure waits `base^1`.

use std::time::Duration;

/// Compute the backoff delay for a job that has failed `attempts` times.
///
/// Pure and deterministic. Degenerate bases are valid: `0^n = 0` and
/// `1^n = 1` for n > 0. Saturates instead of overflowing for large
/// exponents.
pub fn retry_delay(attempts: u32, base: u64) -> Duration {
    Duration::from_secs(base.saturating_pow(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        assert_eq!(retry_delay(1, 2), Duration::from_secs(2));
        assert_eq!(retry_delay(2, 2), Duration::from_secs(4));
        assert_eq!(retry_delay(3, 2), Duration::from_secs(8));
        assert_eq!(retry_delay(2, 3), Duration::from_secs(9));
    }

    #[test]
    fn delay_is_deterministic() {
        for attempts in 1..10 {
            assert_eq!(retry_delay(attempts, 2), retry_delay(attempts, 2));
        }
    }

    #[test]
    fn delay_is_monotone_for_base_above_one() {
        let mut prev = retry_delay(1, 2);
        for attempts in 2..20 {
            let next = retry_delay(attempts, 2);
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn degenerate_bases_do_not_panic() {
        assert_eq!(retry_delay(1, 0), Duration::from_secs(0));
        assert_eq!(retry_delay(5, 0), Duration::from_secs(0));
        assert_eq!(retry_delay(1, 1), Duration::from_secs(1));
        assert_eq!(retry_delay(9, 1), Duration::from_secs(1));
    }

    #[test]
    fn huge_exponents_saturate() {
        assert_eq!(retry_delay(u32::MAX, 2), Duration::from_secs(u64::MAX));
    }
}
