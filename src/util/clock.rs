//! Monotonic clock helpers.

use std::time::{Duration, Instant};

/// Far enough in the future to mean "never" for any timer in this crate.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Returns `now + delay`, saturating instead of panicking on overflow.
#[must_use]
pub fn deadline_after(delay: Duration) -> Instant {
    deadline_from(Instant::now(), delay)
}

/// Returns `start + delay`, saturating instead of panicking on overflow.
#[must_use]
pub fn deadline_from(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_after_saturates() {
        let now = Instant::now();
        let deadline = deadline_from(now, Duration::MAX);
        assert!(deadline > now);
    }

    #[test]
    fn test_deadline_after_is_in_the_future() {
        let before = Instant::now();
        assert!(deadline_after(Duration::from_millis(10)) >= before + Duration::from_millis(10));
    }
}
