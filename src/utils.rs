use std::time::{Duration, Instant};

/// Format a `Duration` as a human-readable string with automatic unit scaling.
///
/// Produces output like `1.94ms` or `2.34s` using Rust's Debug format.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Log a warning if the elapsed time since `start` exceeds `threshold`.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
    }
}

/// Clamp user-supplied pagination into `(page, per_page, offset)`.
///
/// `page` is capped so the offset cannot overflow; pages past the end are empty anyway.
pub fn paginate(page: Option<i64>, per_page: Option<i64>, default: i64, max: i64) -> (i64, i64, i64) {
    let max = max.max(1);
    let page = page.unwrap_or(1).clamp(1, i64::MAX / max);
    let per_page = per_page.unwrap_or(default).clamp(1, max);
    (page, per_page, (page - 1) * per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_clamps() {
        assert_eq!(paginate(None, None, 20, 50), (1, 20, 0));
        assert_eq!(paginate(Some(3), Some(10), 20, 50), (3, 10, 20));
        assert_eq!(paginate(Some(0), Some(500), 20, 50), (1, 50, 0));
        assert_eq!(paginate(Some(-4), Some(0), 20, 50), (1, 1, 0));
    }

    #[test]
    fn test_paginate_huge_page_does_not_overflow() {
        let (page, per_page, offset) = paginate(Some(i64::MAX), Some(50), 20, 50);
        assert_eq!(page, i64::MAX / 50);
        assert_eq!(per_page, 50);
        assert_eq!(offset, (i64::MAX / 50 - 1) * 50);

        let (_, _, offset) = paginate(Some(i64::MAX), Some(1), 20, 50);
        assert!(offset > 0);
    }
}
