//! Attachment size policy.

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Decides whether an attachment may be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    max_size: u64,
}

impl SizePolicy {
    /// Policy allowing attachments of at most `max_size` bytes.
    pub const fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    /// The configured limit in bytes.
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    /// `true` when `size` is strictly above the limit.
    pub const fn is_oversize(&self, size: u64) -> bool {
        size > self.max_size
    }

    /// Caller-facing explanation for a rejected attachment, e.g.
    /// `Attachment size exceeds limit (50.0MB > 10.0MB)`.
    pub fn oversize_reason(&self, size: u64) -> String {
        format!(
            "Attachment size exceeds limit ({} > {})",
            format_mb(size),
            format_mb(self.max_size)
        )
    }
}

/// Binary megabytes with one decimal place.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / BYTES_PER_MB)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_MB: u64 = 10 * 1024 * 1024;

    #[test]
    fn test_limit_is_inclusive() {
        let policy = SizePolicy::new(TEN_MB);
        assert!(!policy.is_oversize(0));
        assert!(!policy.is_oversize(TEN_MB));
        assert!(policy.is_oversize(TEN_MB + 1));
    }

    #[test]
    fn test_reason_mentions_both_sizes() {
        let policy = SizePolicy::new(TEN_MB);
        let reason = policy.oversize_reason(50 * 1024 * 1024);
        assert_eq!(reason, "Attachment size exceeds limit (50.0MB > 10.0MB)");
    }

    #[test]
    fn test_format_mb_rounds_to_one_decimal() {
        assert_eq!(format_mb(0), "0.0MB");
        assert_eq!(format_mb(1536 * 1024), "1.5MB");
        assert_eq!(format_mb(TEN_MB + 1), "10.0MB");
    }
}
