//! Compute provider constants.

/// Attempts made for retryable provider calls (restart, delete, log extraction).
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Fixed pause between retry attempts, in seconds.
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 5;

/// Regions offered by the local provider when none are configured.
pub const DEFAULT_LOCAL_REGIONS: &[&str] = &["local"];

/// Upper bound on the log archive returned by log extraction, in bytes.
pub const MAX_LOG_ARCHIVE_BYTES: usize = 8 * 1024 * 1024;
