//! Lease engine constants: admission bounds, naming, expiry sweep.

/// How many candidate names the allocator tries before giving up.
pub const NAME_ALLOCATION_ATTEMPTS: usize = 5;

/// Number of decimal digits in a lease pin.
pub const PIN_LENGTH: usize = 4;

/// Width of the rolling window used by the creation rate limit, in seconds.
pub const RATE_WINDOW_SECS: u64 = 3600;

/// Default maximum number of concurrently live leases.
pub const DEFAULT_MAX_CONCURRENT_LEASES: u32 = 1;

/// Default maximum number of creations per rate window (0 = unlimited).
pub const DEFAULT_MAX_CREATIONS_PER_HOUR: u32 = 0;

/// Default base lifetime of a lease, in seconds (0 = leases never expire).
pub const DEFAULT_BASE_LIFETIME_SECS: u64 = 7200;

/// Default cap on the total extension a lease may be granted, in seconds.
pub const DEFAULT_MAX_EXTENSION_SECS: u64 = 7200;

/// Default interval between garbage collection sweeps, in seconds.
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 120;

/// Suffix of the log archive attached to deletion notifications.
pub const LOG_ARCHIVE_SUFFIX: &str = ".log.gz";
