//! State store constants.

/// Key prefix under which lease cache records are stored.
pub const LEASE_KEY_PREFIX: &str = "/registry/leases/";
