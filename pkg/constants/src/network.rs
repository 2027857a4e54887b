//! Network-related constants.

/// Default port for the leasehold API server.
pub const DEFAULT_API_PORT: u16 = 7443;

/// Default API server address (HTTP).
pub const DEFAULT_API_ADDR: &str = "http://127.0.0.1:7443";

/// Header carrying the opaque requester identity on lease creation.
pub const REQUESTED_BY_HEADER: &str = "x-requested-by";

/// Header carrying the per-request id on API responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
