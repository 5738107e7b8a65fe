//! Constants for the CORRAL API
//!
//! Defaults that are not part of a config struct live here so they are easy
//! to find and test.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// BACKGROUND SWEEP
// ============================================================================

/// How often stale cache entries and idle clients are swept.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Header carrying the number of seconds to wait after a denial.
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Minimum advertised retry delay in seconds.
pub const MIN_RETRY_AFTER_SECS: u64 = 1;
