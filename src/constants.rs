//! Application constants for s3pipe
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Transfer engine configuration constants
pub mod transfer {
    use super::Duration;

    /// Default segment size for range requests (384 MiB)
    pub const DEFAULT_SEGMENT_SIZE: u64 = 384 * 1024 * 1024;

    /// Minimum accepted segment size (1 MiB)
    pub const MIN_SEGMENT_SIZE: u64 = 1024 * 1024;

    /// Per-fetch inactivity timeout: no bytes for this long fails the fetch
    pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(120);

    /// Interval at which the sequencer re-checks the fault tally while
    /// waiting on an in-flight fetch
    pub const SEQUENCER_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Host-memory tiers for auto-tuning, in bytes
    const TIER_SMALL: u64 = 128 * 1024 * 1024 * 1024;
    const TIER_MEDIUM: u64 = 384 * 1024 * 1024 * 1024;

    /// Concurrency cap and buffered-segment cap scaled to detected host
    /// memory. Returns `(max_in_flight, max_buffered)`.
    ///
    /// Hosts where detection fails (total reported as zero) get the
    /// conservative tier.
    pub fn auto_tune(total_memory_bytes: u64) -> (usize, usize) {
        match total_memory_bytes {
            0 => (3, 6),
            m if m <= TIER_SMALL => (7, 16),
            m if m <= TIER_MEDIUM => (15, 32),
            _ => (36, 72),
        }
    }

    /// Detect total host memory and derive `(max_in_flight, max_buffered)`.
    pub fn auto_tune_from_host() -> (usize, usize) {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        auto_tune(sys.total_memory())
    }
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("s3pipe/", env!("CARGO_PKG_VERSION"));

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host, sized for the largest
    /// concurrency tier so fetches never wait on the pool
    pub const POOL_MAX_PER_HOST: usize = 72;

    /// TCP keep-alive interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
}

/// Credential handling constants
pub mod auth {
    use super::Duration;

    /// Refresh the cached snapshot when less than this remains before expiry
    pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

    /// Region assumed when neither the environment nor the provider supplies one
    pub const DEFAULT_REGION: &str = "us-east-1";

    /// Service name used for request signing
    pub const SIGNING_SERVICE: &str = "s3";
}

/// File operation constants
pub mod files {
    /// Suffix (after the pid) for in-progress `cp` downloads
    pub const PARTIAL_FILE_SUFFIX: &str = "partial";
}

// Re-export commonly used constants for convenience
pub use auth::DEFAULT_REFRESH_MARGIN;
pub use http::USER_AGENT;
pub use transfer::{DEFAULT_SEGMENT_SIZE, DEFAULT_STALL_TIMEOUT};
