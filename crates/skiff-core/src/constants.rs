//! Explicit limits and defaults for Skiff.
//!
//! All limits use big-endian naming (most significant first) and carry
//! their unit in the name.

// =============================================================================
// Heartbeat & Liveness
// =============================================================================

/// Default timeout before a connected agent with no heartbeat is marked
/// unhealthy (30 sec)
pub const HEARTBEAT_TIMEOUT_MS_DEFAULT: u64 = 30 * 1000;

/// Default interval between liveness sweeps over the registry (10 sec)
pub const SWEEP_INTERVAL_MS_DEFAULT: u64 = 10 * 1000;

/// Default interval between agent-side heartbeat frames (10 sec)
pub const HEARTBEAT_SEND_INTERVAL_MS_DEFAULT: u64 = 10 * 1000;

// =============================================================================
// Event Routing
// =============================================================================

/// Default maximum delivery attempts for a pending event
pub const EVENT_RETRY_COUNT_MAX_DEFAULT: u32 = 3;

/// Default interval between retry-worker ticks (30 sec)
pub const RETRY_INTERVAL_MS_DEFAULT: u64 = 30 * 1000;

/// Default event time-to-live in seconds (24 hours)
pub const EVENT_TTL_SECONDS_DEFAULT: u64 = 24 * 60 * 60;

// =============================================================================
// Connection Limits
// =============================================================================

/// Depth of the per-agent outbound send buffer
pub const SEND_BUFFER_DEPTH_MAX: usize = 100;

/// Maximum size of a single wire frame in bytes (1 MB)
pub const FRAME_SIZE_BYTES_MAX: usize = 1024 * 1024;

// =============================================================================
// Storage Limits
// =============================================================================

/// Relative TTL on persisted event status records (7 days)
pub const STATUS_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Maximum entries kept in one status record's execution log
pub const EXECUTION_LOG_ENTRIES_MAX: usize = 256;

// =============================================================================
// Shutdown
// =============================================================================

/// Deadline for draining the HTTP server on shutdown (10 sec)
pub const SHUTDOWN_DRAIN_MS_MAX: u64 = 10 * 1000;

// Compile-time assertions for constant validity
const _: () = {
    assert!(HEARTBEAT_TIMEOUT_MS_DEFAULT > SWEEP_INTERVAL_MS_DEFAULT);
    assert!(HEARTBEAT_TIMEOUT_MS_DEFAULT > HEARTBEAT_SEND_INTERVAL_MS_DEFAULT);
    assert!(SEND_BUFFER_DEPTH_MAX >= 1);
    assert!(EVENT_RETRY_COUNT_MAX_DEFAULT >= 1);
    assert!(STATUS_TTL_SECONDS > EVENT_TTL_SECONDS_DEFAULT);
    assert!(EXECUTION_LOG_ENTRIES_MAX >= 16);
};
