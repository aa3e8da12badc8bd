//! Gateway-wide constants and runtime configuration.
//!
//! Capacities and timing parameters live here so they can be tuned in
//! one place.  `GatewayConfig` carries the values that a deployment may
//! want to override at runtime; everything else is fixed at compile time.

// Registry

/// Maximum number of registered peripheral types.  Matches the number of
/// simultaneous links the host stack is configured for.
pub const MAX_DEVICES: usize = 3;

// Scanning

/// Budget of the initial discovery window (ms).
pub const SCAN_DURATION_MS: u32 = 30 * 1000;

/// Budget of an explicit rescan window (ms).
pub const RESCAN_DURATION_MS: u32 = 5 * 1000;

/// Longest advertisement payload accepted from the host (legacy PDU limit).
pub const MAX_ADV_DATA_LEN: usize = 31;

// Connections

/// Time the host is given to establish a link before reporting failure (ms).
pub const CONNECT_TIMEOUT_MS: u32 = 30 * 1000;

/// GAP device name set during bring-up.
pub const DEVICE_NAME: &str = "nimble-central";

// Event loop

/// Depth of the host → gateway event queue.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Queue slots advertisement reports may never take, so completions
/// still get through during a burst of reports.
pub const EVENT_QUEUE_RESERVED: usize = 4;

/// Runtime-tunable gateway parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Local GAP name announced by the host.
    pub device_name: &'static str,
    /// Initial discovery window; resumed scans only get what is left of it.
    pub scan_duration_ms: u32,
    /// Window opened by `Gateway::rescan`.
    pub rescan_duration_ms: u32,
    /// Connection establishment timeout handed to the host.
    pub connect_timeout_ms: u32,
}

impl GatewayConfig {
    pub const fn new() -> Self {
        Self {
            device_name: DEVICE_NAME,
            scan_duration_ms: SCAN_DURATION_MS,
            rescan_duration_ms: RESCAN_DURATION_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}
