//! GAP discovery scheduling and the "worth connecting to" policy.
//!
//! Scanning happens in bounded windows.  When a scan is cancelled to make
//! room for a connection attempt and later resumed, it only gets what is
//! left of the current window, so the total discovery time seen by the
//! caller never exceeds the window's budget.

use crate::ble::adv_parser::extract_local_name;
use crate::ble::registry::{DeviceHandle, Registry};
use crate::ble::{AdvReport, DiscoveryParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanState {
    Idle,
    Scanning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Window {
    started_ms: u64,
    budget_ms: u32,
}

impl Window {
    fn remaining_ms(&self, now_ms: u64) -> u32 {
        let elapsed = now_ms.saturating_sub(self.started_ms);
        u64::from(self.budget_ms).saturating_sub(elapsed) as u32
    }
}

pub struct ScanController {
    budget_ms: u32,
    state: ScanState,
    window: Option<Window>,
    initial_reported: bool,
}

impl ScanController {
    pub const fn new(budget_ms: u32) -> Self {
        Self {
            budget_ms,
            state: ScanState::Idle,
            window: None,
            initial_reported: false,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    /// Plan a discovery procedure.
    ///
    /// `initial` opens a fresh window with the full budget.  Otherwise the
    /// current window is resumed with whatever budget is left; `None` means
    /// nothing is left and no scan should be requested.
    pub fn start(&mut self, initial: bool, now_ms: u64) -> Option<DiscoveryParams> {
        if initial {
            return Some(self.open_window(self.budget_ms, now_ms));
        }
        let remaining = self.window.map_or(0, |w| w.remaining_ms(now_ms));
        if remaining == 0 {
            return None;
        }
        Some(params(remaining))
    }

    /// Open a new window of `budget_ms`, replacing the current one.
    pub fn open_window(&mut self, budget_ms: u32, now_ms: u64) -> DiscoveryParams {
        self.window = Some(Window {
            started_ms: now_ms,
            budget_ms,
        });
        params(budget_ms)
    }

    /// The host accepted the discovery request.
    pub fn on_started(&mut self) {
        self.state = ScanState::Scanning;
    }

    /// The host confirmed a cancel.
    pub fn on_cancelled(&mut self) {
        self.state = ScanState::Idle;
    }

    /// The window elapsed.
    pub fn on_discovery_complete(&mut self) {
        self.state = ScanState::Idle;
    }

    /// Whether the initial window has already been reported over.
    pub fn initial_reported(&self) -> bool {
        self.initial_reported
    }

    /// Returns `true` exactly once: the first time the initial window is
    /// known to be over (or known never to open).
    pub fn report_initial(&mut self) -> bool {
        if self.initial_reported {
            return false;
        }
        self.initial_reported = true;
        true
    }
}

fn params(duration_ms: u32) -> DiscoveryParams {
    DiscoveryParams {
        duration_ms,
        passive: true,
        filter_duplicates: true,
    }
}

/// Pick the registered device an advertisement should connect to.
///
/// Only connectable advertisements count, and of those only the local name
/// matters: signal strength and address type are ignored.
pub fn select(report: &AdvReport, registry: &Registry) -> Option<DeviceHandle> {
    if !report.kind.is_connectable() {
        return None;
    }
    let name = extract_local_name(&report.data)?;
    registry.find_match(name.name)
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
