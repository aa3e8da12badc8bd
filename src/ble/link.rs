//! Per-device link lifecycle.
//!
//! ```text
//!   Idle / Disconnected
//!        │ advertisement match
//!        ▼
//!   MatchPending ──(scan cancel failed)──► back to Idle / Disconnected
//!        │ scan cancelled, connect issued
//!        ▼
//!   Connecting ──► ServiceDiscovery ──► CharacteristicDiscovery ──► Ready
//!        │                 │                      │                   │
//!        └─────────────────┴──────────────────────┴───────────────────┴──► Disconnected
//! ```

use core::fmt;

use crate::ble::{CharacteristicInfo, ConnHandle, PeerAddress, ServiceRange};
use crate::error::LinkFailure;

/// Connection state of one registered device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Registered, never attempted.
    Idle,
    /// Matched an advertisement; waiting for the scan to be cancelled.
    MatchPending,
    Connecting,
    ServiceDiscovery,
    CharacteristicDiscovery,
    /// Characteristic resolved; writes are accepted.
    Ready,
    /// The last attempt failed or the link dropped.
    Disconnected,
}

impl LinkState {
    /// Waiting for the next advertisement match.
    pub fn is_resting(self) -> bool {
        matches!(self, LinkState::Idle | LinkState::Disconnected)
    }

    /// Part of the single in-flight connect/discover pipeline.
    pub fn is_attempt_in_progress(self) -> bool {
        matches!(
            self,
            LinkState::MatchPending
                | LinkState::Connecting
                | LinkState::ServiceDiscovery
                | LinkState::CharacteristicDiscovery
        )
    }

    /// States in which a connection handle may be held.
    pub fn may_hold_link(self) -> bool {
        matches!(
            self,
            LinkState::Connecting
                | LinkState::ServiceDiscovery
                | LinkState::CharacteristicDiscovery
                | LinkState::Ready
        )
    }

    /// Whether `self → next` is a legal step of the lifecycle.
    pub fn can_transition_to(self, next: LinkState) -> bool {
        use LinkState::*;
        matches!(
            (self, next),
            (Idle | Disconnected, MatchPending)
                | (MatchPending, Connecting | Idle | Disconnected)
                | (Connecting, ServiceDiscovery)
                | (ServiceDiscovery, CharacteristicDiscovery)
                | (CharacteristicDiscovery, Ready)
                | (
                    Connecting | ServiceDiscovery | CharacteristicDiscovery | Ready,
                    Disconnected
                )
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Idle => "idle",
            LinkState::MatchPending => "match-pending",
            LinkState::Connecting => "connecting",
            LinkState::ServiceDiscovery => "service-discovery",
            LinkState::CharacteristicDiscovery => "characteristic-discovery",
            LinkState::Ready => "ready",
            LinkState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Runtime fields of a registered device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub(crate) state: LinkState,
    pub(crate) peer: Option<PeerAddress>,
    pub(crate) conn: Option<ConnHandle>,
    pub(crate) service: Option<ServiceRange>,
    pub(crate) characteristic: Option<CharacteristicInfo>,
    pub(crate) last_failure: Option<LinkFailure>,
    /// State to fall back to when a match is abandoned.
    resting: LinkState,
}

impl Link {
    pub const fn new() -> Self {
        Self {
            state: LinkState::Idle,
            peer: None,
            conn: None,
            service: None,
            characteristic: None,
            last_failure: None,
            resting: LinkState::Idle,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Address of the current, or most recent, peer.
    pub fn peer(&self) -> Option<PeerAddress> {
        self.peer
    }

    /// `None` is the "no active link" sentinel.
    pub fn conn(&self) -> Option<ConnHandle> {
        self.conn
    }

    pub fn service(&self) -> Option<ServiceRange> {
        self.service
    }

    pub fn characteristic(&self) -> Option<CharacteristicInfo> {
        self.characteristic
    }

    pub fn last_failure(&self) -> Option<LinkFailure> {
        self.last_failure
    }

    /// Move to `next` if the lifecycle allows it.
    ///
    /// Returns `false` (and leaves the link untouched) otherwise.
    pub(crate) fn advance(&mut self, next: LinkState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        if next == LinkState::MatchPending {
            self.resting = self.state;
        }
        self.state = next;
        if !next.may_hold_link() {
            self.conn = None;
        }
        true
    }

    /// Start an attempt towards `peer`.
    pub(crate) fn begin(&mut self, peer: PeerAddress) -> bool {
        if !self.advance(LinkState::MatchPending) {
            return false;
        }
        self.peer = Some(peer);
        true
    }

    /// Give up on a match before anything was sent to the peer.
    pub(crate) fn abandon(&mut self, failure: LinkFailure) {
        let resting = self.resting;
        if self.advance(resting) {
            self.last_failure = Some(failure);
        }
    }

    /// Record the new link and reset discovery results.
    pub(crate) fn establish(&mut self, conn: ConnHandle) -> bool {
        if !self.advance(LinkState::ServiceDiscovery) {
            return false;
        }
        self.conn = Some(conn);
        self.service = None;
        self.characteristic = None;
        true
    }

    /// End the attempt or the link.  Returns the handle that was held.
    pub(crate) fn fail(&mut self, failure: LinkFailure) -> Option<ConnHandle> {
        let conn = self.conn;
        if self.advance(LinkState::Disconnected) {
            self.last_failure = Some(failure);
        }
        conn
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}
