//! Bluetooth Low Energy central subsystem.
//!
//! The gateway drives a host stack in **Central** role:
//!
//! 1. **Registry** - the table of peripheral types drivers registered.
//! 2. **Scanner** - bounded discovery windows and the policy that picks
//!    which advertisements are worth a connection attempt.
//! 3. **Central** - the per-device connect → service discovery →
//!    characteristic discovery state machine.
//! 4. **Dispatch** - the write path used by device drivers.
//!
//! The host stack itself sits behind [`BleHost`] (commands going out) and
//! [`HostEvent`] (completions coming back).  Requests that concern one
//! device carry its [`DeviceHandle`], and the host echoes it back in the
//! matching event so the state machine can correlate them.

pub mod adv_parser;
pub mod central;
pub mod dispatch;
pub mod link;
pub mod registry;
pub mod scanner;

#[cfg(test)]
pub(crate) mod mock;

use core::fmt;

use heapless::Vec;

use crate::config::MAX_ADV_DATA_LEN;
use crate::error::HostError;

pub use link::LinkState;
pub use registry::{DeviceConfig, DeviceHandle};

/// Link-layer address kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    Public,
    Random,
}

/// Link-layer address of a peer, bytes in over-the-air (little-endian) order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddress {
    pub kind: AddressKind,
    pub bytes: [u8; 6],
}

impl PeerAddress {
    pub const fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PeerAddress {
    fn format(&self, f: defmt::Formatter) {
        let b = &self.bytes;
        defmt::write!(
            f,
            "{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}",
            b[5],
            b[4],
            b[3],
            b[2],
            b[1],
            b[0]
        )
    }
}

/// Opaque identifier of an established link, assigned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute handle range of a discovered primary service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceRange {
    pub start: u16,
    pub end: u16,
}

/// A discovered characteristic declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicInfo {
    /// Handle of the declaration attribute.
    pub def_handle: u16,
    /// Handle of the value attribute (the write target).
    pub value_handle: u16,
    /// GATT property bits.
    pub properties: u8,
}

/// Advertising PDU type, as reported by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvKind {
    /// ADV_IND
    ConnectableUndirected,
    /// ADV_DIRECT_IND
    ConnectableDirected,
    /// ADV_SCAN_IND
    ScannableUndirected,
    /// ADV_NONCONN_IND
    NonConnectable,
    /// SCAN_RSP
    ScanResponse,
}

impl AdvKind {
    /// Whether the advertiser accepts connection requests.
    pub fn is_connectable(self) -> bool {
        matches!(
            self,
            AdvKind::ConnectableUndirected | AdvKind::ConnectableDirected
        )
    }
}

/// One advertisement report received during discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvReport {
    pub kind: AdvKind,
    pub addr: PeerAddress,
    /// Received Signal Strength Indicator (dBm). Not used for matching.
    pub rssi: i8,
    /// Raw AD structures.
    pub data: Vec<u8, MAX_ADV_DATA_LEN>,
}

/// Status carried by a GATT discovery completion.
///
/// Discovery procedures report once per attribute found (`Ok`), then a
/// final `Done`.  Anything else aborts the procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattStatus {
    Ok,
    Done,
    Failed(u16),
}

/// Parameters of a GAP discovery (scan) procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryParams {
    /// Window length; the host reports `DiscoveryComplete` when it elapses.
    pub duration_ms: u32,
    /// Passive scan: no scan requests sent to advertisers.
    pub passive: bool,
    /// Ask the controller to drop repeated reports from the same advertiser.
    pub filter_duplicates: bool,
}

/// Completions and unsolicited events posted by the host stack.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostEvent {
    /// Host and controller are synchronized; commands may be issued.
    Synced,
    /// The host reset itself and dropped all state.
    Reset { reason: i32 },
    /// An advertisement was received while scanning.
    Advertisement(AdvReport),
    /// A discovery window ended (elapsed, not cancelled).
    DiscoveryComplete { reason: i32 },
    /// A connection requested for `device` is up.
    Connected { device: DeviceHandle, conn: ConnHandle },
    /// A connection requested for `device` could not be established.
    ConnectFailed { device: DeviceHandle, status: i32 },
    /// The link of `device` went down.
    Disconnected {
        device: DeviceHandle,
        conn: ConnHandle,
        reason: i32,
    },
    /// Service discovery progress for `device`.
    ServiceDiscovered {
        device: DeviceHandle,
        conn: ConnHandle,
        status: GattStatus,
        service: Option<ServiceRange>,
    },
    /// Characteristic discovery progress for `device`.
    CharacteristicDiscovered {
        device: DeviceHandle,
        conn: ConnHandle,
        status: GattStatus,
        characteristic: Option<CharacteristicInfo>,
    },
    /// A write issued through `BleHost::write` finished.
    WriteComplete {
        conn: ConnHandle,
        attr_handle: u16,
        status: u16,
    },
    /// The ATT MTU of a link changed.
    MtuUpdated {
        conn: ConnHandle,
        channel: u16,
        mtu: u16,
    },
    /// Encryption was enabled or disabled on a link.
    EncryptionChanged { conn: ConnHandle, status: i32 },
    /// The peer sent a notification or indication.
    Notification {
        conn: ConnHandle,
        attr_handle: u16,
        indication: bool,
        len: u16,
    },
    /// An already-bonded peer asks to pair again.
    RepeatPairing { conn: ConnHandle },
}

/// Commands the gateway issues to the host stack.
///
/// Every method only queues the operation; the outcome arrives later as a
/// [`HostEvent`].  An `Err` means the host refused to start it.
pub trait BleHost {
    /// Bring up the controller and host task and set the GAP device name.
    fn init(&mut self, device_name: &str) -> Result<(), HostError>;

    /// Make sure an identity address is configured (public preferred).
    fn ensure_address(&mut self) -> Result<(), HostError>;

    fn start_discovery(&mut self, params: &DiscoveryParams) -> Result<(), HostError>;

    /// Stop the running discovery.  No `DiscoveryComplete` follows.
    fn cancel_discovery(&mut self) -> Result<(), HostError>;

    fn connect(
        &mut self,
        device: DeviceHandle,
        peer: &PeerAddress,
        timeout_ms: u32,
    ) -> Result<(), HostError>;

    /// Discover the primary service with the given 16-bit UUID.
    fn discover_service(
        &mut self,
        device: DeviceHandle,
        conn: ConnHandle,
        uuid: u16,
    ) -> Result<(), HostError>;

    /// Discover characteristics with the given 16-bit UUID inside `range`.
    fn discover_characteristic(
        &mut self,
        device: DeviceHandle,
        conn: ConnHandle,
        range: ServiceRange,
        uuid: u16,
    ) -> Result<(), HostError>;

    /// Write `payload` to the attribute at `value_handle`.
    fn write(&mut self, conn: ConnHandle, value_handle: u16, payload: &[u8])
        -> Result<(), HostError>;

    /// Tear a link down.
    fn terminate(&mut self, conn: ConnHandle) -> Result<(), HostError>;

    /// Delete the stored bond of the peer on `conn`.
    fn forget_peer(&mut self, conn: ConnHandle) -> Result<(), HostError>;
}
