//! Connection and GATT-discovery state machine.
//!
//! `Central` owns the registry, the scan controller and the host.  Every
//! host event goes through [`Central::handle`], one at a time.  Only one
//! device may be between "match" and "ready" at once: the scan is cancelled
//! before a connect is issued and resumed only once that attempt is over,
//! which serializes the connect → service → characteristic pipeline.
//!
//! Events are correlated by device handle and connection handle, and the
//! device's current state decides whether an event still applies.  A late
//! completion for an attempt that already ended is dropped.

use crate::ble::link::LinkState;
use crate::ble::registry::{DeviceConfig, DeviceHandle, Registry};
use crate::ble::scanner::{self, ScanController};
use crate::ble::{
    adv_parser, AdvReport, BleHost, CharacteristicInfo, ConnHandle, DiscoveryParams, GattStatus,
    HostEvent, PeerAddress, ServiceRange,
};
use crate::config::{GatewayConfig, MAX_DEVICES};
use crate::error::{HostError, LinkFailure, RegistrationError};
use heapless::Vec;

/// ATT error: Attribute Not Found.  Used when discovery ends without a match.
pub const ATT_ERR_ATTR_NOT_FOUND: u16 = 0x0A;

/// Work left for the caller once it has released the gateway state.
#[derive(Debug, Default)]
#[must_use]
pub struct Outcome {
    /// Driver hook of a device that just became ready.
    pub ready: Option<fn()>,
    /// Set once, when the initial discovery window is over (or could not
    /// be opened).
    pub initial_scan: Option<Result<(), HostError>>,
}

pub struct Central<H> {
    host: H,
    config: GatewayConfig,
    registry: Registry,
    scan: ScanController,
}

impl<H: BleHost> Central<H> {
    pub fn new(host: H, config: GatewayConfig) -> Self {
        Self {
            host,
            config,
            registry: Registry::new(),
            scan: ScanController::new(config.scan_duration_ms),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scanner(&self) -> &ScanController {
        &self.scan
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn register(&mut self, config: DeviceConfig) -> Result<DeviceHandle, RegistrationError> {
        self.registry.register(config)
    }

    /// Bring the host up under the configured GAP name.
    pub fn init(&mut self) -> Result<(), HostError> {
        info!("BLE host starting as '{}'", self.config.device_name);
        self.host.init(self.config.device_name)
    }

    /// Open a rescan window if the initial window is over, nothing is
    /// scanning or connecting and at least one device is waiting for a link.
    ///
    /// Returns whether a scan was requested.
    pub fn rescan(&mut self, now_ms: u64) -> Result<bool, HostError> {
        if !self.scan.initial_reported() {
            debug!("Rescan skipped: initial scan window still open");
            return Ok(false);
        }
        if self.scan.is_scanning() || self.registry.in_flight().is_some() {
            debug!("Rescan skipped: scan or connection attempt in progress");
            return Ok(false);
        }
        let waiting = self.registry.handles().any(|h| {
            self.registry
                .lookup(h)
                .is_some_and(|d| d.link().state().is_resting())
        });
        if !waiting {
            debug!("Rescan skipped: every device is linked");
            return Ok(false);
        }
        let params = self.scan.open_window(self.config.rescan_duration_ms, now_ms);
        self.request_discovery(&params)?;
        Ok(true)
    }

    pub fn handle(&mut self, event: HostEvent, now_ms: u64) -> Outcome {
        let mut outcome = Outcome::default();
        match event {
            HostEvent::Synced => self.on_sync(now_ms, &mut outcome),
            HostEvent::Reset { reason } => self.on_reset(reason),
            HostEvent::Advertisement(report) => self.on_advertisement(&report, now_ms, &mut outcome),
            HostEvent::DiscoveryComplete { reason } => {
                info!("Discovery complete; reason={}", reason);
                self.scan.on_discovery_complete();
                if self.scan.report_initial() {
                    outcome.initial_scan = Some(Ok(()));
                }
            }
            HostEvent::Connected { device, conn } => {
                self.on_connected(device, conn, now_ms, &mut outcome)
            }
            HostEvent::ConnectFailed { device, status } => {
                self.on_connect_failed(device, status, now_ms, &mut outcome)
            }
            HostEvent::Disconnected {
                device,
                conn,
                reason,
            } => self.on_disconnected(device, conn, reason, now_ms, &mut outcome),
            HostEvent::ServiceDiscovered {
                device,
                conn,
                status,
                service,
            } => self.on_service(device, conn, status, service, now_ms, &mut outcome),
            HostEvent::CharacteristicDiscovered {
                device,
                conn,
                status,
                characteristic,
            } => self.on_characteristic(device, conn, status, characteristic, now_ms, &mut outcome),
            HostEvent::WriteComplete {
                conn,
                attr_handle,
                status,
            } => {
                if status == 0 {
                    info!(
                        "Write complete; status={} conn_handle={} attr_handle={}",
                        status, conn, attr_handle
                    );
                } else {
                    warn!(
                        "Write failed; status={} conn_handle={} attr_handle={}",
                        status, conn, attr_handle
                    );
                }
            }
            HostEvent::MtuUpdated { conn, channel, mtu } => {
                info!(
                    "MTU update event; conn_handle={} cid={} mtu={}",
                    conn, channel, mtu
                );
            }
            HostEvent::EncryptionChanged { conn, status } => {
                info!("Encryption change event; conn_handle={} status={}", conn, status);
            }
            HostEvent::Notification {
                conn,
                attr_handle,
                indication,
                len,
            } => {
                info!(
                    "received {}; conn_handle={} attr_handle={} attr_len={}",
                    if indication { "indication" } else { "notification" },
                    conn,
                    attr_handle,
                    len
                );
            }
            HostEvent::RepeatPairing { conn } => {
                // Drop the old bond and let pairing proceed.
                info!("Repeat pairing on conn_handle={}; forgetting old bond", conn);
                if let Err(e) = self.host.forget_peer(conn) {
                    error!("Failed to delete old bond; {}", e);
                }
            }
        }
        outcome
    }

    // ── Scanning ───────────────────────────────────────────────────────────

    fn on_sync(&mut self, now_ms: u64, outcome: &mut Outcome) {
        info!("BLE host synchronized");
        if let Err(e) = self.host.ensure_address() {
            error!("No identity address; {}", e);
            self.finish_initial(Err(e), outcome);
            return;
        }
        if let Some(params) = self.scan.start(true, now_ms) {
            if let Err(e) = self.request_discovery(&params) {
                self.finish_initial(Err(e), outcome);
            }
        }
    }

    fn on_reset(&mut self, reason: i32) {
        error!("Resetting state; reason={}", reason);
        self.scan.on_cancelled();
        let handles: Vec<DeviceHandle, MAX_DEVICES> = self.registry.handles().collect();
        for handle in handles {
            if let Some(device) = self.registry.lookup_mut(handle) {
                // Resting devices hold nothing; everything else lost its link.
                device.link.fail(LinkFailure::LinkLost(reason));
            }
        }
    }

    fn request_discovery(&mut self, params: &DiscoveryParams) -> Result<(), HostError> {
        info!("Starting scan for duration: {} ms", params.duration_ms);
        match self.host.start_discovery(params) {
            Ok(()) => {
                self.scan.on_started();
                Ok(())
            }
            Err(e) => {
                error!("Error initiating GAP discovery procedure; {}", e);
                Err(e)
            }
        }
    }

    /// Resume scanning once an attempt reached a terminal state.
    fn resume_scan(&mut self, now_ms: u64, outcome: &mut Outcome) {
        if self.scan.is_scanning() || self.registry.in_flight().is_some() {
            return;
        }
        match self.scan.start(false, now_ms) {
            Some(params) => {
                if let Err(e) = self.request_discovery(&params) {
                    self.finish_initial(Err(e), outcome);
                }
            }
            None => {
                info!("Scan window elapsed; not resuming discovery");
                self.finish_initial(Ok(()), outcome);
            }
        }
    }

    fn finish_initial(&mut self, result: Result<(), HostError>, outcome: &mut Outcome) {
        if self.scan.report_initial() {
            outcome.initial_scan = Some(result);
        }
    }

    fn on_advertisement(&mut self, report: &AdvReport, now_ms: u64, outcome: &mut Outcome) {
        if let Some(name) = adv_parser::extract_local_name(&report.data) {
            info!(
                "Found a BLE device with {} name: {}",
                if name.complete { "complete" } else { "incomplete" },
                name.name
            );
        }
        if !self.scan.is_scanning() || self.registry.in_flight().is_some() {
            trace!("Ignoring advertisement from {}: not scanning", report.addr);
            return;
        }
        if let Some(handle) = scanner::select(report, &self.registry) {
            self.connect(handle, report.addr, now_ms, outcome);
        }
    }

    // ── Connection ─────────────────────────────────────────────────────────

    fn connect(&mut self, handle: DeviceHandle, peer: PeerAddress, now_ms: u64, outcome: &mut Outcome) {
        let Some(device) = self.registry.lookup_mut(handle) else {
            return;
        };
        if !device.link.begin(peer) {
            return;
        }

        // Scanning must be stopped before a connection can be initiated.
        if let Err(e) = self.host.cancel_discovery() {
            debug!("Failed to cancel scan; {}", e);
            device.link.abandon(LinkFailure::ScanCancelFailed(e));
            return;
        }
        self.scan.on_cancelled();
        device.link.advance(LinkState::Connecting);
        info!("Connecting to {} for {}", peer, handle);

        if let Err(e) = self
            .host
            .connect(handle, &peer, self.config.connect_timeout_ms)
        {
            error!("Failed to connect to device; addr={} {}", peer, e);
            device.link.fail(LinkFailure::ConnectFailed(e.0));
            self.resume_scan(now_ms, outcome);
        }
    }

    fn on_connected(&mut self, handle: DeviceHandle, conn: ConnHandle, now_ms: u64, outcome: &mut Outcome) {
        let Some(device) = self.registry.lookup_mut(handle) else {
            warn!("Connection {} for unknown device; terminating", conn);
            self.terminate(conn);
            return;
        };
        if !device.link.establish(conn) {
            warn!(
                "Connection {} for {} in state {}; terminating",
                conn,
                handle,
                device.link.state()
            );
            self.terminate(conn);
            return;
        }
        info!("BLE connection established; conn_handle={}", conn);

        let uuid = device.config().service_uuid;
        if let Err(e) = self.host.discover_service(handle, conn, uuid) {
            error!("Failed to start service discovery; {}", e);
            self.abort(handle, LinkFailure::CommandRefused(e), now_ms, outcome);
        }
    }

    fn on_connect_failed(&mut self, handle: DeviceHandle, status: i32, now_ms: u64, outcome: &mut Outcome) {
        let Some(device) = self.registry.lookup_mut(handle) else {
            return;
        };
        if device.link.state() != LinkState::Connecting {
            debug!("Stale connect failure for {}", handle);
            return;
        }
        info!("Failed to establish BLE connection; status={}", status);
        device.link.fail(LinkFailure::ConnectFailed(status));
        self.resume_scan(now_ms, outcome);
    }

    fn on_disconnected(
        &mut self,
        handle: DeviceHandle,
        conn: ConnHandle,
        reason: i32,
        now_ms: u64,
        outcome: &mut Outcome,
    ) {
        let Some(device) = self.registry.lookup_mut(handle) else {
            return;
        };
        if device.link.conn() != Some(conn) {
            debug!("Disconnect of stale conn_handle={} for {}", conn, handle);
            return;
        }
        let was_attempt = device.link.state().is_attempt_in_progress();
        info!("BLE connection disconnected; conn_handle={} reason={}", conn, reason);
        device.link.fail(LinkFailure::LinkLost(reason));
        if was_attempt {
            self.resume_scan(now_ms, outcome);
        }
    }

    fn terminate(&mut self, conn: ConnHandle) {
        if let Err(e) = self.host.terminate(conn) {
            warn!("Failed to terminate conn_handle={}; {}", conn, e);
        }
    }

    /// End the running attempt of `handle`, drop its link and resume scanning.
    fn abort(&mut self, handle: DeviceHandle, failure: LinkFailure, now_ms: u64, outcome: &mut Outcome) {
        let Some(device) = self.registry.lookup_mut(handle) else {
            return;
        };
        error!("Giving up on {}: {}", handle, failure);
        if let Some(conn) = device.link.fail(failure) {
            self.terminate(conn);
        }
        self.resume_scan(now_ms, outcome);
    }

    // ── GATT discovery ─────────────────────────────────────────────────────

    fn discovering(&self, handle: DeviceHandle, conn: ConnHandle, state: LinkState) -> bool {
        self.registry
            .lookup(handle)
            .is_some_and(|d| d.link().state() == state && d.link().conn() == Some(conn))
    }

    fn on_service(
        &mut self,
        handle: DeviceHandle,
        conn: ConnHandle,
        status: GattStatus,
        service: Option<ServiceRange>,
        now_ms: u64,
        outcome: &mut Outcome,
    ) {
        if !self.discovering(handle, conn, LinkState::ServiceDiscovery) {
            debug!("Ignoring service discovery event for {}", handle);
            return;
        }
        let Some(device) = self.registry.lookup_mut(handle) else {
            return;
        };

        if let GattStatus::Failed(code) = status {
            self.abort(handle, LinkFailure::DiscoveryFailed(code), now_ms, outcome);
            return;
        }
        if let Some(range) = service {
            debug!("Service start handle: {} end handle: {}", range.start, range.end);
            device.link.service = Some(range);
        }
        if status != GattStatus::Done {
            return;
        }

        let Some(range) = device.link.service() else {
            self.abort(handle, LinkFailure::DiscoveryFailed(ATT_ERR_ATTR_NOT_FOUND), now_ms, outcome);
            return;
        };
        device.link.advance(LinkState::CharacteristicDiscovery);
        let uuid = device.config().characteristic_uuid;
        if let Err(e) = self.host.discover_characteristic(handle, conn, range, uuid) {
            error!("Failed to start characteristic discovery; {}", e);
            self.abort(handle, LinkFailure::CommandRefused(e), now_ms, outcome);
        }
    }

    fn on_characteristic(
        &mut self,
        handle: DeviceHandle,
        conn: ConnHandle,
        status: GattStatus,
        characteristic: Option<CharacteristicInfo>,
        now_ms: u64,
        outcome: &mut Outcome,
    ) {
        if !self.discovering(handle, conn, LinkState::CharacteristicDiscovery) {
            debug!("Ignoring characteristic discovery event for {}", handle);
            return;
        }
        let Some(device) = self.registry.lookup_mut(handle) else {
            return;
        };

        if let GattStatus::Failed(code) = status {
            self.abort(handle, LinkFailure::DiscoveryFailed(code), now_ms, outcome);
            return;
        }
        if let Some(chr) = characteristic {
            debug!("Characteristic value handle: {}", chr.value_handle);
            device.link.characteristic = Some(chr);
        }
        if status != GattStatus::Done {
            return;
        }

        if device.link.characteristic().is_none() {
            self.abort(handle, LinkFailure::DiscoveryFailed(ATT_ERR_ATTR_NOT_FOUND), now_ms, outcome);
            return;
        }
        device.link.advance(LinkState::Ready);
        info!("Added BLE device {}", device.config().name_prefix);
        outcome.ready = Some(device.config().on_ready);
        self.resume_scan(now_ms, outcome);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::{Command, MockHost};
    use crate::ble::{AddressKind, AdvKind};

    fn noop() {}

    const PEER: PeerAddress = PeerAddress::new(AddressKind::Public, [1, 2, 3, 4, 5, 6]);
    const CONN: ConnHandle = ConnHandle(1);
    const RANGE: ServiceRange = ServiceRange { start: 10, end: 20 };
    const CHR: CharacteristicInfo = CharacteristicInfo {
        def_handle: 14,
        value_handle: 15,
        properties: 0x08,
    };

    fn lamp() -> DeviceConfig {
        DeviceConfig {
            name_prefix: "Lamp",
            service_uuid: 0x1234,
            characteristic_uuid: 0x5678,
            on_ready: noop,
        }
    }

    fn adv(name: &[u8]) -> HostEvent {
        let mut data: Vec<u8, 31> = Vec::new();
        data.push(name.len() as u8 + 1).unwrap();
        data.push(0x09).unwrap();
        data.extend_from_slice(name).unwrap();
        HostEvent::Advertisement(AdvReport {
            kind: AdvKind::ConnectableUndirected,
            addr: PEER,
            rssi: -60,
            data,
        })
    }

    /// Registered "Lamp", synced and scanning since t=0.
    fn scanning() -> (Central<MockHost>, DeviceHandle) {
        let mut central = Central::new(MockHost::default(), GatewayConfig::default());
        let handle = central.register(lamp()).unwrap();
        let _ = central.handle(HostEvent::Synced, 0);
        central.host_mut().take();
        (central, handle)
    }

    fn state(central: &Central<MockHost>, handle: DeviceHandle) -> LinkState {
        central.registry().lookup(handle).unwrap().link().state()
    }

    fn to_service_discovery(central: &mut Central<MockHost>, handle: DeviceHandle) {
        let _ = central.handle(adv(b"LampX"), 1_000);
        let _ = central.handle(HostEvent::Connected { device: handle, conn: CONN }, 2_000);
        central.host_mut().take();
    }

    #[test]
    fn sync_opens_initial_scan() {
        let mut central = Central::new(MockHost::default(), GatewayConfig::default());
        let outcome = central.handle(HostEvent::Synced, 0);
        assert!(outcome.ready.is_none());
        assert_eq!(outcome.initial_scan, None);
        assert_eq!(
            central.host_mut().take(),
            [
                Command::EnsureAddress,
                Command::StartDiscovery(DiscoveryParams {
                    duration_ms: 30_000,
                    passive: true,
                    filter_duplicates: true,
                }),
            ]
        );
        assert!(central.scanner().is_scanning());
    }

    #[test]
    fn failed_initial_scan_is_reported() {
        let mut central = Central::new(MockHost::default(), GatewayConfig::default());
        central.host_mut().fail_discovery = Some(3);
        let outcome = central.handle(HostEvent::Synced, 0);
        assert_eq!(outcome.initial_scan, Some(Err(HostError(3))));
    }

    #[test]
    fn advertisement_match_cancels_scan_and_connects() {
        let (mut central, handle) = scanning();
        let _ = central.handle(adv(b"LampX"), 1_000);
        assert_eq!(state(&central, handle), LinkState::Connecting);
        assert_eq!(
            central.host_mut().take(),
            [
                Command::CancelDiscovery,
                Command::Connect {
                    device: handle,
                    peer: PEER,
                    timeout_ms: 30_000,
                },
            ]
        );
        assert!(!central.scanner().is_scanning());
        assert_eq!(central.registry().lookup(handle).unwrap().link().peer(), Some(PEER));
    }

    #[test]
    fn unmatched_advertisement_is_a_noop() {
        let (mut central, handle) = scanning();
        let _ = central.handle(adv(b"Bulb"), 1_000);
        assert!(central.host_mut().take().is_empty());
        assert_eq!(state(&central, handle), LinkState::Idle);
    }

    #[test]
    fn failed_cancel_abandons_attempt_and_keeps_scanning() {
        let (mut central, handle) = scanning();
        central.host_mut().fail_cancel = Some(2);
        let _ = central.handle(adv(b"LampX"), 1_000);
        assert_eq!(state(&central, handle), LinkState::Idle);
        assert_eq!(central.host_mut().take(), [Command::CancelDiscovery]);
        assert!(central.scanner().is_scanning());
        assert_eq!(
            central.registry().lookup(handle).unwrap().link().last_failure(),
            Some(LinkFailure::ScanCancelFailed(HostError(2)))
        );
    }

    #[test]
    fn refused_connect_resumes_scan() {
        let (mut central, handle) = scanning();
        central.host_mut().fail_connect = Some(6);
        let _ = central.handle(adv(b"LampX"), 1_000);
        assert_eq!(state(&central, handle), LinkState::Disconnected);
        let commands = central.host_mut().take();
        assert_eq!(
            commands.last(),
            Some(&Command::StartDiscovery(DiscoveryParams {
                duration_ms: 29_000,
                passive: true,
                filter_duplicates: true,
            }))
        );
    }

    #[test]
    fn connect_failure_resumes_scan_with_remaining_budget() {
        let (mut central, handle) = scanning();
        let _ = central.handle(adv(b"LampX"), 1_000);
        central.host_mut().take();
        let _ = central.handle(HostEvent::ConnectFailed { device: handle, status: 13 }, 10_000);
        assert_eq!(state(&central, handle), LinkState::Disconnected);
        assert_eq!(
            central.host_mut().take(),
            [Command::StartDiscovery(DiscoveryParams {
                duration_ms: 20_000,
                passive: true,
                filter_duplicates: true,
            })]
        );
    }

    #[test]
    fn connection_starts_service_discovery() {
        let (mut central, handle) = scanning();
        let _ = central.handle(adv(b"LampX"), 1_000);
        central.host_mut().take();
        let _ = central.handle(HostEvent::Connected { device: handle, conn: CONN }, 2_000);
        assert_eq!(state(&central, handle), LinkState::ServiceDiscovery);
        assert_eq!(
            central.host_mut().take(),
            [Command::DiscoverService {
                device: handle,
                conn: CONN,
                uuid: 0x1234,
            }]
        );
    }

    #[test]
    fn service_done_starts_characteristic_discovery_in_last_seen_range() {
        let (mut central, handle) = scanning();
        to_service_discovery(&mut central, handle);
        let first = ServiceRange { start: 1, end: 5 };
        let _ = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Ok,
                service: Some(first),
            },
            2_100,
        );
        let _ = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Ok,
                service: Some(RANGE),
            },
            2_200,
        );
        // Partial results never move the state forward.
        assert_eq!(state(&central, handle), LinkState::ServiceDiscovery);
        assert!(central.host_mut().take().is_empty());

        let _ = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Done,
                service: None,
            },
            2_300,
        );
        assert_eq!(state(&central, handle), LinkState::CharacteristicDiscovery);
        assert_eq!(
            central.host_mut().take(),
            [Command::DiscoverCharacteristic {
                device: handle,
                conn: CONN,
                range: RANGE,
                uuid: 0x5678,
            }]
        );
    }

    #[test]
    fn service_done_without_match_fails_discovery() {
        let (mut central, handle) = scanning();
        to_service_discovery(&mut central, handle);
        let _ = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Done,
                service: None,
            },
            3_000,
        );
        let link = central.registry().lookup(handle).unwrap().link();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.conn(), None);
        assert_eq!(
            link.last_failure(),
            Some(LinkFailure::DiscoveryFailed(ATT_ERR_ATTR_NOT_FOUND))
        );
        let commands = central.host_mut().take();
        assert_eq!(commands[0], Command::Terminate(CONN));
        assert!(matches!(commands[1], Command::StartDiscovery(_)));
    }

    #[test]
    fn discovery_error_status_aborts_attempt() {
        let (mut central, handle) = scanning();
        to_service_discovery(&mut central, handle);
        let _ = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Failed(0x0E),
                service: None,
            },
            3_000,
        );
        assert_eq!(state(&central, handle), LinkState::Disconnected);
        assert_eq!(
            central.registry().lookup(handle).unwrap().link().last_failure(),
            Some(LinkFailure::DiscoveryFailed(0x0E))
        );
    }

    #[test]
    fn characteristic_done_makes_device_ready_once() {
        let (mut central, handle) = scanning();
        to_service_discovery(&mut central, handle);
        let _ = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Ok,
                service: Some(RANGE),
            },
            2_100,
        );
        let _ = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Done,
                service: None,
            },
            2_200,
        );
        let partial = central.handle(
            HostEvent::CharacteristicDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Ok,
                characteristic: Some(CHR),
            },
            2_300,
        );
        assert_eq!(partial.ready, None);
        assert_eq!(state(&central, handle), LinkState::CharacteristicDiscovery);

        let done = HostEvent::CharacteristicDiscovered {
            device: handle,
            conn: CONN,
            status: GattStatus::Done,
            characteristic: None,
        };
        let outcome = central.handle(done.clone(), 2_400);
        assert!(outcome.ready.is_some());
        assert_eq!(state(&central, handle), LinkState::Ready);
        assert_eq!(
            central.registry().lookup(handle).unwrap().link().characteristic(),
            Some(CHR)
        );

        // A duplicate "done" is stale and must not fire the hook again.
        let again = central.handle(done, 2_500);
        assert_eq!(again.ready, None);
    }

    #[test]
    fn disconnect_mid_discovery_drops_late_completions() {
        let (mut central, handle) = scanning();
        to_service_discovery(&mut central, handle);
        let _ = central.handle(
            HostEvent::Disconnected {
                device: handle,
                conn: CONN,
                reason: 0x213,
            },
            3_000,
        );
        let link = central.registry().lookup(handle).unwrap().link();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.conn(), None);
        central.host_mut().take();

        let outcome = central.handle(
            HostEvent::ServiceDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Done,
                service: Some(RANGE),
            },
            3_100,
        );
        assert!(outcome.ready.is_none());
        assert_eq!(outcome.initial_scan, None);
        assert!(central.host_mut().take().is_empty());
        assert_eq!(state(&central, handle), LinkState::Disconnected);
    }

    #[test]
    fn advertisements_are_ignored_while_an_attempt_runs() {
        let mut central = Central::new(MockHost::default(), GatewayConfig::default());
        let first = central.register(lamp()).unwrap();
        let second = central.register(lamp()).unwrap();
        let _ = central.handle(HostEvent::Synced, 0);
        let _ = central.handle(adv(b"LampX"), 1_000);
        central.host_mut().take();

        let _ = central.handle(adv(b"LampY"), 1_100);
        assert!(central.host_mut().take().is_empty());
        assert_eq!(state(&central, first), LinkState::Connecting);
        assert_eq!(state(&central, second), LinkState::Idle);
    }

    #[test]
    fn initial_window_end_is_reported_once() {
        let (mut central, _) = scanning();
        let outcome = central.handle(HostEvent::DiscoveryComplete { reason: 0 }, 30_000);
        assert_eq!(outcome.initial_scan, Some(Ok(())));
        assert!(!central.scanner().is_scanning());
        let outcome = central.handle(HostEvent::DiscoveryComplete { reason: 0 }, 40_000);
        assert_eq!(outcome.initial_scan, None);
    }

    #[test]
    fn exhausted_window_ends_initial_wait_without_rescanning() {
        let (mut central, handle) = scanning();
        let _ = central.handle(adv(b"LampX"), 1_000);
        central.host_mut().take();
        let outcome = central.handle(HostEvent::ConnectFailed { device: handle, status: 2 }, 31_000);
        assert_eq!(outcome.initial_scan, Some(Ok(())));
        assert!(central.host_mut().take().is_empty());
    }

    #[test]
    fn repeat_pairing_forgets_old_bond() {
        let (mut central, _) = scanning();
        let _ = central.handle(HostEvent::RepeatPairing { conn: CONN }, 5);
        assert_eq!(central.host_mut().take(), [Command::ForgetPeer(CONN)]);
    }

    #[test]
    fn rescan_opens_short_window_only_when_idle() {
        let (mut central, handle) = scanning();
        assert_eq!(central.rescan(100), Ok(false));

        let _ = central.handle(HostEvent::DiscoveryComplete { reason: 0 }, 30_000);
        central.host_mut().take();
        assert_eq!(central.rescan(60_000), Ok(true));
        assert_eq!(
            central.host_mut().take(),
            [Command::StartDiscovery(DiscoveryParams {
                duration_ms: 5_000,
                passive: true,
                filter_duplicates: true,
            })]
        );
        assert_eq!(state(&central, handle), LinkState::Idle);
    }

    #[test]
    fn reset_drops_every_link() {
        let (mut central, handle) = scanning();
        to_service_discovery(&mut central, handle);
        let _ = central.handle(HostEvent::Reset { reason: 5 }, 4_000);
        let link = central.registry().lookup(handle).unwrap().link();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.conn(), None);
    }

    fn to_characteristic_discovery(central: &mut Central<MockHost>, handle: DeviceHandle) {
        to_service_discovery(central, handle);
        for status in [GattStatus::Ok, GattStatus::Done] {
            let _ = central.handle(
                HostEvent::ServiceDiscovered {
                    device: handle,
                    conn: CONN,
                    status,
                    service: Some(RANGE),
                },
                2_500,
            );
        }
        central.host_mut().take();
    }

    #[test]
    fn characteristic_error_status_aborts_attempt() {
        let (mut central, handle) = scanning();
        to_characteristic_discovery(&mut central, handle);
        let outcome = central.handle(
            HostEvent::CharacteristicDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Failed(0x0E),
                characteristic: None,
            },
            3_000,
        );
        assert!(outcome.ready.is_none());
        let link = central.registry().lookup(handle).unwrap().link();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.conn(), None);
        assert_eq!(link.last_failure(), Some(LinkFailure::DiscoveryFailed(0x0E)));
        assert_eq!(
            central.host_mut().take(),
            [
                Command::Terminate(CONN),
                Command::StartDiscovery(DiscoveryParams {
                    duration_ms: 27_000,
                    passive: true,
                    filter_duplicates: true,
                }),
            ]
        );
    }

    #[test]
    fn characteristic_done_without_match_fails_discovery() {
        let (mut central, handle) = scanning();
        to_characteristic_discovery(&mut central, handle);
        let outcome = central.handle(
            HostEvent::CharacteristicDiscovered {
                device: handle,
                conn: CONN,
                status: GattStatus::Done,
                characteristic: None,
            },
            3_000,
        );
        assert!(outcome.ready.is_none());
        let link = central.registry().lookup(handle).unwrap().link();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(
            link.last_failure(),
            Some(LinkFailure::DiscoveryFailed(ATT_ERR_ATTR_NOT_FOUND))
        );
        let commands = central.host_mut().take();
        assert_eq!(commands[0], Command::Terminate(CONN));
        assert!(matches!(commands[1], Command::StartDiscovery(_)));
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn rescan_waits_for_initial_window() {
        let mut central = Central::new(MockHost::default(), GatewayConfig::default());
        central.register(lamp()).unwrap();
        central.init().unwrap();
        central.host_mut().take();

        // Host not synced yet: nothing scans, but the initial window is pending.
        assert_eq!(central.rescan(0), Ok(false));
        assert!(central.host_mut().take().is_empty());

        let _ = central.handle(HostEvent::Synced, 0);
        let _ = central.handle(HostEvent::DiscoveryComplete { reason: 0 }, 30_000);
        central.host_mut().take();
        assert_eq!(central.rescan(31_000), Ok(true));
    }

    #[test]
    fn stale_connection_is_terminated() {
        let (mut central, handle) = scanning();
        let _ = central.handle(HostEvent::Connected { device: handle, conn: CONN }, 1_000);
        assert_eq!(central.host_mut().take(), [Command::Terminate(CONN)]);
        assert_eq!(state(&central, handle), LinkState::Idle);
    }
}
