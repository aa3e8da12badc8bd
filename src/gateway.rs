//! Gateway lifecycle: bring-up, the event loop and the driver-facing API.
//!
//! The [`Central`] state machine lives in a blocking mutex so that drivers
//! on other tasks can `write()` while the event loop is idle.  Host events
//! are queued on a bounded channel and processed one at a time by
//! [`Gateway::run`].  Driver hooks are invoked after the lock is released.
//!
//! Share a gateway between tasks through a `&'static` reference (e.g. from
//! a `StaticCell`), with `CriticalSectionRawMutex` as `M` on target.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;

use crate::ble::central::{Central, Outcome};
use crate::ble::link::LinkState;
use crate::ble::registry::{DeviceConfig, DeviceHandle};
use crate::ble::{BleHost, HostEvent};
use crate::config::{GatewayConfig, EVENT_QUEUE_DEPTH, EVENT_QUEUE_RESERVED};
use crate::error::{Error, HostError, RegistrationError, WriteError};

pub struct Gateway<M: RawMutex, H: BleHost> {
    central: Mutex<M, RefCell<Central<H>>>,
    events: Channel<M, HostEvent, EVENT_QUEUE_DEPTH>,
    initial_scan: Signal<M, Result<(), HostError>>,
}

impl<M: RawMutex, H: BleHost> Gateway<M, H> {
    pub fn new(host: H, config: GatewayConfig) -> Self {
        Self {
            central: Mutex::new(RefCell::new(Central::new(host, config))),
            events: Channel::new(),
            initial_scan: Signal::new(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Central<H>) -> R) -> R {
        self.central.lock(|central| f(&mut central.borrow_mut()))
    }

    /// Register a peripheral type.  Must happen before [`Gateway::start`].
    pub fn register(&self, config: DeviceConfig) -> Result<DeviceHandle, RegistrationError> {
        self.with(|central| central.register(config))
    }

    /// Bring the host up and wait until the initial discovery window is over.
    ///
    /// The scan itself is opened when the host posts `HostEvent::Synced`,
    /// so [`Gateway::run`] must be running for this to return.
    pub async fn start(&self) -> Result<(), Error> {
        self.with(|central| central.init())?;
        self.initial_scan.wait().await?;
        info!("Initial scan complete");
        Ok(())
    }

    /// Queue an event from the host stack.  Never blocks; the event is
    /// handed back if the queue is full.
    ///
    /// Advertisement reports are refused once only the reserved slots are
    /// left, so a burst of them cannot crowd out a completion.
    pub fn post(&self, event: HostEvent) -> Result<(), HostEvent> {
        if matches!(event, HostEvent::Advertisement(_))
            && self.events.len() >= EVENT_QUEUE_DEPTH - EVENT_QUEUE_RESERVED
        {
            trace!("Host event queue busy; dropping advertisement");
            return Err(event);
        }
        self.events.try_send(event).map_err(|TrySendError::Full(event)| {
            warn!("Host event queue full; dropping event");
            event
        })
    }

    /// Queue an event, waiting for room.  For hosts that deliver events
    /// from a task rather than from a callback.
    pub async fn post_async(&self, event: HostEvent) {
        self.events.send(event).await;
    }

    /// Handle one event right away, bypassing the queue.
    pub fn process(&self, event: HostEvent, now_ms: u64) {
        let outcome = self.with(|central| central.handle(event, now_ms));
        self.complete(outcome);
    }

    fn complete(&self, outcome: Outcome) {
        if let Some(result) = outcome.initial_scan {
            self.initial_scan.signal(result);
        }
        if let Some(on_ready) = outcome.ready {
            on_ready();
        }
    }

    /// Event loop.  `now_ms` is a monotonic millisecond clock.
    pub async fn run(&self, now_ms: impl Fn() -> u64) -> ! {
        loop {
            let event = self.events.receive().await;
            self.process(event, now_ms());
        }
    }

    pub fn write(&self, handle: DeviceHandle, payload: &[u8]) -> Result<(), WriteError> {
        self.with(|central| central.write(handle, payload))
    }

    /// Open a short discovery window for devices that lost their link.
    pub fn rescan(&self, now_ms: u64) -> Result<bool, Error> {
        Ok(self.with(|central| central.rescan(now_ms))?)
    }

    pub fn state(&self, handle: DeviceHandle) -> Option<LinkState> {
        self.with(|central| {
            central
                .registry()
                .lookup(handle)
                .map(|device| device.link().state())
        })
    }

    pub fn is_ready(&self, handle: DeviceHandle) -> bool {
        self.state(handle) == Some(LinkState::Ready)
    }

    pub fn device_count(&self) -> usize {
        self.with(|central| central.registry().len())
    }

    /// Run `f` with exclusive access to the host.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.with(|central| f(central.host_mut()))
    }
}
