//! Registry of peripheral types the gateway looks for.
//!
//! Drivers register one [`DeviceConfig`] each before the gateway starts.
//! Slots are handed out in registration order and never released; only
//! the [`Link`] runtime fields change afterwards.
//!
//! Generations come from one process-wide counter, so a handle issued by
//! one registry does not resolve in another.

use core::fmt;
use core::sync::atomic::{AtomicU16, Ordering};

use heapless::Vec;

use crate::ble::link::Link;
use crate::config::MAX_DEVICES;
use crate::error::RegistrationError;

/// Typed handle of a registered device: slot index plus the generation the
/// slot had when it was handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceHandle {
    index: u8,
    generation: u16,
}

impl DeviceHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.index)
    }
}

/// What a driver tells the gateway about its peripheral.
#[derive(Clone, Copy, Debug)]
pub struct DeviceConfig {
    /// Advertised names starting with this string are candidates.
    pub name_prefix: &'static str,
    /// 16-bit UUID of the primary service holding the characteristic.
    pub service_uuid: u16,
    /// 16-bit UUID of the characteristic written by the driver.
    pub characteristic_uuid: u16,
    /// Called once the characteristic is resolved, for every new link.
    pub on_ready: fn(),
}

/// A registered device: its static configuration and its live link.
#[derive(Clone, Debug)]
pub struct Device {
    config: DeviceConfig,
    generation: u16,
    pub(crate) link: Link,
}

impl Device {
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    fn matches(&self, name: &str) -> bool {
        name.starts_with(self.config.name_prefix)
            && self.link.conn().is_none()
            && self.link.state().is_resting()
    }
}

static NEXT_GENERATION: AtomicU16 = AtomicU16::new(1);

fn next_generation() -> u16 {
    loop {
        // Zero is never handed out.
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        if generation != 0 {
            return generation;
        }
    }
}

/// Fixed-capacity device table.
pub struct Registry {
    devices: Vec<Device, MAX_DEVICES>,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Store `config` in the first free slot.
    pub fn register(&mut self, config: DeviceConfig) -> Result<DeviceHandle, RegistrationError> {
        if config.name_prefix.is_empty() {
            error!("Incorrect input: empty advertisement name prefix");
            return Err(RegistrationError::EmptyPrefix);
        }

        if self.devices.is_full() {
            error!("Max limit reached ({} devices)", MAX_DEVICES);
            return Err(RegistrationError::CapacityExhausted);
        }
        let generation = next_generation();
        let index = self.devices.len();
        let device = Device {
            config,
            generation,
            link: Link::new(),
        };
        if self.devices.push(device).is_err() {
            return Err(RegistrationError::CapacityExhausted);
        }

        debug!("Adding device '{}' at index {}", config.name_prefix, index);
        Ok(DeviceHandle {
            index: index as u8,
            generation,
        })
    }

    pub fn lookup(&self, handle: DeviceHandle) -> Option<&Device> {
        self.devices
            .get(handle.index())
            .filter(|d| d.generation == handle.generation)
    }

    pub(crate) fn lookup_mut(&mut self, handle: DeviceHandle) -> Option<&mut Device> {
        self.devices
            .get_mut(handle.index())
            .filter(|d| d.generation == handle.generation)
    }

    /// First device (in registration order) whose prefix matches `name`
    /// and which holds no link and has no attempt in flight.
    pub fn find_match(&self, name: &str) -> Option<DeviceHandle> {
        self.devices
            .iter()
            .enumerate()
            .find(|(_, d)| d.matches(name))
            .map(|(index, d)| DeviceHandle {
                index: index as u8,
                generation: d.generation,
            })
    }

    /// The device whose connect/discover pipeline is running, if any.
    pub fn in_flight(&self) -> Option<DeviceHandle> {
        self.handles()
            .find(|h| self.devices[h.index()].link.state().is_attempt_in_progress())
    }

    pub fn handles(&self) -> impl Iterator<Item = DeviceHandle> + '_ {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, d)| DeviceHandle {
                index: index as u8,
                generation: d.generation,
            })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
