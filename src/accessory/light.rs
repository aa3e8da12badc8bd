//! Colour light model and the driver that pushes it to a peripheral.

use core::marker::PhantomData;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::accessory::color::{hsv_to_rgb, Rgb};
use crate::ble::registry::{DeviceConfig, DeviceHandle};
use crate::ble::BleHost;
use crate::error::{RegistrationError, WriteError};
use crate::gateway::Gateway;

/// One change requested by the user of a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LightCommand {
    Power(bool),
    /// Degrees, 0..360.
    Hue(u16),
    /// Percent.
    Saturation(u8),
    /// Percent.
    Brightness(u8),
}

/// Power and colour of a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LightState {
    pub power: bool,
    pub hue: u16,
    pub saturation: u8,
    pub brightness: u8,
}

impl LightState {
    pub const fn new(power: bool, hue: u16, saturation: u8, brightness: u8) -> Self {
        Self {
            power,
            hue,
            saturation,
            brightness,
        }
    }

    /// Apply `command` and return the colour the light should show.
    ///
    /// Changing any colour parameter turns the light on.
    pub fn apply(&mut self, command: LightCommand) -> Rgb {
        match command {
            LightCommand::Power(power) => self.power = power,
            LightCommand::Hue(hue) => {
                self.hue = hue;
                self.power = true;
            }
            LightCommand::Saturation(saturation) => {
                self.saturation = saturation;
                self.power = true;
            }
            LightCommand::Brightness(brightness) => {
                self.brightness = brightness;
                self.power = true;
            }
        }
        self.color()
    }

    pub fn color(&self) -> Rgb {
        if self.power {
            hsv_to_rgb(self.hue, self.saturation, self.brightness)
        } else {
            Rgb::BLACK
        }
    }
}

/// Wire format of a particular light model.
pub trait LightCodec {
    /// Advertised name prefix.
    const NAME_PREFIX: &'static str;
    const SERVICE_UUID: u16;
    const CHARACTERISTIC_UUID: u16;
    /// State the light is assumed to be in before the first command.
    const DEFAULT_STATE: LightState;

    type Frame: AsRef<[u8]>;

    fn encode(color: Rgb) -> Self::Frame;

    fn device_config(on_ready: fn()) -> DeviceConfig {
        DeviceConfig {
            name_prefix: Self::NAME_PREFIX,
            service_uuid: Self::SERVICE_UUID,
            characteristic_uuid: Self::CHARACTERISTIC_UUID,
            on_ready,
        }
    }
}

/// A registered light of model `C`.
pub struct LightDriver<C: LightCodec> {
    handle: DeviceHandle,
    state: LightState,
    _codec: PhantomData<C>,
}

impl<C: LightCodec> LightDriver<C> {
    /// Register the light with `gateway`.  `on_ready` runs every time a
    /// link to it is resolved.
    pub fn register<M: RawMutex, H: BleHost>(
        gateway: &Gateway<M, H>,
        on_ready: fn(),
    ) -> Result<Self, RegistrationError> {
        let handle = gateway.register(C::device_config(on_ready))?;
        info!("Registered light '{}' as {}", C::NAME_PREFIX, handle);
        Ok(Self {
            handle,
            state: C::DEFAULT_STATE,
            _codec: PhantomData,
        })
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn state(&self) -> &LightState {
        &self.state
    }

    /// Update the model and write the resulting colour.
    ///
    /// The model keeps the change even when the write fails, so the next
    /// [`LightDriver::sync`] catches the peripheral up.
    pub fn set<M: RawMutex, H: BleHost>(
        &mut self,
        gateway: &Gateway<M, H>,
        command: LightCommand,
    ) -> Result<(), WriteError> {
        debug!("Light {}: {}", self.handle, command);
        let color = self.state.apply(command);
        self.push(gateway, color)
    }

    /// Write the current colour, e.g. after the link came back.
    pub fn sync<M: RawMutex, H: BleHost>(&self, gateway: &Gateway<M, H>) -> Result<(), WriteError> {
        self.push(gateway, self.state.color())
    }

    fn push<M: RawMutex, H: BleHost>(&self, gateway: &Gateway<M, H>, color: Rgb) -> Result<(), WriteError> {
        let frame = C::encode(color);
        gateway.write(self.handle, frame.as_ref()).inspect_err(|e| {
            error!("Failed to update the light state; {}", e);
        })
    }
}

impl core::fmt::Display for LightCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LightCommand::Power(on) => write!(f, "power={}", on),
            LightCommand::Hue(h) => write!(f, "hue={}", h),
            LightCommand::Saturation(s) => write!(f, "saturation={}", s),
            LightCommand::Brightness(v) => write!(f, "brightness={}", v),
        }
    }
}
