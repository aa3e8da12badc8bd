//! MiPow Playbulb Candle.
//!
//! The colour characteristic takes `[white, r, g, b]`; white is left off.

use crate::accessory::color::Rgb;
use crate::accessory::light::{LightCodec, LightState};

pub struct Playbulb;

impl LightCodec for Playbulb {
    const NAME_PREFIX: &'static str = "PLAYBULB CANDLE";
    const SERVICE_UUID: u16 = 0xFF02;
    const CHARACTERISTIC_UUID: u16 = 0xFFFC;
    const DEFAULT_STATE: LightState = LightState::new(true, 120, 100, 50);

    type Frame = [u8; 4];

    fn encode(color: Rgb) -> [u8; 4] {
        [0x00, color.r, color.g, color.b]
    }
}
