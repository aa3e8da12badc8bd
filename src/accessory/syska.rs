//! Syska smart bulb ("Cnligh..." advertisers).

use crate::accessory::color::Rgb;
use crate::accessory::light::{LightCodec, LightState};

const RED_INDEX: usize = 11;
const GREEN_INDEX: usize = 12;
const BLUE_INDEX: usize = 13;

/// Fixed command header; the first two bytes are a sequence number that
/// the bulb does not check.
const TEMPLATE: [u8; 18] = [
    0x00, 0x09, 0x00, 0x06, 0x00, 0x0A, 0x03, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

pub struct Syska;

impl LightCodec for Syska {
    const NAME_PREFIX: &'static str = "Cnligh";
    const SERVICE_UUID: u16 = 0xF371;
    const CHARACTERISTIC_UUID: u16 = 0xFFF1;
    const DEFAULT_STATE: LightState = LightState::new(true, 180, 100, 25);

    type Frame = [u8; 18];

    fn encode(color: Rgb) -> [u8; 18] {
        let mut frame = TEMPLATE;
        frame[RED_INDEX] = color.r;
        frame[GREEN_INDEX] = color.g;
        frame[BLUE_INDEX] = color.b;
        frame
    }
}
