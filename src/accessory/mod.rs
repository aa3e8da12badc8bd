//! Reference accessory drivers built on the gateway's write path.

pub mod color;
pub mod light;
pub mod playbulb;
pub mod syska;

pub use color::{hsv_to_rgb, Rgb};
pub use light::{LightCodec, LightCommand, LightDriver, LightState};
pub use playbulb::Playbulb;
pub use syska::Syska;
