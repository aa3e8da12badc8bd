//! Colour space conversion for RGB lights.

/// An 8-bit-per-channel colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
}

/// HSV to RGB, integer only.
///
/// `hue` is in degrees and wraps at 360.  `saturation` and `value` are
/// percentages and are clamped to 100.
pub fn hsv_to_rgb(hue: u16, saturation: u8, value: u8) -> Rgb {
    let h = u32::from(hue % 360);
    let s = u32::from(saturation.min(100));
    let v = u32::from(value.min(100));

    let max = v * 255 / 100;
    let min = max * (100 - s) / 100;

    // Adjustment within the current 60° sector.
    let adj = (max - min) * (h % 60) / 60;

    let (r, g, b) = match h / 60 {
        0 => (max, min + adj, min),
        1 => (max - adj, max, min),
        2 => (min, max, min + adj),
        3 => (min, max - adj, max),
        4 => (min + adj, min, max),
        _ => (max, min, max - adj),
    };

    // Each channel is at most 255.
    Rgb {
        r: r as u8,
        g: g as u8,
        b: b as u8,
    }
}
