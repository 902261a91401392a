use std::fmt;

use serde::Serialize;

/// An sRGB color, rendered as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const GREEN: Rgb = Rgb::new(0, 255, 0);
pub const ORANGE: Rgb = Rgb::new(255, 165, 0);
pub const RED: Rgb = Rgb::new(255, 0, 0);

/// Map `value` in `[0, max]` onto red -> orange -> green.
///
/// `value >= max` is green and `value <= 0` is red; anything between is
/// a piecewise-linear blend through orange at `max / 2`. NaN reads as 0.
pub fn lerp_green_to_red_via_orange(value: f64, max: f64) -> Rgb {
    if max <= 0.0 || value.is_nan() {
        return RED;
    }
    let t = (value / max).clamp(0.0, 1.0);
    if t < 0.5 {
        blend(RED, ORANGE, t * 2.0)
    } else {
        blend(ORANGE, GREEN, (t - 0.5) * 2.0)
    }
}

fn blend(from: Rgb, to: Rgb, t: f64) -> Rgb {
    let channel = |a: u8, b: u8| -> u8 {
        let mixed = f64::from(a) + (f64::from(b) - f64::from(a)) * t;
        mixed.round().clamp(0.0, 255.0) as u8
    };
    Rgb {
        r: channel(from.r, to.r),
        g: channel(from.g, to.g),
        b: channel(from.b, to.b),
    }
}
