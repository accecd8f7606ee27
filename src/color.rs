//! Canonical color representation and the sink-side channel permutation.
//!
//! Everything inside the engine works in RGB. The only place a different
//! channel order exists is [`ChannelOrder::permute`], which the sink writer
//! applies once per pixel when a frame leaves the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An 8-bit RGB triple.
///
/// Serialized as `[r, g, b]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// HSV to RGB with all inputs in [0, 1]. Hue wraps.
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        if s == 0.0 {
            return Self::from_unit(v, v, v);
        }
        let h = h.rem_euclid(1.0) * 6.0;
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        let (r, g, b) = match sector as u32 % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::from_unit(r, g, b)
    }

    /// Fully saturated, full value hue.
    pub fn hue(h: f32) -> Self {
        Self::from_hsv(h, 1.0, 1.0)
    }

    fn from_unit(r: f32, g: f32, b: f32) -> Self {
        Self::new(unit_to_channel(r), unit_to_channel(g), unit_to_channel(b))
    }

    /// Multiply every channel by `factor`, truncating toward zero.
    pub fn scale(self, factor: f32) -> Self {
        Self::new(
            scale_channel(self.r, factor),
            scale_channel(self.g, factor),
            scale_channel(self.b, factor),
        )
    }

    /// Linear blend: `t = 0` gives `self`, `t = 1` gives `other`.
    pub fn lerp(self, other: Color, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| -> u8 {
            let v = f32::from(a) * (1.0 - t) + f32::from(b) * t;
            v.clamp(0.0, 255.0) as u8
        };
        Self::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    pub fn saturating_add(self, other: Color) -> Self {
        Self::new(
            self.r.saturating_add(other.r),
            self.g.saturating_add(other.g),
            self.b.saturating_add(other.b),
        )
    }

    /// Channel-wise maximum.
    pub fn max(self, other: Color) -> Self {
        Self::new(self.r.max(other.r), self.g.max(other.g), self.b.max(other.b))
    }

    pub fn is_dark(self) -> bool {
        self == Self::BLACK
    }

    /// Sum of channels, 0..=765.
    pub fn luma_sum(self) -> u32 {
        u32::from(self.r) + u32::from(self.g) + u32::from(self.b)
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Color {
    fn from(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

impl From<Color> for [u8; 3] {
    fn from(c: Color) -> Self {
        c.to_array()
    }
}

fn unit_to_channel(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0) as u8
}

fn scale_channel(c: u8, factor: f32) -> u8 {
    (f32::from(c) * factor).clamp(0.0, 255.0) as u8
}

// ============================================================================
// Wire channel order
// ============================================================================

/// Byte order the render sink expects on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Rbg,
    /// WS2811 strips.
    #[default]
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ChannelOrder {
    pub fn permute(self, c: Color) -> [u8; 3] {
        let Color { r, g, b } = c;
        match self {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Rbg => [r, b, g],
            ChannelOrder::Grb => [g, r, b],
            ChannelOrder::Gbr => [g, b, r],
            ChannelOrder::Brg => [b, r, g],
            ChannelOrder::Bgr => [b, g, r],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelOrder::Rgb => "rgb",
            ChannelOrder::Rbg => "rbg",
            ChannelOrder::Grb => "grb",
            ChannelOrder::Gbr => "gbr",
            ChannelOrder::Brg => "brg",
            ChannelOrder::Bgr => "bgr",
        }
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "rbg" => Ok(ChannelOrder::Rbg),
            "grb" => Ok(ChannelOrder::Grb),
            "gbr" => Ok(ChannelOrder::Gbr),
            "brg" => Ok(ChannelOrder::Brg),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(format!("unknown channel order '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grb_swaps_red_and_green() {
        let wire = ChannelOrder::Grb.permute(Color::new(10, 20, 30));
        assert_eq!(wire, [20, 10, 30]);
        assert_eq!(ChannelOrder::Rgb.permute(Color::new(10, 20, 30)), [10, 20, 30]);
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(Color::hue(0.0), Color::RED);
        assert_eq!(Color::hue(1.0 / 3.0), Color::GREEN);
        assert_eq!(Color::hue(2.0 / 3.0), Color::BLUE);
        assert_eq!(Color::from_hsv(0.5, 0.0, 1.0), Color::WHITE);
    }

    #[test]
    fn test_lerp_endpoints() {
        assert_eq!(Color::RED.lerp(Color::WHITE, 0.0), Color::RED);
        assert_eq!(Color::RED.lerp(Color::WHITE, 1.0), Color::WHITE);
        assert_eq!(Color::BLACK.lerp(Color::WHITE, 0.5), Color::new(127, 127, 127));
    }

    #[test]
    fn test_saturating_add_clamps() {
        let c = Color::new(200, 100, 255).saturating_add(Color::new(100, 100, 1));
        assert_eq!(c, Color::new(255, 200, 255));
    }

    #[test]
    fn test_serde_as_array() {
        let json = serde_json::to_string(&Color::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let c: Color = serde_json::from_str("[255,0,128]").unwrap();
        assert_eq!(c, Color::new(255, 0, 128));
        let order: ChannelOrder = serde_json::from_str("\"bgr\"").unwrap();
        assert_eq!(order, ChannelOrder::Bgr);
    }

    #[test]
    fn test_channel_order_from_str() {
        assert_eq!("GRB".parse::<ChannelOrder>(), Ok(ChannelOrder::Grb));
        assert!("rgbw".parse::<ChannelOrder>().is_err());
    }
}
