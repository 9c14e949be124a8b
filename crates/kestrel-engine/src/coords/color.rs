use std::fmt;
use std::ops::{Add, Mul, Sub};

/// 8-bit RGBA color as used by vertex data, clear calls and pixel access.
///
/// Arithmetic saturates per channel. `to_linear` produces the normalized float
/// representation backends upload as uniforms.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const GREY: Color = Color::rgb(127, 127, 127);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const MAGENTA: Color = Color::rgb(255, 0, 255);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const ORANGE: Color = Color::rgb(255, 127, 0);
    pub const PINK: Color = Color::rgb(255, 0, 127);
    pub const TEAL: Color = Color::rgb(0, 127, 255);
    pub const NEON: Color = Color::rgb(127, 255, 0);
    pub const PURPLE: Color = Color::rgb(127, 0, 255);
    pub const AQUA: Color = Color::rgb(0, 255, 127);
    /// Fully transparent black. Returned by out-of-bounds pixel reads.
    pub const CLEAR: Color = Color::new(0, 0, 0, 0);
    /// Fully transparent white.
    pub const BLANK: Color = Color::new(255, 255, 255, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Builds a color from normalized floats; values are clamped to [0, 1].
    pub fn from_f32(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::new(unit_to_u8(r), unit_to_u8(g), unit_to_u8(b), unit_to_u8(a))
    }

    /// `0xRRGGBBAA`.
    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self::new(
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        )
    }

    /// Parses `RRGGBB` or `RRGGBBAA`, optionally prefixed with `#` or `0x`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex
            .strip_prefix('#')
            .or_else(|| hex.strip_prefix("0x"))
            .or_else(|| hex.strip_prefix("0X"))
            .unwrap_or(hex);

        if !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        match digits.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// `0xRRGGBBAA`.
    #[inline]
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 24) | ((self.g as u32) << 16) | ((self.b as u32) << 8) | self.a as u32
    }

    /// Packs as bytes `[r, g, b, a]` in memory order; this is what vertex colors carry.
    #[inline]
    pub const fn to_packed_rgba(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }

    /// Lower-case `rrggbbaa` (alpha omitted when opaque).
    pub fn hex(self) -> String {
        if self.a == 255 {
            format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    #[inline]
    pub fn r_f(self) -> f32 {
        self.r as f32 / 255.0
    }

    #[inline]
    pub fn g_f(self) -> f32 {
        self.g as f32 / 255.0
    }

    #[inline]
    pub fn b_f(self) -> f32 {
        self.b as f32 / 255.0
    }

    #[inline]
    pub fn a_f(self) -> f32 {
        self.a as f32 / 255.0
    }

    #[inline]
    pub fn to_linear(self) -> [f32; 4] {
        [self.r_f(), self.g_f(), self.b_f(), self.a_f()]
    }

    #[inline]
    pub const fn with_alpha(self, a: u8) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }

    /// Linear interpolation; `t` is clamped to [0, 1].
    pub fn lerp(self, other: Color, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Self::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}

#[inline]
fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl Add for Color {
    type Output = Color;

    fn add(self, o: Color) -> Color {
        Color::new(
            self.r.saturating_add(o.r),
            self.g.saturating_add(o.g),
            self.b.saturating_add(o.b),
            self.a.saturating_add(o.a),
        )
    }
}

impl Sub for Color {
    type Output = Color;

    fn sub(self, o: Color) -> Color {
        Color::new(
            self.r.saturating_sub(o.r),
            self.g.saturating_sub(o.g),
            self.b.saturating_sub(o.b),
            self.a.saturating_sub(o.a),
        )
    }
}

/// Channel-wise modulation (`a * b / 255`).
impl Mul for Color {
    type Output = Color;

    fn mul(self, o: Color) -> Color {
        let m = |a: u8, b: u8| ((a as u16 * b as u16 + 127) / 255) as u8;
        Color::new(m(self.r, o.r), m(self.g, o.g), m(self.b, o.b), m(self.a, o.a))
    }
}

impl Mul<f32> for Color {
    type Output = Color;

    fn mul(self, k: f32) -> Color {
        let m = |c: u8| (c as f32 * k).round().clamp(0.0, 255.0) as u8;
        Color::new(m(self.r), m(self.g), m(self.b), m(self.a))
    }
}

impl From<u32> for Color {
    fn from(value: u32) -> Self {
        Color::from_u32(value)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing_accepts_prefixes() {
        assert_eq!(Color::from_hex("ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(Color::from_hex("#ff800040"), Some(Color::new(255, 128, 0, 64)));
        assert_eq!(Color::from_hex("0x00ff00"), Some(Color::GREEN));
        assert_eq!(Color::from_hex("fff"), None);
        assert_eq!(Color::from_hex("gg0000"), None);
    }

    #[test]
    fn hex_output_omits_opaque_alpha() {
        assert_eq!(Color::rgb(1, 2, 3).hex(), "010203");
        assert_eq!(Color::new(1, 2, 3, 4).hex(), "01020304");
    }

    #[test]
    fn u32_layout_is_rgba_msb_first() {
        let c = Color::new(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.to_u32(), 0x1122_3344);
        assert_eq!(Color::from_u32(0x1122_3344), c);
        assert_eq!(c.to_packed_rgba().to_le_bytes(), [0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(Color::rgb(200, 10, 0) + Color::rgb(100, 10, 0), Color::new(255, 20, 0, 255));
        assert_eq!(Color::rgb(10, 10, 10) - Color::new(20, 5, 0, 0), Color::new(0, 5, 10, 255));
        assert_eq!(Color::WHITE * Color::RED, Color::RED);
        assert_eq!(Color::rgb(100, 100, 100) * 3.0, Color::new(255, 255, 255, 255));
    }

    #[test]
    fn lerp_endpoints() {
        assert_eq!(Color::BLACK.lerp(Color::WHITE, 0.0), Color::BLACK);
        assert_eq!(Color::BLACK.lerp(Color::WHITE, 1.0), Color::WHITE);
        assert_eq!(Color::BLACK.lerp(Color::WHITE, 0.5), Color::rgb(128, 128, 128));
    }

    #[test]
    fn float_round_trip() {
        let c = Color::from_f32(1.0, 0.5, 0.0, 2.0);
        assert_eq!(c, Color::new(255, 128, 0, 255));
        approx::assert_relative_eq!(c.g_f(), 128.0 / 255.0);
    }
}
