//! RGBA color value type used by materials, lights and clear state.

use bytemuck::{Pod, Zeroable};

/// An RGBA color with floating point components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    /// Red component
    pub r: f32,
    /// Green component
    pub g: f32,
    /// Blue component
    pub b: f32,
    /// Alpha component
    pub a: f32,
}

impl Color {
    /// Opaque black
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Opaque white
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Fully transparent black
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a color from components.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque grey where all channels share `v`.
    pub const fn grey(v: f32) -> Self {
        Self::new(v, v, v, 1.0)
    }

    /// Convert to packed 8-bit RGBA, clamping each channel.
    pub fn to_rgba_bytes(self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    /// Build from packed 8-bit RGBA.
    pub fn from_rgba_bytes(bytes: [u8; 4]) -> Self {
        Self::new(
            f32::from(bytes[0]) / 255.0,
            f32::from(bytes[1]) / 255.0,
            f32::from(bytes[2]) / 255.0,
            f32::from(bytes[3]) / 255.0,
        )
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_conversion_round_trips() {
        let c = Color::new(0.5, 0.25, 1.0, 0.0);
        let back = Color::from_rgba_bytes(c.to_rgba_bytes());
        assert!((back.r - 0.5).abs() < 0.01);
        assert!((back.g - 0.25).abs() < 0.01);
        assert_eq!(back.b, 1.0);
        assert_eq!(back.a, 0.0);
    }

    #[test]
    fn out_of_range_channels_clamp() {
        let c = Color::new(2.0, -1.0, 0.0, 1.0);
        assert_eq!(c.to_rgba_bytes(), [255, 0, 0, 255]);
    }
}
