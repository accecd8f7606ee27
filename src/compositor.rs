//! Frame buffer, blend policies and brightness normalization.
//!
//! Every channel is a `u8`, so every blend is saturating by construction and
//! channel values can never leave [0, 255].

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// How a contribution combines with what is already at a point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendMode {
    /// Last writer wins.
    Overwrite,
    /// Brightest channel wins.
    #[default]
    Max,
    /// Channels add and saturate at 255.
    Add,
}

impl BlendMode {
    pub fn apply(self, under: Color, over: Color) -> Color {
        match self {
            BlendMode::Overwrite => over,
            BlendMode::Max => under.max(over),
            BlendMode::Add => under.saturating_add(over),
        }
    }
}

/// One color per point, index-aligned with the point cloud.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    pixels: Vec<Color>,
}

impl FrameBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Color::BLACK; len],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn clear(&mut self) {
        self.fill(Color::BLACK);
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.iter_mut().for_each(|p| *p = color);
    }

    pub fn get(&self, index: usize) -> Color {
        self.pixels[index]
    }

    pub fn set(&mut self, index: usize, color: Color) {
        self.pixels[index] = color;
    }

    pub fn blend(&mut self, index: usize, color: Color, mode: BlendMode) {
        let px = &mut self.pixels[index];
        *px = mode.apply(*px, color);
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn copy_from(&mut self, other: &FrameBuffer) {
        self.pixels.copy_from_slice(&other.pixels);
    }

    pub fn is_dark(&self) -> bool {
        self.pixels.iter().all(|p| p.is_dark())
    }

    pub fn lit_count(&self) -> usize {
        self.pixels.iter().filter(|p| !p.is_dark()).count()
    }

    /// Scale every lit point by `min(1, target_total / lit_count)`.
    ///
    /// Keeps the summed output roughly constant as a wave lights more of
    /// the cloud. Returns the factor applied.
    pub fn normalize_lit(&mut self, target_total: f32) -> f32 {
        let lit = self.lit_count();
        if lit == 0 {
            return 1.0;
        }
        let factor = (target_total / lit as f32).clamp(0.0, 1.0);
        if factor < 1.0 {
            self.scale(factor);
        }
        factor
    }

    pub fn scale(&mut self, factor: f32) {
        for px in &mut self.pixels {
            *px = px.scale(factor);
        }
    }
}

// ============================================================================
// Afterglow
// ============================================================================

/// Persistent trail buffer: faded every tick, then max-combined with fresh light.
#[derive(Clone, Debug)]
pub struct Afterglow {
    buffer: FrameBuffer,
    /// Per-tick multiplier in [0, 1].
    fade: f32,
}

impl Afterglow {
    pub fn new(len: usize, fade: f32) -> Self {
        Self {
            buffer: FrameBuffer::new(len),
            fade: fade.clamp(0.0, 1.0),
        }
    }

    /// Apply one tick of decay.
    pub fn decay(&mut self) {
        self.buffer.scale(self.fade);
    }

    pub fn add(&mut self, index: usize, color: Color) {
        self.buffer.blend(index, color, BlendMode::Max);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn write_to(&self, frame: &mut FrameBuffer) {
        frame.copy_from(&self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_saturates_with_overlaps() {
        let mut frame = FrameBuffer::new(1);
        for _ in 0..3 {
            frame.blend(0, Color::WHITE, BlendMode::Add);
        }
        assert_eq!(frame.get(0), Color::WHITE);
        frame.clear();
        frame.blend(0, Color::new(200, 10, 0), BlendMode::Add);
        frame.blend(0, Color::new(100, 10, 0), BlendMode::Add);
        assert_eq!(frame.get(0), Color::new(255, 20, 0));
    }

    #[test]
    fn test_max_keeps_brightest_channel() {
        let mut frame = FrameBuffer::new(1);
        frame.blend(0, Color::new(200, 10, 0), BlendMode::Max);
        frame.blend(0, Color::new(100, 50, 0), BlendMode::Max);
        assert_eq!(frame.get(0), Color::new(200, 50, 0));
    }

    #[test]
    fn test_overwrite_is_last_writer() {
        let mut frame = FrameBuffer::new(1);
        frame.blend(0, Color::RED, BlendMode::Overwrite);
        frame.blend(0, Color::BLUE, BlendMode::Overwrite);
        assert_eq!(frame.get(0), Color::BLUE);
    }

    #[test]
    fn test_normalize_lit_caps_total() {
        let mut frame = FrameBuffer::new(10);
        for i in 0..8 {
            frame.set(i, Color::WHITE);
        }
        let factor = frame.normalize_lit(4.0);
        assert!((factor - 0.5).abs() < 1e-6);
        assert_eq!(frame.get(0), Color::new(127, 127, 127));
        assert_eq!(frame.get(9), Color::BLACK);

        // Under target: untouched.
        let mut frame = FrameBuffer::new(10);
        frame.set(3, Color::WHITE);
        assert_eq!(frame.normalize_lit(4.0), 1.0);
        assert_eq!(frame.get(3), Color::WHITE);
    }

    #[test]
    fn test_afterglow_fades_toward_dark() {
        let mut glow = Afterglow::new(2, 0.5);
        glow.add(0, Color::new(200, 100, 0));
        glow.decay();
        glow.add(1, Color::new(10, 0, 0));
        let mut frame = FrameBuffer::new(2);
        glow.write_to(&mut frame);
        assert_eq!(frame.get(0), Color::new(100, 50, 0));
        assert_eq!(frame.get(1), Color::new(10, 0, 0));
        for _ in 0..10 {
            glow.decay();
        }
        glow.write_to(&mut frame);
        assert!(frame.is_dark());
    }
}
