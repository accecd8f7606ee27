//! Closed-form phase fields: spirals, helices, swirls, aurora and beams.
//!
//! A field is a pure function of (point, elapsed time). Nothing here keeps
//! state between frames, so a field can run forever without drift.
//!
//! The spiral family shares one phase:
//!
//! ```text
//! φ = θ·k_angular + height_fraction·k_height·π + t·k_speed + offset
//! intensity = ((sin φ + 1) / 2) ^ sharpness
//! ```

use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::compositor::FrameBuffer;
use crate::effect::{FrameContext, CANCEL_CHECK_STRIDE};
use crate::error::{LightsError, LightsResult};
use crate::geometry::GeometryCache;
use crate::rng::Rng;

// ============================================================================
// Configuration
// ============================================================================

/// Which closed-form pattern to evaluate.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "camelCase")]
pub enum FieldPattern {
    Spiral(SpiralConfig),
    Aurora(AuroraConfig),
    Beams(BeamConfig),
}

/// Stripe/spiral parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpiralConfig {
    /// Stripes around the circumference (k_angular).
    pub angular: f32,
    /// Half-turns of phase from bottom to top (k_height).
    pub height: f32,
    /// Radians per second (k_speed). Negative reverses.
    pub speed: f32,
    /// Constant phase offset.
    pub offset: f32,
    /// Exponent ≥ 1 sharpening stripe edges.
    pub sharpness: f32,
    /// Also evaluate the counter-rotating phase and keep the brighter one.
    pub mirrored: bool,
    pub coloring: FieldColoring,
    /// Optional static per-point brightness variation.
    pub dips: Option<BrightnessDips>,
}

impl Default for SpiralConfig {
    fn default() -> Self {
        Self {
            angular: 3.0,
            height: 50.0,
            speed: 4.0,
            offset: 0.0,
            sharpness: 1.0,
            mirrored: false,
            coloring: FieldColoring::Blend {
                low: Color::BLACK,
                high: Color::WHITE,
            },
            dips: None,
        }
    }
}

/// How intensity becomes a color.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum FieldColoring {
    /// Linear blend from `low` (intensity 0) to `high` (intensity 1).
    Blend { low: Color, high: Color },
    /// Saturated hue scaled by intensity. Hue advances with height, angle and time.
    #[serde(rename_all = "camelCase")]
    Hue {
        height_scale: f32,
        angle_scale: f32,
        time_scale: f32,
    },
}

/// A random subset of points gets a permanently lowered peak brightness.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrightnessDips {
    /// Share of points affected, in [0, 1].
    pub fraction: f32,
    /// Lowest peak level (out of 255) an affected point can get.
    pub min_level: u8,
}

impl Default for BrightnessDips {
    fn default() -> Self {
        Self {
            fraction: 0.15,
            min_level: 170,
        }
    }
}

/// Layered-sine aurora over normalized coordinates.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuroraConfig {
    /// Color ramp the noise value walks along. Must be non-empty.
    pub palette: Vec<Color>,
    pub brightness: f32,
    /// Multiplier on elapsed seconds.
    pub time_scale: f32,
    /// Share of the value taken from height (the rest is noise).
    pub height_weight: f32,
    pub height_exponent: f32,
}

impl Default for AuroraConfig {
    fn default() -> Self {
        Self {
            palette: vec![
                Color::new(0, 200, 50),
                Color::new(0, 255, 200),
                Color::new(50, 150, 255),
                Color::new(180, 80, 255),
            ],
            brightness: 1.0,
            time_scale: 1.0,
            height_weight: 0.4,
            height_exponent: 1.5,
        }
    }
}

/// Vertical beams sweeping around the z axis.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BeamConfig {
    pub count: u32,
    /// Larger is wider.
    pub width: f32,
    /// Radians per second.
    pub rotation_speed: f32,
    /// Edge exponent; higher is softer falloff into darkness.
    pub softness: f32,
    pub coloring: BeamColoring,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            count: 1,
            width: 0.45,
            rotation_speed: 0.2,
            softness: 5.0,
            coloring: BeamColoring::Fixed {
                color: Color::WHITE,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum BeamColoring {
    Fixed { color: Color },
    /// Phase-shifted sine rainbow; `rate` is hue cycles per second.
    Rainbow { rate: f32 },
}

// ============================================================================
// Pure evaluation
// ============================================================================

pub fn spiral_phase(cfg: &SpiralConfig, theta: f32, height_fraction: f32, t: f32) -> f32 {
    theta * cfg.angular + height_fraction * cfg.height * PI + t * cfg.speed + cfg.offset
}

/// Raw stripe intensity for a phase, in [0, 1].
pub fn stripe_intensity(phase: f32, sharpness: f32) -> f32 {
    let base = ((phase.sin() + 1.0) * 0.5).clamp(0.0, 1.0);
    if sharpness == 1.0 {
        base
    } else {
        base.powf(sharpness)
    }
}

pub fn spiral_intensity(cfg: &SpiralConfig, theta: f32, height_fraction: f32, t: f32) -> f32 {
    let forward = stripe_intensity(spiral_phase(cfg, theta, height_fraction, t), cfg.sharpness);
    if cfg.mirrored {
        let backward =
            stripe_intensity(spiral_phase(cfg, theta, height_fraction, -t), cfg.sharpness);
        forward.max(backward)
    } else {
        forward
    }
}

/// Multi-octave pseudo-noise in roughly [-1.9, 1.9].
fn aurora_noise(p: Vec3, t: f32) -> f32 {
    let n1 = (TAU * (p.x * 0.5 + t * 0.03)).sin();
    let n2 = (TAU * (p.y * 0.7 - t * 0.025)).sin();
    let n3 = (TAU * (p.z * 0.8 + t * 0.02)).sin();
    let n4 = (TAU * (p.x * 2.0 + p.y * 2.0 - t * 0.065)).sin();
    let n5 = (TAU * (p.y * 3.0 + p.z * 3.0 + t * 0.045)).sin();
    0.6 * n1 + 0.5 * n2 + 0.4 * n3 + 0.2 * n4 + 0.2 * n5
}

/// Walk a palette ramp with `f` in [0, 1].
pub fn palette_ramp(palette: &[Color], f: f32) -> Color {
    match palette.len() {
        0 => Color::BLACK,
        1 => palette[0],
        len => {
            let span = (len - 1) as f32;
            let pos = f.clamp(0.0, 1.0) * span;
            let idx = (pos as usize).min(len - 1);
            let next = (idx + 1).min(len - 1);
            palette[idx].lerp(palette[next], pos.fract())
        }
    }
}

fn beam_value(cfg: &BeamConfig, theta: f32, t: f32) -> f32 {
    let angle = (t * cfg.rotation_speed).rem_euclid(TAU);
    let mut value = 0.0;
    for b in 0..cfg.count {
        let offset = TAU * (b as f32 / cfg.count as f32);
        let diff = ((theta - angle - offset) / cfg.width).sin().abs();
        value += 1.0 - diff;
    }
    value.powf(cfg.softness).clamp(0.0, 1.0)
}

fn beam_color(coloring: &BeamColoring, t: f32) -> Color {
    match coloring {
        BeamColoring::Fixed { color } => *color,
        BeamColoring::Rainbow { rate } => {
            let hue = (t * rate).rem_euclid(1.0);
            let ch = |shift: f32| (((hue + shift) * TAU).sin() * 0.5 + 0.5) * 255.0;
            Color::new(ch(0.0) as u8, ch(0.33) as u8, ch(0.66) as u8)
        }
    }
}

// ============================================================================
// Effect
// ============================================================================

/// A phase field bound to one point cloud.
pub struct FieldEffect {
    pattern: FieldPattern,
    geometry: Arc<GeometryCache>,
    heights: Vec<f32>,
    /// Peak brightness multiplier per point.
    weights: Vec<f32>,
    normalized: Vec<Vec3>,
}

impl FieldEffect {
    pub fn new(pattern: FieldPattern, geometry: Arc<GeometryCache>, seed: u64) -> LightsResult<Self> {
        let n = geometry.len();
        let mut heights = vec![0.0; n];
        let mut weights = vec![1.0; n];
        let mut normalized = Vec::new();

        match &pattern {
            FieldPattern::Spiral(cfg) => {
                validate_spiral(cfg)?;
                if spiral_needs_height(cfg) {
                    heights = geometry.height_fractions()?.to_vec();
                }
                if let Some(dips) = &cfg.dips {
                    weights = dip_weights(n, dips, seed);
                }
            }
            FieldPattern::Aurora(cfg) => {
                if cfg.palette.is_empty() {
                    return Err(LightsError::config("aurora palette must not be empty"));
                }
                if !(0.0..=1.0).contains(&cfg.height_weight) {
                    return Err(LightsError::config("aurora heightWeight must be in [0, 1]"));
                }
                geometry.height_fractions()?;
                normalized = geometry.normalized_positions();
            }
            FieldPattern::Beams(cfg) => {
                if cfg.count == 0 {
                    return Err(LightsError::config("beam count must be at least 1"));
                }
                if cfg.width.is_nan() || cfg.width <= 0.0 || cfg.softness.is_nan() || cfg.softness <= 0.0 {
                    return Err(LightsError::config("beam width and softness must be positive"));
                }
            }
        }

        Ok(Self {
            pattern,
            geometry,
            heights,
            weights,
            normalized,
        })
    }

    pub fn pattern(&self) -> &FieldPattern {
        &self.pattern
    }

    /// Intensity of point `index` at time `t`, in [0, 1].
    pub fn intensity_at(&self, index: usize, t: f32) -> f32 {
        let theta = self.geometry.thetas()[index];
        match &self.pattern {
            FieldPattern::Spiral(cfg) => spiral_intensity(cfg, theta, self.heights[index], t),
            FieldPattern::Aurora(cfg) => self.aurora_value(cfg, index, t),
            FieldPattern::Beams(cfg) => beam_value(cfg, theta, t),
        }
    }

    pub fn color_at(&self, index: usize, t: f32) -> Color {
        let intensity = self.intensity_at(index, t);
        match &self.pattern {
            FieldPattern::Spiral(cfg) => {
                let color = match &cfg.coloring {
                    FieldColoring::Blend { low, high } => low.lerp(*high, intensity),
                    FieldColoring::Hue {
                        height_scale,
                        angle_scale,
                        time_scale,
                    } => {
                        let theta = self.geometry.thetas()[index];
                        let hue = self.heights[index] * height_scale
                            + theta / TAU * angle_scale
                            + t * time_scale;
                        Color::hue(hue).scale(intensity)
                    }
                };
                if self.weights[index] < 1.0 {
                    color.scale(self.weights[index])
                } else {
                    color
                }
            }
            FieldPattern::Aurora(cfg) => palette_ramp(&cfg.palette, intensity).scale(cfg.brightness),
            FieldPattern::Beams(cfg) => beam_color(&cfg.coloring, t).scale(intensity),
        }
    }

    fn aurora_value(&self, cfg: &AuroraConfig, index: usize, t: f32) -> f32 {
        let p = self.normalized[index];
        let noise = (aurora_noise(p, t * cfg.time_scale) + 1.0) * 0.5;
        let height = p.z.max(0.0).powf(cfg.height_exponent);
        (noise * (1.0 - cfg.height_weight) + height * cfg.height_weight).clamp(0.0, 1.0)
    }

    pub fn render(&self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        for i in 0..frame.len() {
            if i % CANCEL_CHECK_STRIDE == 0 && ctx.is_cancelled() {
                return;
            }
            frame.set(i, self.color_at(i, ctx.elapsed));
        }
    }
}

fn validate_spiral(cfg: &SpiralConfig) -> LightsResult<()> {
    let params = [cfg.angular, cfg.height, cfg.speed, cfg.offset, cfg.sharpness];
    if params.iter().any(|v| !v.is_finite()) {
        return Err(LightsError::config("spiral parameters must be finite"));
    }
    if cfg.sharpness < 1.0 {
        return Err(LightsError::config(format!(
            "spiral sharpness {} must be at least 1",
            cfg.sharpness
        )));
    }
    if let Some(dips) = &cfg.dips {
        if !(0.0..=1.0).contains(&dips.fraction) {
            return Err(LightsError::config("dip fraction must be in [0, 1]"));
        }
    }
    Ok(())
}

fn spiral_needs_height(cfg: &SpiralConfig) -> bool {
    let hue_uses_height = matches!(
        cfg.coloring,
        FieldColoring::Hue { height_scale, .. } if height_scale != 0.0
    );
    cfg.height != 0.0 || hue_uses_height
}

fn dip_weights(n: usize, dips: &BrightnessDips, seed: u64) -> Vec<f32> {
    let mut rng = Rng::new(seed);
    let mut weights = vec![1.0; n];
    let count = (n as f32 * dips.fraction) as usize;
    // Partial Fisher-Yates picks `count` distinct points.
    let mut order: Vec<usize> = (0..n).collect();
    for k in 0..count.min(n) {
        let j = k + rng.below(n - k);
        order.swap(k, j);
        weights[order[k]] = f32::from(rng.range_u8(dips.min_level, 255)) / 255.0;
    }
    weights
}
