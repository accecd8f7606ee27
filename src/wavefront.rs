//! Expanding wavefronts: contagion fill, pulse rings and plane sweeps.
//!
//! One wave at a time moves through
//! `Spawning → Expanding → Hold → Reset → Spawning`. Membership is a
//! distance test against a per-wave distance table computed once at spawn:
//! Euclidean distance from the origin for spheres, offset along a random
//! unit normal for planes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::compositor::FrameBuffer;
use crate::effect::{FrameContext, CANCEL_CHECK_STRIDE};
use crate::error::{LightsError, LightsResult};
use crate::geometry::GeometryCache;
use crate::rng::Rng;

/// Upper bound on state transitions resolved within one tick.
const MAX_TRANSITIONS_PER_TICK: usize = 4;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaveShape {
    /// Sphere growing from an origin point.
    #[default]
    Sphere,
    /// Plane sweeping along a random unit normal.
    Plane,
}

/// Which points a wave lights.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "camelCase")]
pub enum Membership {
    /// Lit once inside the radius, stays lit until the wave resets.
    MonotonicFill,
    /// Lit while `radius - decay_width <= d < radius + step`.
    #[serde(rename_all = "camelCase")]
    DecayingBand { decay_width: f32 },
    /// Lit while within half a slab of the front. The slab is
    /// `thickness_fraction` of the wave's full reach, fixed at spawn.
    #[serde(rename_all = "camelCase")]
    Slab { thickness_fraction: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "camelCase")]
pub enum OriginPolicy {
    Random,
    Fixed { index: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum WaveColor {
    /// Each channel drawn from [min, max].
    Random { min: u8, max: u8 },
    Fixed { color: Color },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WavefrontConfig {
    pub shape: WaveShape,
    pub membership: Membership,
    /// Ignored for planes, which always start at the lowest projection.
    pub origin: OriginPolicy,
    pub color: WaveColor,
    /// Radius growth in coordinate units per second.
    pub speed: f32,
    /// Seconds the fully lit cloud is held (monotonic fill only).
    pub hold: f32,
    /// Dark pause in seconds before the next wave.
    pub cooldown: f32,
    /// Cap on summed brightness, in fully-lit-point units.
    pub constant_brightness: Option<f32>,
}

impl Default for WavefrontConfig {
    fn default() -> Self {
        Self {
            shape: WaveShape::Sphere,
            membership: Membership::MonotonicFill,
            origin: OriginPolicy::Random,
            color: WaveColor::Random { min: 150, max: 255 },
            speed: 9.5,
            hold: 0.5,
            cooldown: 0.02,
            constant_brightness: None,
        }
    }
}

impl WavefrontConfig {
    pub fn validate(&self, point_count: usize) -> LightsResult<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(LightsError::config(format!(
                "wave speed {} must be positive",
                self.speed
            )));
        }
        if self.hold.is_nan() || self.hold < 0.0 || self.cooldown.is_nan() || self.cooldown < 0.0 {
            return Err(LightsError::config("hold and cooldown must not be negative"));
        }
        if let Membership::DecayingBand { decay_width } = self.membership {
            if decay_width.is_nan() || decay_width < 0.0 {
                return Err(LightsError::config("decay width must not be negative"));
            }
        }
        if let Membership::Slab { thickness_fraction } = self.membership {
            if !thickness_fraction.is_finite() || thickness_fraction <= 0.0 {
                return Err(LightsError::config(format!(
                    "slab thickness fraction {} must be positive",
                    thickness_fraction
                )));
            }
        }
        if let OriginPolicy::Fixed { index } = self.origin {
            if index >= point_count {
                return Err(LightsError::config(format!(
                    "wave origin {} is outside the {} points",
                    index, point_count
                )));
            }
        }
        if let Some(target) = self.constant_brightness {
            if target.is_nan() || target <= 0.0 {
                return Err(LightsError::config("constant brightness target must be positive"));
            }
        }
        Ok(())
    }
}

/// Slab membership test: within half a thickness of the front, both sides inclusive.
pub fn slab_contains(distance: f32, front: f32, thickness: f32) -> bool {
    (distance - front).abs() <= thickness * 0.5
}

/// Ring membership test with an inclusive inner edge.
pub fn band_contains(distance: f32, radius: f32, decay_width: f32, step: f32) -> bool {
    radius - decay_width <= distance && distance < radius + step
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WavePhase {
    Spawning,
    Expanding,
    /// Fully lit until the given elapsed time.
    Hold { until: f32 },
    /// Dark until the given elapsed time.
    Reset { until: f32 },
}

struct Wave {
    origin: usize,
    spawn_time: f32,
    color: Color,
    distances: Vec<f32>,
    max_distance: f32,
    lit: Vec<bool>,
}

pub struct WavefrontEffect {
    config: WavefrontConfig,
    geometry: Arc<GeometryCache>,
    rng: Rng,
    phase: WavePhase,
    wave: Option<Wave>,
    waves_started: u64,
    last_full_at: Option<f32>,
}

impl WavefrontEffect {
    pub fn new(config: WavefrontConfig, geometry: Arc<GeometryCache>, seed: u64) -> LightsResult<Self> {
        config.validate(geometry.len())?;
        geometry.require_extent()?;
        Ok(Self {
            config,
            geometry,
            rng: Rng::new(seed),
            phase: WavePhase::Spawning,
            wave: None,
            waves_started: 0,
            last_full_at: None,
        })
    }

    pub fn phase(&self) -> WavePhase {
        self.phase
    }

    /// Elapsed time at which the most recent fill completed.
    pub fn last_full_at(&self) -> Option<f32> {
        self.last_full_at
    }

    pub fn waves_started(&self) -> u64 {
        self.waves_started
    }

    pub fn origin(&self) -> Option<usize> {
        self.wave.as_ref().map(|w| w.origin)
    }

    fn spawn(&mut self, t: f32) {
        let n = self.geometry.len();
        let color = match self.config.color {
            WaveColor::Fixed { color } => color,
            WaveColor::Random { min, max } => Color::new(
                self.rng.range_u8(min, max),
                self.rng.range_u8(min, max),
                self.rng.range_u8(min, max),
            ),
        };

        let (origin, distances) = match self.config.shape {
            WaveShape::Sphere => {
                let origin = match self.config.origin {
                    OriginPolicy::Fixed { index } => index,
                    OriginPolicy::Random => self.rng.below(n),
                };
                (origin, self.geometry.distances_from(origin))
            }
            WaveShape::Plane => {
                let normal = self.rng.unit_vector();
                let projections: Vec<f32> = self
                    .geometry
                    .cloud()
                    .points()
                    .iter()
                    .map(|p| p.position.dot(normal))
                    .collect();
                let (origin, min_p) = projections
                    .iter()
                    .copied()
                    .enumerate()
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .unwrap_or((0, 0.0));
                (origin, projections.iter().map(|p| p - min_p).collect())
            }
        };

        let max_distance = distances.iter().copied().fold(0.0, f32::max);
        log::debug!(
            "Wave {} spawned at point {} (reach {:.1})",
            self.waves_started,
            origin,
            max_distance
        );

        self.wave = Some(Wave {
            origin,
            spawn_time: t,
            color,
            distances,
            max_distance,
            lit: vec![false; n],
        });
        self.waves_started += 1;
    }

    pub fn render(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        let t = ctx.elapsed;
        frame.clear();

        for _ in 0..MAX_TRANSITIONS_PER_TICK {
            match self.phase {
                WavePhase::Spawning => {
                    self.spawn(t);
                    self.phase = WavePhase::Expanding;
                }
                WavePhase::Reset { until } => {
                    if t < until {
                        return;
                    }
                    self.phase = WavePhase::Spawning;
                }
                WavePhase::Hold { until } => {
                    if t >= until {
                        self.wave = None;
                        self.phase = WavePhase::Reset {
                            until: t + self.config.cooldown,
                        };
                        continue;
                    }
                    if let Some(wave) = &self.wave {
                        frame.fill(wave.color);
                    }
                    self.apply_brightness_cap(frame);
                    return;
                }
                WavePhase::Expanding => {
                    if self.expand(ctx, frame) {
                        self.apply_brightness_cap(frame);
                        return;
                    }
                }
            }
        }
    }

    /// Advance the current wave. Returns `false` when the phase changed and
    /// the tick needs another transition.
    fn expand(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) -> bool {
        let t = ctx.elapsed;
        let Some(wave) = self.wave.as_mut() else {
            self.phase = WavePhase::Spawning;
            return false;
        };
        let radius = self.config.speed * (t - wave.spawn_time).max(0.0);

        match self.config.membership {
            Membership::MonotonicFill => {
                for (i, &d) in wave.distances.iter().enumerate() {
                    if i % CANCEL_CHECK_STRIDE == 0 && ctx.is_cancelled() {
                        return true;
                    }
                    if d <= radius {
                        wave.lit[i] = true;
                    }
                    if wave.lit[i] {
                        frame.set(i, wave.color);
                    }
                }
                if radius >= wave.max_distance {
                    self.last_full_at = Some(t);
                    self.phase = WavePhase::Hold {
                        until: t + self.config.hold,
                    };
                    log::debug!("Wave reached full at {:.3}s", t);
                }
                true
            }
            Membership::DecayingBand { decay_width } => {
                if radius - decay_width > wave.max_distance {
                    self.phase = WavePhase::Reset {
                        until: t + self.config.cooldown,
                    };
                    return false;
                }
                let step = self.config.speed * ctx.interval;
                for (i, &d) in wave.distances.iter().enumerate() {
                    if i % CANCEL_CHECK_STRIDE == 0 && ctx.is_cancelled() {
                        return true;
                    }
                    let inside = band_contains(d, radius, decay_width, step);
                    wave.lit[i] = inside;
                    if inside {
                        frame.set(i, wave.color);
                    }
                }
                true
            }
            Membership::Slab { thickness_fraction } => {
                let thickness = thickness_fraction * wave.max_distance;
                if radius - thickness * 0.5 > wave.max_distance {
                    self.phase = WavePhase::Reset {
                        until: t + self.config.cooldown,
                    };
                    return false;
                }
                for (i, &d) in wave.distances.iter().enumerate() {
                    if i % CANCEL_CHECK_STRIDE == 0 && ctx.is_cancelled() {
                        return true;
                    }
                    let inside = slab_contains(d, radius, thickness);
                    wave.lit[i] = inside;
                    if inside {
                        frame.set(i, wave.color);
                    }
                }
                true
            }
        }
    }

    fn apply_brightness_cap(&self, frame: &mut FrameBuffer) {
        if let Some(target) = self.config.constant_brightness {
            frame.normalize_lit(target);
        }
    }
}
