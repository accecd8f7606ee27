//! Polymorphic effect type and the per-tick context passed to engines.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::compositor::FrameBuffer;
use crate::error::LightsResult;
use crate::field::{FieldEffect, FieldPattern};
use crate::geometry::GeometryCache;
use crate::graph_walk::{ChaseConfig, ChaseEffect, GraphWalkConfig, GraphWalkEffect};
use crate::particle::{ParticleConfig, ParticleSystem};
use crate::runner::CancelToken;
use crate::wavefront::{WavefrontConfig, WavefrontEffect};

/// Per-point loops poll cancellation once per this many points.
pub const CANCEL_CHECK_STRIDE: usize = 64;

/// Timing and cancellation for one tick.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext<'a> {
    /// Seconds since the run started.
    pub elapsed: f32,
    /// Real seconds since the previous tick; 0 on the first.
    pub dt: f32,
    /// Nominal seconds between ticks.
    pub interval: f32,
    /// Tick counter, starting at 0.
    pub frame: u64,
    cancel: Option<&'a CancelToken>,
}

impl<'a> FrameContext<'a> {
    pub fn new(elapsed: f32, dt: f32, interval: f32, frame: u64, cancel: &'a CancelToken) -> Self {
        Self {
            elapsed,
            dt,
            interval,
            frame,
            cancel: Some(cancel),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.is_cancelled())
    }
}

impl FrameContext<'static> {
    /// Context with no cancellation source.
    pub fn at(elapsed: f32, dt: f32, interval: f32) -> Self {
        Self {
            elapsed,
            dt,
            interval,
            frame: 0,
            cancel: None,
        }
    }
}

/// Serializable description of an effect, as used by presets and config files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "camelCase")]
pub enum EffectSpec {
    Field(FieldPattern),
    Wavefront(WavefrontConfig),
    Particle(ParticleConfig),
    GraphWalk(GraphWalkConfig),
    Chase(ChaseConfig),
    Solid { color: Color },
}

impl EffectSpec {
    pub fn engine_name(&self) -> &'static str {
        match self {
            EffectSpec::Field(_) => "field",
            EffectSpec::Wavefront(_) => "wavefront",
            EffectSpec::Particle(_) => "particle",
            EffectSpec::GraphWalk(_) => "graphWalk",
            EffectSpec::Chase(_) => "chase",
            EffectSpec::Solid { .. } => "solid",
        }
    }
}

/// A running effect. Owns all mutable animation state for one run.
pub enum Effect {
    Field(FieldEffect),
    Wavefront(WavefrontEffect),
    Particle(ParticleSystem),
    GraphWalk(GraphWalkEffect),
    Chase(ChaseEffect),
    Solid(Color),
}

impl Effect {
    /// Construct and validate an effect. Fails before any frame is produced.
    pub fn build(spec: &EffectSpec, geometry: Arc<GeometryCache>, seed: u64) -> LightsResult<Self> {
        let effect = match spec {
            EffectSpec::Field(pattern) => Effect::Field(FieldEffect::new(pattern.clone(), geometry, seed)?),
            EffectSpec::Wavefront(cfg) => {
                Effect::Wavefront(WavefrontEffect::new(cfg.clone(), geometry, seed)?)
            }
            EffectSpec::Particle(cfg) => Effect::Particle(ParticleSystem::new(cfg.clone(), geometry, seed)?),
            EffectSpec::GraphWalk(cfg) => {
                Effect::GraphWalk(GraphWalkEffect::new(cfg.clone(), geometry, seed)?)
            }
            EffectSpec::Chase(cfg) => Effect::Chase(ChaseEffect::new(cfg.clone(), geometry)?),
            EffectSpec::Solid { color } => Effect::Solid(*color),
        };
        Ok(effect)
    }

    /// Recompute the whole frame for this tick.
    pub fn render(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        match self {
            Effect::Field(e) => e.render(ctx, frame),
            Effect::Wavefront(e) => e.render(ctx, frame),
            Effect::Particle(e) => e.render(ctx, frame),
            Effect::GraphWalk(e) => e.render(ctx, frame),
            Effect::Chase(e) => e.render(ctx, frame),
            Effect::Solid(color) => frame.fill(*color),
        }
    }
}
