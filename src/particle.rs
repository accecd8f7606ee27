//! Particle system types and per-tick evaluation.
//!
//! Two families share one pool:
//! - bursts: a random point lights everything within a blast radius and
//!   fades out over a fixed duration (fireworks);
//! - movers: a fixed population of light sources travelling through the
//!   cloud at a speed in units per second (meteors, rain, snow).
//!
//! Movement uses the real elapsed `dt` of the tick, so trajectories do not
//! depend on the frame rate.

use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::compositor::{Afterglow, BlendMode, FrameBuffer};
use crate::effect::{FrameContext, CANCEL_CHECK_STRIDE};
use crate::error::{LightsError, LightsResult};
use crate::geometry::GeometryCache;
use crate::rng::Rng;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a particle system.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParticleConfig {
    /// Maximum number of live instances. The oldest is evicted past this.
    pub max_instances: usize,
    /// Particle behaviour.
    pub kind: ParticleKind,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            max_instances: 256,
            kind: ParticleKind::Burst(BurstConfig::default()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParticleKind {
    Burst(BurstConfig),
    Meteor(MeteorConfig),
    Rain(RainConfig),
    Snow(SnowConfig),
}

/// Where bursts are centred.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bias", rename_all = "camelCase")]
pub enum SpawnBias {
    #[default]
    Uniform,
    /// Among points in the top `band` fraction of the height.
    Highest { band: f32 },
    /// Among points in the bottom `band` fraction of the height.
    Lowest { band: f32 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BurstConfig {
    /// Probability of one new burst per tick.
    pub spawn_chance: f32,
    /// Lifetime in seconds.
    pub duration: f32,
    /// Blast radius as a fraction of the bounding-box diagonal.
    pub blast_radius: f32,
    /// Each burst picks one group, then one color per affected point.
    pub palettes: Vec<Vec<Color>>,
    pub bias: SpawnBias,
    pub blend: BlendMode,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            spawn_chance: 0.4,
            duration: 0.6,
            blast_radius: 0.38,
            palettes: vec![
                vec![
                    Color::new(0, 255, 0),
                    Color::new(69, 255, 0),
                    Color::new(255, 255, 0),
                ],
                vec![
                    Color::new(105, 255, 180),
                    Color::new(0, 128, 128),
                    Color::new(0, 0, 255),
                ],
                vec![
                    Color::new(0, 0, 255),
                    Color::new(255, 255, 0),
                    Color::new(255, 255, 255),
                ],
            ],
            bias: SpawnBias::Uniform,
            blend: BlendMode::Add,
        }
    }
}

/// Free 3D movers with a distance-tailed glow.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeteorConfig {
    pub count: usize,
    pub speed_min: f32,
    pub speed_max: f32,
    /// Glow reach around the head, in coordinate units.
    pub tail_min: f32,
    pub tail_max: f32,
    pub palette: Vec<Color>,
    /// Afterglow multiplier per tick.
    pub fade: f32,
}

impl Default for MeteorConfig {
    fn default() -> Self {
        Self {
            count: 14,
            speed_min: 25.0,
            speed_max: 55.0,
            tail_min: 15.0,
            tail_max: 30.0,
            palette: vec![
                Color::new(255, 255, 255),
                Color::new(180, 220, 255),
                Color::new(100, 180, 255),
                Color::new(255, 240, 180),
                Color::new(160, 255, 200),
            ],
            fade: 0.76,
        }
    }
}

/// Streams falling along z, bright at the head with a linear tail.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RainConfig {
    pub streams: usize,
    pub speed_min: f32,
    pub speed_max: f32,
    pub length_min: f32,
    pub length_max: f32,
    pub brightness_min: u8,
    pub brightness_max: u8,
    pub color: Color,
    pub fade: f32,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            streams: 12,
            speed_min: 15.0,
            speed_max: 28.0,
            length_min: 18.0,
            length_max: 33.0,
            brightness_min: 180,
            brightness_max: 255,
            color: Color::GREEN,
            fade: 0.78,
        }
    }
}

/// Flakes falling along z, each drawn on the point nearest its height.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnowConfig {
    pub flakes: usize,
    /// Fall speed in units per second.
    pub speed: f32,
    /// Brightness lost per second, out of 255.
    pub dim_rate: f32,
    pub color: Color,
}

impl Default for SnowConfig {
    fn default() -> Self {
        Self {
            flakes: 45,
            speed: 23.0,
            dim_rate: 166.0,
            color: Color::WHITE,
        }
    }
}

fn check_range(name: &str, lo: f32, hi: f32) -> LightsResult<()> {
    if !lo.is_finite() || !hi.is_finite() || lo <= 0.0 || hi < lo {
        return Err(LightsError::config(format!(
            "{} range [{}, {}] must be positive and ordered",
            name, lo, hi
        )));
    }
    Ok(())
}

fn check_fade(fade: f32) -> LightsResult<()> {
    if fade.is_nan() || !(0.0..=1.0).contains(&fade) {
        return Err(LightsError::config(format!("fade {} must be in [0, 1]", fade)));
    }
    Ok(())
}

fn check_count(name: &str, count: usize, max_instances: usize) -> LightsResult<()> {
    if count == 0 || count > max_instances {
        return Err(LightsError::config(format!(
            "{} count {} must be in [1, {}]",
            name, count, max_instances
        )));
    }
    Ok(())
}

impl ParticleConfig {
    pub fn validate(&self) -> LightsResult<()> {
        if self.max_instances == 0 {
            return Err(LightsError::config("max instances must be at least 1"));
        }
        match &self.kind {
            ParticleKind::Burst(cfg) => {
                if cfg.spawn_chance.is_nan() || !(0.0..=1.0).contains(&cfg.spawn_chance) {
                    return Err(LightsError::config(format!(
                        "spawn chance {} must be in [0, 1]",
                        cfg.spawn_chance
                    )));
                }
                if !cfg.duration.is_finite() || cfg.duration <= 0.0 {
                    return Err(LightsError::config(format!(
                        "burst duration {} must be positive",
                        cfg.duration
                    )));
                }
                if cfg.blast_radius.is_nan() || cfg.blast_radius < 0.0 {
                    return Err(LightsError::config("blast radius must not be negative"));
                }
                if cfg.palettes.is_empty() || cfg.palettes.iter().any(|p| p.is_empty()) {
                    return Err(LightsError::config("burst palettes must not be empty"));
                }
                if let SpawnBias::Highest { band } | SpawnBias::Lowest { band } = cfg.bias {
                    if band.is_nan() || band <= 0.0 || band > 1.0 {
                        return Err(LightsError::config(format!(
                            "spawn band {} must be in (0, 1]",
                            band
                        )));
                    }
                }
            }
            ParticleKind::Meteor(cfg) => {
                check_count("meteor", cfg.count, self.max_instances)?;
                check_range("meteor speed", cfg.speed_min, cfg.speed_max)?;
                check_range("meteor tail", cfg.tail_min, cfg.tail_max)?;
                check_fade(cfg.fade)?;
                if cfg.palette.is_empty() {
                    return Err(LightsError::config("meteor palette must not be empty"));
                }
            }
            ParticleKind::Rain(cfg) => {
                check_count("rain stream", cfg.streams, self.max_instances)?;
                check_range("rain speed", cfg.speed_min, cfg.speed_max)?;
                check_range("rain length", cfg.length_min, cfg.length_max)?;
                check_fade(cfg.fade)?;
            }
            ParticleKind::Snow(cfg) => {
                check_count("snow flake", cfg.flakes, self.max_instances)?;
                if !cfg.speed.is_finite() || cfg.speed <= 0.0 {
                    return Err(LightsError::config("snow speed must be positive"));
                }
                if cfg.dim_rate.is_nan() || cfg.dim_rate < 0.0 {
                    return Err(LightsError::config("snow dim rate must not be negative"));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Instances
// ============================================================================

/// A single particle instance.
#[derive(Clone, Debug)]
pub enum ParticleInstance {
    /// Fading burst over a fixed set of points.
    Burst {
        /// Spawn time in seconds.
        birth: f32,
        /// Affected points and their assigned colors.
        members: Vec<(usize, Color)>,
    },
    /// Point light moving along a fixed direction.
    Mover {
        position: Vec3,
        /// Unit direction.
        direction: Vec3,
        /// Units per second.
        speed: f32,
        /// Glow or tail length.
        reach: f32,
        color: Color,
    },
    /// Snowflake pinned to the point nearest its height.
    Flake {
        height: f32,
        /// Remaining brightness out of 255.
        level: f32,
        point: usize,
    },
}

/// Bounded pool of particles driven by one [`ParticleConfig`].
pub struct ParticleSystem {
    config: ParticleConfig,
    geometry: Arc<GeometryCache>,
    instances: Vec<ParticleInstance>,
    afterglow: Option<Afterglow>,
    blast_radius: f32,
    /// Candidate burst centres; empty means uniform.
    spawn_pool: Vec<usize>,
    /// Deterministic RNG state.
    rng: Rng,
}

impl ParticleSystem {
    pub fn new(config: ParticleConfig, geometry: Arc<GeometryCache>, seed: u64) -> LightsResult<Self> {
        config.validate()?;
        geometry.require_extent()?;

        let mut blast_radius = 0.0;
        let mut spawn_pool = Vec::new();
        let mut afterglow = None;
        match &config.kind {
            ParticleKind::Burst(cfg) => {
                blast_radius = cfg.blast_radius * geometry.bounds().diagonal();
                spawn_pool = match cfg.bias {
                    SpawnBias::Uniform => Vec::new(),
                    SpawnBias::Highest { band } => {
                        let heights = geometry.height_fractions()?;
                        (0..heights.len()).filter(|&i| heights[i] >= 1.0 - band).collect()
                    }
                    SpawnBias::Lowest { band } => {
                        let heights = geometry.height_fractions()?;
                        (0..heights.len()).filter(|&i| heights[i] <= band).collect()
                    }
                };
            }
            ParticleKind::Meteor(cfg) => afterglow = Some(Afterglow::new(geometry.len(), cfg.fade)),
            ParticleKind::Rain(cfg) => afterglow = Some(Afterglow::new(geometry.len(), cfg.fade)),
            ParticleKind::Snow(_) => {}
        }

        let mut system = Self {
            instances: Vec::with_capacity(config.max_instances),
            config,
            geometry,
            afterglow,
            blast_radius,
            spawn_pool,
            rng: Rng::new(seed),
        };
        system.seed_movers();
        Ok(system)
    }

    /// Get the current number of live instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instances(&self) -> &[ParticleInstance] {
        &self.instances
    }

    fn seed_movers(&mut self) {
        let count = match &self.config.kind {
            ParticleKind::Burst(_) => 0,
            ParticleKind::Meteor(cfg) => cfg.count,
            ParticleKind::Rain(cfg) => cfg.streams,
            ParticleKind::Snow(cfg) => cfg.flakes,
        };
        for _ in 0..count {
            let instance = match &self.config.kind {
                ParticleKind::Snow(_) => {
                    let point = self.rng.below(self.geometry.len());
                    ParticleInstance::Flake {
                        height: self.geometry.position(point).z,
                        level: 255.0,
                        point,
                    }
                }
                _ => self.spawn_mover(),
            };
            self.instances.push(instance);
        }
    }

    /// Spawn a new burst at `t`, evicting the oldest instance when full.
    fn spawn_burst(&mut self, t: f32) {
        let ParticleKind::Burst(cfg) = &self.config.kind else {
            return;
        };
        if self.instances.len() >= self.config.max_instances {
            self.instances.remove(0);
        }

        let center = if self.spawn_pool.is_empty() {
            self.rng.below(self.geometry.len())
        } else {
            self.spawn_pool[self.rng.below(self.spawn_pool.len())]
        };
        let mut affected = self.geometry.within_radius(center, self.blast_radius);
        if affected.is_empty() {
            affected.push(center);
        }

        let group = &cfg.palettes[self.rng.below(cfg.palettes.len())];
        let members = affected
            .into_iter()
            .map(|i| (i, group[self.rng.below(group.len())]))
            .collect();
        self.instances.push(ParticleInstance::Burst { birth: t, members });
    }

    fn spawn_mover(&mut self) -> ParticleInstance {
        let bounds = self.geometry.bounds();
        let rng = &mut self.rng;
        match &self.config.kind {
            ParticleKind::Meteor(cfg) => {
                let outer = bounds.max.x.max(bounds.max.y);
                let position = if rng.chance(0.5) {
                    Vec3::new(
                        rng.range_f32(bounds.min.x, bounds.max.x),
                        rng.range_f32(bounds.min.y, bounds.max.y),
                        bounds.max.z + rng.range_f32(5.0, 20.0),
                    )
                } else {
                    let theta = rng.range_f32(0.0, std::f32::consts::TAU);
                    let radius = outer + 10.0;
                    Vec3::new(
                        radius * theta.cos(),
                        radius * theta.sin(),
                        rng.range_f32(bounds.min.z, bounds.max.z),
                    )
                };
                let target = Vec3::new(
                    rng.range_f32(bounds.min.x, bounds.max.x),
                    rng.range_f32(bounds.min.y, bounds.max.y),
                    rng.range_f32(bounds.min.z - 10.0, bounds.max.z * 0.5),
                );
                let direction = (target - position).try_normalize().unwrap_or(Vec3::NEG_Z);
                let speed = rng.range_f32(cfg.speed_min, cfg.speed_max);
                let reach = rng.range_f32(cfg.tail_min, cfg.tail_max);
                let color = rng.pick(&cfg.palette).copied().unwrap_or(Color::WHITE);
                ParticleInstance::Mover {
                    position,
                    direction,
                    speed,
                    reach,
                    color,
                }
            }
            ParticleKind::Rain(cfg) => {
                let head = bounds.max.z + rng.range_f32(5.0, 20.0);
                let speed = rng.range_f32(cfg.speed_min, cfg.speed_max);
                let reach = rng.range_f32(cfg.length_min, cfg.length_max);
                let level = f32::from(rng.range_u8(cfg.brightness_min, cfg.brightness_max)) / 255.0;
                ParticleInstance::Mover {
                    position: Vec3::new(0.0, 0.0, head),
                    direction: Vec3::NEG_Z,
                    speed,
                    reach,
                    color: cfg.color.scale(level),
                }
            }
            ParticleKind::Burst(_) | ParticleKind::Snow(_) => ParticleInstance::Mover {
                position: bounds.center(),
                direction: Vec3::NEG_Z,
                speed: 0.0,
                reach: 0.0,
                color: Color::BLACK,
            },
        }
    }

    fn out_of_bounds(&self, position: Vec3) -> bool {
        let bounds = self.geometry.bounds();
        match &self.config.kind {
            ParticleKind::Meteor(_) => {
                let outer = bounds.max.x.max(bounds.max.y);
                position.z < bounds.min.z - 10.0 || position.truncate().length() > outer + 50.0
            }
            _ => position.z < bounds.min.z - 10.0,
        }
    }

    pub fn render(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        match self.config.kind {
            ParticleKind::Burst(_) => self.render_bursts(ctx, frame),
            ParticleKind::Meteor(_) | ParticleKind::Rain(_) => self.render_movers(ctx, frame),
            ParticleKind::Snow(_) => self.render_snow(ctx, frame),
        }
    }

    fn render_bursts(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        let t = ctx.elapsed;
        let (spawn_chance, duration, blend) = match &self.config.kind {
            ParticleKind::Burst(cfg) => (cfg.spawn_chance, cfg.duration, cfg.blend),
            _ => return,
        };

        if self.rng.chance(spawn_chance) {
            self.spawn_burst(t);
        }
        self.instances.retain(|p| match p {
            ParticleInstance::Burst { birth, .. } => t - birth < duration,
            _ => false,
        });

        frame.clear();
        for (n, particle) in self.instances.iter().enumerate() {
            if n % CANCEL_CHECK_STRIDE == 0 && ctx.is_cancelled() {
                return;
            }
            if let ParticleInstance::Burst { birth, members } = particle {
                let fade = (1.0 - (t - birth) / duration).clamp(0.0, 1.0);
                for &(i, color) in members {
                    frame.blend(i, color.scale(fade), blend);
                }
            }
        }
    }

    fn render_movers(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        let dt = ctx.dt.max(0.0);
        let Some(mut glow) = self.afterglow.take() else {
            return;
        };
        glow.decay();

        for n in 0..self.instances.len() {
            if ctx.is_cancelled() {
                break;
            }
            let mut moved = self.instances[n].clone();
            if let ParticleInstance::Mover {
                position,
                direction,
                speed,
                ..
            } = &mut moved
            {
                *position += *direction * *speed * dt;
                if self.out_of_bounds(*position) {
                    moved = self.spawn_mover();
                }
            }
            if let ParticleInstance::Mover {
                position,
                reach,
                color,
                ..
            } = &moved
            {
                self.light_mover(*position, *reach, *color, &mut glow);
            }
            self.instances[n] = moved;
        }

        glow.write_to(frame);
        self.afterglow = Some(glow);
    }

    fn light_mover(&self, head: Vec3, reach: f32, color: Color, glow: &mut Afterglow) {
        let rain = matches!(self.config.kind, ParticleKind::Rain(_));
        for p in self.geometry.cloud().points() {
            let level = if rain {
                // Vertical segment [head - reach, head].
                let below = head.z - p.position.z;
                if !(0.0..=reach).contains(&below) {
                    continue;
                }
                1.0 - below / reach
            } else {
                let d = p.position.distance(head);
                if d >= reach {
                    continue;
                }
                1.0 - d / reach
            };
            glow.add(p.index, color.scale(level));
        }
    }

    fn render_snow(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        let ParticleKind::Snow(cfg) = &self.config.kind else {
            return;
        };
        let (speed, dim_rate, color) = (cfg.speed, cfg.dim_rate, cfg.color);
        let dt = ctx.dt.max(0.0);
        let bounds = self.geometry.bounds();

        frame.clear();
        for flake in &mut self.instances {
            if let ParticleInstance::Flake {
                height,
                level,
                point,
            } = flake
            {
                *height -= speed * dt;
                *level = (*level - dim_rate * dt).max(0.0);
                if *height <= bounds.min.z - 2.0 {
                    *height = self.rng.range_f32(bounds.max.z - 1.0, bounds.max.z);
                    *level = 255.0;
                }
                *point = self.geometry.nearest_by_height(*height);
                frame.blend(*point, color.scale(*level / 255.0), BlendMode::Max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_cloud::{HelixLayout, PointCloud};

    fn helix() -> Arc<GeometryCache> {
        Arc::new(GeometryCache::new(PointCloud::helix(&HelixLayout::default()).unwrap()).unwrap())
    }

    fn burst_config(spawn_chance: f32, duration: f32) -> ParticleConfig {
        ParticleConfig {
            max_instances: 64,
            kind: ParticleKind::Burst(BurstConfig {
                spawn_chance,
                duration,
                ..Default::default()
            }),
        }
    }

    fn tick(system: &mut ParticleSystem, frame: &mut FrameBuffer, t: f32, dt: f32) {
        system.render(&FrameContext::at(t, dt, 0.05), frame);
    }

    #[test]
    fn test_overlapping_bursts_saturate() {
        let config = ParticleConfig {
            max_instances: 64,
            kind: ParticleKind::Burst(BurstConfig {
                spawn_chance: 1.0,
                duration: 100.0,
                blast_radius: 10.0,
                palettes: vec![vec![Color::new(200, 200, 200)]],
                ..Default::default()
            }),
        };
        let mut system = ParticleSystem::new(config, helix(), 3).unwrap();
        let mut frame = FrameBuffer::new(500);
        for n in 0..3 {
            tick(&mut system, &mut frame, n as f32 * 0.01, 0.01);
        }
        // Three bursts cover the whole cloud; 3 * ~200 saturates at 255.
        assert_eq!(frame.len(), 500);
        assert!(frame.pixels().iter().all(|c| *c == Color::WHITE));
    }

    #[test]
    fn test_burst_population_bounded() {
        let mut system = ParticleSystem::new(burst_config(1.0, 0.6), helix(), 5).unwrap();
        let mut frame = FrameBuffer::new(500);
        for n in 0..200 {
            tick(&mut system, &mut frame, n as f32 * 0.05, 0.05);
            // spawn_chance * duration / interval = 12
            assert!(system.instance_count() <= 13, "{}", system.instance_count());
        }
        assert!(system.instance_count() >= 11);
    }

    #[test]
    fn test_max_instances_evicts_oldest() {
        let mut config = burst_config(1.0, 10.0);
        config.max_instances = 4;
        let mut system = ParticleSystem::new(config, helix(), 5).unwrap();
        let mut frame = FrameBuffer::new(500);
        for n in 0..10 {
            tick(&mut system, &mut frame, n as f32 * 0.05, 0.05);
        }
        assert_eq!(system.instance_count(), 4);
        match &system.instances()[0] {
            ParticleInstance::Burst { birth, .. } => assert!((birth - 0.3).abs() < 1e-5),
            other => panic!("unexpected instance {:?}", other),
        }
    }

    #[test]
    fn test_burst_fades_then_expires() {
        let mut system = ParticleSystem::new(burst_config(0.0, 0.5), helix(), 9).unwrap();
        let mut frame = FrameBuffer::new(500);
        system.spawn_burst(0.0);
        assert_eq!(system.instance_count(), 1);

        tick(&mut system, &mut frame, 0.25, 0.25);
        assert_eq!(system.instance_count(), 1);
        assert!(!frame.is_dark());
        let peak = frame.pixels().iter().map(|c| c.r.max(c.g).max(c.b)).max().unwrap();
        assert!(peak <= 128, "half-faded burst too bright: {}", peak);

        tick(&mut system, &mut frame, 0.5, 0.25);
        assert_eq!(system.instance_count(), 0);
        assert!(frame.is_dark());
    }

    #[test]
    fn test_zero_blast_radius_lights_only_center() {
        let config = ParticleConfig {
            max_instances: 8,
            kind: ParticleKind::Burst(BurstConfig {
                spawn_chance: 0.0,
                blast_radius: 0.0,
                ..Default::default()
            }),
        };
        let mut system = ParticleSystem::new(config, helix(), 2).unwrap();
        system.spawn_burst(0.0);
        match &system.instances()[0] {
            ParticleInstance::Burst { members, .. } => assert_eq!(members.len(), 1),
            other => panic!("unexpected instance {:?}", other),
        }
    }

    #[test]
    fn test_highest_bias_spawns_near_top() {
        let config = ParticleConfig {
            max_instances: 64,
            kind: ParticleKind::Burst(BurstConfig {
                spawn_chance: 0.0,
                blast_radius: 0.0,
                bias: SpawnBias::Highest { band: 0.1 },
                ..Default::default()
            }),
        };
        let geometry = helix();
        let mut system = ParticleSystem::new(config, geometry.clone(), 2).unwrap();
        for _ in 0..20 {
            system.spawn_burst(0.0);
        }
        let heights = geometry.height_fractions().unwrap();
        for particle in system.instances() {
            if let ParticleInstance::Burst { members, .. } = particle {
                assert!(heights[members[0].0] >= 0.9);
            }
        }
    }

    #[test]
    fn test_rain_movement_is_frame_rate_independent() {
        let config = ParticleConfig {
            max_instances: 16,
            kind: ParticleKind::Rain(RainConfig::default()),
        };
        let mut fine = ParticleSystem::new(config.clone(), helix(), 21).unwrap();
        let mut coarse = ParticleSystem::new(config, helix(), 21).unwrap();
        let mut frame = FrameBuffer::new(500);
        for n in 1..=10 {
            tick(&mut fine, &mut frame, n as f32 * 0.1, 0.1);
        }
        for n in 1..=2 {
            tick(&mut coarse, &mut frame, n as f32 * 0.5, 0.5);
        }
        for (a, b) in fine.instances().iter().zip(coarse.instances()) {
            match (a, b) {
                (
                    ParticleInstance::Mover { position: pa, .. },
                    ParticleInstance::Mover { position: pb, .. },
                ) => assert!((pa.z - pb.z).abs() < 1e-3, "{} vs {}", pa.z, pb.z),
                _ => panic!("rain should only hold movers"),
            }
        }
    }

    #[test]
    fn test_rain_lights_only_its_color_channel() {
        let config = ParticleConfig {
            max_instances: 16,
            kind: ParticleKind::Rain(RainConfig::default()),
        };
        let mut system = ParticleSystem::new(config, helix(), 4).unwrap();
        let mut frame = FrameBuffer::new(500);
        let mut lit_any = false;
        for n in 0..80 {
            tick(&mut system, &mut frame, n as f32 * 0.05, 0.05);
            assert!(frame.pixels().iter().all(|c| c.r == 0 && c.b == 0));
            lit_any |= !frame.is_dark();
        }
        assert!(lit_any);
    }

    #[test]
    fn test_meteor_pool_size_is_fixed() {
        let config = ParticleConfig {
            max_instances: 32,
            kind: ParticleKind::Meteor(MeteorConfig::default()),
        };
        let mut system = ParticleSystem::new(config, helix(), 8).unwrap();
        let mut frame = FrameBuffer::new(500);
        for n in 0..300 {
            tick(&mut system, &mut frame, n as f32 * 0.05, 0.05);
            assert_eq!(system.instance_count(), 14);
        }
    }

    #[test]
    fn test_snow_dims_and_respawns_at_top() {
        let config = ParticleConfig {
            max_instances: 64,
            kind: ParticleKind::Snow(SnowConfig {
                flakes: 1,
                ..Default::default()
            }),
        };
        let geometry = helix();
        let mut system = ParticleSystem::new(config, geometry.clone(), 13).unwrap();
        let mut frame = FrameBuffer::new(500);
        tick(&mut system, &mut frame, 0.1, 0.1);
        assert!(frame.lit_count() <= 1);
        // 84 units at 23/s: the flake must have wrapped within 5 seconds.
        let mut wrapped = false;
        let mut last = f32::MAX;
        for n in 2..=50 {
            tick(&mut system, &mut frame, n as f32 * 0.1, 0.1);
            if let ParticleInstance::Flake { height, .. } = system.instances()[0] {
                if height > last {
                    wrapped = true;
                    assert!(height >= geometry.bounds().max.z - 1.0);
                }
                last = height;
            }
        }
        assert!(wrapped);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let g = helix();
        assert!(matches!(
            ParticleSystem::new(burst_config(1.5, 0.6), g.clone(), 1),
            Err(LightsError::Config(_))
        ));
        assert!(ParticleSystem::new(burst_config(0.5, -1.0), g.clone(), 1).is_err());
        let too_many = ParticleConfig {
            max_instances: 4,
            kind: ParticleKind::Meteor(MeteorConfig::default()),
        };
        assert!(ParticleSystem::new(too_many, g, 1).is_err());
    }
}
