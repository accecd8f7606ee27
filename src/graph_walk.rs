//! Tokens walking the nearest-neighbour graph, plus sequential chasers.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::compositor::FrameBuffer;
use crate::effect::FrameContext;
use crate::error::{LightsError, LightsResult};
use crate::geometry::{GeometryCache, NeighborGraph, DEFAULT_NEIGHBORS};
use crate::rng::Rng;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphWalkConfig {
    pub tokens: usize,
    /// Trail capacity including the head.
    pub trail_length: usize,
    /// k for the neighbour graph. Must be below the point count.
    pub neighbors: usize,
    /// Brightness of the oldest trail segment, out of 255.
    pub min_brightness: u8,
    /// Brightness of the head, out of 255.
    pub max_brightness: u8,
    /// Per-channel range for each token's random base color.
    pub color_min: u8,
    pub color_max: u8,
}

impl Default for GraphWalkConfig {
    fn default() -> Self {
        Self {
            tokens: 25,
            trail_length: 10,
            neighbors: DEFAULT_NEIGHBORS,
            min_brightness: 50,
            max_brightness: 255,
            color_min: 50,
            color_max: 255,
        }
    }
}

impl GraphWalkConfig {
    pub fn validate(&self) -> LightsResult<()> {
        if self.tokens == 0 {
            return Err(LightsError::config("graph walk needs at least one token"));
        }
        if self.trail_length == 0 {
            return Err(LightsError::config("trail length must be at least 1"));
        }
        if self.min_brightness > self.max_brightness {
            return Err(LightsError::config(format!(
                "min brightness {} exceeds max brightness {}",
                self.min_brightness, self.max_brightness
            )));
        }
        Ok(())
    }
}

/// One walker: a bounded trail of visited points, head at the back.
#[derive(Clone, Debug)]
pub struct Token {
    trail: VecDeque<usize>,
    color: Color,
}

impl Token {
    pub fn head(&self) -> usize {
        self.trail.back().copied().unwrap_or(0)
    }

    pub fn trail(&self) -> &VecDeque<usize> {
        &self.trail
    }

    pub fn color(&self) -> Color {
        self.color
    }
}

/// Pick the next hop: a neighbour outside the trail if any, else any neighbour.
pub fn choose_next(neighbors: &[usize], trail: &VecDeque<usize>, rng: &mut Rng) -> Option<usize> {
    let fresh: Vec<usize> = neighbors
        .iter()
        .copied()
        .filter(|n| !trail.contains(n))
        .collect();
    if fresh.is_empty() {
        rng.pick(neighbors).copied()
    } else {
        rng.pick(&fresh).copied()
    }
}

/// Brightness fraction of a trail segment. Depends on the capacity, so a
/// trail still growing reaches full brightness only once it is full.
pub fn segment_fraction(segment: usize, capacity: usize) -> f32 {
    if capacity <= 1 {
        1.0
    } else {
        segment as f32 / (capacity - 1) as f32
    }
}

pub struct GraphWalkEffect {
    config: GraphWalkConfig,
    graph: NeighborGraph,
    tokens: Vec<Token>,
    rng: Rng,
}

impl GraphWalkEffect {
    pub fn new(config: GraphWalkConfig, geometry: Arc<GeometryCache>, seed: u64) -> LightsResult<Self> {
        config.validate()?;
        let graph = geometry.neighbor_graph(config.neighbors)?;
        let mut rng = Rng::new(seed);
        let tokens = (0..config.tokens)
            .map(|_| {
                let mut trail = VecDeque::with_capacity(config.trail_length + 1);
                trail.push_back(rng.below(geometry.len()));
                let color = Color::new(
                    rng.range_u8(config.color_min, config.color_max),
                    rng.range_u8(config.color_min, config.color_max),
                    rng.range_u8(config.color_min, config.color_max),
                );
                Token { trail, color }
            })
            .collect();
        log::debug!(
            "Graph walk: {} tokens over a {}-NN graph of {} points",
            config.tokens,
            graph.k(),
            graph.len()
        );
        Ok(Self {
            config,
            graph,
            tokens,
            rng,
        })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Advance every token by one hop.
    pub fn step(&mut self) {
        let capacity = self.config.trail_length;
        for token in &mut self.tokens {
            let neighbors = self.graph.neighbors(token.head());
            if let Some(next) = choose_next(neighbors, &token.trail, &mut self.rng) {
                token.trail.push_back(next);
            }
            while token.trail.len() > capacity {
                token.trail.pop_front();
            }
        }
    }

    pub fn render(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        self.step();
        frame.clear();
        let (lo, hi) = (
            f32::from(self.config.min_brightness),
            f32::from(self.config.max_brightness),
        );
        for token in &self.tokens {
            if ctx.is_cancelled() {
                return;
            }
            for (segment, &point) in token.trail.iter().enumerate() {
                let frac = segment_fraction(segment, self.config.trail_length);
                let level = (lo + frac * (hi - lo)) / 255.0;
                // Later tokens overwrite earlier ones.
                frame.set(point, token.color.scale(level));
            }
        }
    }
}

// ============================================================================
// Sequential chase
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChaseOrder {
    /// Strip order.
    #[default]
    Index,
    /// Highest point first.
    TopDown,
    /// Lowest point first.
    BottomUp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChaseConfig {
    pub color: Color,
    /// Seconds per step.
    pub step_interval: f32,
    /// Keep earlier points lit until the whole cloud is lit, then clear.
    pub accumulate: bool,
    pub order: ChaseOrder,
}

impl Default for ChaseConfig {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            step_interval: 0.01,
            accumulate: true,
            order: ChaseOrder::Index,
        }
    }
}

/// Walks the cloud in a fixed order, one point per step.
pub struct ChaseEffect {
    config: ChaseConfig,
    order: Vec<usize>,
}

impl ChaseEffect {
    pub fn new(config: ChaseConfig, geometry: Arc<GeometryCache>) -> LightsResult<Self> {
        if !config.step_interval.is_finite() || config.step_interval <= 0.0 {
            return Err(LightsError::config(format!(
                "chase step interval {} must be positive",
                config.step_interval
            )));
        }
        let order = match config.order {
            ChaseOrder::Index => (0..geometry.len()).collect(),
            ChaseOrder::BottomUp => geometry.by_height().to_vec(),
            ChaseOrder::TopDown => geometry.by_height().iter().rev().copied().collect(),
        };
        Ok(Self { config, order })
    }

    /// Position within the cycle at `elapsed`. Accumulating chases have one
    /// extra all-dark step between cycles.
    pub fn position(&self, elapsed: f32) -> usize {
        let steps = (elapsed.max(0.0) / self.config.step_interval) as usize;
        let cycle = if self.config.accumulate {
            self.order.len() + 1
        } else {
            self.order.len()
        };
        steps % cycle.max(1)
    }

    pub fn render(&mut self, ctx: &FrameContext<'_>, frame: &mut FrameBuffer) {
        let p = self.position(ctx.elapsed);
        frame.clear();
        if self.config.accumulate {
            for &i in &self.order[..p] {
                frame.set(i, self.config.color);
            }
        } else if let Some(&i) = self.order.get(p) {
            frame.set(i, self.config.color);
        }
    }
}
