//! Seeded xorshift64 generator shared by every stochastic effect.
//!
//! Effects own their generator, so two runs with the same seed over the
//! same point cloud produce identical frames.

use glam::Vec3;

/// Fallback state used when the seed is 0 (xorshift would stay at zero forever).
const ZERO_SEED_REPLACEMENT: u64 = 0x5DEECE66D;

#[derive(Clone, Debug)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { ZERO_SEED_REPLACEMENT } else { seed };
        Self { state }
    }

    /// Derive an independent generator, e.g. one per token or per wave.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64() ^ 0x9E37_79B9_7F4A_7C15)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform value in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // Top 24 bits fit an f32 mantissa exactly.
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform value in [lo, hi).
    pub fn range_f32(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Uniform integer in [lo, hi], inclusive on both ends.
    pub fn range_u8(&mut self, lo: u8, hi: u8) -> u8 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let span = u64::from(hi - lo) + 1;
        lo + (self.next_u64() % span) as u8
    }

    /// Uniform index in [0, n). Returns 0 when `n` is 0.
    pub fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        (self.next_u64() % n as u64) as usize
    }

    /// One Bernoulli trial.
    pub fn chance(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            items.get(self.below(items.len()))
        }
    }

    /// Random unit vector, drawn from the cube and normalized.
    pub fn unit_vector(&mut self) -> Vec3 {
        loop {
            let v = Vec3::new(
                self.range_f32(-1.0, 1.0),
                self.range_f32(-1.0, 1.0),
                self.range_f32(-1.0, 1.0),
            );
            if let Some(unit) = v.try_normalize() {
                return unit;
            }
        }
    }
}
