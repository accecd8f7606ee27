//! Geometry cache: per-point derived fields, distances and the k-NN graph.
//!
//! Built once from a [`PointCloud`] and then shared read-only (behind an
//! `Arc`) by every effect of a run. Points never move, so nothing here is
//! ever invalidated.

use std::sync::OnceLock;

use glam::Vec3;

use crate::error::{LightsError, LightsResult};
use crate::point_cloud::{Bounds, PointCloud};

/// Default neighbor count for graph walks.
pub const DEFAULT_NEIGHBORS: usize = 6;

/// Extents at or below this are treated as zero.
const MIN_EXTENT: f32 = 1e-6;

pub struct GeometryCache {
    cloud: PointCloud,
    bounds: Bounds,
    theta: Vec<f32>,
    /// `None` when the cloud is flat along z.
    height_fraction: Option<Vec<f32>>,
    /// Point indices sorted by ascending z.
    by_height: Vec<usize>,
    distances: OnceLock<DistanceMatrix>,
}

impl GeometryCache {
    pub fn new(cloud: PointCloud) -> LightsResult<Self> {
        if cloud.is_empty() {
            return Err(LightsError::geometry("point cloud has no points"));
        }
        let bounds = cloud.bounds();

        let theta = cloud
            .points()
            .iter()
            .map(|p| p.position.y.atan2(p.position.x))
            .collect();

        let height = bounds.extent().z;
        let height_fraction = (height > MIN_EXTENT).then(|| {
            cloud
                .points()
                .iter()
                .map(|p| ((p.position.z - bounds.min.z) / height).clamp(0.0, 1.0))
                .collect()
        });

        let mut by_height: Vec<usize> = (0..cloud.len()).collect();
        by_height.sort_by(|&a, &b| {
            cloud
                .position(a)
                .z
                .total_cmp(&cloud.position(b).z)
                .then(a.cmp(&b))
        });

        Ok(Self {
            cloud,
            bounds,
            theta,
            height_fraction,
            by_height,
            distances: OnceLock::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.cloud.position(index)
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn thetas(&self) -> &[f32] {
        &self.theta
    }

    /// Normalized heights, or a geometry error when the cloud has no z-extent.
    pub fn height_fractions(&self) -> LightsResult<&[f32]> {
        self.height_fraction.as_deref().ok_or_else(|| {
            LightsError::geometry("point cloud has zero height extent")
        })
    }

    /// Fail when the cloud has no spatial extent at all (every point coincident).
    pub fn require_extent(&self) -> LightsResult<()> {
        if self.bounds.max_extent() <= MIN_EXTENT {
            return Err(LightsError::geometry("point cloud has zero spatial extent"));
        }
        Ok(())
    }

    /// Each coordinate mapped into [0, 1] per axis. Flat axes map to 0.
    pub fn normalized_positions(&self) -> Vec<Vec3> {
        let min = self.bounds.min;
        let extent = self.bounds.extent();
        let inv = Vec3::new(
            safe_recip(extent.x),
            safe_recip(extent.y),
            safe_recip(extent.z),
        );
        self.cloud
            .points()
            .iter()
            .map(|p| (p.position - min) * inv)
            .collect()
    }

    /// Euclidean distances from one point to every point (itself included, at 0).
    pub fn distances_from(&self, origin: usize) -> Vec<f32> {
        let o = self.position(origin);
        self.cloud
            .points()
            .iter()
            .map(|p| p.position.distance(o))
            .collect()
    }

    /// Indices within `radius` of `origin`, inclusive.
    pub fn within_radius(&self, origin: usize, radius: f32) -> Vec<usize> {
        let o = self.position(origin);
        self.cloud
            .points()
            .iter()
            .filter(|p| p.position.distance(o) <= radius)
            .map(|p| p.index)
            .collect()
    }

    /// Point whose z is closest to `z`; ties go to the lower point.
    pub fn nearest_by_height(&self, z: f32) -> usize {
        let split = self
            .by_height
            .partition_point(|&i| self.position(i).z < z);
        let above = self.by_height.get(split).copied();
        let below = split.checked_sub(1).map(|s| self.by_height[s]);
        match (below, above) {
            (Some(b), Some(a)) => {
                let db = z - self.position(b).z;
                let da = self.position(a).z - z;
                if da < db {
                    a
                } else {
                    b
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => 0,
        }
    }

    /// Indices sorted by ascending height.
    pub fn by_height(&self) -> &[usize] {
        &self.by_height
    }

    /// Full symmetric distance matrix, built on first use.
    pub fn distance_matrix(&self) -> &DistanceMatrix {
        self.distances.get_or_init(|| {
            log::debug!("Building {}x{} distance matrix", self.len(), self.len());
            DistanceMatrix::build(&self.cloud)
        })
    }

    /// k nearest neighbors per point, ascending by distance, ties by index.
    pub fn neighbor_graph(&self, k: usize) -> LightsResult<NeighborGraph> {
        let n = self.len();
        if k == 0 {
            return Err(LightsError::config("neighbor count k must be at least 1"));
        }
        if k >= n {
            return Err(LightsError::config(format!(
                "neighbor count k={} must be below the point count {}",
                k, n
            )));
        }

        let matrix = self.distance_matrix();
        let mut adjacency = Vec::with_capacity(n);
        let mut candidates: Vec<(usize, f32)> = Vec::with_capacity(n - 1);
        for i in 0..n {
            candidates.clear();
            candidates.extend((0..n).filter(|&j| j != i).map(|j| (j, matrix.get(i, j))));
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            adjacency.push(candidates.iter().take(k).map(|&(j, _)| j).collect());
        }

        log::debug!("Built {}-NN graph over {} points", k, n);
        Ok(NeighborGraph { k, adjacency })
    }
}

fn safe_recip(extent: f32) -> f32 {
    if extent > MIN_EXTENT {
        1.0 / extent
    } else {
        0.0
    }
}

// ============================================================================
// Distance matrix
// ============================================================================

/// Dense symmetric N×N distance matrix.
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f32>,
}

impl DistanceMatrix {
    fn build(cloud: &PointCloud) -> Self {
        let n = cloud.len();
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            let pi = cloud.position(i);
            for j in (i + 1)..n {
                let d = pi.distance(cloud.position(j));
                data[i * n + j] = d;
                data[j * n + i] = d;
            }
        }
        Self { n, data }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}

// ============================================================================
// Neighbor graph
// ============================================================================

/// Per-point k-NN adjacency.
#[derive(Clone, Debug)]
pub struct NeighborGraph {
    k: usize,
    adjacency: Vec<Vec<usize>>,
}

impl NeighborGraph {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn neighbors(&self, index: usize) -> &[usize] {
        &self.adjacency[index]
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}
