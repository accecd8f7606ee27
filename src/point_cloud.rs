//! Point cloud loading and the helix layout generator.
//!
//! A point's index is its ordinal position in the coordinate source and is
//! the permanent address into every frame buffer.

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LightsError, LightsResult};

/// One addressable light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub index: usize,
    pub position: Vec3,
}

/// Axis-aligned bounding box of a point cloud.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest extent over the three axes.
    pub fn max_extent(&self) -> f32 {
        self.extent().max_element()
    }

    pub fn diagonal(&self) -> f32 {
        self.extent().length()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Immutable, ordered set of points.
#[derive(Clone, Debug)]
pub struct PointCloud {
    points: Vec<Point>,
    bounds: Bounds,
}

impl PointCloud {
    /// Build a cloud from positions. Rejects empty input and non-finite coordinates.
    pub fn from_positions(positions: Vec<Vec3>) -> LightsResult<Self> {
        if positions.is_empty() {
            return Err(LightsError::input("coordinate list is empty"));
        }
        if let Some(i) = positions.iter().position(|p| !p.is_finite()) {
            return Err(LightsError::input(format!(
                "point {} has a non-finite coordinate",
                i
            )));
        }

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in &positions {
            min = min.min(*p);
            max = max.max(*p);
        }

        let points = positions
            .into_iter()
            .enumerate()
            .map(|(index, position)| Point { index, position })
            .collect();

        Ok(Self {
            points,
            bounds: Bounds { min, max },
        })
    }

    /// Parse a JSON array of `[x, y, z]` triples.
    pub fn from_json_str(contents: &str) -> LightsResult<Self> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|e| LightsError::input(format!("coordinates are not valid JSON: {}", e)))?;
        let entries = value
            .as_array()
            .ok_or_else(|| LightsError::input("coordinates must be a JSON array"))?;

        let mut positions = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let tuple = entry
                .as_array()
                .ok_or_else(|| LightsError::input(format!("point {} is not an array", i)))?;
            if tuple.len() != 3 {
                return Err(LightsError::input(format!(
                    "point {} has {} coordinates, expected 3",
                    i,
                    tuple.len()
                )));
            }
            let mut xyz = [0.0f32; 3];
            for (axis, v) in tuple.iter().enumerate() {
                xyz[axis] = v.as_f64().ok_or_else(|| {
                    LightsError::input(format!("point {} coordinate {} is not a number", i, axis))
                })? as f32;
            }
            positions.push(Vec3::from_array(xyz));
        }

        Self::from_positions(positions)
    }

    /// Load a coordinate file from disk.
    pub fn load(path: impl AsRef<Path>) -> LightsResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            LightsError::input(format!("cannot read coordinates {}: {}", path.display(), e))
        })?;
        let cloud = Self::from_json_str(&contents)?;
        log::info!("Loaded {} points from {}", cloud.len(), path.display());
        Ok(cloud)
    }

    /// Generate the installation's helix model.
    pub fn helix(layout: &HelixLayout) -> LightsResult<Self> {
        Self::from_positions(layout.positions())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.points[index].position
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Serialize back to the `[[x, y, z], ...]` file format.
    pub fn to_json(&self) -> LightsResult<String> {
        let triples: Vec<[f32; 3]> = self.points.iter().map(|p| p.position.to_array()).collect();
        Ok(serde_json::to_string(&triples)?)
    }
}

// ============================================================================
// Helix layout
// ============================================================================

/// Conical helix: a strip wound bottom to top around a tapering tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelixLayout {
    pub count: usize,
    pub height: f32,
    pub radius_bottom: f32,
    pub radius_top: f32,
    /// Full wraps from bottom to top.
    pub turns: f32,
    pub theta0: f32,
}

impl Default for HelixLayout {
    fn default() -> Self {
        Self {
            count: 500,
            height: 84.0,
            radius_bottom: 18.5,
            radius_top: 1.5,
            turns: 27.0,
            theta0: 0.0,
        }
    }
}

impl HelixLayout {
    pub fn positions(&self) -> Vec<Vec3> {
        let denom = self.count.saturating_sub(1).max(1) as f32;
        (0..self.count)
            .map(|i| {
                let t = i as f32 / denom;
                let z = self.height * t;
                let r = self.radius_bottom + (self.radius_top - self.radius_bottom) * t;
                let theta = std::f32::consts::TAU * self.turns * t + self.theta0;
                Vec3::new(r * theta.cos(), r * theta.sin(), z)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_coordinates() {
        let cloud = PointCloud::from_json_str("[[0, 0, 0], [1.5, -2, 3], [4, 5, 6]]").unwrap();
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.points()[1].index, 1);
        assert_eq!(cloud.position(1), Vec3::new(1.5, -2.0, 3.0));
        assert_eq!(cloud.bounds().min, Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(cloud.bounds().max, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_rejects_empty_input() {
        let err = PointCloud::from_json_str("[]").unwrap_err();
        assert!(matches!(err, LightsError::Input(_)));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let err = PointCloud::from_json_str("[[0, 0, 0], [1, 2]]").unwrap_err();
        assert!(err.to_string().contains("point 1 has 2 coordinates"));
    }

    #[test]
    fn test_rejects_non_numeric() {
        let err = PointCloud::from_json_str("[[0, \"a\", 0]]").unwrap_err();
        assert!(matches!(err, LightsError::Input(_)));
        let err = PointCloud::from_json_str("{\"x\": 1}").unwrap_err();
        assert!(matches!(err, LightsError::Input(_)));
        let err = PointCloud::from_json_str("not json").unwrap_err();
        assert!(matches!(err, LightsError::Input(_)));
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = PointCloud::load("/definitely/not/here/coords.json").unwrap_err();
        assert!(matches!(err, LightsError::Input(_)));
    }

    #[test]
    fn test_helix_layout_matches_installation() {
        let cloud = PointCloud::helix(&HelixLayout::default()).unwrap();
        assert_eq!(cloud.len(), 500);
        let bottom = cloud.position(0);
        let top = cloud.position(499);
        assert!((bottom.x - 18.5).abs() < 1e-4);
        assert!(bottom.z.abs() < 1e-6);
        assert!((top.z - 84.0).abs() < 1e-3);
        assert!((top.truncate().length() - 1.5).abs() < 1e-3);
    }

    #[test]
    fn test_json_round_trip_preserves_order() {
        let cloud = PointCloud::helix(&HelixLayout {
            count: 10,
            ..Default::default()
        })
        .unwrap();
        let reloaded = PointCloud::from_json_str(&cloud.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.len(), 10);
        assert!((reloaded.position(7) - cloud.position(7)).length() < 1e-4);
    }
}
