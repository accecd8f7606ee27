//! Spatial animation engine for an irregular 3D cloud of addressable lights.

pub mod error;
pub mod rng;
pub mod color;

// Geometry
pub mod point_cloud;
pub mod geometry;

// Engines
pub mod effect;
pub mod field;
pub mod wavefront;
pub mod particle;
pub mod graph_walk;
pub mod compositor;

// Output and lifecycle
pub mod sink;
pub mod runner;
pub mod controller;
pub mod presets;
pub mod config;

pub mod cli;

pub use color::{ChannelOrder, Color};
pub use effect::{Effect, EffectSpec, FrameContext};
pub use error::{LightsError, LightsResult};
pub use geometry::GeometryCache;
pub use point_cloud::{HelixLayout, PointCloud};
