//! Installation config file.
//!
//! ```json
//! {
//!   "coordsPath": "tree_coords.json",
//!   "channelOrder": "grb",
//!   "brightness": 200,
//!   "animations": {
//!     "slow_cane": { "intervalMs": 40, "effect": { "engine": "field", "pattern": "spiral", "speed": 1.0 } }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::ChannelOrder;
use crate::effect::EffectSpec;
use crate::error::{LightsError, LightsResult};
use crate::point_cloud::{HelixLayout, PointCloud};
use crate::presets::{Animation, Catalogue};

/// Default coordinate file, next to the config.
fn default_coords_path() -> PathBuf {
    PathBuf::from("tree_coords.json")
}

/// Default global brightness cap.
fn default_brightness() -> u8 {
    255
}

/// Default frame interval for custom animations, in milliseconds.
fn default_interval_ms() -> f32 {
    20.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationConfig {
    /// Coordinate JSON. Relative paths resolve against the config's directory.
    #[serde(default = "default_coords_path")]
    pub coords_path: PathBuf,

    /// Generate a helix instead of reading `coords_path`.
    #[serde(default)]
    pub helix: Option<HelixLayout>,

    /// Wire order expected by the strip.
    #[serde(default)]
    pub channel_order: ChannelOrder,

    /// Seed for stochastic effects. None seeds from the clock.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Overrides every animation's own frame interval.
    #[serde(default)]
    pub frame_interval_ms: Option<f32>,

    /// Global brightness cap out of 255.
    #[serde(default = "default_brightness")]
    pub brightness: u8,

    /// Extra animations, or replacements for built-ins with the same name.
    #[serde(default)]
    pub animations: BTreeMap<String, CustomAnimation>,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAnimation {
    #[serde(default)]
    pub description: String,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: f32,

    pub effect: EffectSpec,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            coords_path: default_coords_path(),
            helix: None,
            channel_order: ChannelOrder::default(),
            seed: None,
            frame_interval_ms: None,
            brightness: default_brightness(),
            animations: BTreeMap::new(),
            base_dir: None,
        }
    }
}

impl InstallationConfig {
    pub fn from_json_str(contents: &str) -> LightsResult<Self> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| LightsError::config(format!("invalid installation config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> LightsResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            LightsError::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json_str(&contents)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        log::info!(
            "Loaded config {} ({} custom animations)",
            path.display(),
            config.animations.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> LightsResult<()> {
        if let Some(ms) = self.frame_interval_ms {
            if !(ms / 1000.0).is_finite() || ms / 1000.0 <= 0.0 {
                return Err(LightsError::config(format!(
                    "frameIntervalMs {} must be positive",
                    ms
                )));
            }
        }
        for (name, animation) in &self.animations {
            let seconds = animation.interval_ms / 1000.0;
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(LightsError::config(format!(
                    "animation '{}' intervalMs {} must be positive",
                    name, animation.interval_ms
                )));
            }
        }
        Ok(())
    }

    /// Coordinate path with relative paths resolved against the config file.
    pub fn resolved_coords_path(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) if self.coords_path.is_relative() => dir.join(&self.coords_path),
            _ => self.coords_path.clone(),
        }
    }

    pub fn load_cloud(&self) -> LightsResult<PointCloud> {
        match &self.helix {
            Some(layout) => PointCloud::helix(layout),
            None => PointCloud::load(self.resolved_coords_path()),
        }
    }

    /// Frame interval override in seconds.
    pub fn frame_interval(&self) -> Option<f32> {
        self.frame_interval_ms.map(|ms| ms / 1000.0)
    }

    /// Built-in presets plus this config's animations.
    pub fn catalogue(&self) -> Catalogue {
        let mut catalogue = Catalogue::builtin();
        for (name, custom) in &self.animations {
            catalogue.insert(Animation {
                name: name.clone(),
                description: custom.description.clone(),
                interval: custom.interval_ms / 1000.0,
                effect: custom.effect.clone(),
            });
        }
        catalogue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = InstallationConfig::from_json_str("{}").unwrap();
        assert_eq!(config.coords_path, PathBuf::from("tree_coords.json"));
        assert_eq!(config.channel_order, ChannelOrder::Grb);
        assert_eq!(config.brightness, 255);
        assert!(config.seed.is_none());
        assert!(config.frame_interval().is_none());
    }

    #[test]
    fn test_custom_animation_joins_catalogue() {
        let config = InstallationConfig::from_json_str(
            r#"{
                "channelOrder": "rgb",
                "frameIntervalMs": 25,
                "animations": {
                    "slow_cane": {
                        "intervalMs": 40,
                        "effect": {"engine": "field", "pattern": "spiral", "speed": 1.0}
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.channel_order, ChannelOrder::Rgb);
        assert_eq!(config.frame_interval(), Some(0.025));
        let catalogue = config.catalogue();
        let animation = catalogue.get("slow_cane").unwrap();
        assert!((animation.interval - 0.04).abs() < 1e-6);
        assert!(catalogue.get("candy_cane").is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            InstallationConfig::from_json_str(r#"{"frameIntervalMs": 0}"#),
            Err(LightsError::Config(_))
        ));
        assert!(InstallationConfig::from_json_str(r#"{"channelOrder": "xyz"}"#).is_err());
        // Positive, but zero once converted to seconds.
        assert!(InstallationConfig::from_json_str(
            r#"{"animations": {"x": {"intervalMs": 1e-45, "effect": {"engine": "solid", "color": [1, 2, 3]}}}}"#
        )
        .is_err());
        assert!(InstallationConfig::from_json_str(r#"{"brightness": 300}"#).is_err());
    }

    #[test]
    fn test_helix_overrides_coords_file() {
        let config =
            InstallationConfig::from_json_str(r#"{"helix": {"count": 20}, "coordsPath": "/missing.json"}"#)
                .unwrap();
        let cloud = config.load_cloud().unwrap();
        assert_eq!(cloud.len(), 20);
    }

    #[test]
    fn test_relative_coords_resolve_against_config_dir() {
        let mut config = InstallationConfig::default();
        config.base_dir = Some(PathBuf::from("/etc/lights"));
        assert_eq!(
            config.resolved_coords_path(),
            PathBuf::from("/etc/lights/tree_coords.json")
        );
        config.coords_path = PathBuf::from("/abs/coords.json");
        assert_eq!(config.resolved_coords_path(), PathBuf::from("/abs/coords.json"));
    }
}
