//! Named animation catalogue.
//!
//! Built-in presets reproduce the installation's animations; the
//! installation config can add more or replace one by name.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::effect::EffectSpec;
use crate::error::{LightsError, LightsResult};
use crate::field::{
    AuroraConfig, BeamConfig, BrightnessDips, FieldColoring, FieldPattern, SpiralConfig,
};
use crate::graph_walk::{ChaseConfig, ChaseOrder, GraphWalkConfig};
use crate::particle::{
    BurstConfig, MeteorConfig, ParticleConfig, ParticleKind, RainConfig, SnowConfig,
};
use crate::wavefront::{Membership, WaveColor, WaveShape, WavefrontConfig};

/// A built-in preset.
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    /// Seconds between frames.
    pub interval: f32,
    build: fn() -> EffectSpec,
}

impl Preset {
    pub fn spec(&self) -> EffectSpec {
        (self.build)()
    }
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "candy_cane",
        description: "Red and white stripes spiralling up the tree",
        interval: 0.02,
        build: candy_cane,
    },
    Preset {
        name: "twister",
        description: "White vortex spinning around the trunk",
        interval: 0.05,
        build: twister,
    },
    Preset {
        name: "wind_swirl",
        description: "Rainbow gusts swirling upward",
        interval: 0.02,
        build: wind_swirl,
    },
    Preset {
        name: "snowy",
        description: "Fast white swirl with a few dimmer lights",
        interval: 0.015,
        build: snowy,
    },
    Preset {
        name: "double_helix",
        description: "Two counter-rotating rainbow helices",
        interval: 0.02,
        build: double_helix,
    },
    Preset {
        name: "northern_lights",
        description: "Drifting aurora curtains",
        interval: 0.02,
        build: northern_lights,
    },
    Preset {
        name: "light_beams",
        description: "A lighthouse beam sweeping around",
        interval: 0.02,
        build: light_beams,
    },
    Preset {
        name: "contagious",
        description: "Color spreads from a random light until the tree is full",
        interval: 0.01,
        build: contagious,
    },
    Preset {
        name: "pulse_ring",
        description: "Expanding shells of light from a random origin",
        interval: 0.02,
        build: pulse_ring,
    },
    Preset {
        name: "random_plane",
        description: "Planes sweeping through the tree at random angles",
        interval: 0.01,
        build: random_plane,
    },
    Preset {
        name: "fireworks",
        description: "Random bursts fading out",
        interval: 0.05,
        build: fireworks,
    },
    Preset {
        name: "meteor_shower",
        description: "Meteors streaking through with glowing tails",
        interval: 0.015,
        build: meteor_shower,
    },
    Preset {
        name: "matrix_rain",
        description: "Green streams falling top to bottom",
        interval: 0.015,
        build: matrix_rain,
    },
    Preset {
        name: "snowfall",
        description: "Flakes drifting down and melting",
        interval: 0.03,
        build: snowfall,
    },
    Preset {
        name: "snake",
        description: "Snakes wandering between neighbouring lights",
        interval: 0.1,
        build: snake,
    },
    Preset {
        name: "top_to_bottom",
        description: "Fill the strip one light at a time, then clear",
        interval: 0.01,
        build: top_to_bottom,
    },
    Preset {
        name: "one_by_one",
        description: "A single red light walking the strip",
        interval: 0.03,
        build: one_by_one,
    },
    Preset {
        name: "solid",
        description: "Whole tree in one color",
        interval: 0.1,
        build: solid,
    },
];

fn candy_cane() -> EffectSpec {
    EffectSpec::Field(FieldPattern::Spiral(SpiralConfig {
        angular: 3.0,
        height: 50.0,
        speed: 4.0,
        sharpness: 10.0,
        coloring: FieldColoring::Blend {
            low: Color::RED,
            high: Color::WHITE,
        },
        ..Default::default()
    }))
}

fn twister() -> EffectSpec {
    EffectSpec::Field(FieldPattern::Spiral(SpiralConfig {
        angular: 1.0,
        // Three turns, phase decreasing with height.
        height: -6.0,
        speed: 2.0 * PI * 0.2,
        ..Default::default()
    }))
}

fn wind_swirl() -> EffectSpec {
    EffectSpec::Field(FieldPattern::Spiral(SpiralConfig {
        angular: 7.0,
        height: 10.0 / PI,
        speed: -4.5,
        coloring: FieldColoring::Hue {
            height_scale: 0.5,
            angle_scale: 0.0,
            time_scale: 0.018,
        },
        ..Default::default()
    }))
}

fn snowy() -> EffectSpec {
    EffectSpec::Field(FieldPattern::Spiral(SpiralConfig {
        angular: 12.0,
        height: 8.0 / PI,
        speed: -23.3,
        dips: Some(BrightnessDips::default()),
        ..Default::default()
    }))
}

fn double_helix() -> EffectSpec {
    EffectSpec::Field(FieldPattern::Spiral(SpiralConfig {
        angular: 1.0,
        height: 11.0,
        speed: 2.0,
        mirrored: true,
        coloring: FieldColoring::Hue {
            height_scale: 1.0,
            angle_scale: 0.0,
            time_scale: 0.2,
        },
        ..Default::default()
    }))
}

fn northern_lights() -> EffectSpec {
    EffectSpec::Field(FieldPattern::Aurora(AuroraConfig::default()))
}

fn light_beams() -> EffectSpec {
    EffectSpec::Field(FieldPattern::Beams(BeamConfig::default()))
}

fn contagious() -> EffectSpec {
    EffectSpec::Wavefront(WavefrontConfig::default())
}

fn pulse_ring() -> EffectSpec {
    EffectSpec::Wavefront(WavefrontConfig {
        membership: Membership::DecayingBand { decay_width: 6.0 },
        speed: 30.0,
        cooldown: 0.3,
        constant_brightness: Some(60.0),
        ..Default::default()
    })
}

fn random_plane() -> EffectSpec {
    EffectSpec::Wavefront(WavefrontConfig {
        shape: WaveShape::Plane,
        membership: Membership::Slab {
            thickness_fraction: 0.1,
        },
        color: WaveColor::Random { min: 120, max: 255 },
        speed: 35.0,
        cooldown: 0.6,
        ..Default::default()
    })
}

fn fireworks() -> EffectSpec {
    EffectSpec::Particle(ParticleConfig {
        kind: ParticleKind::Burst(BurstConfig::default()),
        ..Default::default()
    })
}

fn meteor_shower() -> EffectSpec {
    EffectSpec::Particle(ParticleConfig {
        kind: ParticleKind::Meteor(MeteorConfig::default()),
        ..Default::default()
    })
}

fn matrix_rain() -> EffectSpec {
    EffectSpec::Particle(ParticleConfig {
        kind: ParticleKind::Rain(RainConfig::default()),
        ..Default::default()
    })
}

fn snowfall() -> EffectSpec {
    EffectSpec::Particle(ParticleConfig {
        kind: ParticleKind::Snow(SnowConfig::default()),
        ..Default::default()
    })
}

fn snake() -> EffectSpec {
    EffectSpec::GraphWalk(GraphWalkConfig::default())
}

fn top_to_bottom() -> EffectSpec {
    EffectSpec::Chase(ChaseConfig::default())
}

fn one_by_one() -> EffectSpec {
    EffectSpec::Chase(ChaseConfig {
        color: Color::RED,
        step_interval: 0.03,
        accumulate: false,
        order: ChaseOrder::Index,
    })
}

fn solid() -> EffectSpec {
    EffectSpec::Solid {
        color: Color::WHITE,
    }
}

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

// ============================================================================
// Catalogue
// ============================================================================

/// A runnable animation: effect plus frame pacing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    pub name: String,
    pub description: String,
    /// Seconds between frames.
    pub interval: f32,
    pub effect: EffectSpec,
}

impl From<&Preset> for Animation {
    fn from(preset: &Preset) -> Self {
        Self {
            name: preset.name.to_string(),
            description: preset.description.to_string(),
            interval: preset.interval,
            effect: preset.spec(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Catalogue {
    animations: Vec<Animation>,
}

impl Catalogue {
    /// Every built-in preset.
    pub fn builtin() -> Self {
        Self {
            animations: PRESETS.iter().map(Animation::from).collect(),
        }
    }

    /// Add an animation, replacing any existing one with the same name.
    pub fn insert(&mut self, animation: Animation) {
        match self.animations.iter_mut().find(|a| a.name == animation.name) {
            Some(slot) => {
                log::info!("Overriding animation '{}'", animation.name);
                *slot = animation;
            }
            None => self.animations.push(animation),
        }
    }

    pub fn get(&self, name: &str) -> LightsResult<&Animation> {
        self.animations
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| LightsError::config(format!("unknown animation '{}'", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.animations.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn len(&self) -> usize {
        self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::FrameBuffer;
    use crate::effect::{Effect, FrameContext};
    use crate::geometry::GeometryCache;
    use crate::point_cloud::{HelixLayout, PointCloud};
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = PRESETS.iter().map(|p| p.name).collect();
        assert_eq!(names.len(), PRESETS.len());
        assert_eq!(PRESETS.len(), 18);
    }

    #[test]
    fn test_every_preset_builds_on_helix() {
        let geometry = Arc::new(
            GeometryCache::new(PointCloud::helix(&HelixLayout::default()).unwrap()).unwrap(),
        );
        for preset in PRESETS {
            assert!(preset.interval > 0.0, "{}", preset.name);
            let mut effect = Effect::build(&preset.spec(), geometry.clone(), 7)
                .unwrap_or_else(|e| panic!("{} failed to build: {}", preset.name, e));
            let mut frame = FrameBuffer::new(geometry.len());
            effect.render(&FrameContext::at(0.0, 0.0, preset.interval), &mut frame);
            assert_eq!(frame.len(), 500);
        }
    }

    #[test]
    fn test_custom_animation_overrides_builtin() {
        let mut catalogue = Catalogue::builtin();
        let before = catalogue.len();
        catalogue.insert(Animation {
            name: "solid".to_string(),
            description: "green".to_string(),
            interval: 1.0,
            effect: EffectSpec::Solid {
                color: Color::GREEN,
            },
        });
        assert_eq!(catalogue.len(), before);
        assert_eq!(catalogue.get("solid").unwrap().interval, 1.0);

        catalogue.insert(Animation {
            name: "mine".to_string(),
            description: String::new(),
            interval: 0.5,
            effect: EffectSpec::Solid { color: Color::BLUE },
        });
        assert_eq!(catalogue.len(), before + 1);
        assert!(catalogue.names().contains(&"mine"));
    }

    #[test]
    fn test_random_plane_slab_scales_with_span() {
        match find_preset("random_plane").unwrap().spec() {
            EffectSpec::Wavefront(cfg) => {
                assert_eq!(cfg.shape, WaveShape::Plane);
                assert_eq!(
                    cfg.membership,
                    Membership::Slab {
                        thickness_fraction: 0.1
                    }
                );
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let err = Catalogue::builtin().get("nope").unwrap_err();
        assert!(matches!(err, LightsError::Config(_)));
        assert!(find_preset("nope").is_none());
        assert_eq!(find_preset("snake").unwrap().interval, 0.1);
    }
}
