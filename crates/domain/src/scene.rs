//! Scene presets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::adjustment::SceneOffsets;
use crate::error::ValidationError;

/// A named preset that shifts the adaptive curve by fixed offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    #[default]
    Default,
    Energize,
    EveningComfort,
    UltraDim,
}

impl Scene {
    pub const ALL: [Self; 4] = [
        Self::Default,
        Self::Energize,
        Self::EveningComfort,
        Self::UltraDim,
    ];

    /// Brightness (percentage points) and warmth (kelvin) offsets.
    #[must_use]
    pub fn offsets(self) -> SceneOffsets {
        match self {
            Self::Default => SceneOffsets::default(),
            Self::Energize => SceneOffsets {
                brightness: 20,
                warmth: 500,
            },
            Self::EveningComfort => SceneOffsets {
                brightness: -20,
                warmth: -600,
            },
            Self::UltraDim => SceneOffsets {
                brightness: -50,
                warmth: -1200,
            },
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Energize => "energize",
            Self::EveningComfort => "evening_comfort",
            Self::UltraDim => "ultra_dim",
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scene {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scene| scene.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownScene(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_no_offsets_for_default_scene() {
        assert_eq!(Scene::Default.offsets(), SceneOffsets::default());
    }

    #[test]
    fn should_dim_and_warm_for_ultra_dim() {
        let offsets = Scene::UltraDim.offsets();
        assert!(offsets.brightness < 0);
        assert!(offsets.warmth < 0);
    }

    #[test]
    fn should_parse_every_scene_from_its_display_form() {
        for scene in Scene::ALL {
            assert_eq!(scene.to_string().parse::<Scene>().unwrap(), scene);
        }
    }
}
