//! Global operating mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The global mode selected for the whole installation.
///
/// Each mode scales manual-override durations. Only [`Mode::Automatic`]
/// allows scenes and environmental/sunset boosts to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Automatic,
    Focus,
    Relax,
    LateNight,
}

impl Mode {
    pub const ALL: [Self; 4] = [Self::Automatic, Self::Focus, Self::Relax, Self::LateNight];

    /// Factor applied to manual-override durations while this mode is active.
    #[must_use]
    pub fn duration_multiplier(self) -> f64 {
        match self {
            Self::Automatic => 1.0,
            Self::Focus => 2.0,
            Self::Relax => 1.5,
            Self::LateNight => 0.5,
        }
    }

    #[must_use]
    pub fn is_automatic(self) -> bool {
        self == Self::Automatic
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Focus => "focus",
            Self::Relax => "relax",
            Self::LateNight => "late_night",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownMode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_automatic() {
        assert_eq!(Mode::default(), Mode::Automatic);
        assert!(Mode::default().is_automatic());
    }

    #[test]
    fn should_parse_every_mode_from_its_display_form() {
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn should_reject_unknown_mode() {
        assert_eq!(
            "party".parse::<Mode>(),
            Err(ValidationError::UnknownMode("party".to_string()))
        );
    }

    #[test]
    fn should_shorten_overrides_at_late_night() {
        assert!(Mode::LateNight.duration_multiplier() < Mode::Automatic.duration_multiplier());
    }

    #[test]
    fn should_match_serde_and_display_forms() {
        let json = serde_json::to_string(&Mode::LateNight).unwrap();
        assert_eq!(json, "\"late_night\"");
    }
}
