use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The upstream model variants offered to the user.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    #[default]
    Fast,
    Accurate,
}

impl ModelProfile {
    pub const ALL: [ModelProfile; 2] = [ModelProfile::Fast, ModelProfile::Accurate];

    pub fn model_id(&self) -> &'static str {
        match self {
            ModelProfile::Fast => "gemini-2.5-flash",
            ModelProfile::Accurate => "gemini-2.5-pro",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelProfile::Fast => "Fast (Flash)",
            ModelProfile::Accurate => "Accurate (Pro)",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            ModelProfile::Fast => ModelProfile::Accurate,
            ModelProfile::Accurate => ModelProfile::Fast,
        }
    }
}

impl std::fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "flash" => Ok(ModelProfile::Fast),
            "accurate" | "pro" => Ok(ModelProfile::Accurate),
            _ => Err(format!("Unknown model: {}. Available: fast, accurate", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_profile_names_and_aliases() {
        assert_eq!("fast".parse::<ModelProfile>().unwrap(), ModelProfile::Fast);
        assert_eq!("Flash".parse::<ModelProfile>().unwrap(), ModelProfile::Fast);
        assert_eq!("ACCURATE".parse::<ModelProfile>().unwrap(), ModelProfile::Accurate);
        assert_eq!("pro".parse::<ModelProfile>().unwrap(), ModelProfile::Accurate);
        assert!("ultra".parse::<ModelProfile>().is_err());
    }

    #[test]
    fn toggle_switches_between_profiles() {
        assert_eq!(ModelProfile::Fast.toggle(), ModelProfile::Accurate);
        assert_eq!(ModelProfile::Accurate.toggle().model_id(), "gemini-2.5-flash");
    }
}
