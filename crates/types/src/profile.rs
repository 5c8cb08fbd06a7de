// crates/types/src/profile.rs
//! Model profiles and the per-job processing configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Separation model profiles offered by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelProfile {
    BalancedFourStem,
    #[default]
    BalancedSixStem,
}

impl ModelProfile {
    pub const ALL: [ModelProfile; 2] = [Self::BalancedFourStem, Self::BalancedSixStem];

    /// Stable config key sent to the service.
    pub fn key(self) -> &'static str {
        match self {
            Self::BalancedFourStem => "balanced-four-stem",
            Self::BalancedSixStem => "balanced-six-stem",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BalancedFourStem => "Balanced 4-Stem",
            Self::BalancedSixStem => "Balanced 6-Stem",
        }
    }

    /// Stems the profile produces, in output order.
    pub fn stems(self) -> &'static [&'static str] {
        match self {
            Self::BalancedFourStem => &["vocals", "drums", "bass", "other"],
            Self::BalancedSixStem => &["vocals", "drums", "bass", "piano", "guitar", "other"],
        }
    }

    pub fn has_stem(self, stem: &str) -> bool {
        self.stems().contains(&stem)
    }

    pub fn from_key(key: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|p| p.key() == key)
            .ok_or_else(|| ConfigError::UnknownProfile(key.to_string()))
    }
}

impl std::fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for ModelProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
    }
}

/// Processing parameters attached to a submission.
///
/// Every selected stem belongs to `model`. An empty selection means the
/// service produces all of the profile's stems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "RawJobConfig")]
pub struct JobConfig {
    model: ModelProfile,
    stems: Vec<String>,
}

#[derive(Deserialize)]
struct RawJobConfig {
    model: ModelProfile,
    #[serde(default)]
    stems: Vec<String>,
}

impl TryFrom<RawJobConfig> for JobConfig {
    type Error = ConfigError;

    fn try_from(raw: RawJobConfig) -> Result<Self, Self::Error> {
        JobConfig::new(raw.model).with_stems(raw.stems)
    }
}

impl JobConfig {
    pub fn new(model: ModelProfile) -> Self {
        Self {
            model,
            stems: Vec::new(),
        }
    }

    /// Replace the stem selection. Duplicates collapse; unknown stems are rejected.
    pub fn with_stems<I, S>(mut self, stems: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected: Vec<String> = Vec::new();
        for stem in stems {
            let stem = stem.into();
            if !self.model.has_stem(&stem) {
                return Err(ConfigError::UnknownStem {
                    stem,
                    profile: self.model.key().to_string(),
                });
            }
            if !selected.contains(&stem) {
                selected.push(stem);
            }
        }
        self.stems = selected;
        Ok(self)
    }

    pub fn model(&self) -> ModelProfile {
        self.model
    }

    pub fn stems(&self) -> &[String] {
        &self.stems
    }

    /// Switch profile, dropping any selected stem the new profile lacks.
    pub fn set_model(&mut self, model: ModelProfile) {
        self.model = model;
        self.stems.retain(|s| model.has_stem(s));
    }

    /// Select or deselect one stem of the current profile.
    pub fn toggle_stem(&mut self, stem: &str) -> Result<(), ConfigError> {
        if !self.model.has_stem(stem) {
            return Err(ConfigError::UnknownStem {
                stem: stem.to_string(),
                profile: self.model.key().to_string(),
            });
        }
        if let Some(pos) = self.stems.iter().position(|s| s == stem) {
            self.stems.remove(pos);
        } else {
            self.stems.push(stem.to_string());
        }
        Ok(())
    }

    /// Stems the job will actually produce.
    pub fn resolved_stems(&self) -> Vec<&str> {
        if self.stems.is_empty() {
            return self.model.stems().to_vec();
        }
        self.model
            .stems()
            .iter()
            .copied()
            .filter(|s| self.stems.iter().any(|sel| sel == s))
            .collect()
    }

    /// JSON side channel sent next to the audio part.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
