use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::TrackError;

/// Kilometer-effort per hour for a given hiker level.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn effort_per_hour(self) -> f64 {
        match self {
            SkillLevel::Beginner => 4.0,
            SkillLevel::Intermediate => 5.0,
            SkillLevel::Advanced => 6.0,
        }
    }
}

impl Default for SkillLevel {
    fn default() -> Self {
        SkillLevel::Beginner
    }
}

/// What the hysteresis filter does with its reference point once elevation
/// moves against the tracked direction by more than the threshold.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// Drop the reference; the next point becomes the new baseline.
    Reset,
    /// Move the reference to the point where the reversal was detected.
    Rebase,
}

impl Default for ReversalPolicy {
    fn default() -> Self {
        ReversalPolicy::Reset
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Noise floor in meters below which elevation changes are ignored.
    pub elevation_diff_threshold: f64,
    /// Grade (percent) above which ascent/descent distance leaves the flat term.
    pub slope_limit_percent: f64,
    /// Meters per hour on flat terrain.
    pub flat_speed: f64,
    /// Vertical meters per hour while climbing.
    pub asc_speed: f64,
    /// Vertical meters per hour while descending.
    pub desc_speed: f64,
    /// Meters of ascent worth one horizontal kilometer of effort.
    pub asc_effort_coefficient: f64,
    /// Meters of descent worth one horizontal kilometer of effort.
    pub desc_effort_coefficient: f64,
    pub effort_per_hour: f64,
    pub reversal_policy: ReversalPolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            elevation_diff_threshold: 10.0,
            slope_limit_percent: 6.0,
            flat_speed: 5000.0,
            asc_speed: 350.0,
            desc_speed: 550.0,
            asc_effort_coefficient: 125.0,
            desc_effort_coefficient: 400.0,
            effort_per_hour: SkillLevel::default().effort_per_hour(),
            reversal_policy: ReversalPolicy::default(),
        }
    }
}

impl AnalysisOptions {
    pub fn with_skill(mut self, skill: SkillLevel) -> Self {
        self.effort_per_hour = skill.effort_per_hour();
        self
    }

    pub fn from_json(text: &str) -> Result<Self, TrackError> {
        let options: Self =
            serde_json::from_str(text).map_err(|e| TrackError::InvalidParameter(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        let non_negative = [
            ("elevation_diff_threshold", self.elevation_diff_threshold),
            ("slope_limit_percent", self.slope_limit_percent),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackError::InvalidParameter(format!(
                    "{name} must be a finite value >= 0 (got {value})"
                )));
            }
        }
        let positive = [
            ("flat_speed", self.flat_speed),
            ("asc_speed", self.asc_speed),
            ("desc_speed", self.desc_speed),
            ("asc_effort_coefficient", self.asc_effort_coefficient),
            ("desc_effort_coefficient", self.desc_effort_coefficient),
            ("effort_per_hour", self.effort_per_hour),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TrackError::InvalidParameter(format!(
                    "{name} must be a finite value > 0 (got {value})"
                )));
            }
        }
        Ok(())
    }

    pub fn params_hash_sha256(&self) -> Result<String, TrackError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| TrackError::InvalidParameter(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = AnalysisOptions::default();
        assert_eq!(opts.elevation_diff_threshold, 10.0);
        assert_eq!(opts.slope_limit_percent, 6.0);
        assert_eq!(opts.flat_speed, 5000.0);
        assert_eq!(opts.asc_speed, 350.0);
        assert_eq!(opts.desc_speed, 550.0);
        assert_eq!(opts.asc_effort_coefficient, 125.0);
        assert_eq!(opts.desc_effort_coefficient, 400.0);
        assert_eq!(opts.effort_per_hour, 4.0);
        assert_eq!(opts.reversal_policy, ReversalPolicy::Reset);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn skill_levels() {
        assert_eq!(SkillLevel::Beginner.effort_per_hour(), 4.0);
        assert_eq!(SkillLevel::Intermediate.effort_per_hour(), 5.0);
        assert_eq!(SkillLevel::Advanced.effort_per_hour(), 6.0);
        let opts = AnalysisOptions::default().with_skill(SkillLevel::Advanced);
        assert_eq!(opts.effort_per_hour, 6.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let opts = AnalysisOptions::from_json(
            r#"{ "elevation_diff_threshold": 5, "reversal_policy": "rebase" }"#,
        )
        .unwrap();
        assert_eq!(opts.elevation_diff_threshold, 5.0);
        assert_eq!(opts.reversal_policy, ReversalPolicy::Rebase);
        assert_eq!(opts.flat_speed, 5000.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut opts = AnalysisOptions::default();
        opts.flat_speed = 0.0;
        assert!(matches!(opts.validate(), Err(TrackError::InvalidParameter(_))));

        let mut opts = AnalysisOptions::default();
        opts.elevation_diff_threshold = f64::NAN;
        assert!(opts.validate().is_err());

        assert!(AnalysisOptions::from_json(r#"{ "asc_speed": -1 }"#).is_err());
        assert!(AnalysisOptions::from_json("not json").is_err());
    }

    #[test]
    fn hash_tracks_option_changes() {
        let a = AnalysisOptions::default();
        let b = AnalysisOptions::default().with_skill(SkillLevel::Intermediate);
        let ha = a.params_hash_sha256().unwrap();
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, a.clone().params_hash_sha256().unwrap());
        assert_ne!(ha, b.params_hash_sha256().unwrap());
    }
}
