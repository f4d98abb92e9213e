//! Style profiles
//!
//! One profile per musical idiom, selectable at runtime. Swapping the active
//! profile restarts only the background drone; in-flight voices keep the
//! profile they were scheduled under.

use serde::{Deserialize, Serialize};

use chimes_common::{Error, Result};

/// Oscillator waveform kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

/// Per-idiom sound configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StyleProfile {
    /// Idiom name used for runtime selection
    pub name: &'static str,
    /// Drone frequency and the root of every scheduled note, in Hz
    pub base_frequency: f32,
    /// Waveform for melodic voices and the drone
    pub waveform: Waveform,
    /// Semitone offsets from the base (never empty)
    pub scale: Vec<i32>,
    /// Chord shapes selected by amount digits (never empty)
    pub chord_table: Vec<Vec<i32>>,
}

impl StyleProfile {
    /// Driving four-on-the-floor idiom: bright sawtooth over a wide scale
    pub fn techno() -> Self {
        Self {
            name: "techno",
            base_frequency: 140.0,
            waveform: Waveform::Sawtooth,
            scale: vec![0, 4, 7, 12, 16],
            chord_table: vec![
                vec![0, 7],
                vec![0, 4, 7],
                vec![0, 3, 7],
                vec![0, 5, 7],
                vec![0, 4, 7, 10],
            ],
        }
    }

    /// Mellow idiom built on a minor-ish pentatonic
    pub fn jazz() -> Self {
        Self {
            name: "jazz",
            base_frequency: 120.0,
            waveform: Waveform::Sine,
            scale: vec![0, 3, 5, 7, 10],
            chord_table: vec![
                vec![0, 3, 7, 10],
                vec![0, 4, 7, 11],
                vec![0, 3, 6, 10],
                vec![0, 4, 7, 9],
                vec![0, 5, 10],
            ],
        }
    }

    /// Syncopated idiom on a major pentatonic
    pub fn reggaeton() -> Self {
        Self {
            name: "reggaeton",
            base_frequency: 160.0,
            waveform: Waveform::Triangle,
            scale: vec![0, 2, 5, 7, 9],
            chord_table: vec![
                vec![0, 4, 7],
                vec![0, 3, 7],
                vec![0, 5, 9],
                vec![0, 2, 7],
            ],
        }
    }

    /// Slow, washed-out idiom with wide voicings
    pub fn vaporwave() -> Self {
        Self {
            name: "vaporwave",
            base_frequency: 100.0,
            waveform: Waveform::Sine,
            scale: vec![0, 4, 7, 11, 14],
            chord_table: vec![
                vec![0, 4, 7, 11],
                vec![0, 3, 7, 10],
                vec![0, 5, 9, 14],
                vec![0, 7, 12],
            ],
        }
    }

    /// All built-in profiles
    pub fn all() -> Vec<StyleProfile> {
        vec![
            Self::techno(),
            Self::jazz(),
            Self::reggaeton(),
            Self::vaporwave(),
        ]
    }

    /// Look up a built-in profile by name
    pub fn by_name(name: &str) -> Option<StyleProfile> {
        Self::all()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Reject profiles that cannot drive the melody mapping
    pub fn validate(&self) -> Result<()> {
        if self.scale.is_empty() {
            return Err(Error::Config(format!("style {}: empty scale", self.name)));
        }
        if self.chord_table.is_empty() {
            return Err(Error::Config(format!(
                "style {}: empty chord table",
                self.name
            )));
        }
        if !(self.base_frequency.is_finite() && self.base_frequency > 0.0) {
            return Err(Error::Config(format!(
                "style {}: base frequency {} not positive",
                self.name, self.base_frequency
            )));
        }
        Ok(())
    }
}

impl Default for StyleProfile {
    fn default() -> Self {
        Self::techno()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        for profile in StyleProfile::all() {
            assert!(profile.validate().is_ok(), "profile {}", profile.name);
            assert!(!profile.scale.is_empty());
            assert!(!profile.chord_table.is_empty());
        }
    }

    #[test]
    fn test_by_name() {
        assert_eq!(StyleProfile::by_name("jazz").unwrap().base_frequency, 120.0);
        assert_eq!(StyleProfile::by_name("TECHNO").unwrap().name, "techno");
        assert!(StyleProfile::by_name("polka").is_none());
    }

    #[test]
    fn test_validate_rejects_degenerate_profiles() {
        let mut profile = StyleProfile::techno();
        profile.scale.clear();
        assert!(profile.validate().is_err());

        let mut profile = StyleProfile::techno();
        profile.chord_table.clear();
        assert!(profile.validate().is_err());

        let mut profile = StyleProfile::techno();
        profile.base_frequency = 0.0;
        assert!(profile.validate().is_err());
    }
}
