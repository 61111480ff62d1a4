//! Render settings: TOML-loadable engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load or validate render settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid TOML.
    #[error("cannot parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of its supported range.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Engine configuration for an offline render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Engine sample rate in Hz.
    pub sample_rate: f32,
    /// Frames per processing quantum.
    pub quantum_size: usize,
    /// Length of the render in seconds.
    pub duration_secs: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            quantum_size: 128,
            duration_secs: 2.0,
        }
    }
}

impl RenderSettings {
    /// Loads settings from a TOML file and validates them.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        let settings: RenderSettings = toml::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every field against its supported range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(3_000.0..=384_000.0).contains(&self.sample_rate) {
            return Err(SettingsError::Invalid(format!(
                "sample_rate {} outside 3000..=384000",
                self.sample_rate
            )));
        }
        if !(1..=8192).contains(&self.quantum_size) {
            return Err(SettingsError::Invalid(format!(
                "quantum_size {} outside 1..=8192",
                self.quantum_size
            )));
        }
        if !(self.duration_secs > 0.0 && self.duration_secs <= 3_600.0) {
            return Err(SettingsError::Invalid(format!(
                "duration_secs {} outside (0, 3600]",
                self.duration_secs
            )));
        }
        Ok(())
    }

    /// Total number of frames the render produces.
    pub fn total_frames(&self) -> u64 {
        (self.duration_secs * f64::from(self.sample_rate)).ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        RenderSettings::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut settings = RenderSettings::default();
        settings.sample_rate = 100.0;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = RenderSettings::default();
        settings.quantum_size = 0;
        assert!(settings.validate().is_err());

        let mut settings = RenderSettings::default();
        settings.duration_secs = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sample_rate = 44100.0").unwrap();

        let settings = RenderSettings::load(file.path()).unwrap();
        assert_eq!(settings.sample_rate, 44_100.0);
        assert_eq!(settings.quantum_size, 128);
    }

    #[test]
    fn total_frames_rounds_up() {
        let settings = RenderSettings {
            sample_rate: 1000.0,
            quantum_size: 128,
            duration_secs: 0.0015,
        };
        assert_eq!(settings.total_frames(), 2);
    }
}
