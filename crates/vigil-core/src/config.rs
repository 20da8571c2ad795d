use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("history_length must be > 0")]
    ZeroHistoryLength,
    #[error("dc_mask_radius must be > 0, the spectrum peak would be the DC term")]
    ZeroMaskRadius,
    #[error("{name} must be finite and >= 0, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
}

/// Which anti-spoofing pipeline the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Static-artifact gate (frequency peak, depth flatness) followed by
    /// blink and head-motion dynamics. Requires landmarks.
    #[default]
    Landmarks,
    /// Majority vote over texture, frequency, edge and motion indicators.
    /// Landmarks only gate face presence and locate the face.
    DepthTexture,
}

/// Engine thresholds and window sizes.
///
/// Any field missing from a deserialized document takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub strategy: Strategy,
    /// Samples (frames) in the EAR and head-depth windows.
    pub history_length: usize,
    /// EAR std above which the window counts as containing blinks.
    pub ear_std_threshold: f64,
    /// Nose-tip depth std above which the head counts as moving.
    pub head_move_std_threshold: f64,
    /// Mesh depth std below which the face is a flat image.
    pub static_z_std_threshold: f64,
    /// Off-DC spectrum peak (`20 ln(|F| + 1)`) above which the crop is a
    /// screen or printed reproduction.
    pub fourier_peak_threshold: f64,
    /// Pixels added on each side of the landmark box before the spectrum crop.
    pub crop_padding: u32,
    /// Radius of the disk around DC removed before taking the spectrum peak.
    pub dc_mask_radius: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Landmarks,
            history_length: 20,
            ear_std_threshold: 0.015,
            head_move_std_threshold: 0.002,
            static_z_std_threshold: 0.01,
            fourier_peak_threshold: 265.0,
            crop_padding: 10,
            dc_mask_radius: 5,
        }
    }
}

impl LivenessConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_length == 0 {
            return Err(ConfigError::ZeroHistoryLength);
        }
        if self.dc_mask_radius == 0 {
            return Err(ConfigError::ZeroMaskRadius);
        }
        let thresholds = [
            ("ear_std_threshold", self.ear_std_threshold),
            ("head_move_std_threshold", self.head_move_std_threshold),
            ("static_z_std_threshold", self.static_z_std_threshold),
            ("fourier_peak_threshold", self.fourier_peak_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }
}
