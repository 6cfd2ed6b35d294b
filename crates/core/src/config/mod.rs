use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, StageError};

/// Top-level configuration structure for the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generator: GeneratorConfig,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Loads a configuration file. Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.generator.validate()?;
        self.analysis.validate()
    }
}

/// Placement parameters shared by the placer and the stage assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Horizontal scroll speed in pixels per second.
    pub scroll_speed: u32,
    /// Minimum horizontal distance between two pillars in pixels.
    pub min_pillar_spacing: u32,
    /// Number of parallel lanes a pillar can block.
    pub total_lanes: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            scroll_speed: 80,
            min_pillar_spacing: 400,
            total_lanes: 7,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scroll_speed == 0 {
            return Err(StageError::InvalidInput("scroll speed must be positive"));
        }
        // The hardest tier blocks four lanes and still needs an open corridor.
        if self.total_lanes <= crate::mapping::MAX_BLOCKED_LANES {
            return Err(StageError::InvalidInput(
                "total lanes must exceed the largest blocked lane count",
            ));
        }
        Ok(())
    }
}

/// Frame layout and search ranges for the DSP primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Rate decoded audio is resampled to before analysis.
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Tempo the estimator leans towards when the envelope is ambiguous.
    pub start_bpm: f64,
    /// Weight of the beat tracker's deviation-from-period penalty.
    pub tightness: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::audio::TARGET_SAMPLE_RATE,
            frame_size: 2048,
            hop_size: 512,
            min_bpm: 60.0,
            max_bpm: 200.0,
            start_bpm: 120.0,
            tightness: 100.0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(StageError::InvalidInput("analysis sample rate must be positive"));
        }
        if self.frame_size < 2 || self.hop_size == 0 {
            return Err(StageError::InvalidInput(
                "frame size must be at least two samples and hop size positive",
            ));
        }
        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm) {
            return Err(StageError::InvalidInput("tempo range must be positive and ordered"));
        }
        Ok(())
    }
}
