use serde::{Deserialize, Serialize};

use crate::{AudioFeatures, Pillar};

/// Provenance tag recorded in every generated stage.
pub const GENERATED_FROM: &str = "stage-forge";

/// Global force scaling applied by the game; generated stages never change it.
pub const FORCE_MULTIPLIER: f64 = 1.0;

/// Complete level description handed to the renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub name: String,
    pub audio_file: String,
    /// Seconds, rounded to two decimals.
    pub duration: f64,
    /// Tempo rounded to one decimal.
    pub bpm: f64,
    /// Scroll length in pixels.
    pub length: u32,
    pub force_multiplier: f64,
    pub pillars: Vec<Pillar>,
    pub metadata: StageMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMetadata {
    pub generated_from: String,
    pub tempo: f64,
    pub beats: usize,
    pub onsets: usize,
    pub pillars_generated: usize,
}

/// Builds the [`StageConfig`] record for a generation run.
#[derive(Debug, Clone, Copy)]
pub struct StageAssembler {
    scroll_speed: u32,
}

impl StageAssembler {
    pub fn new(scroll_speed: u32) -> Self {
        Self { scroll_speed }
    }

    pub fn assemble(
        &self,
        name: impl Into<String>,
        audio_file: impl Into<String>,
        features: &AudioFeatures,
        pillars: Vec<Pillar>,
    ) -> StageConfig {
        let bpm = round_to(features.tempo, 1);
        let metadata = StageMetadata {
            generated_from: GENERATED_FROM.to_string(),
            tempo: bpm,
            beats: features.beat_times.len(),
            onsets: features.onset_times.len(),
            pillars_generated: pillars.len(),
        };

        StageConfig {
            name: name.into(),
            audio_file: audio_file.into(),
            duration: round_to(features.duration, 2),
            bpm,
            length: (features.duration * self.scroll_speed as f64).floor() as u32,
            force_multiplier: FORCE_MULTIPLIER,
            pillars,
            metadata,
        }
    }
}

/// Rounds to `decimals` places using the exact binary value of `value`, with
/// ties going to the even digit. `decimals` must stay below 16.
fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let bits = value.to_bits();
    let negative = bits >> 63 == 1;
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1 << 52) - 1);
    let (mantissa, exponent) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | 1 << 52, biased - 1075)
    };
    if exponent >= 0 {
        return value;
    }

    // value * 10^decimals == scaled / 2^shift exactly.
    let scale = 10u128.pow(decimals);
    let scaled = u128::from(mantissa) * scale;
    let shift = exponent.unsigned_abs();
    let quotient = if shift >= 128 {
        0
    } else {
        let whole = scaled >> shift;
        let remainder = scaled - (whole << shift);
        let half = 1u128 << (shift - 1);
        if remainder > half || (remainder == half && whole & 1 == 1) {
            whole + 1
        } else {
            whole
        }
    };

    let magnitude = quotient as f64 / scale as f64;
    if negative {
        -magnitude
    } else {
        magnitude
    }
}
