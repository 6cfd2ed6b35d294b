//! Offline feature extraction: turns a decoded waveform into beat, onset and
//! normalised envelope series.

pub mod beat;
pub mod dsp;

use serde::{Deserialize, Serialize};

use crate::{AnalysisConfig, DecodedAudio, Result, StageError};

use self::dsp::Stft;

/// A single value of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopePoint {
    pub time: f64,
    pub value: f32,
}

/// Time-aligned features of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub duration: f64,
    pub tempo: f64,
    /// Strictly increasing beat timestamps in seconds.
    pub beat_times: Vec<f64>,
    pub onset_times: Vec<f64>,
    /// Frame RMS, min-max normalised to [0, 1].
    pub rms_envelope: Vec<EnvelopePoint>,
    /// Spectral centroid ("brightness"), min-max normalised to [0, 1].
    pub spectral_envelope: Vec<EnvelopePoint>,
    pub sample_rate: u32,
}

/// Runs the DSP primitives over a whole waveform.
#[derive(Debug)]
pub struct FeatureExtractor {
    config: AnalysisConfig,
    stft: Stft,
}

impl FeatureExtractor {
    pub fn new(config: AnalysisConfig) -> Self {
        let stft = Stft::new(config.frame_size, config.hop_size);
        Self { config, stft }
    }

    /// Convenience wrapper around [`FeatureExtractor::extract`].
    pub fn extract_audio(&mut self, audio: &DecodedAudio) -> Result<AudioFeatures> {
        self.extract(&audio.samples, audio.sample_rate)
    }

    pub fn extract(&mut self, samples: &[f32], sample_rate: u32) -> Result<AudioFeatures> {
        if samples.is_empty() {
            return Err(StageError::InvalidInput(
                "feature extraction requires at least one sample",
            ));
        }
        if sample_rate == 0 {
            return Err(StageError::InvalidInput("sample rate must be positive"));
        }

        let hop = self.config.hop_size;
        let frame_rate = sample_rate as f64 / hop as f64;
        let frame_time = |frame: usize| frame as f64 * hop as f64 / sample_rate as f64;
        let duration = samples.len() as f64 / sample_rate as f64;
        tracing::info!(duration, sample_rate, "analysing waveform");

        let spectral = self.stft.analyse(samples, sample_rate)?;

        tracing::info!("detecting tempo and beats");
        let tempo = beat::estimate_tempo(
            &spectral.onset_strength,
            frame_rate,
            self.config.min_bpm,
            self.config.max_bpm,
            self.config.start_bpm,
        );
        let beat_times: Vec<f64> = beat::track_beats(
            &spectral.onset_strength,
            frame_rate,
            tempo,
            self.config.tightness,
        )
        .into_iter()
        .map(frame_time)
        .collect();

        tracing::info!("detecting onsets");
        let onset_times: Vec<f64> = beat::detect_onsets(&spectral.onset_strength, frame_rate)
            .into_iter()
            .map(frame_time)
            .collect();

        tracing::info!("calculating amplitude and spectral envelopes");
        let rms = dsp::frame_rms(samples, self.config.frame_size, hop);
        let rms_envelope = to_envelope(&normalize_min_max(&rms), frame_time);
        let spectral_envelope =
            to_envelope(&normalize_min_max(&spectral.centroid), frame_time);

        tracing::info!(
            beats = beat_times.len(),
            onsets = onset_times.len(),
            tempo = format_args!("{tempo:.1}"),
            "analysis complete"
        );

        Ok(AudioFeatures {
            duration,
            tempo,
            beat_times,
            onset_times,
            rms_envelope,
            spectral_envelope,
            sample_rate,
        })
    }
}

fn to_envelope(values: &[f32], frame_time: impl Fn(usize) -> f64) -> Vec<EnvelopePoint> {
    values
        .iter()
        .enumerate()
        .map(|(frame, value)| EnvelopePoint {
            time: frame_time(frame),
            value: *value,
        })
        .collect()
}

/// Rescales values to [0, 1] using the series' own minimum and maximum.
///
/// A series without range (constant, or empty) maps to all zeros.
pub fn normalize_min_max(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !(range > 0.0) {
        if !values.is_empty() {
            tracing::warn!("feature series has no range, treating it as silent");
        }
        return vec![0.0; values.len()];
    }

    values.iter().map(|value| (value - min) / range).collect()
}

/// Index of the point whose timestamp is closest to `time`. Ties resolve to the
/// earlier point. Returns `None` for an empty envelope.
pub fn nearest_index(envelope: &[EnvelopePoint], time: f64) -> Option<usize> {
    if envelope.is_empty() {
        return None;
    }

    let after = envelope.partition_point(|point| point.time < time);
    if after == 0 {
        return Some(0);
    }
    if after == envelope.len() {
        return Some(envelope.len() - 1);
    }

    let before = after - 1;
    let distance_before = (time - envelope[before].time).abs();
    let distance_after = (envelope[after].time - time).abs();
    if distance_before <= distance_after {
        Some(before)
    } else {
        Some(after)
    }
}
