//! Frame-based DSP primitives used by the feature extractor.
//!
//! Frames are centred: frame `i` covers `[i * hop - frame / 2, i * hop + frame / 2)`
//! with zeros outside the waveform, so its timestamp is `i * hop / sample_rate`.

use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::Result;

/// Scale applied before log compression of spectral magnitudes.
const LOG_COMPRESSION: f32 = 1000.0;

/// Number of centred frames for a waveform of `len` samples.
pub fn frame_count(len: usize, hop_size: usize) -> usize {
    1 + len / hop_size
}

/// Copies the centred frame `index` into `out`, zero padding past either edge.
pub fn fill_frame(samples: &[f32], index: usize, hop_size: usize, out: &mut [f32]) {
    let half = out.len() / 2;
    let centre = index * hop_size;
    for (offset, slot) in out.iter_mut().enumerate() {
        *slot = (centre + offset)
            .checked_sub(half)
            .and_then(|position| samples.get(position))
            .copied()
            .unwrap_or(0.0);
    }
}

/// Root-mean-square energy of every centred frame.
pub fn frame_rms(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<f32> {
    let mut frame = vec![0.0; frame_size];
    (0..frame_count(samples.len(), hop_size))
        .map(|index| {
            fill_frame(samples, index, hop_size, &mut frame);
            compute_rms(&frame)
        })
        .collect()
}

pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

/// Per-frame spectral series derived from a single STFT pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralSeries {
    /// Magnitude-weighted mean frequency in Hz; silent frames yield 0.
    pub centroid: Vec<f32>,
    /// Half-wave rectified flux of the log-compressed spectrum; frame 0 is 0.
    pub onset_strength: Vec<f32>,
}

/// Short-time Fourier analyser holding a reusable forward plan.
pub struct Stft {
    frame_size: usize,
    hop_size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
}

impl Stft {
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(frame_size);
        let window = (0..frame_size)
            .map(|index| hann_value(index, frame_size))
            .collect();
        Self {
            frame_size,
            hop_size,
            input: plan.make_input_vec(),
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            plan,
            window,
        }
    }

    /// Computes spectral centroid and onset strength for every frame.
    pub fn analyse(&mut self, samples: &[f32], sample_rate: u32) -> Result<SpectralSeries> {
        let frames = frame_count(samples.len(), self.hop_size);
        let bin_hz = sample_rate as f32 / self.frame_size as f32;
        let bins = self.spectrum.len();

        let mut series = SpectralSeries {
            centroid: Vec::with_capacity(frames),
            onset_strength: Vec::with_capacity(frames),
        };
        let mut previous: Option<Vec<f32>> = None;
        let mut current = vec![0.0; bins];

        for index in 0..frames {
            fill_frame(samples, index, self.hop_size, &mut self.input);
            for (sample, weight) in self.input.iter_mut().zip(&self.window) {
                *sample *= weight;
            }
            self.plan
                .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

            let mut magnitude_sum = 0.0;
            let mut weighted_sum = 0.0;
            for (bin, (value, log_magnitude)) in
                self.spectrum.iter().zip(current.iter_mut()).enumerate()
            {
                let magnitude = value.norm();
                magnitude_sum += magnitude;
                weighted_sum += magnitude * (bin as f32 * bin_hz);
                *log_magnitude = (1.0 + LOG_COMPRESSION * magnitude).ln();
            }

            series.centroid.push(if magnitude_sum <= f32::EPSILON {
                0.0
            } else {
                weighted_sum / magnitude_sum
            });

            let flux = match &previous {
                Some(prev) => {
                    current
                        .iter()
                        .zip(prev)
                        .map(|(now, before)| (now - before).max(0.0))
                        .sum::<f32>()
                        / bins as f32
                }
                None => 0.0,
            };
            series.onset_strength.push(flux);

            match &mut previous {
                Some(prev) => prev.copy_from_slice(&current),
                None => previous = Some(current.clone()),
            }
        }

        Ok(series)
    }
}

impl fmt::Debug for Stft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stft")
            .field("frame_size", &self.frame_size)
            .field("hop_size", &self.hop_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn centred_frames_cover_the_whole_signal() {
        assert_eq!(frame_count(0, 512), 1);
        assert_eq!(frame_count(1024, 512), 3);

        let samples = [1.0, 2.0, 3.0, 4.0];
        let mut frame = [0.0; 4];
        fill_frame(&samples, 0, 2, &mut frame);
        assert_eq!(frame, [0.0, 0.0, 1.0, 2.0]);
        fill_frame(&samples, 2, 2, &mut frame);
        assert_eq!(frame, [3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn rms_of_constant_signal_is_its_level() {
        let samples = vec![0.5; 8192];
        let rms = frame_rms(&samples, 2048, 512);
        assert_eq!(rms.len(), frame_count(samples.len(), 512));
        // Interior frames are fully inside the signal.
        assert!((rms[8] - 0.5).abs() < 1e-6);
        assert!(rms[0] < rms[8]);
    }

    #[test]
    fn centroid_tracks_tone_frequency() {
        let sample_rate = 22_050;
        let mut stft = Stft::new(2048, 512);
        let low = stft.analyse(&sine(440.0, sample_rate, 1.0), sample_rate).unwrap();
        let high = stft.analyse(&sine(4_000.0, sample_rate, 1.0), sample_rate).unwrap();

        let mid = low.centroid.len() / 2;
        assert!((low.centroid[mid] - 440.0).abs() < 150.0);
        assert!(high.centroid[mid] > low.centroid[mid] * 4.0);
    }

    #[test]
    fn silence_has_no_centroid_or_flux() {
        let mut stft = Stft::new(1024, 256);
        let series = stft.analyse(&vec![0.0; 4096], 22_050).unwrap();
        assert!(series.centroid.iter().all(|value| *value == 0.0));
        assert!(series.onset_strength.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn flux_peaks_when_sound_starts() {
        let sample_rate = 22_050;
        let mut samples = vec![0.0; sample_rate as usize];
        samples.extend(sine(1_000.0, sample_rate, 1.0));

        let mut stft = Stft::new(2048, 512);
        let series = stft.analyse(&samples, sample_rate).unwrap();
        let (peak, _) = series
            .onset_strength
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });

        let onset_frame = sample_rate as usize / 512;
        assert!(peak.abs_diff(onset_frame) <= 3, "peak at frame {peak}");
        assert_eq!(series.onset_strength[0], 0.0);
    }
}
