//! Onset picking, tempo estimation and dynamic-programming beat tracking over
//! an onset strength envelope sampled at `frame_rate` frames per second.

/// Minimum onset height above the local average, relative to the envelope peak.
const ONSET_DELTA: f32 = 0.07;
/// Width of the tempo prior in octaves.
const TEMPO_PRIOR_OCTAVES: f64 = 1.0;

fn frames_for(seconds: f64, frame_rate: f64) -> usize {
    (seconds * frame_rate).floor() as usize
}

/// Picks onset frames from the envelope and rolls each one back to the
/// preceding energy minimum.
pub fn detect_onsets(envelope: &[f32], frame_rate: f64) -> Vec<usize> {
    let Some(normalized) = unit_range(envelope) else {
        return Vec::new();
    };

    let pre_max = frames_for(0.03, frame_rate);
    let post_max = frames_for(0.0, frame_rate) + 1;
    let pre_avg = frames_for(0.10, frame_rate);
    let post_avg = frames_for(0.10, frame_rate) + 1;
    let wait = frames_for(0.03, frame_rate);

    let len = normalized.len();
    let mut peaks = Vec::new();
    let mut last_peak: Option<usize> = None;

    for (index, &value) in normalized.iter().enumerate() {
        let max_window = &normalized[index.saturating_sub(pre_max)..(index + post_max).min(len)];
        let local_max = max_window.iter().copied().fold(f32::MIN, f32::max);
        if value < local_max {
            continue;
        }

        let avg_window = &normalized[index.saturating_sub(pre_avg)..(index + post_avg).min(len)];
        let local_avg = avg_window.iter().sum::<f32>() / avg_window.len() as f32;
        if value < local_avg + ONSET_DELTA {
            continue;
        }

        if last_peak.map_or(true, |last| index > last + wait) {
            peaks.push(index);
            last_peak = Some(index);
        }
    }

    let mut onsets = backtrack(&peaks, envelope);
    onsets.dedup();
    onsets
}

/// Moves every event back to the closest preceding local minimum of `energy`.
fn backtrack(events: &[usize], energy: &[f32]) -> Vec<usize> {
    let minima: Vec<usize> = (0..energy.len())
        .filter(|&i| {
            let before = if i == 0 { energy[i] } else { energy[i - 1] };
            let after = energy.get(i + 1).copied().unwrap_or(energy[i]);
            energy[i] <= before && energy[i] < after
        })
        .collect();

    events
        .iter()
        .map(|&event| {
            let position = minima.partition_point(|&minimum| minimum <= event);
            if position == 0 {
                0
            } else {
                minima[position - 1]
            }
        })
        .collect()
}

/// Estimates the global tempo in BPM from the autocorrelation of the envelope,
/// weighted by a log-normal prior around `start_bpm`. Flat envelopes yield
/// `start_bpm`.
pub fn estimate_tempo(
    envelope: &[f32],
    frame_rate: f64,
    min_bpm: f64,
    max_bpm: f64,
    start_bpm: f64,
) -> f64 {
    let min_lag = ((60.0 * frame_rate / max_bpm).ceil() as usize).max(1);
    let max_lag = (60.0 * frame_rate / min_bpm).floor() as usize;
    let max_lag = max_lag.min(envelope.len().saturating_sub(1));

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let correlation: f64 = envelope
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| f64::from(*a) * f64::from(*b))
            .sum::<f64>()
            / (envelope.len() - lag) as f64;

        let bpm = 60.0 * frame_rate / lag as f64;
        let octaves = (bpm / start_bpm).log2() / TEMPO_PRIOR_OCTAVES;
        let score = correlation * (-0.5 * octaves * octaves).exp();

        if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((lag, score));
        }
    }

    best.map(|(lag, _)| 60.0 * frame_rate / lag as f64)
        .unwrap_or(start_bpm)
}

/// Tracks beats at roughly `bpm` through the envelope and returns strictly
/// increasing beat frames.
pub fn track_beats(envelope: &[f32], frame_rate: f64, bpm: f64, tightness: f64) -> Vec<usize> {
    if envelope.iter().all(|value| *value == 0.0) || bpm <= 0.0 {
        return Vec::new();
    }

    let period = (60.0 * frame_rate / bpm).round().max(1.0);
    let local = local_score(&normalize_by_std(envelope), period as usize);

    let len = local.len();
    let min_offset = ((period / 2.0).round() as usize).max(1);
    let max_offset = (2.0 * period).round() as usize;

    let onset_floor = 0.01 * local.iter().copied().fold(0.0, f64::max);

    let mut cumulative = vec![0.0f64; len];
    let mut backlink: Vec<Option<usize>> = vec![None; len];
    let mut first_beat = true;

    for index in 0..len {
        // Offsets reaching before the first frame start a fresh chain with a
        // zero score.
        let mut best: Option<(Option<usize>, f64)> = None;
        for offset in (min_offset..=max_offset).rev() {
            let ratio = offset as f64 / period;
            let penalty = -tightness * ratio.ln().powi(2);
            let (previous, candidate) = match index.checked_sub(offset) {
                Some(previous) => (Some(previous), cumulative[previous] + penalty),
                None => (None, penalty),
            };
            if best.map_or(true, |(_, score)| candidate > score) {
                best = Some((previous, candidate));
            }
        }

        let (previous, score) = best.unwrap_or((None, 0.0));
        cumulative[index] = local[index] + score;
        if first_beat && local[index] < onset_floor {
            backlink[index] = None;
        } else {
            backlink[index] = previous;
            first_beat = false;
        }
    }

    let Some(last) = last_beat(&cumulative) else {
        return Vec::new();
    };

    let mut beats = vec![last];
    let mut cursor = last;
    while let Some(previous) = backlink[cursor] {
        beats.push(previous);
        cursor = previous;
    }
    beats.reverse();

    trim_weak_beats(&beats, &local)
}

fn unit_range(values: &[f32]) -> Option<Vec<f32>> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !(range > 0.0) {
        return None;
    }
    Some(values.iter().map(|value| (value - min) / range).collect())
}

fn normalize_by_std(envelope: &[f32]) -> Vec<f64> {
    let n = envelope.len() as f64;
    let mean = envelope.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
    let variance = envelope
        .iter()
        .map(|v| (f64::from(*v) - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0).max(1.0);
    let std = variance.sqrt();
    if std > 0.0 {
        envelope.iter().map(|v| f64::from(*v) / std).collect()
    } else {
        envelope.iter().map(|v| f64::from(*v)).collect()
    }
}

/// Smooths the envelope with a Gaussian spanning one beat period each side.
fn local_score(envelope: &[f64], period: usize) -> Vec<f64> {
    let radius = period as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|offset| (-0.5 * (offset as f64 * 32.0 / period as f64).powi(2)).exp())
        .collect();

    (0..envelope.len() as isize)
        .map(|centre| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, weight)| {
                    let position = centre + k as isize - radius;
                    usize::try_from(position)
                        .ok()
                        .and_then(|p| envelope.get(p))
                        .map(|value| value * weight)
                })
                .sum()
        })
        .collect()
}

/// The last local maximum of the cumulative score that clears half the median
/// of all local maxima.
fn last_beat(cumulative: &[f64]) -> Option<usize> {
    let len = cumulative.len();
    let is_peak = |i: usize| {
        let before = if i == 0 { f64::NEG_INFINITY } else { cumulative[i - 1] };
        let after = cumulative.get(i + 1).copied().unwrap_or(f64::NEG_INFINITY);
        cumulative[i] > before && cumulative[i] >= after
    };

    let mut peaks: Vec<f64> = (0..len).filter(|&i| is_peak(i)).map(|i| cumulative[i]).collect();
    if peaks.is_empty() {
        return None;
    }
    peaks.sort_by(|a, b| a.total_cmp(b));
    let median = peaks[peaks.len() / 2];

    (0..len)
        .rev()
        .find(|&i| is_peak(i) && cumulative[i] >= 0.5 * median)
}

/// Drops leading and trailing beats whose local score is below half the RMS
/// of the local score.
fn trim_weak_beats(beats: &[usize], local: &[f64]) -> Vec<usize> {
    let rms = (local.iter().map(|v| v * v).sum::<f64>() / local.len().max(1) as f64).sqrt();
    let threshold = 0.5 * rms;
    let strong = |beat: &&usize| local[**beat] > threshold;

    let start = beats.iter().position(|beat| strong(&beat));
    let end = beats.iter().rposition(|beat| strong(&beat));
    match (start, end) {
        (Some(start), Some(end)) => beats[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Impulse envelope with one spike every `spacing` frames.
    fn pulse_train(len: usize, spacing: usize, offset: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i >= offset && (i - offset) % spacing == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn picks_isolated_peaks() {
        let mut envelope = vec![0.0; 200];
        envelope[50] = 1.0;
        envelope[120] = 0.8;

        let onsets = detect_onsets(&envelope, 43.0);
        assert_eq!(onsets, vec![49, 119]);
    }

    #[test]
    fn flat_envelope_has_no_onsets() {
        assert!(detect_onsets(&[0.3; 64], 43.0).is_empty());
    }

    #[test]
    fn backtracks_to_preceding_minimum() {
        let energy = [0.5, 0.2, 0.4, 0.9, 0.6, 0.1, 0.3, 1.0];
        assert_eq!(backtrack(&[3, 7], &energy), vec![1, 5]);
        assert_eq!(backtrack(&[0], &energy), vec![0]);
    }

    #[test]
    fn tempo_follows_pulse_spacing() {
        // 43 frames/s with a pulse every 21 frames is ~122.9 BPM.
        let envelope = pulse_train(43 * 20, 21, 5);
        let bpm = estimate_tempo(&envelope, 43.0, 60.0, 200.0, 120.0);
        assert!((bpm - 60.0 * 43.0 / 21.0).abs() < 1e-9, "bpm {bpm}");
    }

    #[test]
    fn silent_envelope_falls_back_to_start_tempo() {
        let bpm = estimate_tempo(&[0.0; 500], 43.0, 60.0, 200.0, 120.0);
        assert_eq!(bpm, 120.0);
    }

    #[test]
    fn beats_land_on_pulses() {
        let envelope = pulse_train(43 * 10, 20, 10);
        let beats = track_beats(&envelope, 43.0, 60.0 * 43.0 / 20.0, 100.0);

        assert!(beats.len() >= 15, "found {} beats", beats.len());
        assert!(beats.windows(2).all(|pair| pair[0] < pair[1]));
        for beat in &beats {
            assert_eq!((beat - 10) % 20, 0, "beat {beat} off the grid");
        }
    }

    #[test]
    fn silent_envelope_has_no_beats() {
        assert!(track_beats(&[0.0; 100], 43.0, 120.0, 100.0).is_empty());
    }
}
