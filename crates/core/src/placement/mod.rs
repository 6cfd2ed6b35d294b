use serde::{Deserialize, Serialize};

use crate::{
    analysis::nearest_index, AudioFeatures, DifficultyMapper, GeneratorConfig, LaneSelector,
    Result, StageError,
};

/// Brightness above which a pillar blocks the top lanes.
const TOP_BRIGHTNESS: f32 = 0.5;

/// A positioned obstacle blocking a contiguous band of lanes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pillar {
    pub x: u32,
    pub blocked_lanes: Vec<u8>,
    pub width: u32,
}

/// Places pillars on every other beat, greedily enforcing a minimum spacing.
///
/// Placement is a single forward pass. A rejected beat is never revisited, so
/// an early cluster of beats can push a later, stronger beat out of range.
#[derive(Debug, Clone)]
pub struct PillarPlacer {
    scroll_speed: u32,
    min_spacing: u32,
    difficulty: DifficultyMapper,
    lanes: LaneSelector,
}

impl PillarPlacer {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scroll_speed: config.scroll_speed,
            min_spacing: config.min_pillar_spacing,
            difficulty: DifficultyMapper::new(config.total_lanes)?,
            lanes: LaneSelector::new(config.total_lanes),
        })
    }

    /// Horizontal position of a timestamp in pixels.
    pub fn position(&self, time: f64) -> u32 {
        (time * self.scroll_speed as f64).floor().max(0.0) as u32
    }

    pub fn place(&self, features: &AudioFeatures) -> Result<Vec<Pillar>> {
        let mut pillars = Vec::new();
        let mut last_x = -i64::from(self.min_spacing);

        for &time in features.beat_times.iter().step_by(2) {
            let x = self.position(time);
            if i64::from(x) - last_x < i64::from(self.min_spacing) {
                tracing::trace!(time, x, "beat rejected by spacing");
                continue;
            }

            let amplitude_index = nearest_index(&features.rms_envelope, time)
                .ok_or(StageError::InvalidInput("amplitude envelope is empty"))?;
            let amplitude = features.rms_envelope[amplitude_index].value;

            let brightness_index = amplitude_index.min(
                features
                    .spectral_envelope
                    .len()
                    .checked_sub(1)
                    .ok_or(StageError::InvalidInput("spectral envelope is empty"))?,
            );
            let brightness = features.spectral_envelope[brightness_index].value;

            let shape = self.difficulty.map(amplitude);
            let is_top = brightness > TOP_BRIGHTNESS;
            let blocked = self.lanes.blocked_lanes(shape.lane_count, is_top)?;

            pillars.push(Pillar {
                x,
                blocked_lanes: blocked.collect(),
                width: shape.width,
            });
            last_x = i64::from(x);
        }

        tracing::info!(pillars = pillars.len(), "generated pillars");
        Ok(pillars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnvelopePoint;
    use proptest::prelude::*;

    fn constant_envelope(duration: f64, value: f32) -> Vec<EnvelopePoint> {
        (0..=(duration * 10.0) as usize)
            .map(|i| EnvelopePoint {
                time: i as f64 * 0.1,
                value,
            })
            .collect()
    }

    fn features(beats: Vec<f64>, amplitude: f32, brightness: f32) -> AudioFeatures {
        let duration = beats.last().copied().unwrap_or(0.0) + 1.0;
        AudioFeatures {
            duration,
            tempo: 120.0,
            beat_times: beats,
            onset_times: Vec::new(),
            rms_envelope: constant_envelope(duration, amplitude),
            spectral_envelope: constant_envelope(duration, brightness),
            sample_rate: 22_050,
        }
    }

    fn placer(scroll_speed: u32, min_pillar_spacing: u32) -> PillarPlacer {
        PillarPlacer::new(&GeneratorConfig {
            scroll_speed,
            min_pillar_spacing,
            total_lanes: 7,
        })
        .unwrap()
    }

    #[test]
    fn spacing_gate_rejects_close_beats() {
        let input = features(vec![0.0, 0.5, 1.0, 1.5, 2.0], 0.1, 0.1);
        let pillars = placer(80, 400).place(&input).unwrap();

        assert_eq!(pillars.len(), 1);
        assert_eq!(pillars[0].x, 0);
    }

    #[test]
    fn only_even_beats_are_candidates() {
        let input = features(vec![0.0, 1.0, 2.0, 3.0, 4.0], 0.1, 0.1);
        let xs: Vec<u32> = placer(100, 100)
            .place(&input)
            .unwrap()
            .iter()
            .map(|p| p.x)
            .collect();
        assert_eq!(xs, vec![0, 200, 400]);
    }

    #[test]
    fn loud_bright_beat_blocks_top_lanes() {
        let input = features(vec![10.0], 0.8, 0.9);
        let pillars = placer(80, 400).place(&input).unwrap();

        assert_eq!(
            pillars,
            vec![Pillar {
                x: 800,
                blocked_lanes: vec![3, 4, 5, 6],
                width: 90,
            }]
        );
    }

    #[test]
    fn dark_beat_blocks_bottom_lanes() {
        let input = features(vec![1.0], 0.45, 0.5);
        let pillars = placer(80, 400).place(&input).unwrap();
        assert_eq!(pillars[0].blocked_lanes, vec![0, 1, 2]);
        assert_eq!(pillars[0].width, 70);
    }

    #[test]
    fn brightness_index_is_clamped_to_shorter_series() {
        let mut input = features(vec![5.0], 0.1, 0.0);
        input.spectral_envelope = vec![EnvelopePoint {
            time: 0.0,
            value: 0.9,
        }];
        let pillars = placer(80, 400).place(&input).unwrap();
        assert_eq!(pillars[0].blocked_lanes, vec![5, 6]);
    }

    #[test]
    fn empty_envelopes_are_rejected() {
        let mut input = features(vec![1.0], 0.1, 0.1);
        input.rms_envelope.clear();
        assert!(placer(80, 400).place(&input).is_err());
    }

    #[test]
    fn no_beats_means_no_pillars() {
        let input = features(Vec::new(), 0.5, 0.5);
        assert!(placer(80, 400).place(&input).unwrap().is_empty());
    }

    fn arbitrary_features() -> impl Strategy<Value = AudioFeatures> {
        (
            prop::collection::vec(0.01f64..2.0, 0..60),
            prop::collection::vec(0.0f32..=1.0, 1..400),
            prop::collection::vec(0.0f32..=1.0, 1..400),
        )
            .prop_map(|(gaps, rms, spectral)| {
                let beat_times: Vec<f64> = gaps
                    .iter()
                    .scan(0.0, |time, gap| {
                        *time += gap;
                        Some(*time)
                    })
                    .collect();
                let envelope = |values: Vec<f32>| -> Vec<EnvelopePoint> {
                    values
                        .into_iter()
                        .enumerate()
                        .map(|(i, value)| EnvelopePoint {
                            time: i as f64 * 0.25,
                            value,
                        })
                        .collect()
                };
                AudioFeatures {
                    duration: beat_times.last().copied().unwrap_or(0.0) + 1.0,
                    tempo: 120.0,
                    beat_times,
                    onset_times: Vec::new(),
                    rms_envelope: envelope(rms),
                    spectral_envelope: envelope(spectral),
                    sample_rate: 22_050,
                }
            })
    }

    proptest! {
        #[test]
        fn placement_invariants_hold(
            input in arbitrary_features(),
            scroll_speed in 1u32..400,
            spacing in 0u32..1_000,
        ) {
            let placer = placer(scroll_speed, spacing);
            let pillars = placer.place(&input).unwrap();

            for pair in pillars.windows(2) {
                prop_assert!(pair[1].x >= pair[0].x);
                prop_assert!(pair[1].x - pair[0].x >= spacing);
            }
            for pillar in &pillars {
                let lanes = &pillar.blocked_lanes;
                prop_assert!((2..=4).contains(&lanes.len()));
                prop_assert!(lanes.windows(2).all(|w| w[1] == w[0] + 1));
                prop_assert!(*lanes.last().unwrap() < 7);
                prop_assert!(lanes[0] == 0 || *lanes.last().unwrap() == 6);
                prop_assert!([50, 70, 90].contains(&pillar.width));
            }

            prop_assert_eq!(&pillars, &placer.place(&input).unwrap());
        }
    }
}
