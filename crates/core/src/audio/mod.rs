use std::{fs::File, path::Path};

use rubato::{FftFixedIn, Resampler};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{Result, StageError};

/// Rate every waveform is analysed at.
pub const TARGET_SAMPLE_RATE: u32 = 22_050;

/// Input frames handed to the resampler per call.
const RESAMPLE_CHUNK: usize = 4096;

/// Mono waveform decoded from an audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length of the waveform in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decodes every packet of the first playable track, mixes it down to mono and
/// resamples it to `target_rate`.
pub fn decode_file(path: impl AsRef<Path>, target_rate: u32) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(StageError::InvalidInput("no decodable audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(StageError::InvalidInput("audio track has no sample rate"))?;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut buffer: Option<SampleBuffer<f32>> = None;
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped_packets += 1;
                tracing::warn!(reason, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let frames = decoded.capacity() as u64;
        let fits = buffer
            .as_ref()
            .map(|buf| buf.capacity() as u64 >= frames * channels as u64)
            .unwrap_or(false);
        if !fits {
            buffer = Some(SampleBuffer::new(frames, spec));
        }

        if let Some(buf) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend(downmix(buf.samples(), channels));
        }
    }

    if samples.is_empty() {
        return Err(StageError::InvalidInput("audio file contains no samples"));
    }

    tracing::debug!(
        path = %path.display(),
        sample_rate,
        samples = samples.len(),
        skipped_packets,
        "decoded audio"
    );

    let samples = resample(&samples, sample_rate, target_rate)?;
    Ok(DecodedAudio::new(samples, target_rate))
}

/// Converts a mono waveform between sample rates. The output holds
/// `ceil(len * to / from)` samples with the resampler delay removed.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == 0 || to == 0 {
        return Err(StageError::InvalidInput("sample rates must be positive"));
    }
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|err| StageError::msg(format!("cannot build resampler: {err}")))?;
    let failed = |err: rubato::ResampleError| StageError::msg(format!("resampling failed: {err}"));

    let expected = (samples.len() as u64 * u64::from(to)).div_ceil(u64::from(from)) as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay);

    let mut position = 0;
    while samples.len() - position >= resampler.input_frames_next() {
        let next = resampler.input_frames_next();
        let input: [&[f32]; 1] = [&samples[position..position + next]];
        let chunk = resampler.process(&input[..], None).map_err(failed)?;
        output.extend_from_slice(&chunk[0]);
        position += next;
    }
    if position < samples.len() {
        let input: [&[f32]; 1] = [&samples[position..]];
        let chunk = resampler
            .process_partial(Some(&input[..]), None)
            .map_err(failed)?;
        output.extend_from_slice(&chunk[0]);
    }
    // Flush the delay line with silence until the tail is out.
    while output.len() < expected + delay {
        let chunk = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(failed)?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    tracing::debug!(from, to, samples = output.len(), "resampled audio");
    Ok(output)
}

/// Averages interleaved frames into a single channel.
fn downmix(interleaved: &[f32], channels: usize) -> impl Iterator<Item = f32> + '_ {
    interleaved
        .chunks_exact(channels)
        .map(move |frame| frame.iter().sum::<f32>() / channels as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[Vec<i16>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for sample in frame {
                writer.write_sample(*sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let frames: Vec<Vec<i16>> = (0..22_050).map(|i| vec![(i % 200) as i16 * 100]).collect();
        write_wav(&path, 1, TARGET_SAMPLE_RATE, &frames);

        let audio = decode_file(&path, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(audio.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(audio.samples.len(), 22_050);
        assert!((audio.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resamples_high_rate_files_to_analysis_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hires.wav");
        // 3.125 s at 48 kHz.
        let frames: Vec<Vec<i16>> = (0..150_000)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48_000.0;
                vec![(phase.sin() * 16_000.0) as i16]
            })
            .collect();
        write_wav(&path, 1, 48_000, &frames);

        let audio = decode_file(&path, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.samples.len(), 68_907);
        assert!((audio.duration_seconds() - 3.125).abs() < 1e-3);
    }

    #[test]
    fn resampling_keeps_tone_level() {
        let tone: Vec<f32> = (0..44_100)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44_100.0).sin() * 0.5)
            .collect();
        let resampled = resample(&tone, 44_100, 22_050).unwrap();
        assert_eq!(resampled.len(), 22_050);

        let peak = resampled[2_000..20_000]
            .iter()
            .fold(0.0f32, |max, sample| max.max(sample.abs()));
        assert!((peak - 0.5).abs() < 0.02, "peak {peak}");
    }

    #[test]
    fn resampling_to_same_rate_is_identity() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 22_050, 22_050).unwrap(), samples);
        assert!(resample(&samples, 0, 22_050).is_err());
    }

    #[test]
    fn mixes_stereo_down_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let frames: Vec<Vec<i16>> = (0..1_000).map(|_| vec![16_384, -16_384]).collect();
        write_wav(&path, 2, 22_050, &frames);

        let audio = decode_file(&path, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(audio.samples.len(), 1_000);
        assert!(audio.samples.iter().all(|sample| sample.abs() < 1e-4));
    }

    #[test]
    fn rejects_files_that_are_not_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();

        assert!(decode_file(&path, TARGET_SAMPLE_RATE).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = decode_file("/nonexistent/song.mp3", TARGET_SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, StageError::Io(_)));
    }

    #[test]
    fn downmix_averages_channels() {
        let mixed: Vec<f32> = downmix(&[1.0, 0.0, 0.5, 0.5], 2).collect();
        assert_eq!(mixed, vec![0.5, 0.5]);
    }
}
