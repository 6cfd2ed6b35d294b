use std::path::Path;

use crate::{
    audio, AppConfig, DecodedAudio, FeatureExtractor, PillarPlacer, Result, StageAssembler,
    StageConfig, StageError,
};

/// Runs decode, feature extraction, placement and assembly for one song.
#[derive(Debug)]
pub struct StageGenerator {
    extractor: FeatureExtractor,
    placer: PillarPlacer,
    assembler: StageAssembler,
    sample_rate: u32,
}

impl StageGenerator {
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::new(config.analysis.clone()),
            placer: PillarPlacer::new(&config.generator)?,
            assembler: StageAssembler::new(config.generator.scroll_speed),
            sample_rate: config.analysis.sample_rate,
        })
    }

    /// Generates a stage from an audio file. The stage name defaults to the
    /// file stem.
    pub fn generate_from_file(
        &mut self,
        path: impl AsRef<Path>,
        name: Option<&str>,
    ) -> Result<StageConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StageError::InputNotFound(path.to_path_buf()));
        }

        let audio_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| audio_file.clone()),
        };

        tracing::info!(path = %path.display(), "loading audio file");
        let audio = audio::decode_file(path, self.sample_rate)?;
        tracing::info!(
            duration = format_args!("{:.2}", audio.duration_seconds()),
            sample_rate = audio.sample_rate,
            "decoded audio"
        );

        self.generate(&audio, name, audio_file)
    }

    /// Generates a stage from an already decoded waveform.
    pub fn generate(
        &mut self,
        audio: &DecodedAudio,
        name: impl Into<String>,
        audio_file: impl Into<String>,
    ) -> Result<StageConfig> {
        let features = self.extractor.extract_audio(audio)?;
        let pillars = self.placer.place(&features)?;
        Ok(self.assembler.assemble(name, audio_file, &features, pillars))
    }
}
