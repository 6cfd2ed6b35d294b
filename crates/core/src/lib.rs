//! Core library for Stage Forge.
//!
//! Turns a song into a rhythm game stage: the waveform is decoded, analysed
//! for beats, onsets, loudness and brightness, and the features are mapped onto
//! a sequence of pillars that each leave exactly one open corridor. Each module
//! owns one step of that pipeline, and [`StageGenerator`] wires them together.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod export;
pub mod generator;
pub mod mapping;
pub mod placement;
pub mod stage;

pub use analysis::{AudioFeatures, EnvelopePoint, FeatureExtractor};
pub use audio::{decode_file, DecodedAudio};
pub use config::{AnalysisConfig, AppConfig, GeneratorConfig};
pub use error::{Result, StageError};
pub use export::{render_js_module, render_json, to_camel_case, write_outputs, OutputPlan};
pub use generator::StageGenerator;
pub use mapping::{Difficulty, DifficultyMapper, LaneSelector, PillarShape};
pub use placement::{Pillar, PillarPlacer};
pub use stage::{StageAssembler, StageConfig, StageMetadata};
