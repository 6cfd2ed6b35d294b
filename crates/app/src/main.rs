use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use stage_forge_core::{
    export::DEFAULT_OUTPUT_DIR, to_camel_case, write_outputs, AppConfig, OutputPlan,
    StageConfig, StageGenerator,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    if !cli.audio_file.exists() {
        tracing::error!(path = %cli.audio_file.display(), "audio file not found");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "stage generation failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> stage_forge_core::Result<()> {
    let config = cli.resolve_config()?;
    tracing::info!(
        input = %cli.audio_file.display(),
        scroll_speed = config.generator.scroll_speed,
        min_pillar_spacing = config.generator.min_pillar_spacing,
        "generating stage"
    );

    let mut generator = StageGenerator::new(&config)?;
    let stage = generator.generate_from_file(&cli.audio_file, cli.name.as_deref())?;

    let plan = OutputPlan::resolve(&stage.name, cli.output.as_deref(), &cli.out_dir);
    write_outputs(&stage, &plan)?;

    print_summary(&stage, &plan);
    Ok(())
}

fn print_summary(stage: &StageConfig, plan: &OutputPlan) {
    let rule = "=".repeat(80);
    println!("\n{rule}");
    println!("STAGE GENERATED SUCCESSFULLY");
    println!("{rule}");
    println!("Stage: {}", stage.name);
    println!("Duration: {}s", stage.duration);
    println!("Tempo: {} BPM", stage.bpm);
    println!("Pillars: {}", stage.pillars.len());
    println!("JSON: {}", plan.json_path.display());
    println!("JS Module: {}", plan.js_path.display());
    println!("{rule}\n");

    let identifier = to_camel_case(&stage.name);
    println!("To use this stage in your game:");
    println!("1. Import it in src/game/stages.js:");
    println!("   import {identifier} from './generated/{identifier}.js';");
    println!("2. Add to stages object:");
    println!("   export const stages = {{ {identifier} }};");
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Generate a rhythm game stage from an audio file",
    long_about = None
)]
struct Cli {
    /// Path to the audio file (MP3, WAV, FLAC, OGG, M4A).
    audio_file: PathBuf,
    /// Output file; a `.json` or `.js` path replaces that document's default location.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Stage name (defaults to the file name without extension).
    #[arg(short, long)]
    name: Option<String>,
    /// Game scroll speed in pixels per second [default: 80].
    #[arg(short, long)]
    scroll_speed: Option<u32>,
    /// Minimum pillar spacing in pixels [default: 400].
    #[arg(short = 'p', long)]
    spacing: Option<u32>,
    /// Number of lanes in the level [default: 7].
    #[arg(long)]
    lanes: Option<u8>,
    /// Directory for generated files without an explicit output path.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    out_dir: PathBuf,
    /// JSON configuration file; command line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn resolve_config(&self) -> stage_forge_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_json_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(scroll_speed) = self.scroll_speed {
            config.generator.scroll_speed = scroll_speed;
        }
        if let Some(spacing) = self.spacing {
            config.generator.min_pillar_spacing = spacing;
        }
        if let Some(lanes) = self.lanes {
            config.generator.total_lanes = lanes;
        }

        config.validate()?;
        Ok(config)
    }
}
