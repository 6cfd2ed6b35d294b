//! Renders a [`StageConfig`] as a JSON document and as an importable
//! JavaScript module, and writes both to disk.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{Result, StageConfig};

/// Directory used when no explicit output path is given.
pub const DEFAULT_OUTPUT_DIR: &str = "../src/game/generated";

/// Pretty-printed JSON with two-space indentation and no trailing newline.
pub fn render_json(stage: &StageConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(stage)?)
}

/// JavaScript module exporting the stage as its default export, with one
/// pillar per line.
pub fn render_js_module(stage: &StageConfig) -> Result<String> {
    let mut js = String::new();

    writeln!(js, "// Auto-generated stage configuration")?;
    writeln!(js, "// Generated from: {}", single_line(&stage.audio_file))?;
    writeln!(
        js,
        "// Tempo: {} BPM, Duration: {}s",
        literal(&stage.bpm)?,
        literal(&stage.duration)?
    )?;
    writeln!(js)?;
    writeln!(js, "export default {{")?;
    writeln!(js, "  \"name\": {},", literal(&stage.name)?)?;
    writeln!(js, "  \"audioFile\": {},", literal(&stage.audio_file)?)?;
    writeln!(js, "  \"duration\": {},", literal(&stage.duration)?)?;
    writeln!(js, "  \"bpm\": {},", literal(&stage.bpm)?)?;
    writeln!(js, "  \"length\": {},", stage.length)?;
    writeln!(js, "  \"forceMultiplier\": {},", literal(&stage.force_multiplier)?)?;
    writeln!(js, "  \"pillars\": [")?;
    for pillar in &stage.pillars {
        let lanes: Vec<String> = pillar.blocked_lanes.iter().map(u8::to_string).collect();
        writeln!(
            js,
            "    {{ \"x\": {}, \"blockedLanes\": [{}], \"width\": {} }},",
            pillar.x,
            lanes.join(", "),
            pillar.width
        )?;
    }
    writeln!(js, "  ],")?;

    let metadata = &stage.metadata;
    writeln!(js, "  \"metadata\": {{")?;
    writeln!(js, "    \"generatedFrom\": {},", literal(&metadata.generated_from)?)?;
    writeln!(js, "    \"tempo\": {},", literal(&metadata.tempo)?)?;
    writeln!(js, "    \"beats\": {},", metadata.beats)?;
    writeln!(js, "    \"onsets\": {},", metadata.onsets)?;
    writeln!(js, "    \"pillarsGenerated\": {}", metadata.pillars_generated)?;
    writeln!(js, "  }}")?;
    writeln!(js, "}};")?;

    Ok(js)
}

/// JSON literal of a value, so strings arrive quoted and escaped.
fn literal<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Converts a stage name into a JavaScript identifier such as `aPraireira`.
pub fn to_camel_case(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .map(|word| word.trim_start_matches(|c: char| c.is_ascii_digit()))
        .filter(|word| !word.is_empty())
        .collect();

    let Some((first, rest)) = words.split_first() else {
        return "stage".to_string();
    };

    let mut identifier = first.to_lowercase();
    for word in rest {
        let mut chars = word.chars();
        if let Some(head) = chars.next() {
            identifier.extend(head.to_uppercase());
            identifier.push_str(&chars.as_str().to_lowercase());
        }
    }
    identifier
}

/// Where the two rendered documents are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub json_path: PathBuf,
    pub js_path: PathBuf,
}

impl OutputPlan {
    /// An explicit `output` ending in `.json` or `.js` replaces that document's
    /// path; anything else lands in `out_dir` under the camel-cased stage name.
    pub fn resolve(stage_name: &str, output: Option<&Path>, out_dir: &Path) -> Self {
        let identifier = to_camel_case(stage_name);
        let extension = output
            .and_then(|path| path.extension())
            .and_then(|ext| ext.to_str());

        let explicit = |wanted: &str| {
            output
                .filter(|_| extension == Some(wanted))
                .map(Path::to_path_buf)
        };

        Self {
            json_path: explicit("json")
                .unwrap_or_else(|| out_dir.join(format!("{identifier}.json"))),
            js_path: explicit("js").unwrap_or_else(|| out_dir.join(format!("{identifier}.js"))),
        }
    }
}

/// Renders both documents and writes them, creating parent directories.
pub fn write_outputs(stage: &StageConfig, plan: &OutputPlan) -> Result<()> {
    write_document(&plan.json_path, &render_json(stage)?)?;
    tracing::info!(path = %plan.json_path.display(), "wrote JSON stage");

    write_document(&plan.js_path, &render_js_module(stage)?)?;
    tracing::info!(path = %plan.js_path.display(), "wrote JS module");
    Ok(())
}

fn write_document(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if !parent.exists() {
            tracing::debug!(dir = %parent.display(), "creating output directory");
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents)?;
    Ok(())
}
