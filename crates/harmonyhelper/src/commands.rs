use crate::flags::TransformFlags;
use anyhow::{bail, Context, Result};
use harmony::{EventStore, Pipeline, TransformConfig};
use harmony_codec::FileFormat;
use harmonyconf::{HarmonyConfig, OutputConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub lenient: bool,
    pub dry_run: bool,
}

/// Read and decode a file, optionally dropping unmatched note-offs first.
fn load_store(path: &Path, lenient: bool) -> Result<EventStore> {
    let format = FileFormat::from_path(path)
        .with_context(|| format!("Cannot tell the file type of {}", path.display()))?;
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut events = harmony_codec::decode(&bytes, format)
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    if lenient {
        let before = events.len();
        events = harmony::repair_raw(events);
        let dropped = before - events.len();
        if dropped > 0 {
            warn!("dropped {} note-offs with no sounding note", dropped);
        }
    }

    EventStore::load(events).with_context(|| format!("Failed to load {}", path.display()))
}

pub fn inspect(input: &Path, json: bool) -> Result<()> {
    let store = load_store(input, true)?;
    let survey = harmony::survey(&store);

    if json {
        println!("{}", serde_json::to_string_pretty(&survey)?);
        return Ok(());
    }

    println!("{}", survey.summary);
    for track in &survey.tracks {
        let title = track.title.as_deref().unwrap_or("-");
        let mut line = format!(
            "  track {:>2}  {:<24} {:>5} notes",
            track.track, title, track.note_count
        );
        if !track.channels.is_empty() {
            line.push_str(&format!("  channels {:?}", track.channels));
        }
        if !track.programs.is_empty() {
            line.push_str(&format!("  programs {:?}", track.programs));
        }
        if track.max_divisi > 1 {
            line.push_str(&format!("  divisi {}", track.max_divisi));
        }
        if track.is_percussion {
            line.push_str("  percussion");
        }
        println!("{}", line);
    }
    for change in &survey.tempo_changes {
        println!("  tempo at {}: {:.1} bpm", change.tick, change.bpm);
    }
    Ok(())
}

pub fn convert(config: &HarmonyConfig, flags: &TransformFlags, options: &ConvertOptions) -> Result<()> {
    let mut transform: TransformConfig = config.transform.clone();
    flags.apply(&mut transform);

    let output = match &options.output {
        Some(path) => path.clone(),
        None => default_output(&options.input, &config.output)?,
    };
    if output == options.input {
        bail!("Refusing to overwrite the input file {}", output.display());
    }
    let format = FileFormat::from_path(&output)
        .with_context(|| format!("Cannot tell the file type of {}", output.display()))?;

    let store = load_store(&options.input, options.lenient)?;

    if options.dry_run {
        harmony::validate(&store, &transform).context("Transform settings rejected")?;
        let pipeline = Pipeline::from_config(&transform);
        if pipeline.is_empty() {
            println!("nothing to do; {} would be a copy", output.display());
        } else {
            println!("{} -> {}", options.input.display(), output.display());
            for name in pipeline.pass_names() {
                println!("  {}", name);
            }
        }
        return Ok(());
    }

    let result = harmony::run(store, transform).context("Transform failed")?;
    let bytes = harmony_codec::encode(&result.serialize(), format)
        .with_context(|| format!("Failed to encode {}", output.display()))?;
    std::fs::write(&output, bytes).with_context(|| format!("Failed to write {}", output.display()))?;

    info!("wrote {}", output.display());
    println!("{}", output.display());
    Ok(())
}

/// `<dir>/<input stem><suffix>.<ext>`, where `dir` defaults to the input's directory.
fn default_output(input: &Path, output: &OutputConfig) -> Result<PathBuf> {
    let format = FileFormat::from_name(&output.default_format.to_ascii_lowercase())
        .context("Invalid output.default_format")?;
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Input path {} has no file name", input.display()))?;
    let dir = match &output.directory {
        Some(dir) => dir.clone(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(format!("{}{}.{}", stem, output.suffix, format.extension())))
}
