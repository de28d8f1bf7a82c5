//! Command-line transform switches, layered over the `[transform]` config table.

use clap::Args;
use harmony::{
    DivisiPolicy, HighlightConfig, PanPolicy, ProgramOverride, TrackId, TransformConfig,
};

#[derive(Args, Debug, Clone, Default)]
pub struct TransformFlags {
    /// Remove pan controllers from every track
    #[arg(long)]
    pub remove_panning: bool,

    /// Keep pan controllers but force them to center (implies --remove-panning)
    #[arg(long)]
    pub center_pan: bool,

    /// Track to emphasize (1 is the first musical track)
    #[arg(long, value_name = "TRACK")]
    pub highlight: Option<TrackId>,

    /// Emphasize every track except the highlighted one
    #[arg(long, requires = "highlight")]
    pub invert: bool,

    /// Pan the highlighted track right and the rest left
    #[arg(long, requires = "highlight")]
    pub pan: bool,

    /// Scale volume controllers on the quiet side as well
    #[arg(long, requires = "highlight")]
    pub scale_volume: bool,

    /// Collapse chords: higher, lower, nth:N (0 is the lowest) or none
    #[arg(long, value_name = "POLICY", value_parser = parse_divisi)]
    pub divisi: Option<DivisiPolicy>,

    /// Restrict chord collapsing to these tracks (repeatable)
    #[arg(long = "divisi-track", value_name = "TRACK")]
    pub divisi_tracks: Vec<TrackId>,

    /// Add a click track
    #[arg(long)]
    pub metronome: bool,

    /// Click on the half beat as well (implies --metronome)
    #[arg(long)]
    pub subdivide: bool,

    /// Set a track's instrument, e.g. 2=73 (repeatable)
    #[arg(long = "program", value_name = "TRACK=PROGRAM", value_parser = parse_program)]
    pub programs: Vec<ProgramOverride>,

    /// Instrument for every track without an explicit --program
    #[arg(long, value_name = "PROGRAM")]
    pub all_programs: Option<u8>,

    /// Skip closing re-triggered and dangling notes
    #[arg(long)]
    pub no_repair: bool,
}

impl TransformFlags {
    /// Overlay the switches that were given onto `config`.
    ///
    /// Flags only ever turn things on or replace values; absent flags leave
    /// the configured value alone.
    pub fn apply(&self, config: &mut TransformConfig) {
        if self.no_repair {
            config.repair_notes = false;
        }
        if self.remove_panning || self.center_pan {
            config.remove_panning = true;
        }
        if self.center_pan {
            config.pan_policy = PanPolicy::Center;
        }

        if let Some(track) = self.highlight {
            let highlight = match config.highlight.take() {
                Some(existing) => HighlightConfig { track, ..existing },
                None => HighlightConfig::new(track),
            };
            config.highlight = Some(highlight);
        }
        if let Some(highlight) = config.highlight.as_mut() {
            highlight.invert |= self.invert;
            highlight.pan |= self.pan;
            highlight.scale_volume |= self.scale_volume;
        }

        if let Some(policy) = self.divisi {
            config.divisi.policy = policy;
        }
        if !self.divisi_tracks.is_empty() {
            config.divisi.tracks = self.divisi_tracks.clone();
        }

        if self.metronome || self.subdivide {
            config.metronome.enabled = true;
        }
        if self.subdivide {
            config.metronome.subdivide = true;
        }

        config
            .instruments
            .overrides
            .extend(self.programs.iter().copied());
        if self.all_programs.is_some() {
            config.instruments.all = self.all_programs;
        }
    }
}

fn parse_divisi(value: &str) -> Result<DivisiPolicy, String> {
    match value {
        "none" => Ok(DivisiPolicy::None),
        "higher" | "high" => Ok(DivisiPolicy::KeepHigher),
        "lower" | "low" => Ok(DivisiPolicy::KeepLower),
        other => {
            let n = other
                .strip_prefix("nth:")
                .ok_or_else(|| format!("unknown divisi policy '{other}'"))?;
            n.parse::<u8>()
                .map(DivisiPolicy::KeepNthLowest)
                .map_err(|e| format!("bad chord position '{n}': {e}"))
        }
    }
}

fn parse_program(value: &str) -> Result<ProgramOverride, String> {
    let (track, program) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TRACK=PROGRAM, got '{value}'"))?;
    let track = track
        .trim()
        .parse::<TrackId>()
        .map_err(|e| format!("bad track '{track}': {e}"))?;
    let program = program
        .trim()
        .parse::<u8>()
        .map_err(|e| format!("bad program '{program}': {e}"))?;
    Ok(ProgramOverride { track, program })
}
