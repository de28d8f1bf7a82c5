//! Assembles the enabled passes and runs them in their fixed order.

use crate::config::TransformConfig;
use crate::event::Event;
use crate::passes::{
    DivisiCollapser, InstrumentSwapper, MetronomeInserter, NoteRepair, PanningRemover, Pass,
    TrackHighlighter,
};
use crate::store::EventStore;
use crate::{Error, Result};

/// Ordered list of passes built from one configuration.
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// Enabled passes only, in the order note repair, panning, highlight,
    /// divisi, metronome, instruments.
    pub fn from_config(config: &TransformConfig) -> Self {
        let mut passes: Vec<Box<dyn Pass>> = Vec::new();
        if config.repair_notes {
            passes.push(Box::new(NoteRepair));
        }
        if config.remove_panning {
            passes.push(Box::new(PanningRemover::new(config.pan_policy)));
        }
        if let Some(highlight) = &config.highlight {
            passes.push(Box::new(TrackHighlighter::new(highlight.clone())));
        }
        if config.divisi.is_enabled() {
            passes.push(Box::new(DivisiCollapser::new(config.divisi.clone())));
        }
        if config.metronome.enabled {
            passes.push(Box::new(MetronomeInserter::new(config.metronome)));
        }
        if config.instruments.is_enabled() {
            passes.push(Box::new(InstrumentSwapper::new(config.instruments.clone())));
        }
        Self { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass. The store is consumed so a failed run leaves nothing
    /// half-transformed behind.
    pub fn apply(&self, mut store: EventStore) -> Result<EventStore> {
        for pass in &self.passes {
            let before = store.len();
            pass.apply(&mut store)?;
            tracing::debug!(
                pass = pass.name(),
                before,
                after = store.len(),
                "pass applied"
            );
        }
        Ok(store)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("passes", &self.pass_names())
            .finish()
    }
}

fn check_midi_value(name: &str, value: u8) -> Result<()> {
    if value > 127 {
        return Err(Error::InvalidConfiguration(format!(
            "{name} must be 0-127, got {value}"
        )));
    }
    Ok(())
}

/// Reject configurations that cannot work against this store before any
/// pass touches it.
pub fn validate(store: &EventStore, config: &TransformConfig) -> Result<()> {
    if let Some(highlight) = &config.highlight {
        if !store.has_track(highlight.track) {
            return Err(Error::InvalidTrack(highlight.track));
        }
        check_midi_value("velocity floor", highlight.levels.velocity_floor)?;
        // Any pan left in the file, centred or not, would override the injected one.
        if highlight.pan && !config.remove_panning && store.events().iter().any(Event::is_pan) {
            return Err(Error::InvalidConfiguration(
                "highlight panning needs existing panning removed first".into(),
            ));
        }
    }

    if config.divisi.is_enabled() {
        if let Some(&missing) = config.divisi.tracks.iter().find(|&&t| !store.has_track(t)) {
            return Err(Error::InvalidTrack(missing));
        }
    }

    if config.metronome.enabled {
        check_midi_value("metronome pitch", config.metronome.pitch)?;
        check_midi_value("metronome velocity", config.metronome.velocity)?;
        if config.metronome.velocity == 0 {
            return Err(Error::InvalidConfiguration(
                "metronome velocity 0 would be silent".into(),
            ));
        }
    }

    for o in &config.instruments.overrides {
        if !store.has_track(o.track) {
            return Err(Error::InvalidTrack(o.track));
        }
        check_midi_value("program", o.program)?;
    }
    if let Some(program) = config.instruments.all {
        check_midi_value("program", program)?;
    }
    Ok(())
}

/// Validate `config` against `store`, then apply every enabled pass.
pub fn run(store: EventStore, config: TransformConfig) -> Result<EventStore> {
    validate(&store, &config)?;
    let pipeline = Pipeline::from_config(&config);
    tracing::info!(passes = ?pipeline.pass_names(), events = store.len(), "running transform");
    let out = pipeline.apply(store)?;
    tracing::info!(events = out.len(), tracks = out.tracks().len(), "transform finished");
    Ok(out)
}
