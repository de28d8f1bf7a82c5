//! MIDI event transformation engine.
//!
//! Takes a file as a flat list of tabular [`Event`]s, loads it into an
//! [`EventStore`], and runs the passes a [`TransformConfig`] enables in a
//! fixed order: note repair, panning removal, track highlighting, divisi
//! collapsing, metronome insertion and instrument swapping.
//!
//! ```
//! use harmony::{run, Event, EventKind, EventStore, TransformConfig};
//!
//! let store = EventStore::load(vec![
//!     Event::new(0, 1, EventKind::TrackStart),
//!     Event::control(0, 1, 0, 10, 20),
//!     Event::note_on(0, 1, 0, 60, 90),
//!     Event::note_off(480, 1, 0, 60),
//!     Event::new(480, 1, EventKind::TrackEnd),
//! ])
//! .unwrap();
//!
//! let config = TransformConfig {
//!     remove_panning: true,
//!     ..TransformConfig::default()
//! };
//! let out = run(store, config).unwrap();
//! assert!(out.events().iter().all(|ev| !ev.is_pan()));
//! ```

pub mod config;
pub mod event;
pub mod passes;
pub mod pipeline;
pub mod store;
pub mod survey;

pub use config::{
    DivisiConfig, DivisiPolicy, HighlightConfig, HighlightLevels, InstrumentOverrides,
    MetronomeConfig, PanPolicy, ProgramOverride, TransformConfig,
};
pub use event::{
    Event, EventKind, Header, NoteKey, RawRecord, TimeDivision, TimeSignature, TrackId,
};
pub use passes::{repair_raw, Pass};
pub use pipeline::{run, validate, Pipeline};
pub use store::{EventStore, TrackEvents};
pub use survey::{survey, Survey, TempoChange, TrackSummary};

/// Errors from loading or transforming an event sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("track {0} does not exist")]
    InvalidTrack(TrackId),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no time division available to place metronome clicks")]
    MissingTempo,
}

pub type Result<T> = std::result::Result<T, Error>;
