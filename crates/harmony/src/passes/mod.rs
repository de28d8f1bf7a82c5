//! Transform passes. Each one takes a whole store and leaves it valid.

pub mod divisi;
pub mod highlight;
pub mod instrument;
pub mod metronome;
pub mod panning;
pub mod repair;

pub use divisi::{find_groups, DivisiCollapser, DivisiGroup};
pub use highlight::TrackHighlighter;
pub use instrument::InstrumentSwapper;
pub use metronome::MetronomeInserter;
pub use panning::PanningRemover;
pub use repair::{repair_raw, NoteRepair};

use crate::store::EventStore;
use crate::Result;

/// One step of the pipeline.
///
/// A pass either fully transforms the store or returns an error; callers
/// drop the store on error, so a half-applied pass is never observed.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn apply(&self, store: &mut EventStore) -> Result<()>;
}
