use crate::event::{Event, EventKind, NoteKey};
use crate::passes::Pass;
use crate::store::EventStore;
use crate::Result;
use std::collections::{BTreeSet, HashMap};

/// Brings every note into strict on/off alternation.
///
/// A repeated start on a sounding key closes the earlier note first, ends
/// with nothing to close are dropped, and notes still sounding when their
/// track ends are closed right before the end marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoteRepair;

#[derive(Debug, Default, PartialEq, Eq)]
struct RepairStats {
    retriggers: usize,
    orphans: usize,
    dangling: usize,
}

fn repair(events: Vec<Event>, stats: &mut RepairStats) -> Vec<Event> {
    let mut open: BTreeSet<NoteKey> = BTreeSet::new();
    let mut out = Vec::with_capacity(events.len());

    for ev in events {
        if matches!(ev.kind, EventKind::TrackEnd) {
            let closing: Vec<NoteKey> = open.iter().filter(|k| k.track == ev.track).copied().collect();
            for key in closing {
                open.remove(&key);
                out.push(Event::note_off(ev.time, key.track, key.channel, key.pitch));
                stats.dangling += 1;
            }
            out.push(ev);
            continue;
        }

        let Some(key) = ev.note_key() else {
            out.push(ev);
            continue;
        };
        if ev.is_note_start() {
            if !open.insert(key) {
                out.push(Event::note_off(ev.time, key.track, key.channel, key.pitch));
                stats.retriggers += 1;
            }
            out.push(ev);
        } else if open.remove(&key) {
            out.push(ev);
        } else {
            stats.orphans += 1;
        }
    }
    out
}

/// Drop note ends that close nothing, so a sloppy file can pass
/// [`EventStore::load`]. Each track's events must be in file order.
pub fn repair_raw(events: Vec<Event>) -> Vec<Event> {
    let mut open: HashMap<NoteKey, u32> = HashMap::new();
    let mut dropped = 0usize;
    let kept: Vec<Event> = events
        .into_iter()
        .filter(|ev| {
            let Some(key) = ev.note_key() else {
                return true;
            };
            let count = open.entry(key).or_default();
            if ev.is_note_start() {
                *count += 1;
                true
            } else if *count > 0 {
                *count -= 1;
                true
            } else {
                dropped += 1;
                false
            }
        })
        .collect();
    if dropped > 0 {
        tracing::debug!(dropped, "dropped unmatched note ends");
    }
    kept
}

impl Pass for NoteRepair {
    fn name(&self) -> &'static str {
        "note-repair"
    }

    fn apply(&self, store: &mut EventStore) -> Result<()> {
        let mut stats = RepairStats::default();
        store.rebuild(|events| repair(events, &mut stats));
        if stats != RepairStats::default() {
            tracing::debug!(
                retriggers = stats.retriggers,
                orphans = stats.orphans,
                dangling = stats.dangling,
                "notes repaired"
            );
        }
        Ok(())
    }
}
