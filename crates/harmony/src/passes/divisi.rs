use crate::config::{DivisiConfig, DivisiPolicy};
use crate::event::{NoteKey, TrackId};
use crate::passes::Pass;
use crate::store::EventStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One note of a chord, located by its positions in the store body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub on_index: usize,
    /// `None` when the note is still sounding at the end of its track.
    pub off_index: Option<usize>,
    pub pitch: u8,
}

/// Notes starting together on one track and channel, all actually sustaining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisiGroup {
    pub time: u64,
    pub track: TrackId,
    pub channel: u8,
    /// In store order.
    pub members: Vec<GroupMember>,
}

impl DivisiGroup {
    /// Member to keep under `policy`; ties go to the earliest in the store.
    pub fn keeper(&self, policy: DivisiPolicy) -> Option<&GroupMember> {
        match policy {
            DivisiPolicy::None => None,
            DivisiPolicy::KeepHigher => self
                .members
                .iter()
                .reduce(|best, m| if m.pitch > best.pitch { m } else { best }),
            DivisiPolicy::KeepLower => self
                .members
                .iter()
                .reduce(|best, m| if m.pitch < best.pitch { m } else { best }),
            DivisiPolicy::KeepNthLowest(n) => {
                let mut ordered: Vec<&GroupMember> = self.members.iter().collect();
                // stable, so equal pitches keep store order
                ordered.sort_by_key(|m| m.pitch);
                let idx = (n as usize).min(ordered.len().saturating_sub(1));
                ordered.get(idx).copied()
            }
        }
    }
}

struct PairedNote {
    key: NoteKey,
    time: u64,
    on_index: usize,
    off: Option<(usize, u64)>,
}

/// Pair every note start with the end that closes it.
///
/// Ends close the most recent open start on the same key, matching how the
/// store validated the input.
fn pair_notes(store: &EventStore) -> Vec<PairedNote> {
    let mut notes: Vec<PairedNote> = Vec::new();
    let mut open: HashMap<NoteKey, Vec<usize>> = HashMap::new();

    for (idx, ev) in store.events().iter().enumerate() {
        let Some(key) = ev.note_key() else { continue };
        if ev.is_note_start() {
            open.entry(key).or_default().push(notes.len());
            notes.push(PairedNote {
                key,
                time: ev.time,
                on_index: idx,
                off: None,
            });
        } else if let Some(note) = open.get_mut(&key).and_then(|stack| stack.pop()) {
            notes[note].off = Some((idx, ev.time));
        }
    }
    notes
}

/// Scan the store for chords: same tick, same track and channel, more than
/// one note that lasts past its start tick.
pub fn find_groups(store: &EventStore) -> Vec<DivisiGroup> {
    let mut by_onset: BTreeMap<(u64, TrackId, u8), Vec<GroupMember>> = BTreeMap::new();

    for note in pair_notes(store) {
        let sustains = note.off.map_or(true, |(_, off_time)| off_time > note.time);
        if !sustains {
            continue;
        }
        by_onset
            .entry((note.time, note.key.track, note.key.channel))
            .or_default()
            .push(GroupMember {
                on_index: note.on_index,
                off_index: note.off.map(|(idx, _)| idx),
                pitch: note.key.pitch,
            });
    }

    by_onset
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((time, track, channel), mut members)| {
            members.sort_by_key(|m| m.on_index);
            DivisiGroup {
                time,
                track,
                channel,
                members,
            }
        })
        .collect()
}

/// Reduces every chord to a single voice.
#[derive(Debug, Clone)]
pub struct DivisiCollapser {
    pub config: DivisiConfig,
}

impl DivisiCollapser {
    pub fn new(config: DivisiConfig) -> Self {
        Self { config }
    }
}

impl Pass for DivisiCollapser {
    fn name(&self) -> &'static str {
        "divisi-collapser"
    }

    fn apply(&self, store: &mut EventStore) -> Result<()> {
        if !self.config.is_enabled() {
            return Ok(());
        }
        if let Some(&missing) = self.config.tracks.iter().find(|&&t| !store.has_track(t)) {
            return Err(Error::InvalidTrack(missing));
        }

        let groups: Vec<DivisiGroup> = find_groups(store)
            .into_iter()
            .filter(|g| self.config.applies_to(g.track))
            .collect();
        if groups.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "divisi policy {:?} requested but no targeted track has simultaneous notes",
                self.config.policy
            )));
        }

        let mut doomed = BTreeSet::new();
        for group in &groups {
            let Some(keeper) = group.keeper(self.config.policy) else {
                continue;
            };
            let keep = keeper.on_index;
            for member in group.members.iter().filter(|m| m.on_index != keep) {
                doomed.insert(member.on_index);
                if let Some(off) = member.off_index {
                    doomed.insert(off);
                }
            }
        }

        store.remove_indices(&doomed);
        tracing::debug!(
            policy = ?self.config.policy,
            groups = groups.len(),
            removed = doomed.len(),
            "divisi collapsed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventKind};
    use pretty_assertions::assert_eq;

    fn chord(pitches: &[u8]) -> EventStore {
        let mut raw = vec![Event::new(0, 1, EventKind::TrackStart)];
        for &p in pitches {
            raw.push(Event::note_on(0, 1, 0, p, 80 + p % 10));
        }
        for &p in pitches {
            raw.push(Event::note_off(480, 1, 0, p));
        }
        raw.push(Event::note_on(480, 1, 0, 62, 70));
        raw.push(Event::note_off(960, 1, 0, 62));
        raw.push(Event::new(960, 1, EventKind::TrackEnd));
        EventStore::load(raw).unwrap()
    }

    fn sounding(store: &EventStore) -> Vec<(u64, u8)> {
        store
            .events()
            .iter()
            .filter(|ev| ev.is_note_start())
            .filter_map(|ev| ev.note_key().map(|k| (ev.time, k.pitch)))
            .collect()
    }

    fn collapse(store: &mut EventStore, policy: DivisiPolicy) -> Result<()> {
        DivisiCollapser::new(DivisiConfig {
            policy,
            tracks: vec![],
        })
        .apply(store)
    }

    #[test]
    fn keep_higher_is_order_independent() {
        for order in [[60, 64, 67], [67, 60, 64], [64, 67, 60]] {
            let mut store = chord(&order);
            collapse(&mut store, DivisiPolicy::KeepHigher).unwrap();
            assert_eq!(sounding(&store), vec![(0, 67), (480, 62)]);
        }
    }

    #[test]
    fn keep_lower_is_order_independent() {
        for order in [[60, 64, 67], [67, 64, 60]] {
            let mut store = chord(&order);
            collapse(&mut store, DivisiPolicy::KeepLower).unwrap();
            assert_eq!(sounding(&store), vec![(0, 60), (480, 62)]);
        }
    }

    #[test]
    fn kept_note_keeps_velocity_and_removed_notes_lose_their_offs() {
        let mut store = chord(&[60, 64, 67]);
        collapse(&mut store, DivisiPolicy::KeepHigher).unwrap();

        let kept = store
            .events()
            .iter()
            .find(|ev| ev.is_note_start())
            .unwrap();
        assert_eq!(kept, &Event::note_on(0, 1, 0, 67, 87));

        let offs: Vec<u8> = store
            .events()
            .iter()
            .filter(|ev| ev.is_note_end())
            .filter_map(|ev| ev.note_key().map(|k| k.pitch))
            .collect();
        assert_eq!(offs, vec![67, 62]);
    }

    #[test]
    fn nth_lowest_clamps_to_the_top() {
        let mut store = chord(&[60, 64, 67]);
        collapse(&mut store, DivisiPolicy::KeepNthLowest(1)).unwrap();
        assert_eq!(sounding(&store)[0], (0, 64));

        let mut store = chord(&[60, 64]);
        collapse(&mut store, DivisiPolicy::KeepNthLowest(5)).unwrap();
        assert_eq!(sounding(&store)[0], (0, 64));
    }

    #[test]
    fn tie_keeps_the_earliest() {
        let group = DivisiGroup {
            time: 0,
            track: 1,
            channel: 0,
            members: vec![
                GroupMember {
                    on_index: 3,
                    off_index: None,
                    pitch: 67,
                },
                GroupMember {
                    on_index: 4,
                    off_index: None,
                    pitch: 67,
                },
            ],
        };
        assert_eq!(group.keeper(DivisiPolicy::KeepHigher).unwrap().on_index, 3);
        assert_eq!(group.keeper(DivisiPolicy::KeepLower).unwrap().on_index, 3);
    }

    #[test]
    fn doubled_top_note_keeps_the_first_in_the_store() {
        let mut store = EventStore::load(vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::note_on(0, 1, 0, 60, 70),
            Event::note_on(0, 1, 0, 67, 80),
            Event::note_on(0, 1, 0, 67, 90),
            Event::note_off(240, 1, 0, 67),
            Event::note_off(480, 1, 0, 60),
            Event::note_off(480, 1, 0, 67),
            Event::new(480, 1, EventKind::TrackEnd),
        ])
        .unwrap();
        collapse(&mut store, DivisiPolicy::KeepHigher).unwrap();

        let notes: Vec<&Event> = store.events().iter().filter(|ev| ev.is_note()).collect();
        assert_eq!(
            notes,
            vec![
                &Event::note_on(0, 1, 0, 67, 80),
                &Event::note_off(480, 1, 0, 67),
            ]
        );
    }

    #[test]
    fn single_notes_and_other_channels_are_not_groups() {
        let store = EventStore::load(vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::note_on(0, 1, 0, 60, 80),
            Event::note_on(0, 1, 1, 64, 80),
            Event::note_off(480, 1, 0, 60),
            Event::note_off(480, 1, 1, 64),
            Event::new(480, 1, EventKind::TrackEnd),
        ])
        .unwrap();
        assert!(find_groups(&store).is_empty());
    }

    #[test]
    fn policy_without_chords_is_a_configuration_error() {
        let mut store = chord(&[60]);
        let err = collapse(&mut store, DivisiPolicy::KeepHigher).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn unknown_track_filter_is_rejected() {
        let mut store = chord(&[60, 64]);
        let err = DivisiCollapser::new(DivisiConfig {
            policy: DivisiPolicy::KeepLower,
            tracks: vec![4],
        })
        .apply(&mut store)
        .unwrap_err();
        assert_eq!(err, Error::InvalidTrack(4));
    }
}
