use crate::config::InstrumentOverrides;
use crate::event::{Event, EventKind, TrackId, PERCUSSION_CHANNEL};
use crate::passes::Pass;
use crate::store::EventStore;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Forces the program (instrument) of chosen tracks.
///
/// Percussion on channel 10 is left alone; a program change there would
/// select a drum kit rather than an instrument.
#[derive(Debug, Clone)]
pub struct InstrumentSwapper {
    pub overrides: InstrumentOverrides,
}

impl InstrumentSwapper {
    pub fn new(overrides: InstrumentOverrides) -> Self {
        Self { overrides }
    }
}

#[derive(Debug, Default)]
struct ChannelUse {
    first_event: Option<u64>,
    first_note: Option<u64>,
    program_before_note: bool,
}

fn channel_use(store: &EventStore, track: TrackId) -> BTreeMap<u8, ChannelUse> {
    let mut channels: BTreeMap<u8, ChannelUse> = BTreeMap::new();
    for ev in store.iterate_track(track) {
        let Some(channel) = ev.channel() else { continue };
        if channel == PERCUSSION_CHANNEL {
            continue;
        }
        let usage = channels.entry(channel).or_default();
        usage.first_event.get_or_insert(ev.time);
        match ev.kind {
            EventKind::ProgramChange { .. } if usage.first_note.is_none() => {
                usage.program_before_note = true;
            }
            _ if ev.is_note_start() => {
                usage.first_note.get_or_insert(ev.time);
            }
            _ => {}
        }
    }
    channels
}

impl Pass for InstrumentSwapper {
    fn name(&self) -> &'static str {
        "instrument-swapper"
    }

    fn apply(&self, store: &mut EventStore) -> Result<()> {
        if let Some(missing) = self
            .overrides
            .overrides
            .iter()
            .find(|o| !store.has_track(o.track))
        {
            return Err(Error::InvalidTrack(missing.track));
        }

        let targets: Vec<(TrackId, u8)> = store
            .tracks()
            .iter()
            .filter_map(|&t| self.overrides.program_for(t).map(|p| (t, p)))
            .collect();
        let programs: BTreeMap<TrackId, u8> = targets.iter().copied().collect();

        let mut rewritten = 0usize;
        for (_, track, kind) in store.kinds_mut() {
            let Some(&wanted) = programs.get(&track) else {
                continue;
            };
            if let EventKind::ProgramChange { channel, program } = kind {
                if *channel != PERCUSSION_CHANNEL {
                    *program = wanted;
                    rewritten += 1;
                }
            }
        }

        let mut inserted = 0usize;
        for (track, program) in targets {
            for (channel, usage) in channel_use(store, track) {
                if usage.program_before_note || usage.first_note.is_none() {
                    continue;
                }
                let Some(time) = usage.first_event else { continue };
                store.insert_before_notes(Event::program(time, track, channel, program))?;
                inserted += 1;
            }
        }

        tracing::debug!(rewritten, inserted, "instruments swapped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgramOverride;
    use pretty_assertions::assert_eq;

    fn band() -> EventStore {
        EventStore::load(vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::program(0, 1, 0, 0),
            Event::note_on(0, 1, 0, 60, 80),
            Event::program(240, 1, 0, 5),
            Event::note_off(480, 1, 0, 60),
            Event::new(480, 1, EventKind::TrackEnd),
            Event::new(0, 2, EventKind::TrackStart),
            Event::control(0, 2, 1, 7, 100),
            Event::note_on(120, 2, 1, 48, 80),
            Event::note_on(120, 2, 9, 36, 100),
            Event::note_off(480, 2, 1, 48),
            Event::note_off(480, 2, 9, 36),
            Event::new(480, 2, EventKind::TrackEnd),
        ])
        .unwrap()
    }

    fn programs(store: &EventStore) -> Vec<(u64, TrackId, u8, u8)> {
        store
            .events()
            .iter()
            .filter_map(|ev| match ev.kind {
                EventKind::ProgramChange { channel, program } => {
                    Some((ev.time, ev.track, channel, program))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rewrites_every_program_change_on_the_track() {
        let mut store = band();
        InstrumentSwapper::new(InstrumentOverrides {
            overrides: vec![ProgramOverride {
                track: 1,
                program: 73,
            }],
            all: None,
        })
        .apply(&mut store)
        .unwrap();
        assert_eq!(programs(&store), vec![(0, 1, 0, 73), (240, 1, 0, 73)]);
    }

    #[test]
    fn inserts_program_where_none_precedes_the_notes() {
        let mut store = band();
        InstrumentSwapper::new(InstrumentOverrides {
            overrides: vec![],
            all: Some(19),
        })
        .apply(&mut store)
        .unwrap();
        // channel 9 of track 2 is percussion and stays without a program
        assert_eq!(
            programs(&store),
            vec![(0, 1, 0, 19), (0, 2, 1, 19), (240, 1, 0, 19)]
        );
        let track2: Vec<&Event> = store.iterate_track(2).collect();
        assert_eq!(track2[1], &Event::control(0, 2, 1, 7, 100));
        assert_eq!(track2[2], &Event::program(0, 2, 1, 19));
    }

    #[test]
    fn explicit_override_beats_the_blanket_program() {
        let mut store = band();
        InstrumentSwapper::new(InstrumentOverrides {
            overrides: vec![ProgramOverride {
                track: 2,
                program: 33,
            }],
            all: Some(19),
        })
        .apply(&mut store)
        .unwrap();
        assert!(programs(&store).contains(&(0, 2, 1, 33)));
        assert!(programs(&store).contains(&(0, 1, 0, 19)));
    }

    #[test]
    fn percussion_program_changes_are_untouched() {
        let mut store = EventStore::load(vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::program(0, 1, 9, 25),
            Event::note_on(0, 1, 9, 36, 100),
            Event::note_off(120, 1, 9, 36),
            Event::new(120, 1, EventKind::TrackEnd),
        ])
        .unwrap();
        InstrumentSwapper::new(InstrumentOverrides {
            overrides: vec![],
            all: Some(0),
        })
        .apply(&mut store)
        .unwrap();
        assert_eq!(programs(&store), vec![(0, 1, 9, 25)]);
    }

    #[test]
    fn override_for_missing_track_is_rejected() {
        let mut store = band();
        let err = InstrumentSwapper::new(InstrumentOverrides {
            overrides: vec![ProgramOverride {
                track: 7,
                program: 1,
            }],
            all: None,
        })
        .apply(&mut store)
        .unwrap_err();
        assert_eq!(err, Error::InvalidTrack(7));
    }
}
