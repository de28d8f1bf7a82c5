use crate::config::MetronomeConfig;
use crate::event::{
    Event, EventKind, TimeDivision, TimeSignature, DEFAULT_TEMPO, PAN_CENTER, PAN_CONTROLLER,
    PERCUSSION_CHANNEL, VOLUME_CONTROLLER,
};
use crate::passes::Pass;
use crate::store::EventStore;
use crate::{Error, Result};
use std::collections::BTreeMap;

const TRACK_TITLE: &str = "Metronome";
const TRACK_VOLUME: u8 = 100;

/// Tempo and meter in force from `tick` onward.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MeterSegment {
    tick: u64,
    usec_per_quarter: u32,
    signature: TimeSignature,
}

/// Adds a percussion track that clicks on every beat.
#[derive(Debug, Clone, Copy)]
pub struct MetronomeInserter {
    pub config: MetronomeConfig,
}

impl MetronomeInserter {
    pub fn new(config: MetronomeConfig) -> Self {
        Self { config }
    }
}

/// Running tempo/meter state at every tick where either changes.
fn meter_map(store: &EventStore) -> Vec<MeterSegment> {
    let mut changes: BTreeMap<u64, (Option<u32>, Option<TimeSignature>)> = BTreeMap::new();
    for ev in store.events() {
        match ev.kind {
            EventKind::Tempo { usec_per_quarter } => {
                changes.entry(ev.time).or_default().0 = Some(usec_per_quarter);
            }
            EventKind::TimeSignature(sig) => {
                changes.entry(ev.time).or_default().1 = Some(sig);
            }
            _ => {}
        }
    }

    let mut current = MeterSegment {
        tick: 0,
        usec_per_quarter: DEFAULT_TEMPO,
        signature: TimeSignature::default(),
    };
    let mut segments = vec![current];
    for (tick, (tempo, signature)) in changes {
        current = MeterSegment {
            tick,
            usec_per_quarter: tempo.unwrap_or(current.usec_per_quarter),
            signature: signature.unwrap_or(current.signature),
        };
        match segments.last_mut() {
            Some(last) if last.tick == tick => *last = current,
            _ => segments.push(current),
        }
    }
    segments
}

/// Beat length in ticks for one segment; the beat is the signature's denominator note.
fn beat_ticks(division: TimeDivision, segment: &MeterSegment) -> u64 {
    let quarter = division.ticks_per_quarter(segment.usec_per_quarter);
    (quarter * 4 / segment.signature.denominator() as u64).max(1)
}

/// Click ticks before `end`. Each segment lays its own grid starting at its
/// first tick rather than continuing the previous one.
fn click_ticks(
    division: TimeDivision,
    segments: &[MeterSegment],
    end: u64,
    subdivide: bool,
) -> Vec<u64> {
    let mut ticks = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        let segment_end = segments.get(i + 1).map_or(end, |next| next.tick.min(end));
        let beat = beat_ticks(division, segment);
        let mut tick = segment.tick;
        while tick < segment_end {
            ticks.push(tick);
            let half = tick + beat / 2;
            if subdivide && beat >= 2 && half < segment_end {
                ticks.push(half);
            }
            tick += beat;
        }
    }
    ticks
}

impl Pass for MetronomeInserter {
    fn name(&self) -> &'static str {
        "metronome-inserter"
    }

    fn apply(&self, store: &mut EventStore) -> Result<()> {
        let division = store.header().map(|h| h.division).ok_or(Error::MissingTempo)?;
        match division {
            TimeDivision::Metrical(0) => return Err(Error::MissingTempo),
            TimeDivision::Timecode {
                fps,
                ticks_per_frame,
            } if fps == 0 || ticks_per_frame == 0 => return Err(Error::MissingTempo),
            _ => {}
        }

        let end = store.last_note_tick().unwrap_or(0);
        let segments = meter_map(store);
        let ticks = click_ticks(division, &segments, end, self.config.subdivide);

        let channel = PERCUSSION_CHANNEL;
        let pitch = self.config.pitch;
        // Channel controllers are shared, so leave an existing drum part's mix alone.
        let drums_present = store
            .events()
            .iter()
            .any(|ev| ev.channel() == Some(channel));
        let mut body = Vec::with_capacity(ticks.len() * 2 + 2);
        if !drums_present {
            body.push(Event::control(0, 0, channel, VOLUME_CONTROLLER, TRACK_VOLUME));
            body.push(Event::control(0, 0, channel, PAN_CONTROLLER, PAN_CENTER));
        }
        for (i, &tick) in ticks.iter().enumerate() {
            let segment = segments
                .iter()
                .rev()
                .find(|s| s.tick <= tick)
                .unwrap_or(&segments[0]);
            let length = (beat_ticks(division, segment) / 4).max(1);
            let off = match ticks.get(i + 1) {
                Some(&next) => (tick + length).min(next),
                None => tick + length,
            };
            body.push(Event::note_on(tick, 0, channel, pitch, self.config.velocity));
            body.push(Event::note_off(off, 0, channel, pitch));
        }

        let track = store.add_track(Some(TRACK_TITLE.to_string()), body)?;
        tracing::debug!(
            track,
            clicks = ticks.len(),
            segments = segments.len(),
            drums_present,
            "metronome added"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Header;
    use pretty_assertions::assert_eq;

    fn song(division: TimeDivision, extra: Vec<Event>, last_note: u64) -> EventStore {
        let mut raw = vec![
            Event::new(
                0,
                0,
                EventKind::Header(Header {
                    format: 1,
                    tracks: 1,
                    division,
                }),
            ),
            Event::new(0, 1, EventKind::TrackStart),
        ];
        raw.extend(extra);
        raw.push(Event::note_on(0, 1, 0, 60, 90));
        raw.push(Event::note_off(last_note, 1, 0, 60));
        raw.push(Event::new(last_note, 1, EventKind::TrackEnd));
        EventStore::load(raw).unwrap()
    }

    fn clicks(store: &EventStore, track: u16) -> Vec<u64> {
        store
            .iterate_track(track)
            .filter(|ev| ev.is_note_start())
            .map(|ev| ev.time)
            .collect()
    }

    fn insert(store: &mut EventStore, subdivide: bool) {
        MetronomeInserter::new(MetronomeConfig {
            enabled: true,
            subdivide,
            ..MetronomeConfig::default()
        })
        .apply(store)
        .unwrap();
    }

    #[test]
    fn quarter_clicks_at_120_bpm() {
        let mut store = song(
            TimeDivision::Metrical(480),
            vec![Event::tempo(0, 1, 500_000)],
            1920,
        );
        insert(&mut store, false);
        assert_eq!(clicks(&store, 2), vec![0, 480, 960, 1440]);
        assert_eq!(store.header().unwrap().tracks, 2);
    }

    #[test]
    fn missing_tempo_defaults_to_120() {
        let mut store = song(TimeDivision::Metrical(96), vec![], 384);
        insert(&mut store, false);
        assert_eq!(clicks(&store, 2), vec![0, 96, 192, 288]);
    }

    #[test]
    fn tempo_change_re_anchors_the_grid() {
        let mut store = song(
            TimeDivision::Metrical(480),
            vec![Event::tempo(0, 1, 500_000), Event::tempo(1000, 1, 400_000)],
            2000,
        );
        insert(&mut store, false);
        assert_eq!(clicks(&store, 2), vec![0, 480, 960, 1000, 1480, 1960]);
    }

    #[test]
    fn timecode_beats_follow_tempo() {
        // 25 fps * 40 ticks = 1000 ticks per second
        let division = TimeDivision::Timecode {
            fps: 25,
            ticks_per_frame: 40,
        };
        let mut store = song(
            division,
            vec![Event::tempo(0, 1, 500_000), Event::tempo(1000, 1, 1_000_000)],
            3000,
        );
        insert(&mut store, false);
        assert_eq!(clicks(&store, 2), vec![0, 500, 1000, 2000]);
    }

    #[test]
    fn compound_meter_clicks_on_eighths() {
        let six_eight = TimeSignature {
            numerator: 6,
            denominator_pow: 3,
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        };
        let mut store = song(
            TimeDivision::Metrical(480),
            vec![Event::new(0, 1, EventKind::TimeSignature(six_eight))],
            960,
        );
        insert(&mut store, false);
        assert_eq!(clicks(&store, 2), vec![0, 240, 480, 720]);
    }

    #[test]
    fn subdivided_clicks_land_halfway() {
        let mut store = song(TimeDivision::Metrical(480), vec![], 960);
        insert(&mut store, true);
        assert_eq!(clicks(&store, 2), vec![0, 240, 480, 720]);
    }

    #[test]
    fn every_click_is_closed_before_the_next() {
        let mut store = song(
            TimeDivision::Metrical(480),
            vec![Event::tempo(0, 1, 500_000), Event::tempo(1000, 1, 400_000)],
            2000,
        );
        insert(&mut store, true);
        let mut open = false;
        for ev in store.iterate_track(2).filter(|ev| ev.is_note()) {
            if ev.is_note_start() {
                assert!(!open, "click at {} starts while another sounds", ev.time);
                open = true;
            } else {
                assert!(open);
                open = false;
            }
        }
        assert!(!open);
    }

    #[test]
    fn metronome_track_is_percussion_at_constant_velocity() {
        let mut store = song(TimeDivision::Metrical(480), vec![], 960);
        insert(&mut store, false);
        let track: Vec<&Event> = store.iterate_track(2).collect();
        assert_eq!(track[1].kind, EventKind::Title("Metronome".into()));
        for ev in track.iter().filter(|ev| ev.is_note_start()) {
            assert_eq!(
                ev.kind,
                EventKind::NoteOn {
                    channel: 9,
                    pitch: 42,
                    velocity: 56
                }
            );
        }
    }

    #[test]
    fn click_track_sets_its_mix_on_a_free_channel() {
        let mut store = song(TimeDivision::Metrical(480), vec![], 960);
        insert(&mut store, false);
        let controls: Vec<&Event> = store
            .iterate_track(2)
            .filter(|ev| matches!(ev.kind, EventKind::ControlChange { .. }))
            .collect();
        assert_eq!(
            controls,
            vec![
                &Event::control(0, 2, 9, VOLUME_CONTROLLER, 100),
                &Event::control(0, 2, 9, PAN_CONTROLLER, PAN_CENTER),
            ]
        );
    }

    #[test]
    fn existing_drum_mix_is_left_alone() {
        let drums = vec![
            Event::control(0, 1, 9, VOLUME_CONTROLLER, 30),
            Event::control(0, 1, 9, PAN_CONTROLLER, 127),
        ];
        let mut store = song(TimeDivision::Metrical(480), drums, 960);
        insert(&mut store, false);

        assert!(store
            .iterate_track(2)
            .all(|ev| !matches!(ev.kind, EventKind::ControlChange { .. })));
        assert_eq!(clicks(&store, 2), vec![0, 480]);
    }

    #[test]
    fn no_header_means_no_timing() {
        let mut store = EventStore::load(vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::new(0, 1, EventKind::TrackEnd),
        ])
        .unwrap();
        let err = MetronomeInserter::new(MetronomeConfig::default())
            .apply(&mut store)
            .unwrap_err();
        assert_eq!(err, Error::MissingTempo);
    }
}
