//! Ordered, validated event storage for one file.
//!
//! The body is kept sorted by `(time, track)`. Sorting is stable, so
//! same-time events of one track keep the order the file gave them, which is
//! the causal order a synthesizer will see.

use crate::event::{Event, EventKind, Header, NoteKey, TrackId};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct EventStore {
    header: Option<Header>,
    has_end_of_file: bool,
    events: Vec<Event>,
    tracks: BTreeSet<TrackId>,
}

#[derive(Default)]
struct Bounds {
    start: Option<u64>,
    end: Option<u64>,
    latest: u64,
}

fn sort_key(ev: &Event) -> (u64, TrackId) {
    (ev.time, ev.track)
}

impl EventStore {
    /// Build a store from the flat event list handed over by a codec.
    pub fn load(raw: Vec<Event>) -> Result<Self> {
        let mut header: Option<Header> = None;
        let mut has_end_of_file = false;
        let mut bounds: BTreeMap<TrackId, Bounds> = BTreeMap::new();
        let mut body = Vec::with_capacity(raw.len());

        for ev in raw {
            match ev.kind {
                EventKind::Header(h) => {
                    if header.replace(h).is_some() {
                        return Err(Error::MalformedInput("more than one header".into()));
                    }
                    continue;
                }
                EventKind::EndOfFile => {
                    has_end_of_file = true;
                    continue;
                }
                _ => {}
            }

            if ev.track == 0 {
                return Err(Error::MalformedInput(format!(
                    "{:?} at tick {} sits on file-level track 0",
                    ev.kind, ev.time
                )));
            }

            let b = bounds.entry(ev.track).or_default();
            if matches!(ev.kind, EventKind::TrackStart) {
                if b.start.is_some() {
                    return Err(Error::MalformedInput(format!(
                        "track {} starts twice",
                        ev.track
                    )));
                }
                b.start = Some(ev.time);
                b.latest = ev.time;
            } else {
                let start = b.start.ok_or_else(|| {
                    Error::MalformedInput(format!(
                        "event at tick {} references track {} which has not started",
                        ev.time, ev.track
                    ))
                })?;
                if b.end.is_some() {
                    return Err(Error::MalformedInput(format!(
                        "event at tick {} follows the end of track {}",
                        ev.time, ev.track
                    )));
                }
                if ev.time < start {
                    return Err(Error::MalformedInput(format!(
                        "event at tick {} precedes the start of track {} at {}",
                        ev.time, ev.track, start
                    )));
                }
                if matches!(ev.kind, EventKind::TrackEnd) {
                    if ev.time < b.latest {
                        return Err(Error::MalformedInput(format!(
                            "track {} ends at tick {} before its event at {}",
                            ev.track, ev.time, b.latest
                        )));
                    }
                    b.end = Some(ev.time);
                }
                b.latest = b.latest.max(ev.time);
            }
            body.push(ev);
        }

        if let Some((track, _)) = bounds.iter().find(|(_, b)| b.end.is_none()) {
            return Err(Error::MalformedInput(format!("track {track} never ends")));
        }

        let tracks: BTreeSet<TrackId> = bounds.keys().copied().collect();
        if let Some(h) = &header {
            if h.tracks as usize != tracks.len() {
                return Err(Error::MalformedInput(format!(
                    "header declares {} tracks but {} are present",
                    h.tracks,
                    tracks.len()
                )));
            }
            if let Some(&stray) = tracks.iter().find(|&&t| t > h.tracks) {
                return Err(Error::MalformedInput(format!(
                    "track {stray} is outside the {} declared tracks",
                    h.tracks
                )));
            }
        }

        body.sort_by_key(sort_key);
        check_note_pairs(&body)?;

        tracing::debug!(
            events = body.len(),
            tracks = tracks.len(),
            "loaded event store"
        );

        Ok(Self {
            header,
            has_end_of_file,
            events: body,
            tracks,
        })
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn tracks(&self) -> &BTreeSet<TrackId> {
        &self.tracks
    }

    pub fn has_track(&self, track: TrackId) -> bool {
        self.tracks.contains(&track)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Lazy iterator over one track's events in time order. Clone it to restart.
    pub fn iterate_track(&self, track: TrackId) -> TrackEvents<'_> {
        TrackEvents {
            events: &self.events,
            track,
            pos: 0,
        }
    }

    /// Tick of the track's end marker.
    pub fn track_end(&self, track: TrackId) -> Option<u64> {
        self.iterate_track(track)
            .find(|ev| matches!(ev.kind, EventKind::TrackEnd))
            .map(|ev| ev.time)
    }

    /// Channels a track uses for channel-voice events.
    pub fn channels_of(&self, track: TrackId) -> BTreeSet<u8> {
        self.iterate_track(track).filter_map(Event::channel).collect()
    }

    /// Latest tick of any note event, if the file has notes at all.
    pub fn last_note_tick(&self) -> Option<u64> {
        self.events
            .iter()
            .filter(|ev| ev.is_note())
            .map(|ev| ev.time)
            .max()
    }

    /// Insert after the same-time events of its track, ahead of the track end.
    ///
    /// An event later than the track end moves the end marker up to it.
    pub fn insert(&mut self, event: Event) -> Result<()> {
        self.prepare_insert(&event)?;
        let (lo, hi) = self.group_range(event.time, event.track);
        let pos = self.events[lo..hi]
            .iter()
            .position(|ev| matches!(ev.kind, EventKind::TrackEnd))
            .map_or(hi, |offset| lo + offset);
        self.events.insert(pos, event);
        Ok(())
    }

    /// Insert after same-time non-note events of its track but ahead of its
    /// same-time notes, so a controller or program lands before the note it
    /// is meant for.
    pub fn insert_before_notes(&mut self, event: Event) -> Result<()> {
        self.prepare_insert(&event)?;
        let (lo, hi) = self.group_range(event.time, event.track);
        let pos = self.events[lo..hi]
            .iter()
            .position(|ev| ev.is_note() || matches!(ev.kind, EventKind::TrackEnd))
            .map_or(hi, |offset| lo + offset);
        self.events.insert(pos, event);
        Ok(())
    }

    /// Keep only events matching the predicate. Track boundaries always stay.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Event) -> bool,
    {
        self.events.retain(|ev| {
            matches!(ev.kind, EventKind::TrackStart | EventKind::TrackEnd) || keep(ev)
        });
    }

    /// Remove the events at the given body positions. Track boundaries always stay.
    pub fn remove_indices(&mut self, indices: &BTreeSet<usize>) {
        let mut idx = 0;
        self.events.retain(|ev| {
            let drop = indices.contains(&idx)
                && !matches!(ev.kind, EventKind::TrackStart | EventKind::TrackEnd);
            idx += 1;
            !drop
        });
    }

    /// Mutable access to event payloads. Time and track stay fixed so the
    /// ordering cannot be disturbed from here.
    pub fn kinds_mut(&mut self) -> impl Iterator<Item = (u64, TrackId, &mut EventKind)> + '_ {
        self.events
            .iter_mut()
            .map(|ev| (ev.time, ev.track, &mut ev.kind))
    }

    /// Swap in a rebuilt body. Tracks cannot change here.
    pub(crate) fn rebuild<F>(&mut self, build: F)
    where
        F: FnOnce(Vec<Event>) -> Vec<Event>,
    {
        let events = std::mem::take(&mut self.events);
        self.events = build(events);
        self.events.sort_by_key(sort_key);
    }

    /// Append a new track after the existing ones and return its id.
    ///
    /// `body` events are re-homed onto the new track; start and end markers
    /// are added around them.
    pub fn add_track(&mut self, title: Option<String>, body: Vec<Event>) -> Result<TrackId> {
        let id = self.tracks.iter().next_back().map_or(1, |last| last + 1);
        if let Some(structural) = body.iter().find(|ev| is_structural(&ev.kind)) {
            return Err(Error::MalformedInput(format!(
                "{:?} cannot be part of a new track body",
                structural.kind
            )));
        }

        let end = body.iter().map(|ev| ev.time).max().unwrap_or(0);
        let mut track_events = Vec::with_capacity(body.len() + 3);
        track_events.push(Event::new(0, id, EventKind::TrackStart));
        if let Some(title) = title {
            track_events.push(Event::new(0, id, EventKind::Title(title)));
        }
        track_events.extend(body.into_iter().map(|ev| Event { track: id, ..ev }));
        track_events.push(Event::new(end, id, EventKind::TrackEnd));
        track_events.sort_by_key(|ev| ev.time);
        check_note_pairs(&track_events)?;

        self.events.extend(track_events);
        self.events.sort_by_key(sort_key);
        self.tracks.insert(id);
        if let Some(header) = self.header.as_mut() {
            header.tracks = self.tracks.len() as u16;
        }
        Ok(id)
    }

    /// Flat time-ordered sequence: header, body, end-of-file.
    pub fn serialize(&self) -> Vec<Event> {
        self.clone().into_events()
    }

    pub fn into_events(self) -> Vec<Event> {
        let last = self.events.last().map_or(0, |ev| ev.time);
        let mut out = Vec::with_capacity(self.events.len() + 2);
        if let Some(header) = self.header {
            out.push(Event::new(0, 0, EventKind::Header(header)));
        }
        out.extend(self.events);
        if self.has_end_of_file {
            out.push(Event::new(last, 0, EventKind::EndOfFile));
        }
        out
    }

    fn prepare_insert(&mut self, event: &Event) -> Result<()> {
        if !self.has_track(event.track) {
            return Err(Error::InvalidTrack(event.track));
        }
        if is_structural(&event.kind) || matches!(event.kind, EventKind::TrackStart) {
            return Err(Error::MalformedInput(format!(
                "{:?} cannot be inserted into an existing track",
                event.kind
            )));
        }
        if let Some(end) = self.track_end(event.track) {
            if event.time > end {
                self.move_track_end(event.track, event.time);
            }
        }
        Ok(())
    }

    fn move_track_end(&mut self, track: TrackId, time: u64) {
        if let Some(idx) = self
            .events
            .iter()
            .position(|ev| ev.track == track && matches!(ev.kind, EventKind::TrackEnd))
        {
            let mut end = self.events.remove(idx);
            end.time = time;
            let (_, hi) = self.group_range(time, track);
            self.events.insert(hi, end);
        }
    }

    /// Half-open body range holding events with exactly this `(time, track)`.
    fn group_range(&self, time: u64, track: TrackId) -> (usize, usize) {
        let key = (time, track);
        let lo = self.events.partition_point(|ev| sort_key(ev) < key);
        let hi = self.events.partition_point(|ev| sort_key(ev) <= key);
        (lo, hi)
    }
}

fn is_structural(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Header(_) | EventKind::EndOfFile | EventKind::TrackStart | EventKind::TrackEnd
    )
}

/// Reject note ends that have nothing open to close.
fn check_note_pairs(events: &[Event]) -> Result<()> {
    let mut open: HashMap<NoteKey, u32> = HashMap::new();
    for ev in events {
        let Some(key) = ev.note_key() else { continue };
        if ev.is_note_start() {
            *open.entry(key).or_default() += 1;
        } else {
            match open.get_mut(&key) {
                Some(count) if *count > 0 => *count -= 1,
                _ => {
                    return Err(Error::MalformedInput(format!(
                        "note off for pitch {} on track {} channel {} at tick {} has no open note",
                        key.pitch, key.track, key.channel, ev.time
                    )))
                }
            }
        }
    }
    Ok(())
}

/// Iterator over a single track, see [`EventStore::iterate_track`].
#[derive(Debug, Clone)]
pub struct TrackEvents<'a> {
    events: &'a [Event],
    track: TrackId,
    pos: usize,
}

impl<'a> Iterator for TrackEvents<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ev) = self.events.get(self.pos) {
            self.pos += 1;
            if ev.track == self.track {
                return Some(ev);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TimeDivision;
    use pretty_assertions::assert_eq;

    fn header(tracks: u16) -> Event {
        Event::new(
            0,
            0,
            EventKind::Header(Header {
                format: 1,
                tracks,
                division: TimeDivision::Metrical(480),
            }),
        )
    }

    fn two_tracks() -> Vec<Event> {
        vec![
            header(2),
            Event::new(0, 1, EventKind::TrackStart),
            Event::tempo(0, 1, 500_000),
            Event::new(960, 1, EventKind::TrackEnd),
            Event::new(0, 2, EventKind::TrackStart),
            Event::note_on(0, 2, 0, 60, 90),
            Event::note_off(480, 2, 0, 60),
            Event::new(960, 2, EventKind::TrackEnd),
            Event::new(0, 0, EventKind::EndOfFile),
        ]
    }

    #[test]
    fn load_sorts_by_time_then_track() {
        let store = EventStore::load(two_tracks()).unwrap();
        let times: Vec<(u64, TrackId)> = store.events().iter().map(sort_key).collect();
        assert_eq!(
            times,
            vec![(0, 1), (0, 1), (0, 2), (0, 2), (480, 2), (960, 1), (960, 2)]
        );
        assert_eq!(store.tracks().len(), 2);
    }

    #[test]
    fn serialize_wraps_body_in_header_and_end_of_file() {
        let store = EventStore::load(two_tracks()).unwrap();
        let out = store.serialize();
        assert!(matches!(out.first().unwrap().kind, EventKind::Header(_)));
        let last = out.last().unwrap();
        assert!(matches!(last.kind, EventKind::EndOfFile));
        assert_eq!(last.time, 960);
        assert!(out.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn unmatched_note_off_is_malformed() {
        let mut raw = two_tracks();
        raw.insert(6, Event::note_off(240, 2, 0, 64));
        let err = EventStore::load(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)), "{err}");
    }

    #[test]
    fn event_on_undeclared_track_is_malformed() {
        let mut raw = two_tracks();
        raw.insert(3, Event::note_on(0, 3, 0, 60, 90));
        assert!(matches!(
            EventStore::load(raw),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn track_end_before_events_is_malformed() {
        let raw = vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::note_on(100, 1, 0, 60, 90),
            Event::note_off(200, 1, 0, 60),
            Event::new(150, 1, EventKind::TrackEnd),
        ];
        assert!(matches!(
            EventStore::load(raw),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn header_track_count_must_match() {
        let mut raw = two_tracks();
        raw[0] = header(3);
        assert!(matches!(
            EventStore::load(raw),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn open_note_at_track_end_is_tolerated() {
        let raw = vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::note_on(0, 1, 0, 60, 90),
            Event::new(480, 1, EventKind::TrackEnd),
        ];
        assert!(EventStore::load(raw).is_ok());
    }

    #[test]
    fn insert_lands_after_same_time_events_but_before_track_end() {
        let mut store = EventStore::load(two_tracks()).unwrap();
        store.insert(Event::control(960, 2, 0, 7, 100)).unwrap();
        let track: Vec<&Event> = store.iterate_track(2).collect();
        let n = track.len();
        assert_eq!(track[n - 2], &Event::control(960, 2, 0, 7, 100));
        assert!(matches!(track[n - 1].kind, EventKind::TrackEnd));
    }

    #[test]
    fn insert_past_track_end_moves_the_end() {
        let mut store = EventStore::load(two_tracks()).unwrap();
        store.insert(Event::control(2000, 2, 0, 7, 100)).unwrap();
        assert_eq!(store.track_end(2), Some(2000));
        let last = store.events().last().unwrap();
        assert!(matches!(last.kind, EventKind::TrackEnd));
        assert_eq!(last.track, 2);
    }

    #[test]
    fn insert_before_notes_goes_ahead_of_same_time_note() {
        let mut store = EventStore::load(two_tracks()).unwrap();
        store
            .insert_before_notes(Event::control(0, 2, 0, 10, 127))
            .unwrap();
        let track: Vec<&Event> = store.iterate_track(2).collect();
        assert!(matches!(track[0].kind, EventKind::TrackStart));
        assert!(track[1].is_pan());
        assert!(track[2].is_note_start());
    }

    #[test]
    fn insert_into_missing_track_fails() {
        let mut store = EventStore::load(two_tracks()).unwrap();
        assert_eq!(
            store.insert(Event::control(0, 9, 0, 7, 1)),
            Err(Error::InvalidTrack(9))
        );
    }

    #[test]
    fn iterate_track_restarts_from_clone() {
        let store = EventStore::load(two_tracks()).unwrap();
        let iter = store.iterate_track(2);
        let first: Vec<&Event> = iter.clone().collect();
        let second: Vec<&Event> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn add_track_bumps_header() {
        let mut store = EventStore::load(two_tracks()).unwrap();
        let id = store
            .add_track(
                Some("Click".into()),
                vec![Event::note_on(0, 0, 9, 42, 50), Event::note_off(120, 0, 9, 42)],
            )
            .unwrap();
        assert_eq!(id, 3);
        assert_eq!(store.header().unwrap().tracks, 3);
        assert_eq!(store.track_end(3), Some(120));
        assert_eq!(store.iterate_track(3).count(), 5);
    }

    #[test]
    fn retain_keeps_track_boundaries() {
        let mut store = EventStore::load(two_tracks()).unwrap();
        store.retain(|_| false);
        assert_eq!(store.len(), 4);
        assert!(store
            .events()
            .iter()
            .all(|ev| matches!(ev.kind, EventKind::TrackStart | EventKind::TrackEnd)));
    }
}
