use crate::event::{EventKind, TimeDivision, TrackId, PAN_CENTER, PAN_CONTROLLER, PERCUSSION_CHANNEL};
use crate::passes::find_groups;
use crate::store::EventStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub usec_per_quarter: u32,
    pub bpm: f64,
}

/// What one track contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track: TrackId,
    pub title: Option<String>,
    pub channels: Vec<u8>,
    pub note_count: usize,
    /// Distinct programs selected anywhere on the track.
    pub programs: Vec<u8>,
    /// Size of the largest chord; 1 for a single line, 0 without notes.
    pub max_divisi: usize,
    /// Every note is on the percussion channel.
    pub is_percussion: bool,
}

/// Facts about a loaded file that a front end needs before choosing transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub format: Option<u16>,
    pub track_count: usize,
    pub division: Option<TimeDivision>,
    pub tracks: Vec<TrackSummary>,
    /// Any pan controller away from center.
    pub has_panning: bool,
    pub has_programs: bool,
    pub tempo_changes: Vec<TempoChange>,
    pub summary: String,
}

impl Survey {
    pub fn track(&self, track: TrackId) -> Option<&TrackSummary> {
        self.tracks.iter().find(|t| t.track == track)
    }

    /// Tracks with at least one chord.
    pub fn divisi_tracks(&self) -> impl Iterator<Item = &TrackSummary> {
        self.tracks.iter().filter(|t| t.max_divisi > 1)
    }
}

pub fn survey(store: &EventStore) -> Survey {
    let mut divisi: BTreeMap<TrackId, usize> = BTreeMap::new();
    for group in find_groups(store) {
        let size = divisi.entry(group.track).or_default();
        *size = (*size).max(group.members.len());
    }

    let tracks: Vec<TrackSummary> = store
        .tracks()
        .iter()
        .map(|&track| profile_track(store, track, divisi.get(&track).copied()))
        .collect();

    let has_panning = store.events().iter().any(|ev| {
        matches!(
            ev.kind,
            EventKind::ControlChange {
                controller: PAN_CONTROLLER,
                value,
                ..
            } if value != PAN_CENTER
        )
    });
    let has_programs = tracks.iter().any(|t| !t.programs.is_empty());

    let tempo_changes = store
        .events()
        .iter()
        .filter_map(|ev| match ev.kind {
            EventKind::Tempo { usec_per_quarter } if usec_per_quarter > 0 => Some(TempoChange {
                tick: ev.time,
                usec_per_quarter,
                bpm: 60_000_000.0 / usec_per_quarter as f64,
            }),
            _ => None,
        })
        .collect();

    let header = store.header();
    let mut survey = Survey {
        format: header.map(|h| h.format),
        track_count: tracks.len(),
        division: header.map(|h| h.division),
        tracks,
        has_panning,
        has_programs,
        tempo_changes,
        summary: String::new(),
    };
    survey.summary = build_summary(&survey);
    survey
}

fn profile_track(store: &EventStore, track: TrackId, max_chord: Option<usize>) -> TrackSummary {
    let mut title = None;
    let mut note_count = 0;
    let mut percussion_notes = 0;
    let mut programs = Vec::new();

    for ev in store.iterate_track(track) {
        match &ev.kind {
            EventKind::Title(text) if title.is_none() => title = Some(text.clone()),
            EventKind::ProgramChange { program, .. } => programs.push(*program),
            _ if ev.is_note_start() => {
                note_count += 1;
                if ev.channel() == Some(PERCUSSION_CHANNEL) {
                    percussion_notes += 1;
                }
            }
            _ => {}
        }
    }
    programs.sort_unstable();
    programs.dedup();

    let max_divisi = match max_chord {
        Some(size) => size,
        None if note_count > 0 => 1,
        None => 0,
    };

    TrackSummary {
        track,
        title,
        channels: store.channels_of(track).into_iter().collect(),
        note_count,
        programs,
        max_divisi,
        is_percussion: note_count > 0 && percussion_notes == note_count,
    }
}

fn build_summary(survey: &Survey) -> String {
    let format_name = match survey.format {
        Some(0) => "Format 0 (single track)",
        Some(1) => "Format 1 (multi-track)",
        Some(2) => "Format 2 (sequential)",
        Some(_) => "Unknown format",
        None => "Headerless",
    };

    let note_tracks = survey.tracks.iter().filter(|t| t.note_count > 0).count();
    let total_notes: usize = survey.tracks.iter().map(|t| t.note_count).sum();

    let mut summary = format!(
        "{}, {} tracks ({} with notes), {} total notes",
        format_name, survey.track_count, note_tracks, total_notes,
    );
    match survey.division {
        Some(TimeDivision::Metrical(ppq)) => summary.push_str(&format!(", PPQ {ppq}")),
        Some(TimeDivision::Timecode {
            fps,
            ticks_per_frame,
        }) => summary.push_str(&format!(", {fps} fps x {ticks_per_frame}")),
        None => {}
    }

    let chords = survey.divisi_tracks().count();
    if chords > 0 {
        summary.push_str(&format!(". {chords} tracks have divisi"));
    }
    if survey.has_panning {
        summary.push_str(". Panning present");
    }
    summary
}
