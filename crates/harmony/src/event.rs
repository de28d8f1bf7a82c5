use serde::{Deserialize, Serialize};

/// Track index as used by the tabular format: `0` is file-level, music lives on `1..=n`.
pub type TrackId = u16;

/// Controller number for stereo panning.
pub const PAN_CONTROLLER: u8 = 10;
/// Controller number for channel volume.
pub const VOLUME_CONTROLLER: u8 = 7;
pub const PAN_CENTER: u8 = 64;
pub const PAN_HARD_LEFT: u8 = 0;
pub const PAN_HARD_RIGHT: u8 = 127;
/// General MIDI percussion channel (channel 10, zero-based).
pub const PERCUSSION_CHANNEL: u8 = 9;
/// 120 BPM, the tempo a file has until it says otherwise.
pub const DEFAULT_TEMPO: u32 = 500_000;

/// How ticks relate to musical or wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeDivision {
    /// Ticks per quarter note.
    Metrical(u16),
    /// SMPTE frames per second and ticks per frame. `fps` 29 means 29.97 drop-frame.
    Timecode { fps: u8, ticks_per_frame: u8 },
}

impl TimeDivision {
    /// Decode the 16-bit division word of a MIDI header.
    pub fn from_raw(raw: u16) -> Self {
        if raw & 0x8000 == 0 {
            TimeDivision::Metrical(raw)
        } else {
            let fps = ((raw >> 8) as u8 as i8).unsigned_abs();
            TimeDivision::Timecode {
                fps,
                ticks_per_frame: (raw & 0xFF) as u8,
            }
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            TimeDivision::Metrical(ppq) => ppq & 0x7FFF,
            TimeDivision::Timecode {
                fps,
                ticks_per_frame,
            } => {
                let negated = (fps as i8).wrapping_neg() as u8;
                ((negated as u16) << 8) | 0x8000 | ticks_per_frame as u16
            }
        }
    }

    /// Length of one quarter note in ticks at the given tempo.
    ///
    /// Metrical files ignore the tempo; timecode files count wall-clock ticks,
    /// so the quarter note stretches and shrinks with it.
    pub fn ticks_per_quarter(self, usec_per_quarter: u32) -> u64 {
        match self {
            TimeDivision::Metrical(ppq) => ppq as u64,
            TimeDivision::Timecode {
                fps,
                ticks_per_frame,
            } => {
                let frames_per_second = if fps == 29 { 29.97 } else { fps as f64 };
                let ticks_per_second = frames_per_second * ticks_per_frame as f64;
                (usec_per_quarter as f64 * ticks_per_second / 1_000_000.0).round() as u64
            }
        }
    }
}

/// File-level header record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub format: u16,
    pub tracks: u16,
    pub division: TimeDivision,
}

/// Time signature meta event, fields as stored in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    /// Denominator as a power of two (2 = quarter note, 3 = eighth note).
    pub denominator_pow: u8,
    pub clocks_per_click: u8,
    pub thirty_seconds_per_quarter: u8,
}

impl TimeSignature {
    pub fn denominator(&self) -> u32 {
        1u32 << self.denominator_pow.min(31)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator_pow: 2,
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        }
    }
}

/// A record the engine carries through untouched: its tabular name plus fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub name: String,
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Header(Header),
    TrackStart,
    /// End-of-track marker; closes its track.
    TrackEnd,
    EndOfFile,
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    Tempo {
        usec_per_quarter: u32,
    },
    TimeSignature(TimeSignature),
    Title(String),
    Other(RawRecord),
}

/// One timed MIDI occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub time: u64,
    pub track: TrackId,
    pub kind: EventKind,
}

/// The identity a note's on and off events share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteKey {
    pub track: TrackId,
    pub channel: u8,
    pub pitch: u8,
}

impl Event {
    pub fn new(time: u64, track: TrackId, kind: EventKind) -> Self {
        Self { time, track, kind }
    }

    pub fn note_on(time: u64, track: TrackId, channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::new(
            time,
            track,
            EventKind::NoteOn {
                channel,
                pitch,
                velocity,
            },
        )
    }

    pub fn note_off(time: u64, track: TrackId, channel: u8, pitch: u8) -> Self {
        Self::new(
            time,
            track,
            EventKind::NoteOff {
                channel,
                pitch,
                velocity: 0,
            },
        )
    }

    pub fn control(time: u64, track: TrackId, channel: u8, controller: u8, value: u8) -> Self {
        Self::new(
            time,
            track,
            EventKind::ControlChange {
                channel,
                controller,
                value,
            },
        )
    }

    pub fn program(time: u64, track: TrackId, channel: u8, program: u8) -> Self {
        Self::new(time, track, EventKind::ProgramChange { channel, program })
    }

    pub fn tempo(time: u64, track: TrackId, usec_per_quarter: u32) -> Self {
        Self::new(time, track, EventKind::Tempo { usec_per_quarter })
    }

    /// Channel of a channel-voice event.
    pub fn channel(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOn { channel, .. }
            | EventKind::NoteOff { channel, .. }
            | EventKind::ControlChange { channel, .. }
            | EventKind::ProgramChange { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// A NoteOn that actually starts a sound.
    pub fn is_note_start(&self) -> bool {
        matches!(self.kind, EventKind::NoteOn { velocity, .. } if velocity > 0)
    }

    /// A NoteOff, or the equivalent velocity-0 NoteOn.
    pub fn is_note_end(&self) -> bool {
        match self.kind {
            EventKind::NoteOff { .. } => true,
            EventKind::NoteOn { velocity, .. } => velocity == 0,
            _ => false,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(
            self.kind,
            EventKind::NoteOn { .. } | EventKind::NoteOff { .. }
        )
    }

    pub fn note_key(&self) -> Option<NoteKey> {
        match self.kind {
            EventKind::NoteOn { channel, pitch, .. } | EventKind::NoteOff { channel, pitch, .. } => {
                Some(NoteKey {
                    track: self.track,
                    channel,
                    pitch,
                })
            }
            _ => None,
        }
    }

    pub fn is_pan(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ControlChange {
                controller: PAN_CONTROLLER,
                ..
            }
        )
    }
}
