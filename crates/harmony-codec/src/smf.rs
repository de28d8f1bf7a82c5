//! Standard MIDI File bytes.
//!
//! Both directions go through `midly`. Records the engine only carries as
//! [`RawRecord`]s are re-encoded from their midicsv fields.

use crate::csv::{quote, unquote};
use crate::{CodecError, Result};
use harmony::{Event, EventKind, Header, RawRecord, TimeDivision, TimeSignature, TrackId};
use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{
    Format, Fps, MetaMessage, MidiMessage, PitchBend, Smf, SmpteTime, Timing, TrackEvent,
    TrackEventKind,
};

/// Parse SMF bytes into events numbered the midicsv way: tracks `1..=n`.
pub fn read(bytes: &[u8]) -> Result<Vec<Event>> {
    let smf = Smf::parse(bytes).map_err(|e| CodecError::MidiParse(e.to_string()))?;

    let format = match smf.header.format {
        Format::SingleTrack => 0,
        Format::Parallel => 1,
        Format::Sequential => 2,
    };
    let division = match smf.header.timing {
        Timing::Metrical(ticks) => TimeDivision::Metrical(ticks.as_int()),
        Timing::Timecode(fps, ticks_per_frame) => TimeDivision::Timecode {
            fps: fps.as_int(),
            ticks_per_frame,
        },
    };

    let mut events = vec![Event::new(
        0,
        0,
        EventKind::Header(Header {
            format,
            tracks: smf.tracks.len() as u16,
            division,
        }),
    )];
    let mut last_tick = 0u64;

    for (idx, track) in smf.tracks.iter().enumerate() {
        let id = (idx + 1) as TrackId;
        let mut current_tick: u64 = 0;
        let mut ended = false;
        events.push(Event::new(0, id, EventKind::TrackStart));

        for event in track {
            current_tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::EndOfTrack) = event.kind {
                events.push(Event::new(current_tick, id, EventKind::TrackEnd));
                ended = true;
                break;
            }
            events.push(Event::new(current_tick, id, convert_kind(&event.kind)));
        }
        if !ended {
            tracing::debug!(track = id, "track without end marker");
            events.push(Event::new(current_tick, id, EventKind::TrackEnd));
        }
        last_tick = last_tick.max(current_tick);
    }

    events.push(Event::new(last_tick, 0, EventKind::EndOfFile));
    tracing::debug!(
        tracks = smf.tracks.len(),
        events = events.len(),
        "parsed SMF"
    );
    Ok(events)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn byte_fields(bytes: &[u8]) -> impl Iterator<Item = String> + '_ {
    bytes.iter().map(|b| b.to_string())
}

fn other(name: &str, fields: Vec<String>) -> EventKind {
    EventKind::Other(RawRecord::new(name, fields))
}

fn text_record(name: &str, bytes: &[u8]) -> EventKind {
    other(name, vec![quote(&text(bytes))])
}

/// Length-prefixed byte payload, as midicsv lists sysex and unknown metas.
fn data_fields(prefix: Vec<String>, bytes: &[u8]) -> Vec<String> {
    let mut fields = prefix;
    fields.push(bytes.len().to_string());
    fields.extend(byte_fields(bytes));
    fields
}

fn convert_kind(kind: &TrackEventKind) -> EventKind {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                    channel,
                    program: program.as_int(),
                },
                MidiMessage::Aftertouch { key, vel } => other(
                    "Poly_aftertouch_c",
                    vec![
                        channel.to_string(),
                        key.as_int().to_string(),
                        vel.as_int().to_string(),
                    ],
                ),
                MidiMessage::ChannelAftertouch { vel } => other(
                    "Channel_aftertouch_c",
                    vec![channel.to_string(), vel.as_int().to_string()],
                ),
                MidiMessage::PitchBend { bend } => other(
                    "Pitch_bend_c",
                    vec![channel.to_string(), bend.0.as_int().to_string()],
                ),
            }
        }
        TrackEventKind::Meta(meta) => match meta {
            MetaMessage::Tempo(tempo) => EventKind::Tempo {
                usec_per_quarter: tempo.as_int(),
            },
            MetaMessage::TimeSignature(numerator, denominator_pow, clocks, thirty_seconds) => {
                EventKind::TimeSignature(TimeSignature {
                    numerator,
                    denominator_pow,
                    clocks_per_click: clocks,
                    thirty_seconds_per_quarter: thirty_seconds,
                })
            }
            MetaMessage::TrackName(name) => EventKind::Title(text(name)),
            MetaMessage::Text(t) => text_record("Text_t", t),
            MetaMessage::Copyright(t) => text_record("Copyright_t", t),
            MetaMessage::InstrumentName(t) => text_record("Instrument_name_t", t),
            MetaMessage::Lyric(t) => text_record("Lyric_t", t),
            MetaMessage::Marker(t) => text_record("Marker_t", t),
            MetaMessage::CuePoint(t) => text_record("Cue_point_t", t),
            MetaMessage::ProgramName(t) => {
                other("Unknown_meta_event", data_fields(vec!["8".into()], t))
            }
            MetaMessage::DeviceName(t) => {
                other("Unknown_meta_event", data_fields(vec!["9".into()], t))
            }
            MetaMessage::TrackNumber(Some(n)) => other("Sequence_number", vec![n.to_string()]),
            MetaMessage::TrackNumber(None) => {
                other("Unknown_meta_event", data_fields(vec!["0".into()], &[]))
            }
            MetaMessage::MidiChannel(ch) => other("Channel_prefix", vec![ch.as_int().to_string()]),
            MetaMessage::MidiPort(port) => other("MIDI_port", vec![port.as_int().to_string()]),
            MetaMessage::KeySignature(key, minor) => other(
                "Key_signature",
                vec![
                    key.to_string(),
                    quote(if minor { "minor" } else { "major" }),
                ],
            ),
            MetaMessage::SmpteOffset(smpte) => {
                let rate = match smpte.fps() {
                    Fps::Fps24 => 0u8,
                    Fps::Fps25 => 1,
                    Fps::Fps29 => 2,
                    Fps::Fps30 => 3,
                };
                other(
                    "SMPTE_offset",
                    vec![
                        ((rate << 5) | smpte.hour()).to_string(),
                        smpte.minute().to_string(),
                        smpte.second().to_string(),
                        smpte.frame().to_string(),
                        smpte.subframe().to_string(),
                    ],
                )
            }
            MetaMessage::SequencerSpecific(data) => {
                other("Sequencer_specific", data_fields(vec![], data))
            }
            MetaMessage::Unknown(kind, data) => {
                other("Unknown_meta_event", data_fields(vec![kind.to_string()], data))
            }
            MetaMessage::EndOfTrack => EventKind::TrackEnd,
        },
        TrackEventKind::SysEx(data) => other("System_exclusive", data_fields(vec![], data)),
        TrackEventKind::Escape(data) => {
            other("System_exclusive_packet", data_fields(vec![], data))
        }
    }
}

/// Largest delta time a track event can carry (28 bits).
const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Encode a serialized store as SMF bytes.
///
/// Tracks are written in id order; the header's format and division are
/// reused, metrical 480 when the events carry no header.
pub fn write(events: &[Event]) -> Result<Vec<u8>> {
    let header = events.iter().find_map(|ev| match ev.kind {
        EventKind::Header(h) => Some(h),
        _ => None,
    });
    let (format, division) = header
        .map(|h| (h.format, h.division))
        .unwrap_or((1, TimeDivision::Metrical(480)));

    let format = match format {
        0 => Format::SingleTrack,
        2 => Format::Sequential,
        _ => Format::Parallel,
    };
    let timing = match division {
        TimeDivision::Metrical(ppq) => Timing::Metrical(u15::new(ppq)),
        TimeDivision::Timecode {
            fps,
            ticks_per_frame,
        } => {
            let rate = Fps::from_int(fps).ok_or_else(|| CodecError::Encode {
                record: "Header".into(),
                message: format!("{fps} fps is not an SMPTE frame rate"),
            })?;
            Timing::Timecode(rate, ticks_per_frame)
        }
    };

    let mut track_ids: Vec<TrackId> = events
        .iter()
        .filter(|ev| ev.track != 0)
        .map(|ev| ev.track)
        .collect();
    track_ids.sort_unstable();
    track_ids.dedup();

    let mut payloads = Vec::with_capacity(track_ids.len());
    for id in track_ids {
        payloads.push(encode_track(events.iter().filter(|ev| ev.track == id))?);
    }

    let tracks: Vec<Vec<TrackEvent<'_>>> = payloads
        .iter()
        .map(|track| {
            track
                .iter()
                .map(|(delta, payload)| TrackEvent {
                    delta: *delta,
                    kind: payload.kind(),
                })
                .collect()
        })
        .collect();

    let smf = Smf {
        header: midly::Header::new(format, timing),
        tracks,
    };
    let mut bytes = Vec::new();
    smf.write(&mut bytes).map_err(|e| CodecError::Encode {
        record: "file".into(),
        message: e.to_string(),
    })?;
    Ok(bytes)
}

/// Records whose whole content is a byte string.
#[derive(Debug, Clone, Copy)]
enum ByteRecord {
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    SequencerSpecific,
    UnknownMeta(u8),
    SysEx,
    Escape,
}

/// Owned form of one track event. `midly` events borrow their byte strings,
/// so a track is encoded into payloads first and borrowed from for writing.
#[derive(Debug)]
enum Payload {
    Midi { channel: u4, message: MidiMessage },
    Tempo(u24),
    TimeSignature(TimeSignature),
    KeySignature(i8, bool),
    SmpteOffset(SmpteTime),
    MidiChannel(u4),
    MidiPort(u7),
    TrackNumber(Option<u16>),
    EndOfTrack,
    Bytes(ByteRecord, Vec<u8>),
}

impl Payload {
    fn midi(channel: u8, message: MidiMessage) -> Self {
        Payload::Midi {
            channel: u4::new(channel),
            message,
        }
    }

    fn kind(&self) -> TrackEventKind<'_> {
        let meta = match self {
            Payload::Midi { channel, message } => {
                return TrackEventKind::Midi {
                    channel: *channel,
                    message: *message,
                }
            }
            Payload::Tempo(tempo) => MetaMessage::Tempo(*tempo),
            Payload::TimeSignature(sig) => MetaMessage::TimeSignature(
                sig.numerator,
                sig.denominator_pow,
                sig.clocks_per_click,
                sig.thirty_seconds_per_quarter,
            ),
            Payload::KeySignature(key, minor) => MetaMessage::KeySignature(*key, *minor),
            Payload::SmpteOffset(time) => MetaMessage::SmpteOffset(*time),
            Payload::MidiChannel(channel) => MetaMessage::MidiChannel(*channel),
            Payload::MidiPort(port) => MetaMessage::MidiPort(*port),
            Payload::TrackNumber(n) => MetaMessage::TrackNumber(*n),
            Payload::EndOfTrack => MetaMessage::EndOfTrack,
            Payload::Bytes(record, data) => {
                let data = data.as_slice();
                match record {
                    ByteRecord::Text => MetaMessage::Text(data),
                    ByteRecord::Copyright => MetaMessage::Copyright(data),
                    ByteRecord::TrackName => MetaMessage::TrackName(data),
                    ByteRecord::InstrumentName => MetaMessage::InstrumentName(data),
                    ByteRecord::Lyric => MetaMessage::Lyric(data),
                    ByteRecord::Marker => MetaMessage::Marker(data),
                    ByteRecord::CuePoint => MetaMessage::CuePoint(data),
                    ByteRecord::SequencerSpecific => MetaMessage::SequencerSpecific(data),
                    ByteRecord::UnknownMeta(kind) => MetaMessage::Unknown(*kind, data),
                    ByteRecord::SysEx => return TrackEventKind::SysEx(data),
                    ByteRecord::Escape => return TrackEventKind::Escape(data),
                }
            }
        };
        TrackEventKind::Meta(meta)
    }
}

fn encode_track<'a>(events: impl Iterator<Item = &'a Event>) -> Result<Vec<(u28, Payload)>> {
    let mut track = Vec::new();
    let mut last_tick = 0u64;
    let mut ended = false;

    for ev in events {
        let Some(payload) = encode_kind(&ev.kind)? else {
            continue;
        };
        let delta = ev.time.saturating_sub(last_tick);
        if delta > MAX_DELTA {
            return Err(CodecError::Encode {
                record: "delta time".into(),
                message: format!(
                    "track {} waits {} ticks before tick {}, more than a delta can hold",
                    ev.track, delta, ev.time
                ),
            });
        }
        track.push((u28::new(delta as u32), payload));
        last_tick = ev.time.max(last_tick);
        if matches!(ev.kind, EventKind::TrackEnd) {
            ended = true;
            break;
        }
    }

    if !ended {
        track.push((u28::new(0), Payload::EndOfTrack));
    }
    Ok(track)
}

/// Payload for one event; `None` for records that have no place inside a track.
fn encode_kind(kind: &EventKind) -> Result<Option<Payload>> {
    let payload = match kind {
        EventKind::Header(_) | EventKind::EndOfFile | EventKind::TrackStart => return Ok(None),
        EventKind::TrackEnd => Payload::EndOfTrack,
        EventKind::NoteOn {
            channel,
            pitch,
            velocity,
        } => Payload::midi(
            *channel,
            MidiMessage::NoteOn {
                key: u7::new(*pitch),
                vel: u7::new(*velocity),
            },
        ),
        EventKind::NoteOff {
            channel,
            pitch,
            velocity,
        } => Payload::midi(
            *channel,
            MidiMessage::NoteOff {
                key: u7::new(*pitch),
                vel: u7::new(*velocity),
            },
        ),
        EventKind::ControlChange {
            channel,
            controller,
            value,
        } => Payload::midi(
            *channel,
            MidiMessage::Controller {
                controller: u7::new(*controller),
                value: u7::new(*value),
            },
        ),
        EventKind::ProgramChange { channel, program } => Payload::midi(
            *channel,
            MidiMessage::ProgramChange {
                program: u7::new(*program),
            },
        ),
        EventKind::Tempo { usec_per_quarter } => {
            if *usec_per_quarter > 0x00FF_FFFF {
                return Err(CodecError::Encode {
                    record: "Tempo".into(),
                    message: format!("{usec_per_quarter} does not fit in 24 bits"),
                });
            }
            Payload::Tempo(u24::new(*usec_per_quarter))
        }
        EventKind::TimeSignature(sig) => Payload::TimeSignature(*sig),
        EventKind::Title(text) => Payload::Bytes(ByteRecord::TrackName, text.as_bytes().to_vec()),
        EventKind::Other(raw) => encode_raw(raw)?,
    };
    Ok(Some(payload))
}

struct Fields<'a> {
    raw: &'a RawRecord,
}

impl Fields<'_> {
    fn error(&self, message: String) -> CodecError {
        CodecError::Encode {
            record: self.raw.name.clone(),
            message,
        }
    }

    fn get(&self, idx: usize) -> Result<&str> {
        self.raw
            .fields
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| self.error(format!("missing field {}", idx + 1)))
    }

    fn int<T: std::str::FromStr>(&self, idx: usize) -> Result<T> {
        let raw = self.get(idx)?;
        raw.parse()
            .map_err(|_| self.error(format!("field {} ({raw}) is not a valid number", idx + 1)))
    }

    fn text(&self, idx: usize) -> Result<Vec<u8>> {
        unquote(self.get(idx)?)
            .map(String::into_bytes)
            .map_err(|message| self.error(message))
    }

    /// Length field at `idx` followed by that many byte fields.
    fn data(&self, idx: usize) -> Result<Vec<u8>> {
        let len: usize = self.int(idx)?;
        (0..len).map(|i| self.int(idx + 1 + i)).collect()
    }
}

fn encode_raw(raw: &RawRecord) -> Result<Payload> {
    let f = Fields { raw };
    let bytes = |record: ByteRecord, data: Vec<u8>| Payload::Bytes(record, data);
    let payload = match raw.name.as_str() {
        "Poly_aftertouch_c" => Payload::midi(
            f.int(0)?,
            MidiMessage::Aftertouch {
                key: u7::new(f.int(1)?),
                vel: u7::new(f.int(2)?),
            },
        ),
        "Channel_aftertouch_c" => Payload::midi(
            f.int(0)?,
            MidiMessage::ChannelAftertouch {
                vel: u7::new(f.int(1)?),
            },
        ),
        "Pitch_bend_c" => Payload::midi(
            f.int(0)?,
            MidiMessage::PitchBend {
                bend: PitchBend(u14::new(f.int(1)?)),
            },
        ),
        "Text_t" => bytes(ByteRecord::Text, f.text(0)?),
        "Copyright_t" => bytes(ByteRecord::Copyright, f.text(0)?),
        "Instrument_name_t" => bytes(ByteRecord::InstrumentName, f.text(0)?),
        "Lyric_t" => bytes(ByteRecord::Lyric, f.text(0)?),
        "Marker_t" => bytes(ByteRecord::Marker, f.text(0)?),
        "Cue_point_t" => bytes(ByteRecord::CuePoint, f.text(0)?),
        "Sequence_number" => Payload::TrackNumber(Some(f.int(0)?)),
        "Channel_prefix" => Payload::MidiChannel(u4::new(f.int(0)?)),
        "MIDI_port" => Payload::MidiPort(u7::new(f.int(0)?)),
        "Key_signature" => {
            let key: i8 = f.int(0)?;
            let minor = match unquote(f.get(1)?).as_deref() {
                Ok("minor") => true,
                Ok("major") => false,
                _ => return Err(f.error("mode must be \"major\" or \"minor\"".into())),
            };
            Payload::KeySignature(key, minor)
        }
        "SMPTE_offset" => {
            // the hour field carries the frame rate in its top bits
            let hour_and_rate: u8 = f.int(0)?;
            let fps = match hour_and_rate >> 5 {
                0 => Fps::Fps24,
                1 => Fps::Fps25,
                2 => Fps::Fps29,
                _ => Fps::Fps30,
            };
            let time = SmpteTime::new(
                hour_and_rate & 0x1F,
                f.int(1)?,
                f.int(2)?,
                f.int(3)?,
                f.int(4)?,
                fps,
            )
            .ok_or_else(|| f.error("time is out of range for its frame rate".into()))?;
            Payload::SmpteOffset(time)
        }
        "Sequencer_specific" => bytes(ByteRecord::SequencerSpecific, f.data(0)?),
        "Unknown_meta_event" => bytes(ByteRecord::UnknownMeta(f.int(0)?), f.data(1)?),
        "System_exclusive" => bytes(ByteRecord::SysEx, f.data(0)?),
        "System_exclusive_packet" => bytes(ByteRecord::Escape, f.data(0)?),
        other => {
            return Err(CodecError::Encode {
                record: other.to_string(),
                message: "no SMF encoding for this record".into(),
            })
        }
    };
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn song() -> Vec<Event> {
        vec![
            Event::new(
                0,
                0,
                EventKind::Header(Header {
                    format: 1,
                    tracks: 2,
                    division: TimeDivision::Metrical(480),
                }),
            ),
            Event::new(0, 1, EventKind::TrackStart),
            Event::new(0, 1, EventKind::Title("Conductor".into())),
            Event::tempo(0, 1, 500_000),
            Event::new(0, 1, EventKind::TimeSignature(TimeSignature::default())),
            Event::new(0, 2, EventKind::TrackStart),
            Event::program(0, 2, 0, 52),
            Event::control(0, 2, 0, 10, 20),
            Event::note_on(0, 2, 0, 60, 100),
            Event::new(
                240,
                2,
                EventKind::Other(RawRecord::new(
                    "Pitch_bend_c",
                    vec!["0".into(), "9000".into()],
                )),
            ),
            Event::new(
                240,
                2,
                EventKind::Other(RawRecord::new("Marker_t", vec!["\"verse\"".into()])),
            ),
            Event::note_off(480, 2, 0, 60),
            Event::new(480, 1, EventKind::TrackEnd),
            Event::new(960, 2, EventKind::TrackEnd),
            Event::new(960, 0, EventKind::EndOfFile),
        ]
    }

    fn by_track(mut events: Vec<Event>) -> Vec<Event> {
        events.sort_by_key(|ev| (matches!(ev.kind, EventKind::EndOfFile), ev.track));
        events
    }

    #[test]
    fn written_file_reads_back_identically() {
        let bytes = write(&song()).unwrap();
        let back = read(&bytes).unwrap();
        assert_eq!(by_track(back), by_track(song()));
    }

    #[test]
    fn output_is_valid_for_midly() {
        let bytes = write(&song()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(midly::num::u15::new(480)));
        assert_eq!(smf.tracks.len(), 2);

        let note_ons = smf.tracks[1]
            .iter()
            .filter(|ev| {
                matches!(
                    ev.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(note_ons, 1);
    }

    #[test]
    fn missing_end_of_track_is_synthesized() {
        // header + one track holding a single note-on and no end marker
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 1, 0x01, 0xE0]);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&[0x60, 0x90, 60, 100]);

        let events = read(&bytes).unwrap();
        let end = events
            .iter()
            .find(|ev| matches!(ev.kind, EventKind::TrackEnd))
            .unwrap();
        assert_eq!((end.time, end.track), (96, 1));
    }

    #[test]
    fn unknown_records_cannot_be_encoded() {
        let events = vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::new(0, 1, EventKind::Other(RawRecord::new("Mystery", vec![]))),
            Event::new(0, 1, EventKind::TrackEnd),
        ];
        assert!(matches!(
            write(&events),
            Err(CodecError::Encode { .. })
        ));
    }

    #[test]
    fn timecode_division_round_trips() {
        let mut events = song();
        events[0] = Event::new(
            0,
            0,
            EventKind::Header(Header {
                format: 1,
                tracks: 2,
                division: TimeDivision::Timecode {
                    fps: 25,
                    ticks_per_frame: 40,
                },
            }),
        );
        let back = read(&write(&events).unwrap()).unwrap();
        assert_eq!(back[0], events[0]);
    }

    #[test]
    fn oversized_gap_is_an_error() {
        let events = vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::note_on(0, 1, 0, 60, 90),
            Event::note_off(0x1000_0000, 1, 0, 60),
            Event::new(0x1000_0000, 1, EventKind::TrackEnd),
        ];
        let err = write(&events).unwrap_err();
        assert!(
            matches!(&err, CodecError::Encode { record, .. } if record == "delta time"),
            "{err}"
        );
    }

    #[test]
    fn meta_and_sysex_records_round_trip() {
        let raw = |name: &str, fields: &[&str]| {
            EventKind::Other(RawRecord::new(
                name,
                fields.iter().map(|f| f.to_string()).collect(),
            ))
        };
        let events = vec![
            Event::new(0, 1, EventKind::TrackStart),
            Event::new(0, 1, raw("Key_signature", &["-2", "\"minor\""])),
            Event::new(0, 1, raw("SMPTE_offset", &["33", "2", "3", "4", "5"])),
            Event::new(0, 1, raw("Unknown_meta_event", &["9", "2", "65", "66"])),
            Event::new(0, 1, raw("Sequencer_specific", &["3", "0", "0", "65"])),
            Event::new(0, 1, raw("System_exclusive", &["3", "65", "16", "247"])),
            Event::new(10, 1, raw("Channel_aftertouch_c", &["2", "50"])),
            Event::new(20, 1, EventKind::TrackEnd),
        ];

        let back = read(&write(&events).unwrap()).unwrap();
        let body: Vec<Event> = back
            .into_iter()
            .filter(|ev| ev.track == 1)
            .collect();
        assert_eq!(body, events);
    }

    #[test]
    fn unsupported_frame_rate_is_an_error() {
        let mut events = song();
        events[0] = Event::new(
            0,
            0,
            EventKind::Header(Header {
                format: 1,
                tracks: 2,
                division: TimeDivision::Timecode {
                    fps: 12,
                    ticks_per_frame: 40,
                },
            }),
        );
        assert!(matches!(write(&events), Err(CodecError::Encode { .. })));
    }
}
