//! midicsv text: one record per line, `track, time, Record_name, fields...`.
//!
//! Records the engine understands become typed [`EventKind`]s. Everything
//! else is carried as [`EventKind::Other`] with its fields untouched, so a
//! parse/write cycle reproduces the line.

use crate::{CodecError, Result};
use harmony::{Event, EventKind, Header, RawRecord, TimeDivision, TimeSignature, TrackId};
use std::str::FromStr;

/// Parse raw file bytes. UTF-8 first, Latin-1 when that fails.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<Event>> {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse(text),
        Err(_) => {
            let text: String = bytes.iter().map(|&b| b as char).collect();
            parse(&text)
        }
    }
}

pub fn parse(text: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line).map_err(|message| CodecError::Csv {
            line: line_no,
            message,
        })?;
        let event = parse_record(&fields).map_err(|message| CodecError::Csv {
            line: line_no,
            message,
        })?;
        events.push(event);
    }
    tracing::debug!(events = events.len(), "parsed midicsv");
    Ok(events)
}

/// Split on commas outside quoted strings, trimming the padding.
fn split_fields(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in line.chars() {
        if in_quotes {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_quotes = false;
            }
            continue;
        }
        match ch {
            ',' => fields.push(std::mem::take(&mut current).trim().to_string()),
            '"' => {
                in_quotes = true;
                current.push(ch);
            }
            _ => current.push(ch),
        }
    }
    if in_quotes {
        return Err("unterminated string".into());
    }
    fields.push(current.trim().to_string());
    Ok(fields)
}

fn number<T: FromStr>(fields: &[String], idx: usize, what: &str) -> std::result::Result<T, String> {
    let raw = fields
        .get(idx)
        .ok_or_else(|| format!("missing {what}"))?;
    raw.parse()
        .map_err(|_| format!("{what} {raw:?} is not a valid number"))
}

fn midi_byte(fields: &[String], idx: usize, what: &str) -> std::result::Result<u8, String> {
    let value: u8 = number(fields, idx, what)?;
    if value > 127 {
        return Err(format!("{what} {value} is out of range 0-127"));
    }
    Ok(value)
}

fn channel(fields: &[String], idx: usize) -> std::result::Result<u8, String> {
    let value: u8 = number(fields, idx, "channel")?;
    if value > 15 {
        return Err(format!("channel {value} is out of range 0-15"));
    }
    Ok(value)
}

fn parse_record(fields: &[String]) -> std::result::Result<Event, String> {
    let track: TrackId = number(fields, 0, "track")?;
    let time: u64 = number(fields, 1, "time")?;
    let name = fields.get(2).ok_or("missing record type")?.as_str();
    let args = &fields[3.min(fields.len())..];

    let kind = match name {
        "Header" => EventKind::Header(Header {
            format: number(args, 0, "format")?,
            tracks: number(args, 1, "track count")?,
            division: TimeDivision::from_raw(number(args, 2, "division")?),
        }),
        "Start_track" => EventKind::TrackStart,
        "End_track" => EventKind::TrackEnd,
        "End_of_file" => EventKind::EndOfFile,
        "Note_on_c" => EventKind::NoteOn {
            channel: channel(args, 0)?,
            pitch: midi_byte(args, 1, "note")?,
            velocity: midi_byte(args, 2, "velocity")?,
        },
        "Note_off_c" => EventKind::NoteOff {
            channel: channel(args, 0)?,
            pitch: midi_byte(args, 1, "note")?,
            velocity: midi_byte(args, 2, "velocity")?,
        },
        "Control_c" => EventKind::ControlChange {
            channel: channel(args, 0)?,
            controller: midi_byte(args, 1, "controller")?,
            value: midi_byte(args, 2, "value")?,
        },
        "Program_c" => EventKind::ProgramChange {
            channel: channel(args, 0)?,
            program: midi_byte(args, 1, "program")?,
        },
        "Tempo" => EventKind::Tempo {
            usec_per_quarter: number(args, 0, "tempo")?,
        },
        "Time_signature" => EventKind::TimeSignature(TimeSignature {
            numerator: number(args, 0, "numerator")?,
            denominator_pow: number(args, 1, "denominator")?,
            clocks_per_click: number(args, 2, "click")?,
            thirty_seconds_per_quarter: number(args, 3, "32nds per quarter")?,
        }),
        "Title_t" => {
            let raw = args.first().ok_or("missing title")?;
            EventKind::Title(unquote(raw)?)
        }
        other => EventKind::Other(RawRecord::new(other, args.to_vec())),
    };
    Ok(Event::new(time, track, kind))
}

/// Write events in midicsv layout: header, each track in turn, end of file.
pub fn write(events: &[Event]) -> String {
    let mut out = String::new();
    let mut tracks: Vec<TrackId> = events
        .iter()
        .filter(|ev| ev.track != 0)
        .map(|ev| ev.track)
        .collect();
    tracks.sort_unstable();
    tracks.dedup();

    for ev in events.iter().filter(|ev| ev.track == 0) {
        if !matches!(ev.kind, EventKind::EndOfFile) {
            write_line(&mut out, ev);
        }
    }
    for track in tracks {
        for ev in events.iter().filter(|ev| ev.track == track) {
            write_line(&mut out, ev);
        }
    }
    for ev in events.iter().filter(|ev| matches!(ev.kind, EventKind::EndOfFile)) {
        // midicsv always stamps the end of file at tick 0
        write_line(&mut out, &Event::new(0, ev.track, EventKind::EndOfFile));
    }
    out
}

fn write_line(out: &mut String, ev: &Event) {
    let (name, fields) = record_fields(&ev.kind);
    out.push_str(&format!("{}, {}, {}", ev.track, ev.time, name));
    for field in fields {
        out.push_str(", ");
        out.push_str(&field);
    }
    out.push('\n');
}

fn record_fields(kind: &EventKind) -> (&str, Vec<String>) {
    match kind {
        EventKind::Header(h) => (
            "Header",
            vec![
                h.format.to_string(),
                h.tracks.to_string(),
                h.division.to_raw().to_string(),
            ],
        ),
        EventKind::TrackStart => ("Start_track", vec![]),
        EventKind::TrackEnd => ("End_track", vec![]),
        EventKind::EndOfFile => ("End_of_file", vec![]),
        EventKind::NoteOn {
            channel,
            pitch,
            velocity,
        } => (
            "Note_on_c",
            vec![channel.to_string(), pitch.to_string(), velocity.to_string()],
        ),
        EventKind::NoteOff {
            channel,
            pitch,
            velocity,
        } => (
            "Note_off_c",
            vec![channel.to_string(), pitch.to_string(), velocity.to_string()],
        ),
        EventKind::ControlChange {
            channel,
            controller,
            value,
        } => (
            "Control_c",
            vec![
                channel.to_string(),
                controller.to_string(),
                value.to_string(),
            ],
        ),
        EventKind::ProgramChange { channel, program } => {
            ("Program_c", vec![channel.to_string(), program.to_string()])
        }
        EventKind::Tempo { usec_per_quarter } => ("Tempo", vec![usec_per_quarter.to_string()]),
        EventKind::TimeSignature(sig) => (
            "Time_signature",
            vec![
                sig.numerator.to_string(),
                sig.denominator_pow.to_string(),
                sig.clocks_per_click.to_string(),
                sig.thirty_seconds_per_quarter.to_string(),
            ],
        ),
        EventKind::Title(text) => ("Title_t", vec![quote(text)]),
        EventKind::Other(raw) => (raw.name.as_str(), raw.fields.clone()),
    }
}

/// midicsv string literal: backslash escapes, octal for control bytes.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 || c as u32 == 0x7F => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inverse of [`quote`].
pub fn unquote(field: &str) -> std::result::Result<String, String> {
    let inner = field
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| format!("expected a quoted string, got {field}"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some(d) if d.is_digit(8) => {
                let mut code = 0u32;
                for _ in 0..3 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(v) => {
                            code = code * 8 + v;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).unwrap_or('?'));
            }
            Some(next) => {
                out.push(next);
                chars.next();
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}
