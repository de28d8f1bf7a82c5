//! Boundary codecs for the harmony engine.
//!
//! Both directions speak [`harmony::Event`]: `csv` handles the midicsv text
//! layout (`track, time, Record_name, fields...`), `smf` handles Standard MIDI
//! File bytes.

pub mod csv;
pub mod smf;

use harmony::Event;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("cannot encode {record}: {message}")]
    Encode { record: String, message: String },

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// On-disk representation of an event sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Smf,
}

impl FileFormat {
    /// Pick the format from a file extension (`.csv`, `.mid`, `.midi`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self::from_name(&ext)
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "csv" => Ok(FileFormat::Csv),
            "mid" | "midi" | "smf" => Ok(FileFormat::Smf),
            other => Err(CodecError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Smf => "mid",
        }
    }
}

/// Decode file contents into the flat event list the engine loads.
pub fn decode(bytes: &[u8], format: FileFormat) -> Result<Vec<Event>> {
    match format {
        FileFormat::Csv => csv::parse_bytes(bytes),
        FileFormat::Smf => smf::read(bytes),
    }
}

/// Encode a serialized store.
pub fn encode(events: &[Event], format: FileFormat) -> Result<Vec<u8>> {
    match format {
        FileFormat::Csv => Ok(csv::write(events).into_bytes()),
        FileFormat::Smf => smf::write(events),
    }
}
