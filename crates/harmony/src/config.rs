use crate::event::TrackId;
use serde::{Deserialize, Serialize};

/// Everything the user chose for one conversion.
///
/// Built once by a front end and handed to [`crate::run`] by value; the
/// engine never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Close re-triggered and dangling notes before anything else runs.
    pub repair_notes: bool,
    pub remove_panning: bool,
    pub pan_policy: PanPolicy,
    pub highlight: Option<HighlightConfig>,
    pub divisi: DivisiConfig,
    pub metronome: MetronomeConfig,
    pub instruments: InstrumentOverrides,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            repair_notes: true,
            remove_panning: false,
            pan_policy: PanPolicy::default(),
            highlight: None,
            divisi: DivisiConfig::default(),
            metronome: MetronomeConfig::default(),
            instruments: InstrumentOverrides::default(),
        }
    }
}

/// What happens to pan controllers when panning is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanPolicy {
    /// Delete the controller events.
    #[default]
    Remove,
    /// Keep them but force the value to center.
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightConfig {
    pub track: TrackId,
    /// Emphasize everyone except `track`.
    #[serde(default)]
    pub invert: bool,
    /// Pan `track` hard right and every other track hard left.
    #[serde(default)]
    pub pan: bool,
    /// Also scale channel volume controllers on the attenuated side.
    #[serde(default)]
    pub scale_volume: bool,
    #[serde(default)]
    pub levels: HighlightLevels,
}

impl HighlightConfig {
    pub fn new(track: TrackId) -> Self {
        Self {
            track,
            invert: false,
            pan: false,
            scale_volume: false,
            levels: HighlightLevels::default(),
        }
    }
}

/// Velocity scaling applied by the highlighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightLevels {
    /// Percentage applied to the emphasized side, clamped to 127.
    pub boost_percent: u16,
    /// Percentage applied to the attenuated side.
    pub attenuate_percent: u16,
    /// Attenuated notes never drop below this velocity.
    pub velocity_floor: u8,
}

impl Default for HighlightLevels {
    fn default() -> Self {
        Self {
            boost_percent: 125,
            attenuate_percent: 35,
            velocity_floor: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisiPolicy {
    /// Leave chords alone.
    #[default]
    None,
    KeepHigher,
    KeepLower,
    /// Keep the n-th lowest note (0 is the lowest); short chords keep their top note.
    KeepNthLowest(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DivisiConfig {
    pub policy: DivisiPolicy,
    /// Tracks to collapse. Empty means every track.
    pub tracks: Vec<TrackId>,
}

impl DivisiConfig {
    pub fn is_enabled(&self) -> bool {
        self.policy != DivisiPolicy::None
    }

    pub fn applies_to(&self, track: TrackId) -> bool {
        self.tracks.is_empty() || self.tracks.contains(&track)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub enabled: bool,
    /// Percussion key; 42 is a closed hi-hat.
    pub pitch: u8,
    pub velocity: u8,
    /// Add an off-beat click halfway through every beat.
    pub subdivide: bool,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pitch: 42,
            velocity: 56,
            subdivide: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramOverride {
    pub track: TrackId,
    pub program: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentOverrides {
    pub overrides: Vec<ProgramOverride>,
    /// Program for every track that has no explicit override.
    pub all: Option<u8>,
}

impl InstrumentOverrides {
    pub fn is_enabled(&self) -> bool {
        !self.overrides.is_empty() || self.all.is_some()
    }

    /// Program requested for a track, explicit overrides first.
    pub fn program_for(&self, track: TrackId) -> Option<u8> {
        self.overrides
            .iter()
            .rev()
            .find(|o| o.track == track)
            .map(|o| o.program)
            .or(self.all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_only_repair() {
        let config = TransformConfig::default();
        assert!(config.repair_notes);
        assert!(!config.remove_panning);
        assert!(config.highlight.is_none());
        assert!(!config.divisi.is_enabled());
        assert!(!config.metronome.enabled);
        assert!(!config.instruments.is_enabled());
    }

    #[test]
    fn explicit_override_beats_all() {
        let instruments = InstrumentOverrides {
            overrides: vec![ProgramOverride {
                track: 2,
                program: 65,
            }],
            all: Some(0),
        };
        assert_eq!(instruments.program_for(2), Some(65));
        assert_eq!(instruments.program_for(3), Some(0));
    }

    #[test]
    fn empty_divisi_track_list_means_all() {
        let divisi = DivisiConfig {
            policy: DivisiPolicy::KeepLower,
            tracks: vec![],
        };
        assert!(divisi.applies_to(7));
        let only_two = DivisiConfig {
            tracks: vec![2],
            ..divisi
        };
        assert!(only_two.applies_to(2));
        assert!(!only_two.applies_to(3));
    }
}
