use crate::config::{HighlightConfig, HighlightLevels};
use crate::event::{
    Event, EventKind, TrackId, PAN_CONTROLLER, PAN_HARD_LEFT, PAN_HARD_RIGHT, VOLUME_CONTROLLER,
};
use crate::passes::Pass;
use crate::store::EventStore;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Volume set on channels that had none before scaling.
const FULL_VOLUME: u8 = 127;

/// Makes one track stand out against the rest (or, inverted, fade it back).
#[derive(Debug, Clone)]
pub struct TrackHighlighter {
    pub config: HighlightConfig,
}

impl TrackHighlighter {
    pub fn new(config: HighlightConfig) -> Self {
        Self { config }
    }

    fn is_emphasized(&self, track: TrackId) -> bool {
        (track == self.config.track) != self.config.invert
    }
}

/// Scale up, never past 127.
fn boost(value: u8, levels: &HighlightLevels) -> u8 {
    let scaled = value as u32 * levels.boost_percent as u32 / 100;
    scaled.clamp(1, 127) as u8
}

/// Scale down, never below the floor (or below the original if it was already quieter).
fn attenuate(value: u8, levels: &HighlightLevels) -> u8 {
    let scaled = (value as u32 * levels.attenuate_percent as u32 / 100).min(127) as u8;
    scaled.max(levels.velocity_floor.min(value))
}

/// Where each (track, channel) starts playing, and whether a volume
/// controller was set before that.
#[derive(Debug, Default)]
struct ChannelStart {
    first_note: Option<u64>,
    volume_before_note: bool,
}

fn channel_starts(store: &EventStore) -> BTreeMap<(TrackId, u8), ChannelStart> {
    let mut starts: BTreeMap<(TrackId, u8), ChannelStart> = BTreeMap::new();
    for ev in store.events() {
        let Some(channel) = ev.channel() else { continue };
        let start = starts.entry((ev.track, channel)).or_default();
        if start.first_note.is_some() {
            continue;
        }
        match ev.kind {
            EventKind::ControlChange {
                controller: VOLUME_CONTROLLER,
                ..
            } => start.volume_before_note = true,
            _ if ev.is_note_start() => start.first_note = Some(ev.time),
            _ => {}
        }
    }
    starts
}

impl Pass for TrackHighlighter {
    fn name(&self) -> &'static str {
        "track-highlighter"
    }

    fn apply(&self, store: &mut EventStore) -> Result<()> {
        let target = self.config.track;
        if !store.has_track(target) {
            return Err(Error::InvalidTrack(target));
        }
        let levels = self.config.levels;

        // Channels that never set a volume get full volume first, so there is
        // something to scale.
        let mut volumes_added = 0usize;
        if self.config.scale_volume {
            for ((track, channel), start) in channel_starts(store) {
                let Some(time) = start.first_note else { continue };
                if start.volume_before_note {
                    continue;
                }
                store.insert_before_notes(Event::control(
                    time,
                    track,
                    channel,
                    VOLUME_CONTROLLER,
                    FULL_VOLUME,
                ))?;
                volumes_added += 1;
            }
        }

        let mut boosted = 0usize;
        let mut attenuated = 0usize;
        for (_, track, kind) in store.kinds_mut() {
            let emphasized = self.is_emphasized(track);
            match kind {
                EventKind::NoteOn { velocity, .. } if *velocity > 0 => {
                    if emphasized {
                        *velocity = boost(*velocity, &levels);
                        boosted += 1;
                    } else {
                        *velocity = attenuate(*velocity, &levels);
                        attenuated += 1;
                    }
                }
                EventKind::ControlChange {
                    controller: VOLUME_CONTROLLER,
                    value,
                    ..
                } if self.config.scale_volume && !emphasized => {
                    *value = attenuate(*value, &levels);
                }
                _ => {}
            }
        }

        if self.config.pan {
            // The pan goes right ahead of the first sounding note of each (track, channel).
            for ((track, channel), start) in channel_starts(store) {
                let Some(time) = start.first_note else { continue };
                let value = if track == target {
                    PAN_HARD_RIGHT
                } else {
                    PAN_HARD_LEFT
                };
                store.insert_before_notes(Event::control(
                    time,
                    track,
                    channel,
                    PAN_CONTROLLER,
                    value,
                ))?;
            }
        }

        tracing::debug!(
            track = target,
            invert = self.config.invert,
            boosted,
            attenuated,
            volumes_added,
            "track highlighted"
        );
        Ok(())
    }
}
