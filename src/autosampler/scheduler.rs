// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Builds the note timeline of an auto-sampling run.
//!
//! Every take gets its own slot of `preroll + sustain + tail` samples. The note on is placed at
//! the start of the slot and the note off `sustain` samples later; pre-roll is recovered from
//! input history at capture time rather than by delaying the note.

use super::settings::{AutoSamplerSettings, MAX_VELOCITY_LAYERS};
use super::{AutoSamplerError, OUTPUT_CHANNEL};
use crate::engine::NoteEvent;
use crate::util::ms_to_samples;

/// Shortest take, in frames.
pub const MIN_TAKE_SAMPLES: usize = 4;

/// Frames of input history kept beyond the pre-roll.
const HISTORY_MARGIN: usize = 4;

/// Returns the velocity range covered by a layer, both ends in [1, 127].
pub fn velocity_bounds_for_layer(layer: u32, layers: u32) -> (u8, u8) {
    let layers = layers.clamp(1, MAX_VELOCITY_LAYERS);
    let layer = layer.clamp(1, layers);

    let low = ((layer - 1) * 128 / layers + 1).clamp(1, 127);
    let high = (layer * 128 / layers).clamp(low, 127);
    (low as u8, high as u8)
}

/// Returns the velocity played for a layer: the middle of its range, rounded down.
pub fn velocity_for_layer(layer: u32, layers: u32) -> u8 {
    let (low, high) = velocity_bounds_for_layer(layer, layers);
    low + (high - low) / 2
}

/// Returns the layer a velocity falls into.
pub fn velocity_to_layer(velocity: u8, layers: u32) -> u32 {
    let layers = layers.clamp(1, MAX_VELOCITY_LAYERS);
    let v0 = velocity.clamp(1, 128) as u32 - 1;
    1 + (v0 * layers) / 128
}

/// One note on or note off of the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScheduledEvent {
    /// Position on the run's timeline, in frames from its start.
    pub sample_position: u64,
    pub note: u8,
    pub velocity: u8,
    pub velocity_layer: u32,
    pub velocity_low: u8,
    pub velocity_high: u8,
    pub round_robin: u32,
    pub note_on: bool,
}

impl ScheduledEvent {
    /// The note event sent for this entry of the timeline.
    pub fn note_event(&self) -> NoteEvent {
        if self.note_on {
            NoteEvent::NoteOn {
                channel: OUTPUT_CHANNEL,
                note: self.note,
                velocity: self.velocity,
            }
        } else {
            NoteEvent::NoteOff {
                channel: OUTPUT_CHANNEL,
                note: self.note,
            }
        }
    }
}

/// A fully resolved run: clamped settings, frame counts and the timeline.
#[derive(Clone, Debug)]
pub struct CapturePlan {
    pub settings: AutoSamplerSettings,
    pub sample_rate: f64,
    /// Notes to capture, in timeline order.
    pub notes: Vec<u8>,
    /// Whether each MIDI note is part of the run.
    pub note_mask: [bool; 128],
    pub preroll_samples: usize,
    pub sustain_samples: usize,
    pub tail_samples: usize,
    /// Length of every take: `preroll + sustain + tail`, at least [`MIN_TAKE_SAMPLES`].
    pub take_samples: usize,
    /// Size of the input history ring.
    pub history_samples: usize,
    pub expected_takes: usize,
    pub events: Vec<ScheduledEvent>,
}

impl CapturePlan {
    /// Resolves settings into a plan at the given sample rate.
    pub fn new(
        settings: &AutoSamplerSettings,
        sample_rate: f64,
    ) -> Result<CapturePlan, AutoSamplerError> {
        let settings = settings.clamped();
        let (notes, note_mask) = scheduled_notes(&settings);
        if notes.is_empty() {
            return Err(AutoSamplerError::NoNotes);
        }

        let preroll_samples = ms_to_samples(sample_rate, settings.preroll_ms);
        let sustain_samples = ms_to_samples(sample_rate, settings.sustain_ms);
        let tail_samples = ms_to_samples(sample_rate, settings.release_tail_ms);
        let take_samples = (preroll_samples + sustain_samples + tail_samples).max(MIN_TAKE_SAMPLES);

        let layers = settings.velocity_layers as u32;
        let round_robins = settings.round_robins as u32;
        let expected_takes = notes.len() * layers as usize * round_robins as usize;

        let mut events = Vec::with_capacity(expected_takes * 2);
        let mut offset = 0u64;
        for &note in &notes {
            for layer in 1..=layers {
                let velocity = velocity_for_layer(layer, layers);
                let (velocity_low, velocity_high) = velocity_bounds_for_layer(layer, layers);
                for round_robin in 1..=round_robins {
                    let note_on = ScheduledEvent {
                        sample_position: offset,
                        note,
                        velocity,
                        velocity_layer: layer,
                        velocity_low,
                        velocity_high,
                        round_robin,
                        note_on: true,
                    };
                    events.push(note_on);
                    events.push(ScheduledEvent {
                        sample_position: offset + sustain_samples as u64,
                        note_on: false,
                        ..note_on
                    });
                    offset += take_samples as u64;
                }
            }
        }

        Ok(CapturePlan {
            settings,
            sample_rate,
            notes,
            note_mask,
            preroll_samples,
            sustain_samples,
            tail_samples,
            take_samples,
            history_samples: (preroll_samples + HISTORY_MARGIN).max(1),
            expected_takes,
            events,
        })
    }

    /// Whether note ons for this note should be captured.
    pub fn captures_note(&self, note: u8) -> bool {
        self.note_mask[note.min(127) as usize]
    }

    /// Total length of the timeline in frames.
    pub fn total_samples(&self) -> u64 {
        self.expected_takes as u64 * self.take_samples as u64
    }
}

/// Builds the timeline for the settings at the given sample rate.
pub fn build_timeline(
    settings: &AutoSamplerSettings,
    sample_rate: f64,
) -> Result<Vec<ScheduledEvent>, AutoSamplerError> {
    Ok(CapturePlan::new(settings, sample_rate)?.events)
}

/// Lists the notes of the range, stepping by the interval and always ending on the high note.
fn scheduled_notes(settings: &AutoSamplerSettings) -> (Vec<u8>, [bool; 128]) {
    let mut mask = [false; 128];
    let mut notes = Vec::new();
    let (low, high) = (settings.low_note(), settings.high_note());
    let step = settings.interval_semitones.clamp(1, 12) as usize;

    for note in (low..=high).step_by(step).chain(std::iter::once(high)) {
        if !mask[note as usize] {
            mask[note as usize] = true;
            notes.push(note);
        }
    }
    (notes, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(start: i32, end: i32, interval: i32) -> AutoSamplerSettings {
        AutoSamplerSettings {
            start_note: start,
            end_note: end,
            interval_semitones: interval,
            velocity_layers: 1,
            round_robins: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_velocity_layers() {
        assert_eq!((1, 127), velocity_bounds_for_layer(1, 1));
        assert_eq!(64, velocity_for_layer(1, 1));

        assert_eq!((1, 64), velocity_bounds_for_layer(1, 2));
        assert_eq!((65, 127), velocity_bounds_for_layer(2, 2));
        assert_eq!(32, velocity_for_layer(1, 2));
        assert_eq!(96, velocity_for_layer(2, 2));

        assert_eq!((1, 42), velocity_bounds_for_layer(1, 3));
        assert_eq!((43, 85), velocity_bounds_for_layer(2, 3));
        assert_eq!((86, 127), velocity_bounds_for_layer(3, 3));

        for layers in 1..=5 {
            for layer in 1..=layers {
                let velocity = velocity_for_layer(layer, layers);
                assert_eq!(layer, velocity_to_layer(velocity, layers));
                let (_, high) = velocity_bounds_for_layer(layer, layers);
                assert_eq!(layer, velocity_to_layer(high, layers));
            }
        }
    }

    #[test]
    fn test_single_note() {
        let plan = CapturePlan::new(&settings(60, 60, 1), 48000.0).unwrap();
        assert_eq!(1, plan.expected_takes);
        assert_eq!(vec![60], plan.notes);
        assert_eq!(2, plan.events.len());
        assert!(plan.events[0].note_on);
        assert!(!plan.events[1].note_on);
        assert!(plan.events.iter().all(|e| e.note == 60));
    }

    #[test]
    fn test_three_notes() {
        let plan = CapturePlan::new(&settings(48, 50, 1), 48000.0).unwrap();
        assert_eq!(3, plan.expected_takes);
        let notes: Vec<u8> = plan
            .events
            .iter()
            .filter(|e| e.note_on)
            .map(|e| e.note)
            .collect();
        assert_eq!(vec![48, 49, 50], notes);
    }

    #[test]
    fn test_end_note_always_included() {
        let plan = CapturePlan::new(&settings(60, 48, 5), 48000.0).unwrap();
        assert_eq!(vec![48, 53, 58, 60], plan.notes);
        assert!(plan.captures_note(53));
        assert!(!plan.captures_note(54));

        let plan = CapturePlan::new(&settings(36, 84, 12), 48000.0).unwrap();
        assert_eq!(vec![36, 48, 60, 72, 84], plan.notes);
    }

    #[test]
    fn test_timeline_layout() {
        let settings = AutoSamplerSettings {
            start_note: 60,
            end_note: 61,
            interval_semitones: 1,
            velocity_layers: 2,
            round_robins: 2,
            preroll_ms: 10.0,
            sustain_ms: 50.0,
            release_tail_ms: 20.0,
            ..Default::default()
        };
        let plan = CapturePlan::new(&settings, 48000.0).unwrap();
        assert_eq!(480, plan.preroll_samples);
        assert_eq!(2400, plan.sustain_samples);
        assert_eq!(960, plan.tail_samples);
        assert_eq!(3840, plan.take_samples);
        assert_eq!(484, plan.history_samples);
        assert_eq!(8, plan.expected_takes);
        assert_eq!(16, plan.events.len());
        assert_eq!(8 * 3840, plan.total_samples());

        for (take, pair) in plan.events.chunks(2).enumerate() {
            let start = take as u64 * 3840;
            assert_eq!(start, pair[0].sample_position);
            assert_eq!(start + 2400, pair[1].sample_position);
            assert_eq!(pair[0].note, pair[1].note);
            assert_eq!(pair[0].round_robin, pair[1].round_robin);
        }

        let order: Vec<(u8, u32, u32)> = plan
            .events
            .iter()
            .filter(|e| e.note_on)
            .map(|e| (e.note, e.velocity_layer, e.round_robin))
            .collect();
        assert_eq!(
            vec![
                (60, 1, 1),
                (60, 1, 2),
                (60, 2, 1),
                (60, 2, 2),
                (61, 1, 1),
                (61, 1, 2),
                (61, 2, 1),
                (61, 2, 2)
            ],
            order
        );
    }

    #[test]
    fn test_note_events() {
        let plan = CapturePlan::new(&settings(60, 60, 1), 48000.0).unwrap();
        let on = plan.events[0];
        assert_eq!(
            NoteEvent::NoteOn {
                channel: OUTPUT_CHANNEL,
                note: 60,
                velocity: on.velocity
            },
            on.note_event()
        );
        assert_eq!(
            NoteEvent::NoteOff {
                channel: OUTPUT_CHANNEL,
                note: 60
            },
            plan.events[1].note_event()
        );
    }

    #[test]
    fn test_minimum_take_length() {
        let settings = AutoSamplerSettings {
            sustain_ms: 0.01,
            release_tail_ms: 0.0,
            preroll_ms: 0.0,
            ..settings(60, 60, 1)
        };
        let plan = CapturePlan::new(&settings, 1000.0).unwrap();
        assert_eq!(MIN_TAKE_SAMPLES, plan.take_samples);
        assert_eq!(HISTORY_MARGIN, plan.history_samples);
    }

    #[test]
    fn test_deterministic() {
        let settings = AutoSamplerSettings {
            velocity_layers: 3,
            round_robins: 4,
            ..settings(30, 90, 7)
        };
        assert_eq!(
            build_timeline(&settings, 44100.0).unwrap(),
            build_timeline(&settings, 44100.0).unwrap()
        );
    }
}
