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

//! Note events exchanged with the engine, and their MIDI encoding.

use std::fs;
use std::path::Path;

use midly::live::LiveEvent;
use midly::num::{u4, u7};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

/// Controller number for "all sound off".
const CC_ALL_SOUND_OFF: u8 = 120;
/// Controller number for "all notes off".
const CC_ALL_NOTES_OFF: u8 = 123;

/// Tempo of a MIDI file until its first tempo event: 120 BPM.
const DEFAULT_TEMPO_US: u32 = 500_000;

/// Error types for reading standard MIDI files.
#[derive(Debug, thiserror::Error)]
pub enum MidiFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI file error: {0}")]
    Parse(#[from] midly::Error),
}

/// A note event. Channels are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    AllNotesOff { channel: u8 },
    AllSoundOff { channel: u8 },
}

impl NoteEvent {
    /// Parses a raw MIDI message. Messages that are not note related yield None.
    /// A note on with velocity 0 is a note off.
    pub fn from_midi(raw_event: &[u8]) -> Option<NoteEvent> {
        let event = match LiveEvent::parse(raw_event) {
            Ok(e) => e,
            Err(e) => {
                debug!(error = ?e, "Failed to parse MIDI event");
                return None;
            }
        };

        let LiveEvent::Midi { channel, message } = event else {
            return None;
        };
        let channel = u8::from(channel) + 1;
        match message {
            MidiMessage::NoteOn { key, vel } if u8::from(vel) == 0 => Some(NoteEvent::NoteOff {
                channel,
                note: key.into(),
            }),
            MidiMessage::NoteOn { key, vel } => Some(NoteEvent::NoteOn {
                channel,
                note: key.into(),
                velocity: vel.into(),
            }),
            MidiMessage::NoteOff { key, .. } => Some(NoteEvent::NoteOff {
                channel,
                note: key.into(),
            }),
            MidiMessage::Controller { controller, .. } => match u8::from(controller) {
                CC_ALL_SOUND_OFF => Some(NoteEvent::AllSoundOff { channel }),
                CC_ALL_NOTES_OFF => Some(NoteEvent::AllNotesOff { channel }),
                _ => None,
            },
            _ => None,
        }
    }

    /// Converts the event into a MIDI live event.
    pub fn to_live_event(&self) -> LiveEvent<'static> {
        match *self {
            NoteEvent::NoteOn {
                channel,
                note,
                velocity,
            } => LiveEvent::Midi {
                channel: midi_channel(channel),
                message: MidiMessage::NoteOn {
                    key: u7::from(note.min(127)),
                    vel: u7::from(velocity.min(127)),
                },
            },
            NoteEvent::NoteOff { channel, note } => LiveEvent::Midi {
                channel: midi_channel(channel),
                message: MidiMessage::NoteOff {
                    key: u7::from(note.min(127)),
                    vel: u7::from(0),
                },
            },
            NoteEvent::AllNotesOff { channel } => controller(channel, CC_ALL_NOTES_OFF),
            NoteEvent::AllSoundOff { channel } => controller(channel, CC_ALL_SOUND_OFF),
        }
    }

    /// Encodes the event as raw MIDI bytes.
    pub fn to_midi_bytes(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(3);
        // Writing into a Vec cannot fail.
        let _ = self.to_live_event().write(&mut buf);
        buf
    }

    /// The channel the event is addressed to.
    pub fn channel(&self) -> u8 {
        match *self {
            NoteEvent::NoteOn { channel, .. }
            | NoteEvent::NoteOff { channel, .. }
            | NoteEvent::AllNotesOff { channel }
            | NoteEvent::AllSoundOff { channel } => channel,
        }
    }
}

fn midi_channel(channel: u8) -> u4 {
    u4::from(channel.clamp(1, 16) - 1)
}

fn controller(channel: u8, number: u8) -> LiveEvent<'static> {
    LiveEvent::Midi {
        channel: midi_channel(channel),
        message: MidiMessage::Controller {
            controller: u7::from(number),
            value: u7::from(0),
        },
    }
}

/// A note event at a sample offset within a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedEvent {
    pub offset: usize,
    pub event: NoteEvent,
}

impl TimedEvent {
    pub fn new(offset: usize, event: NoteEvent) -> TimedEvent {
        TimedEvent { offset, event }
    }
}

/// Merges two offset-ordered event lists into `out`, keeping `first` ahead of `second` when
/// offsets tie. `out` is cleared first.
pub fn merge_events(first: &[TimedEvent], second: &[TimedEvent], out: &mut Vec<TimedEvent>) {
    out.clear();
    let (mut a, mut b) = (0, 0);
    while a < first.len() && b < second.len() {
        if second[b].offset < first[a].offset {
            out.push(second[b]);
            b += 1;
        } else {
            out.push(first[a]);
            a += 1;
        }
    }
    out.extend_from_slice(&first[a..]);
    out.extend_from_slice(&second[b..]);
}

/// Reads the note events of a standard MIDI file. Offsets are absolute frame positions at the
/// given sample rate.
pub fn read_midi_file(path: &Path, sample_rate: f64) -> Result<Vec<TimedEvent>, MidiFileError> {
    let data = fs::read(path)?;
    let events = parse_midi_file(&data, sample_rate)?;
    debug!(path = ?path, events = events.len(), "Read MIDI file");
    Ok(events)
}

/// Parses the note events of a standard MIDI file. Tracks of a parallel file play together,
/// tracks of a sequential file play one after another. Tempo changes apply to every track.
pub fn parse_midi_file(data: &[u8], sample_rate: f64) -> Result<Vec<TimedEvent>, MidiFileError> {
    let smf = Smf::parse(data)?;

    let mut ticked: Vec<(u64, TrackEventKind)> = Vec::new();
    let mut track_start = 0u64;
    for track in smf.tracks.iter() {
        let mut tick = match smf.header.format {
            Format::Sequential => track_start,
            _ => 0,
        };
        for event in track.iter() {
            tick += event.delta.as_int() as u64;
            ticked.push((tick, event.kind));
        }
        track_start = tick;
    }
    ticked.sort_by_key(|(tick, _)| *tick);

    let mut events = Vec::new();
    let mut buf: Vec<u8> = Vec::with_capacity(3);
    let mut tempo = DEFAULT_TEMPO_US;
    let mut last_tick = 0u64;
    let mut seconds = 0.0f64;
    for (tick, kind) in ticked {
        seconds += (tick - last_tick) as f64 * seconds_per_tick(smf.header.timing, tempo);
        last_tick = tick;

        if let TrackEventKind::Meta(MetaMessage::Tempo(t)) = kind {
            tempo = t.as_int();
            continue;
        }
        let Some(live) = kind.as_live_event() else {
            continue;
        };
        buf.clear();
        if live.write(&mut buf).is_err() {
            continue;
        }
        if let Some(event) = NoteEvent::from_midi(&buf) {
            let offset = (seconds * sample_rate).round() as usize;
            events.push(TimedEvent::new(offset, event));
        }
    }
    Ok(events)
}

fn seconds_per_tick(timing: Timing, tempo_us: u32) -> f64 {
    match timing {
        Timing::Metrical(ticks_per_beat) => {
            tempo_us as f64 / 1_000_000.0 / ticks_per_beat.as_int().max(1) as f64
        }
        Timing::Timecode(fps, subframes) => 1.0 / (fps.as_f32() as f64 * subframes.max(1) as f64),
    }
}

#[cfg(test)]
mod tests {
    use midly::num::{u15, u24, u28};
    use midly::{Header, TrackEvent};

    use super::*;

    fn track_event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        track_event(
            delta,
            TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        )
    }

    fn tempo(delta: u32, us_per_beat: u32) -> TrackEvent<'static> {
        track_event(delta, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_beat))))
    }

    fn end_of_track() -> TrackEvent<'static> {
        track_event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack))
    }

    fn encode(format: Format, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let smf = Smf {
            header: Header::new(format, Timing::Metrical(u15::new(480))),
            tracks,
        };
        let mut buf = Vec::new();
        smf.write(&mut buf).unwrap();
        buf
    }

    fn offsets(events: &[TimedEvent]) -> Vec<(usize, NoteEvent)> {
        events.iter().map(|e| (e.offset, e.event)).collect()
    }

    #[test]
    fn test_parse_note_events() {
        assert_eq!(
            Some(NoteEvent::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100
            }),
            NoteEvent::from_midi(&[0x90, 60, 100])
        );
        assert_eq!(
            Some(NoteEvent::NoteOff {
                channel: 2,
                note: 61
            }),
            NoteEvent::from_midi(&[0x81, 61, 40])
        );
        // Velocity 0 note on is a note off.
        assert_eq!(
            Some(NoteEvent::NoteOff {
                channel: 16,
                note: 62
            }),
            NoteEvent::from_midi(&[0x9F, 62, 0])
        );
        assert_eq!(
            Some(NoteEvent::AllNotesOff { channel: 1 }),
            NoteEvent::from_midi(&[0xB0, 123, 0])
        );
        assert_eq!(
            Some(NoteEvent::AllSoundOff { channel: 3 }),
            NoteEvent::from_midi(&[0xB2, 120, 0])
        );
        assert_eq!(None, NoteEvent::from_midi(&[0xB0, 7, 100]));
        assert_eq!(None, NoteEvent::from_midi(&[0xC0, 5]));
        assert_eq!(None, NoteEvent::from_midi(&[]));
    }

    #[test]
    fn test_encode_note_events() {
        let on = NoteEvent::NoteOn {
            channel: 1,
            note: 48,
            velocity: 64,
        };
        assert_eq!(vec![0x90, 48, 64], on.to_midi_bytes());
        assert_eq!(Some(on), NoteEvent::from_midi(&on.to_midi_bytes()));

        let off = NoteEvent::NoteOff {
            channel: 10,
            note: 48,
        };
        assert_eq!(vec![0x89, 48, 0], off.to_midi_bytes());
        assert_eq!(
            vec![0xB0, 123, 0],
            NoteEvent::AllNotesOff { channel: 1 }.to_midi_bytes()
        );
    }

    #[test]
    fn test_merge_events() {
        let note = |offset, note| {
            TimedEvent::new(
                offset,
                NoteEvent::NoteOff {
                    channel: 1,
                    note,
                },
            )
        };
        let first = [note(0, 1), note(5, 2), note(9, 3)];
        let second = [note(0, 10), note(4, 11), note(12, 12)];
        let mut out = Vec::new();
        merge_events(&first, &second, &mut out);

        let notes: Vec<u8> = out
            .iter()
            .map(|e| match e.event {
                NoteEvent::NoteOff { note, .. } => note,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(vec![1, 10, 11, 2, 3, 12], notes);
    }

    #[test]
    fn test_parse_midi_file_tempo_changes() {
        let data = encode(
            Format::SingleTrack,
            vec![vec![
                note_on(0, 60, 100),
                // A zero velocity note on ends the note one beat later at 120 BPM.
                note_on(480, 60, 0),
                tempo(0, 1_000_000),
                note_on(480, 62, 90),
                end_of_track(),
            ]],
        );

        let events = parse_midi_file(&data, 1000.0).unwrap();
        assert_eq!(
            vec![
                (
                    0,
                    NoteEvent::NoteOn {
                        channel: 1,
                        note: 60,
                        velocity: 100
                    }
                ),
                (
                    500,
                    NoteEvent::NoteOff {
                        channel: 1,
                        note: 60
                    }
                ),
                (
                    1500,
                    NoteEvent::NoteOn {
                        channel: 1,
                        note: 62,
                        velocity: 90
                    }
                ),
            ],
            offsets(&events)
        );
    }

    #[test]
    fn test_parse_midi_file_tempo_track() {
        let data = encode(
            Format::Parallel,
            vec![
                vec![tempo(0, 1_000_000), end_of_track()],
                vec![note_on(0, 48, 64), note_on(480, 48, 0), end_of_track()],
            ],
        );

        let events = parse_midi_file(&data, 48000.0).unwrap();
        assert_eq!(2, events.len());
        assert_eq!(0, events[0].offset);
        assert_eq!(48000, events[1].offset);
    }

    #[test]
    fn test_parse_midi_file_errors() {
        assert!(matches!(
            parse_midi_file(b"not midi", 48000.0),
            Err(MidiFileError::Parse(_))
        ));
        assert!(matches!(
            read_midi_file(Path::new("/does/not/exist.mid"), 48000.0),
            Err(MidiFileError::Io(_))
        ));
    }
}
