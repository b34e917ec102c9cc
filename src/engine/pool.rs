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

//! Voice management for polyphonic sample playback.
//!
//! Handles voice allocation, stealing, and note-off behavior.

use tracing::debug;

use super::controls::BlockSettings;
use super::events::NoteEvent;
use super::voice::Voice;
use crate::zones::{ZoneLibrary, ZoneSelector};

/// A fixed set of voices owned by the render thread.
pub struct VoicePool {
    /// All voices, active or not. Never resized after creation.
    voices: Vec<Voice>,
    /// Picks zones for incoming notes.
    selector: ZoneSelector,
    /// Age handed to the next started voice.
    next_age: u64,
}

impl VoicePool {
    /// Creates a pool with the given number of voices (at least one).
    pub fn new(max_voices: usize) -> VoicePool {
        let max_voices = max_voices.max(1);
        VoicePool {
            voices: (0..max_voices).map(|_| Voice::default()).collect(),
            selector: ZoneSelector::default(),
            next_age: 0,
        }
    }

    /// Starts a voice for the note. Returns false if the library has no zone to play.
    pub fn note_on(
        &mut self,
        library: &ZoneLibrary,
        channel: u8,
        note: u8,
        velocity: u8,
        settings: &BlockSettings,
    ) -> bool {
        let Some(zone) = self.selector.pick_zone(library, note, velocity) else {
            return false;
        };

        let index = match self.voices.iter().position(|v| !v.is_active()) {
            Some(index) => index,
            None => {
                let index = self.oldest_voice();
                debug!(
                    max_voices = self.voices.len(),
                    stolen_note = self.voices[index].note(),
                    "Voice limit reached, stealing oldest"
                );
                index
            }
        };

        let age = self.next_age;
        self.next_age = self.next_age.wrapping_add(1);
        self.voices[index].start(zone, channel, note, velocity, age, settings);
        true
    }

    /// Handles a Note Off event for the specified channel and note.
    pub fn note_off(
        &mut self,
        channel: u8,
        note: u8,
        allow_tail_off: bool,
        settings: &BlockSettings,
    ) {
        for voice in self.voices.iter_mut().filter(|v| v.matches(channel, note)) {
            voice.release(allow_tail_off, settings);
        }
    }

    /// Stops every voice immediately.
    pub fn stop_all(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.stop();
        }
    }

    /// Dispatches a note event.
    pub fn handle_event(
        &mut self,
        library: &ZoneLibrary,
        event: &NoteEvent,
        settings: &BlockSettings,
    ) {
        match *event {
            NoteEvent::NoteOn {
                channel,
                note,
                velocity: 0,
            } => self.note_off(channel, note, true, settings),
            NoteEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                self.note_on(library, channel, note, velocity, settings);
            }
            NoteEvent::NoteOff { channel, note } => self.note_off(channel, note, true, settings),
            NoteEvent::AllNotesOff { .. } | NoteEvent::AllSoundOff { .. } => self.stop_all(),
        }
    }

    /// Adds every active voice into `output` for `len` frames starting at `start`.
    pub fn render(
        &mut self,
        output: &mut [Vec<f32>],
        start: usize,
        len: usize,
        settings: &BlockSettings,
    ) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.render(output, start, len, settings);
        }
    }

    /// The number of voices currently playing.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// The total number of voices.
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// All voices, active or not.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    fn oldest_voice(&self) -> usize {
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, voice)| voice.age())
            .map(|(index, _)| index)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("capacity", &self.voices.len())
            .field("active", &self.active_voices())
            .finish()
    }
}
