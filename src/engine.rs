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

//! Polyphonic sample playback.
//!
//! The engine is driven one block at a time. Each block reads one library snapshot and one
//! control snapshot, so nothing it shares with other threads can change mid-block.

pub mod controls;
pub mod events;
pub mod pool;
pub mod processor;
pub mod voice;

#[cfg(test)]
mod tests;

pub use controls::{BlockSettings, ControlId, ControlSnapshot, Controls, LoopSettings};
pub use events::{merge_events, read_midi_file, MidiFileError, NoteEvent, TimedEvent};
pub use pool::VoicePool;
pub use processor::Engine;
pub use voice::Voice;
