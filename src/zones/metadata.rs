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

//! Zone key/velocity/round-robin metadata and the file-name tag parser.

use serde::{Deserialize, Serialize};

/// Characters treated as token separators in sample file names.
const SEPARATORS: [char; 9] = ['(', ')', '[', ']', '{', '}', '.', ',', '_'];

/// Describes which notes and velocities a zone responds to.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneMetadata {
    /// The note at which the sample plays back unpitched.
    pub root_note: u8,
    /// Lowest note of the key range (inclusive).
    pub low_note: u8,
    /// Highest note of the key range (inclusive).
    pub high_note: u8,
    /// Lowest velocity of the velocity range (inclusive, 1-127).
    pub low_velocity: u8,
    /// Highest velocity of the velocity range (inclusive, 1-127).
    pub high_velocity: u8,
    /// Round-robin index, starting at 1.
    pub round_robin_index: u32,
}

impl Default for ZoneMetadata {
    fn default() -> Self {
        Self {
            root_note: 60,
            low_note: 0,
            high_note: 127,
            low_velocity: 1,
            high_velocity: 127,
            round_robin_index: 1,
        }
    }
}

impl ZoneMetadata {
    /// Builds metadata from unchecked integers, clamping and ordering every range.
    pub fn from_raw(
        root_note: i64,
        low_note: i64,
        high_note: i64,
        low_velocity: i64,
        high_velocity: i64,
        round_robin_index: i64,
    ) -> Self {
        let note = |v: i64| v.clamp(0, 127) as u8;
        let velocity = |v: i64| v.clamp(1, 127) as u8;

        let (low_note, high_note) = ordered(note(low_note), note(high_note));
        let (low_velocity, high_velocity) = ordered(velocity(low_velocity), velocity(high_velocity));

        Self {
            root_note: note(root_note),
            low_note,
            high_note,
            low_velocity,
            high_velocity,
            round_robin_index: round_robin_index.clamp(1, u32::MAX as i64) as u32,
        }
    }

    /// Returns a copy with every field clamped to its valid range and ranges ordered.
    pub fn sanitized(self) -> Self {
        Self::from_raw(
            self.root_note as i64,
            self.low_note as i64,
            self.high_note as i64,
            self.low_velocity as i64,
            self.high_velocity as i64,
            self.round_robin_index as i64,
        )
    }

    /// Returns true if the note falls inside the key range.
    pub fn contains_note(&self, note: u8) -> bool {
        (self.low_note..=self.high_note).contains(&note)
    }

    /// Returns true if the velocity falls inside the velocity range.
    pub fn contains_velocity(&self, velocity: u8) -> bool {
        (self.low_velocity..=self.high_velocity).contains(&velocity)
    }

    /// Parses metadata from a file name without its extension.
    ///
    /// Recognized tokens: `note60`/`n60`/`c4`/`f#3`/`bb2` for the root note, `rr2` for the
    /// round robin, `vel1-64`/`v65-127`/`v100` for velocity, and `lokey48`/`hikey72`/`key48-72`
    /// for the key range. Anything else is ignored.
    pub fn from_file_name(file_stem: &str) -> Self {
        let defaults = Self::default();
        let mut root = defaults.root_note as i64;
        let mut low_note = defaults.low_note as i64;
        let mut high_note = defaults.high_note as i64;
        let mut low_velocity = defaults.low_velocity as i64;
        let mut high_velocity = defaults.high_velocity as i64;
        let mut round_robin = defaults.round_robin_index as i64;

        let text = file_stem.to_lowercase().replace(SEPARATORS, " ");

        for token in text.split_whitespace() {
            if let Some(value) = token.strip_prefix("note").and_then(parse_strict_int) {
                root = value;
            } else if let Some(value) = token.strip_prefix('n').and_then(parse_strict_int) {
                root = value;
            } else if let Some(value) = token.strip_prefix("rr").and_then(parse_strict_int) {
                round_robin = value;
            } else if let Some((low, high)) = token.strip_prefix("vel").and_then(parse_int_range) {
                (low_velocity, high_velocity) = (low, high);
            } else if let Some((low, high)) = token.strip_prefix('v').and_then(parse_int_range) {
                (low_velocity, high_velocity) = (low, high);
            } else if let Some(value) = token.strip_prefix("lokey").and_then(parse_strict_int) {
                low_note = value;
            } else if let Some(value) = token.strip_prefix("hikey").and_then(parse_strict_int) {
                high_note = value;
            } else if let Some((low, high)) = token.strip_prefix("key").and_then(parse_int_range) {
                (low_note, high_note) = (low, high);
            } else if let Some(note) = parse_note_token(token) {
                root = note as i64;
            }
        }

        Self::from_raw(
            root,
            low_note,
            high_note,
            low_velocity,
            high_velocity,
            round_robin,
        )
    }
}

/// Returns a short description of the supported file name tags.
pub fn zone_naming_hint() -> &'static str {
    "Supported filename tags:\n  \
     note60 / n60 / C3  -> root note\n  \
     vel1-64 / v65-127  -> velocity layer\n  \
     rr1 / rr2          -> round robin index\n  \
     lokey48 / hikey72 / key48-72 -> key range\n\
     \nExample: Piano_C3_vel1-80_rr2.wav"
}

fn ordered<T: Ord>(a: T, b: T) -> (T, T) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

/// Parses an integer made of an optional sign followed only by digits.
fn parse_strict_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parses either a single integer or a `low-high` pair.
fn parse_int_range(text: &str) -> Option<(i64, i64)> {
    let text = text.trim();
    match text.split_once('-') {
        None => parse_strict_int(text).map(|v| (v, v)),
        Some((low, high)) => Some((parse_strict_int(low)?, parse_strict_int(high)?)),
    }
}

/// Parses a note name such as `c4`, `f#3` or `eb-1` into a MIDI note.
fn parse_note_token(token: &str) -> Option<u8> {
    let mut chars = token.chars();
    let mut semitone: i64 = match chars.next()? {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };

    let mut rest = chars.as_str();
    if let Some(stripped) = rest.strip_prefix('#') {
        semitone += 1;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('b') {
        semitone -= 1;
        rest = stripped;
    }

    let octave = parse_strict_int(rest)?;
    let note = (octave + 1) * 12 + semitone.rem_euclid(12);
    (0..=127).contains(&note).then_some(note as u8)
}
