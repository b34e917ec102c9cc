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

use std::path::Path;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Converts a duration in milliseconds to a whole number of frames at the given rate.
/// Negative or NaN durations yield zero.
pub fn ms_to_samples(sample_rate: f64, time_ms: f32) -> usize {
    let samples = (sample_rate * 0.001 * time_ms as f64).round();
    if samples.is_finite() && samples > 0.0 {
        samples as usize
    } else {
        0
    }
}

/// Formats a MIDI note as a note name with octave, where 60 is C4.
pub fn note_name(note: u8) -> String {
    let note = note.min(127);
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(48000.0, 10.0), 480);
        assert_eq!(ms_to_samples(44100.0, 1.0), 44);
        assert_eq!(ms_to_samples(44100.0, 0.0), 0);
        assert_eq!(ms_to_samples(44100.0, -5.0), 0);
        assert_eq!(ms_to_samples(44100.0, f32::NAN), 0);
    }

    #[test]
    fn test_note_names() {
        assert_eq!("C4", note_name(60));
        assert_eq!("C-1", note_name(0));
        assert_eq!("A#2", note_name(46));
        assert_eq!("G9", note_name(127));
    }

    #[test]
    fn test_filename_display() {
        assert_eq!("kick.wav", filename_display(Path::new("/samples/kick.wav")));
        assert_eq!("unreadable file name", filename_display(Path::new("/")));
    }
}
