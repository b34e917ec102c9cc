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
use serde::{Deserialize, Serialize};

/// Most velocity layers a run can capture.
pub const MAX_VELOCITY_LAYERS: u32 = 5;

/// Most round robins a run can capture per note and layer.
pub const MAX_ROUND_ROBINS: u32 = 8;

/// Longest sustain, release tail, pre-roll or crossfade, in milliseconds.
const MAX_DURATION_MS: f32 = 60000.0;

/// Describes an auto-sampling run.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AutoSamplerSettings {
    /// First note of the range.
    pub start_note: i32,
    /// Last note of the range. Always captured, even when off the interval grid.
    pub end_note: i32,
    /// Semitones between captured notes.
    pub interval_semitones: i32,
    /// Number of velocity layers per note.
    pub velocity_layers: i32,
    /// Number of round robins per note and layer.
    pub round_robins: i32,
    /// How long each note is held.
    pub sustain_ms: f32,
    /// How long to keep recording after the note is released.
    pub release_tail_ms: f32,
    /// How much audio from before the note on to keep.
    pub preroll_ms: f32,
    /// Whether takes are meant to loop.
    pub loop_samples: bool,
    /// Carried through to takes for consumers that pick loop points themselves.
    pub auto_loop_mode: bool,
    /// Trim looping takes at the loop end.
    pub cut_loop_at_end: bool,
    pub loop_start_pct: f32,
    pub loop_end_pct: f32,
    pub loop_crossfade_ms: f32,
    /// Scale each take so its peak is just below full scale.
    pub normalize: bool,
}

impl Default for AutoSamplerSettings {
    fn default() -> Self {
        Self {
            start_note: 48,
            end_note: 72,
            interval_semitones: 12,
            velocity_layers: 1,
            round_robins: 1,
            sustain_ms: 2000.0,
            release_tail_ms: 1000.0,
            preroll_ms: 50.0,
            loop_samples: true,
            auto_loop_mode: false,
            cut_loop_at_end: false,
            loop_start_pct: 5.0,
            loop_end_pct: 95.0,
            loop_crossfade_ms: 15.0,
            normalize: true,
        }
    }
}

impl AutoSamplerSettings {
    /// Returns a copy with every field inside its valid range.
    pub fn clamped(&self) -> AutoSamplerSettings {
        let duration = |ms: f32, min: f32| {
            if ms.is_finite() {
                ms.clamp(min, MAX_DURATION_MS)
            } else {
                min
            }
        };
        let percent = |pct: f32| if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };

        let loop_start_pct = percent(self.loop_start_pct);
        let mut loop_end_pct = percent(self.loop_end_pct);
        if loop_end_pct <= loop_start_pct + 0.1 {
            loop_end_pct = (loop_start_pct + 0.1).min(100.0);
        }

        AutoSamplerSettings {
            start_note: self.start_note.clamp(0, 127),
            end_note: self.end_note.clamp(0, 127),
            interval_semitones: self.interval_semitones.clamp(1, 12),
            velocity_layers: self.velocity_layers.clamp(1, MAX_VELOCITY_LAYERS as i32),
            round_robins: self.round_robins.clamp(1, MAX_ROUND_ROBINS as i32),
            sustain_ms: duration(self.sustain_ms, 1.0),
            release_tail_ms: duration(self.release_tail_ms, 0.0),
            preroll_ms: duration(self.preroll_ms, 0.0),
            loop_start_pct,
            loop_end_pct,
            loop_crossfade_ms: duration(self.loop_crossfade_ms, 0.0),
            ..self.clone()
        }
    }

    /// The lowest note of the range.
    pub fn low_note(&self) -> u8 {
        self.start_note.min(self.end_note).clamp(0, 127) as u8
    }

    /// The highest note of the range.
    pub fn high_note(&self) -> u8 {
        self.start_note.max(self.end_note).clamp(0, 127) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped() {
        let settings = AutoSamplerSettings {
            start_note: -4,
            end_note: 300,
            interval_semitones: 0,
            velocity_layers: 9,
            round_robins: 0,
            sustain_ms: 0.0,
            release_tail_ms: -10.0,
            preroll_ms: 120000.0,
            loop_start_pct: 50.0,
            loop_end_pct: 20.0,
            loop_crossfade_ms: f32::NAN,
            ..Default::default()
        }
        .clamped();

        assert_eq!(0, settings.start_note);
        assert_eq!(127, settings.end_note);
        assert_eq!(1, settings.interval_semitones);
        assert_eq!(5, settings.velocity_layers);
        assert_eq!(1, settings.round_robins);
        assert_eq!(1.0, settings.sustain_ms);
        assert_eq!(0.0, settings.release_tail_ms);
        assert_eq!(60000.0, settings.preroll_ms);
        assert_eq!(50.0, settings.loop_start_pct);
        assert!((settings.loop_end_pct - 50.1).abs() < 1e-4);
        assert_eq!(0.0, settings.loop_crossfade_ms);
    }

    #[test]
    fn test_loop_end_capped_at_100() {
        let settings = AutoSamplerSettings {
            loop_start_pct: 100.0,
            loop_end_pct: 100.0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(100.0, settings.loop_end_pct);
    }

    #[test]
    fn test_note_range() {
        let settings = AutoSamplerSettings {
            start_note: 72,
            end_note: 60,
            ..Default::default()
        };
        assert_eq!(60, settings.low_note());
        assert_eq!(72, settings.high_note());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: AutoSamplerSettings =
            serde_yml::from_str("start_note: 60\nend_note: 64\nnormalize: false\n").unwrap();
        assert_eq!(60, settings.start_note);
        assert_eq!(64, settings.end_note);
        assert!(!settings.normalize);
        assert_eq!(2000.0, settings.sustain_ms);
    }
}
