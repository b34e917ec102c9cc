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
use super::settings::AutoSamplerSettings;
use crate::audio::PcmBuffer;
use crate::util::note_name;
use crate::zones::ZoneMetadata;

/// Which note, layer and round robin a take belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TakeIdentity {
    pub root_note: u8,
    /// The velocity the note was played at.
    pub velocity: u8,
    pub velocity_layer: u32,
    pub velocity_low: u8,
    pub velocity_high: u8,
    pub round_robin_index: u32,
}

/// Describes a take and the run settings it was captured with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TakeInfo {
    pub identity: TakeIdentity,
    pub sample_rate: f64,
    pub loop_samples: bool,
    pub auto_loop_mode: bool,
    pub loop_start_pct: f32,
    pub loop_end_pct: f32,
    pub cut_loop_at_end: bool,
    pub loop_crossfade_ms: f32,
    /// For triggered takes, whether normalization is requested. For completed takes, whether
    /// it was applied.
    pub normalized: bool,
}

impl TakeInfo {
    pub fn new(
        identity: TakeIdentity,
        settings: &AutoSamplerSettings,
        sample_rate: f64,
        normalized: bool,
    ) -> TakeInfo {
        TakeInfo {
            identity,
            sample_rate,
            loop_samples: settings.loop_samples,
            auto_loop_mode: settings.auto_loop_mode,
            loop_start_pct: settings.loop_start_pct,
            loop_end_pct: settings.loop_end_pct,
            cut_loop_at_end: settings.cut_loop_at_end,
            loop_crossfade_ms: settings.loop_crossfade_ms,
            normalized,
        }
    }

    /// The file name a take should be saved as, e.g. `AUTO_C4_V1_RR2.wav`.
    pub fn suggested_file_name(&self) -> String {
        format!(
            "AUTO_{}_V{}_RR{}.wav",
            note_name(self.identity.root_note),
            self.identity.velocity_layer,
            self.identity.round_robin_index
        )
    }
}

/// A take whose note has just been sent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggeredTake {
    pub info: TakeInfo,
}

/// A finished take and its audio.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedTake {
    pub info: TakeInfo,
    pub audio: PcmBuffer,
}

impl CompletedTake {
    /// Metadata for playing the take back as a zone: rooted and keyed on its own note,
    /// covering its layer's velocities.
    pub fn zone_metadata(&self) -> ZoneMetadata {
        let identity = &self.info.identity;
        ZoneMetadata {
            root_note: identity.root_note,
            low_note: identity.root_note,
            high_note: identity.root_note,
            low_velocity: identity.velocity_low,
            high_velocity: identity.velocity_high,
            round_robin_index: identity.round_robin_index,
        }
        .sanitized()
    }

    /// Length of the take in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.info.sample_rate > 0.0 {
            self.audio.frames() as f64 / self.info.sample_rate
        } else {
            0.0
        }
    }
}
