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

//! Playback controls.
//!
//! Controls are a fixed set of identifiers resolved once. Values are stored as f32 bits in
//! atomics so any thread can set them and the render thread can read them without locking.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::audio::PcmBuffer;
use crate::util::ms_to_samples;

/// The number of controls.
pub const CONTROL_COUNT: usize = 13;

/// Identifies a playback control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlId {
    OutputGainDb,
    AttackMs,
    DecayMs,
    Sustain,
    ReleaseMs,
    LoopEnabled,
    LoopStartPct,
    LoopEndPct,
    LoopCrossfadeMs,
    FilterEnabled,
    FilterCutoffHz,
    FilterResonance,
    FilterEnvAmount,
}

impl ControlId {
    /// Every control, in index order.
    pub const ALL: [ControlId; CONTROL_COUNT] = [
        ControlId::OutputGainDb,
        ControlId::AttackMs,
        ControlId::DecayMs,
        ControlId::Sustain,
        ControlId::ReleaseMs,
        ControlId::LoopEnabled,
        ControlId::LoopStartPct,
        ControlId::LoopEndPct,
        ControlId::LoopCrossfadeMs,
        ControlId::FilterEnabled,
        ControlId::FilterCutoffHz,
        ControlId::FilterResonance,
        ControlId::FilterEnvAmount,
    ];

    /// The stable index of the control.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The control's name as used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            ControlId::OutputGainDb => "output_gain_db",
            ControlId::AttackMs => "attack_ms",
            ControlId::DecayMs => "decay_ms",
            ControlId::Sustain => "sustain",
            ControlId::ReleaseMs => "release_ms",
            ControlId::LoopEnabled => "loop_enabled",
            ControlId::LoopStartPct => "loop_start_pct",
            ControlId::LoopEndPct => "loop_end_pct",
            ControlId::LoopCrossfadeMs => "loop_crossfade_ms",
            ControlId::FilterEnabled => "filter_enabled",
            ControlId::FilterCutoffHz => "filter_cutoff_hz",
            ControlId::FilterResonance => "filter_resonance",
            ControlId::FilterEnvAmount => "filter_env_amount",
        }
    }

    /// Resolves a control by name.
    pub fn from_name(name: &str) -> Option<ControlId> {
        ControlId::ALL.into_iter().find(|id| id.name() == name)
    }

    /// The inclusive range of values the control accepts.
    pub fn range(self) -> (f32, f32) {
        match self {
            ControlId::OutputGainDb => (-48.0, 12.0),
            ControlId::AttackMs | ControlId::DecayMs => (0.0, 5000.0),
            ControlId::Sustain => (0.0, 1.0),
            ControlId::ReleaseMs => (0.0, 7000.0),
            ControlId::LoopEnabled | ControlId::FilterEnabled => (0.0, 1.0),
            ControlId::LoopStartPct => (0.0, 99.0),
            ControlId::LoopEndPct => (1.0, 100.0),
            ControlId::LoopCrossfadeMs => (0.0, 250.0),
            ControlId::FilterCutoffHz => (20.0, 20000.0),
            ControlId::FilterResonance => (0.0, 0.99),
            ControlId::FilterEnvAmount => (-4.0, 4.0),
        }
    }

    /// The value the control starts at.
    pub fn default_value(self) -> f32 {
        match self {
            ControlId::OutputGainDb => -3.0,
            ControlId::AttackMs => 5.0,
            ControlId::DecayMs => 250.0,
            ControlId::Sustain => 1.0,
            ControlId::ReleaseMs => 350.0,
            ControlId::LoopEnabled => 1.0,
            ControlId::LoopStartPct => 5.0,
            ControlId::LoopEndPct => 95.0,
            ControlId::LoopCrossfadeMs => 15.0,
            ControlId::FilterEnabled => 0.0,
            ControlId::FilterCutoffHz => 18000.0,
            ControlId::FilterResonance => 0.1,
            ControlId::FilterEnvAmount => 0.0,
        }
    }

    /// Whether the control is an on/off switch.
    pub fn is_toggle(self) -> bool {
        matches!(self, ControlId::LoopEnabled | ControlId::FilterEnabled)
    }
}

impl std::fmt::Display for ControlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared control values.
pub struct Controls {
    values: [AtomicU32; CONTROL_COUNT],
}

impl Controls {
    /// Creates controls at their default values.
    pub fn new() -> Controls {
        Controls {
            values: ControlId::ALL.map(|id| AtomicU32::new(id.default_value().to_bits())),
        }
    }

    /// Sets a control, clamping it to its range. Non-finite values are ignored.
    pub fn set(&self, id: ControlId, value: f32) {
        if !value.is_finite() {
            return;
        }
        let (min, max) = id.range();
        self.values[id.index()].store(value.clamp(min, max).to_bits(), Ordering::Relaxed);
    }

    /// Returns the current value of a control.
    pub fn get(&self, id: ControlId) -> f32 {
        f32::from_bits(self.values[id.index()].load(Ordering::Relaxed))
    }

    /// Reads every control once.
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            values: ControlId::ALL.map(|id| self.get(id)),
        }
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Controls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for id in ControlId::ALL {
            map.entry(&id.name(), &self.get(id));
        }
        map.finish()
    }
}

/// Control values read at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlSnapshot {
    values: [f32; CONTROL_COUNT],
}

impl ControlSnapshot {
    /// Returns the value of a control.
    pub fn get(&self, id: ControlId) -> f32 {
        self.values[id.index()]
    }

    /// Returns a toggle control as a bool.
    pub fn is_on(&self, id: ControlId) -> bool {
        self.get(id) >= 0.5
    }
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        ControlSnapshot {
            values: ControlId::ALL.map(ControlId::default_value),
        }
    }
}

/// Everything voices need for one block, derived from a control snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockSettings {
    pub sample_rate: f64,
    pub output_gain: f32,
    pub attack_samples: usize,
    pub decay_samples: usize,
    pub sustain: f32,
    pub release_ms: f32,
    pub release_samples: usize,
    pub loop_enabled: bool,
    pub loop_start_pct: f32,
    pub loop_end_pct: f32,
    pub loop_crossfade_ms: f32,
    pub filter_enabled: bool,
    pub filter_cutoff_hz: f32,
    pub filter_resonance: f32,
    pub filter_env_amount: f32,
}

impl BlockSettings {
    /// Converts a control snapshot into per-block settings at the engine rate.
    pub fn new(snapshot: &ControlSnapshot, sample_rate: f64) -> BlockSettings {
        let release_ms = snapshot.get(ControlId::ReleaseMs);
        BlockSettings {
            sample_rate,
            output_gain: 10f32.powf(snapshot.get(ControlId::OutputGainDb) / 20.0),
            attack_samples: ms_to_samples(sample_rate, snapshot.get(ControlId::AttackMs)),
            decay_samples: ms_to_samples(sample_rate, snapshot.get(ControlId::DecayMs)),
            sustain: snapshot.get(ControlId::Sustain).clamp(0.0, 1.0),
            release_ms,
            release_samples: ms_to_samples(sample_rate, release_ms),
            loop_enabled: snapshot.is_on(ControlId::LoopEnabled),
            loop_start_pct: snapshot.get(ControlId::LoopStartPct),
            loop_end_pct: snapshot.get(ControlId::LoopEndPct),
            loop_crossfade_ms: snapshot.get(ControlId::LoopCrossfadeMs),
            filter_enabled: snapshot.is_on(ControlId::FilterEnabled),
            filter_cutoff_hz: snapshot.get(ControlId::FilterCutoffHz),
            filter_resonance: snapshot.get(ControlId::FilterResonance),
            filter_env_amount: snapshot.get(ControlId::FilterEnvAmount),
        }
    }

    /// Settings from default control values.
    pub fn with_defaults(sample_rate: f64) -> BlockSettings {
        BlockSettings::new(&ControlSnapshot::default(), sample_rate)
    }
}

/// The loop region of one zone under the current settings, in source frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopSettings {
    pub enabled: bool,
    pub start: usize,
    pub end: usize,
    pub crossfade: usize,
}

impl LoopSettings {
    /// Shortest zone, in frames, that can loop.
    pub const MIN_LOOP_FRAMES: usize = 4;

    /// Computes the loop region for a zone's audio. Degenerate regions are widened rather
    /// than rejected.
    pub fn for_zone(settings: &BlockSettings, audio: &PcmBuffer) -> LoopSettings {
        let len = audio.frames();
        if !settings.loop_enabled || len < Self::MIN_LOOP_FRAMES {
            return LoopSettings::default();
        }

        let last = (len - 1) as f64;
        let percent_position = |pct: f32| (pct as f64 / 100.0 * last).round().max(0.0) as usize;

        let start = percent_position(settings.loop_start_pct).min(len - 3);
        let mut end = percent_position(settings.loop_end_pct).clamp(start + 1, len - 1);
        if end < start + 2 {
            end = start + 2;
        }

        let crossfade = ms_to_samples(audio.sample_rate() as f64, settings.loop_crossfade_ms)
            .min(end - start - 1);

        LoopSettings {
            enabled: true,
            start,
            end,
            crossfade,
        }
    }

    /// Length of the loop in frames.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the loop has no length.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
