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

//! A single playing note: resampling, looping, envelope and filter.

use std::f64::consts::PI;
use std::sync::Arc;

use super::controls::{BlockSettings, LoopSettings};
use crate::zones::Zone;

/// Voices render at most this many channels.
pub const VOICE_CHANNELS: usize = 2;

/// Lowest pitch ratio a voice will play at.
const MIN_PITCH_RATIO: f64 = 1e-4;

/// Releases at or below this length stop the voice at once.
const INSTANT_RELEASE_MS: f32 = 0.001;

/// Lowest per-sample release step, so a release always finishes.
const MIN_RELEASE_STEP: f32 = 1e-6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Attack,
    Decay,
    Sustain,
}

/// Linear ADSR envelope. Release overrides whatever stage is running.
#[derive(Clone, Copy, Debug, Default)]
struct Envelope {
    level: f32,
    sustain: f32,
    stage: Stage,
    attack_step: f32,
    attack_remaining: usize,
    decay_step: f32,
    decay_remaining: usize,
    release_step: f32,
    release_remaining: usize,
    releasing: bool,
}

impl Envelope {
    fn start(settings: &BlockSettings) -> Envelope {
        let sustain = settings.sustain;
        let mut envelope = Envelope {
            sustain,
            ..Default::default()
        };

        if settings.attack_samples > 0 {
            envelope.level = 0.0;
            envelope.stage = Stage::Attack;
            envelope.attack_step = 1.0 / settings.attack_samples as f32;
            envelope.attack_remaining = settings.attack_samples;
        } else {
            envelope.level = 1.0;
            envelope.stage = Stage::Decay;
        }

        if settings.decay_samples > 0 {
            envelope.decay_step = (1.0 - sustain) / settings.decay_samples as f32;
            envelope.decay_remaining = settings.decay_samples;
        }
        if envelope.stage == Stage::Decay && envelope.decay_remaining == 0 {
            envelope.level = sustain;
            envelope.stage = Stage::Sustain;
        }
        envelope
    }

    fn release(&mut self, samples: usize) {
        let samples = samples.max(1);
        self.releasing = true;
        self.release_remaining = samples;
        self.release_step = (self.level / samples as f32).max(MIN_RELEASE_STEP);
    }

    /// Advances one sample. Returns None once a release has finished.
    #[inline]
    fn next(&mut self) -> Option<f32> {
        if self.releasing {
            self.level -= self.release_step;
            self.release_remaining = self.release_remaining.saturating_sub(1);
            if self.release_remaining == 0 || self.level <= 0.0 {
                self.level = 0.0;
                return None;
            }
            return Some(self.level);
        }

        match self.stage {
            Stage::Attack => {
                self.level += self.attack_step;
                self.attack_remaining = self.attack_remaining.saturating_sub(1);
                if self.attack_remaining == 0 || self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                    if self.decay_remaining == 0 {
                        self.level = self.sustain;
                        self.stage = Stage::Sustain;
                    }
                }
            }
            Stage::Decay => {
                self.level -= self.decay_step;
                self.decay_remaining = self.decay_remaining.saturating_sub(1);
                if self.decay_remaining == 0 || self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = self.sustain;
            }
        }
        Some(self.level)
    }
}

/// Chamberlin state variable filter state for one channel.
#[derive(Clone, Copy, Debug, Default)]
struct FilterState {
    low: f32,
    band: f32,
}

impl FilterState {
    /// Runs one sample through the filter and returns the low-pass output.
    #[inline]
    fn low_pass(&mut self, input: f32, frequency: f32, damping: f32) -> f32 {
        self.low += frequency * self.band;
        let high = input - self.low - damping * self.band;
        self.band += frequency * high;
        self.low
    }
}

/// Per-sample filter coefficients.
#[derive(Clone, Copy, Debug)]
struct FilterCoefficients {
    frequency: f32,
    damping: f32,
}

impl FilterCoefficients {
    fn new(settings: &BlockSettings, envelope_level: f32) -> FilterCoefficients {
        let sample_rate = settings.sample_rate;
        let modulation = 2f64.powf(
            settings.filter_env_amount as f64 * envelope_level.clamp(0.0, 1.0) as f64,
        );
        let cutoff = (settings.filter_cutoff_hz as f64 * modulation)
            .clamp(20.0, (0.49 * sample_rate).max(40.0));
        let frequency = (2.0 * (PI * cutoff / sample_rate).sin()).clamp(0.001, 1.9);
        let damping = (1.0 - 0.95 * settings.filter_resonance).clamp(0.05, 1.0);

        FilterCoefficients {
            frequency: frequency as f32,
            damping,
        }
    }
}

/// Wraps a position into `[loop.start, loop.end)` by removing whole loop lengths.
#[inline]
pub fn wrap_position(position: f64, loop_settings: &LoopSettings) -> f64 {
    let start = loop_settings.start as f64;
    let end = loop_settings.end as f64;
    if position < end || loop_settings.is_empty() {
        return position;
    }

    let len = loop_settings.len() as f64;
    let wrapped = start + (position - start) % len;
    if wrapped >= end {
        start
    } else {
        wrapped.max(start)
    }
}

/// A voice playing one zone.
#[derive(Default)]
pub struct Voice {
    active: bool,
    note: u8,
    channel: u8,
    zone: Option<Arc<Zone>>,
    position: f64,
    pitch_ratio: f64,
    velocity_gain: f32,
    envelope: Envelope,
    filters: [FilterState; VOICE_CHANNELS],
    age: u64,
}

impl Voice {
    /// Resets the voice and starts it playing the zone.
    pub fn start(
        &mut self,
        zone: Arc<Zone>,
        channel: u8,
        note: u8,
        velocity: u8,
        age: u64,
        settings: &BlockSettings,
    ) {
        let semitones = note as f64 - zone.metadata().root_note as f64;
        let source_rate = zone.audio().sample_rate() as f64;
        let pitch_ratio = source_rate / settings.sample_rate * 2f64.powf(semitones / 12.0);

        *self = Voice {
            active: true,
            note,
            channel,
            zone: Some(zone),
            position: 0.0,
            pitch_ratio: if pitch_ratio.is_finite() {
                pitch_ratio.max(MIN_PITCH_RATIO)
            } else {
                MIN_PITCH_RATIO
            },
            velocity_gain: velocity.min(127) as f32 / 127.0,
            envelope: Envelope::start(settings),
            filters: Default::default(),
            age,
        };
    }

    /// Stops the voice. With tail-off the envelope releases over the release time,
    /// otherwise the voice stops immediately. A voice already releasing is left alone.
    pub fn release(&mut self, allow_tail_off: bool, settings: &BlockSettings) {
        if !self.active || self.envelope.releasing {
            return;
        }
        if !allow_tail_off || settings.release_ms <= INSTANT_RELEASE_MS {
            self.stop();
            return;
        }
        self.envelope.release(settings.release_samples);
    }

    /// Stops the voice immediately.
    pub fn stop(&mut self) {
        self.active = false;
        self.zone = None;
    }

    /// Adds this voice into `output` for `len` frames starting at `start`.
    pub fn render(
        &mut self,
        output: &mut [Vec<f32>],
        start: usize,
        len: usize,
        settings: &BlockSettings,
    ) {
        if !self.active {
            return;
        }
        let Some(zone) = self.zone.clone() else {
            self.active = false;
            return;
        };

        let audio = zone.audio();
        let frames = audio.frames();
        let zone_channels = audio.channel_count().min(VOICE_CHANNELS);
        let out_channels = output.len().min(VOICE_CHANNELS);
        if frames < 2 || zone_channels == 0 {
            self.stop();
            return;
        }

        let last_position = (frames - 1) as f64;
        let loop_settings = LoopSettings::for_zone(settings, audio);
        let loop_start = loop_settings.start as f64;
        let fade_start = loop_settings.end.saturating_sub(loop_settings.crossfade) as f64;
        let crossfade = loop_settings.enabled && loop_settings.crossfade > 0;

        for frame in start..start + len {
            if loop_settings.enabled {
                self.position = wrap_position(self.position, &loop_settings);
            } else if self.position >= last_position {
                self.stop();
                return;
            }

            let Some(level) = self.envelope.next() else {
                self.stop();
                return;
            };

            let gain = settings.output_gain * self.velocity_gain * level;
            let fade = if crossfade && self.position >= fade_start {
                let t = (self.position - fade_start) / loop_settings.crossfade as f64;
                Some(t.clamp(0.0, 1.0) as f32)
            } else {
                None
            };
            let coefficients = settings
                .filter_enabled
                .then(|| FilterCoefficients::new(settings, level));

            for (channel, out) in output.iter_mut().take(out_channels).enumerate() {
                let source = channel.min(zone_channels - 1);
                let mut sample = audio.read_linear(source, self.position);
                if let Some(fade) = fade {
                    let alternate =
                        audio.read_linear(source, loop_start + (self.position - fade_start));
                    sample = sample * (1.0 - fade) + alternate * fade;
                }
                sample *= gain;
                if let Some(coefficients) = coefficients {
                    sample = self.filters[channel].low_pass(
                        sample,
                        coefficients.frequency,
                        coefficients.damping,
                    );
                }
                if let Some(slot) = out.get_mut(frame) {
                    *slot += sample;
                }
            }

            self.position += self.pitch_ratio;
            if loop_settings.enabled {
                self.position = wrap_position(self.position, &loop_settings);
            } else if self.position >= last_position {
                self.stop();
                return;
            }
        }
    }

    /// Whether the voice is playing.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the voice is in its release stage.
    pub fn is_releasing(&self) -> bool {
        self.active && self.envelope.releasing
    }

    /// Whether the voice was started by this channel and note.
    pub fn matches(&self, channel: u8, note: u8) -> bool {
        self.active && self.channel == channel && self.note == note
    }

    /// The note that started the voice.
    pub fn note(&self) -> u8 {
        self.note
    }

    /// The channel that started the voice.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// When the voice was started, relative to other voices. Lower is older.
    pub fn age(&self) -> u64 {
        self.age
    }

    /// The current envelope level.
    pub fn envelope_level(&self) -> f32 {
        self.envelope.level
    }

    /// The current read position in source frames.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// The playback rate relative to the source.
    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    /// The zone being played.
    pub fn zone(&self) -> Option<&Arc<Zone>> {
        self.zone.as_ref()
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("active", &self.active)
            .field("note", &self.note)
            .field("channel", &self.channel)
            .field("zone", &self.zone.as_ref().map(|z| z.name()))
            .field("position", &self.position)
            .field("pitch_ratio", &self.pitch_ratio)
            .field("level", &self.envelope.level)
            .field("releasing", &self.envelope.releasing)
            .field("age", &self.age)
            .finish()
    }
}
