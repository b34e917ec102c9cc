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

//! Drives an engine without an audio device.

use tracing::{info, span, warn, Level};

use crate::audio::PcmBuffer;
use crate::autosampler::{AutoSamplerError, AutoSamplerSettings, CapturePlan, CompletedTake};
use crate::engine::{Engine, TimedEvent};

/// Channels rendered by the offline host.
const OUTPUT_CHANNELS: usize = 2;

/// Extra time a loopback run may take beyond its timeline before it is stopped.
const LOOPBACK_GRACE_BLOCKS: u64 = 16;

/// Calls an engine block by block, the way an audio callback would.
pub struct OfflineHost {
    engine: Engine,
    block_size: usize,
}

impl OfflineHost {
    pub fn new(engine: Engine, block_size: usize) -> OfflineHost {
        OfflineHost {
            engine,
            block_size: block_size.max(1),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Renders `frames` frames of output with no input. Event offsets are absolute frame
    /// positions; events past the end are dropped.
    pub fn render(&mut self, events: &[TimedEvent], frames: usize) -> PcmBuffer {
        let mut events = events.to_vec();
        events.sort_by_key(|e| e.offset);

        let mut rendered = vec![Vec::with_capacity(frames); OUTPUT_CHANNELS];
        let mut output = vec![vec![0.0f32; self.block_size]; OUTPUT_CHANNELS];
        let mut incoming = Vec::new();
        let mut outgoing = Vec::new();
        let mut next_event = 0;

        let mut position = 0;
        while position < frames {
            let block = self.block_size.min(frames - position);
            incoming.clear();
            while let Some(event) = events.get(next_event) {
                if event.offset >= position + block {
                    break;
                }
                incoming.push(TimedEvent::new(event.offset - position, event.event));
                next_event += 1;
            }

            self.engine
                .process_block(&[], &mut output, block, &incoming, &mut outgoing);
            for (dest, src) in rendered.iter_mut().zip(output.iter()) {
                dest.extend_from_slice(&src[..block]);
            }
            position += block;
        }

        PcmBuffer::from_planar(rendered, self.engine.sample_rate().round() as u32)
    }

    /// Auto-samples the engine's own zones. The engine's output is fed back as its input and
    /// the notes the auto-sampler sends are fed back as incoming events, each one block later.
    /// Input monitoring is off for the run so the loop does not feed back on itself.
    ///
    /// Returns the completed takes. A run that does not finish within its timeline plus a
    /// short grace period is stopped and returns what it captured.
    pub fn sample_loopback(
        &mut self,
        settings: &AutoSamplerSettings,
    ) -> Result<Vec<CompletedTake>, AutoSamplerError> {
        let span = span!(Level::INFO, "loopback");
        let _enter = span.enter();

        let plan = CapturePlan::new(settings, self.engine.sample_rate())?;
        let limit = plan.total_samples() + LOOPBACK_GRACE_BLOCKS * self.block_size as u64;

        let autosampler = self.engine.autosampler().clone();
        autosampler.start(settings)?;

        let mut input = vec![vec![0.0f32; self.block_size]; OUTPUT_CHANNELS];
        let mut output = vec![vec![0.0f32; self.block_size]; OUTPUT_CHANNELS];
        let mut incoming: Vec<TimedEvent> = Vec::new();
        let mut outgoing = Vec::new();
        let mut elapsed = 0u64;

        let monitor_input = self.engine.monitor_input();
        self.engine.set_monitor_input(false);
        while autosampler.is_active() && elapsed < limit {
            self.engine.process_block(
                &input,
                &mut output,
                self.block_size,
                &incoming,
                &mut outgoing,
            );
            std::mem::swap(&mut input, &mut output);
            incoming.clear();
            incoming.extend_from_slice(self.engine.generated_events());
            elapsed += self.block_size as u64;
        }
        self.engine.set_monitor_input(monitor_input);

        if autosampler.is_active() {
            warn!(elapsed, limit, "Loopback run did not finish, stopping");
            autosampler.stop(false);
        }

        // Let the last releases reach the voices.
        self.engine.process_block(
            &input,
            &mut output,
            self.block_size,
            &incoming,
            &mut outgoing,
        );

        let takes = autosampler.pop_completed_takes();
        info!(
            takes = takes.len(),
            expected = plan.expected_takes,
            frames = elapsed,
            "Loopback run complete"
        );
        Ok(takes)
    }
}

impl std::fmt::Debug for OfflineHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineHost")
            .field("block_size", &self.block_size)
            .field("engine", &self.engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::autosampler::AutoSampler;
    use crate::engine::{Controls, NoteEvent};
    use crate::zones::library::tests::zone;
    use crate::zones::{LibraryHandle, ZoneMetadata};

    fn host() -> OfflineHost {
        let library = LibraryHandle::new();
        library.publish(vec![zone(
            "ramp",
            ZoneMetadata {
                root_note: 60,
                ..Default::default()
            },
        )]);
        let engine = Engine::new(
            library,
            Arc::new(Controls::new()),
            Arc::new(AutoSampler::new(48000.0)),
            48000.0,
            8,
        );
        OfflineHost::new(engine, 64)
    }

    #[test]
    fn test_render() {
        let mut host = host();
        let events = [
            TimedEvent::new(
                100,
                NoteEvent::NoteOn {
                    channel: 1,
                    note: 60,
                    velocity: 127,
                },
            ),
            TimedEvent::new(10_000, NoteEvent::NoteOff { channel: 1, note: 60 }),
        ];
        let audio = host.render(&events, 1000);

        assert_eq!(1000, audio.frames());
        assert_eq!(2, audio.channel_count());
        assert_eq!(48000, audio.sample_rate());
        assert!(audio.channel(0)[..100].iter().all(|s| *s == 0.0));
        assert!(audio.channel(0)[100..].iter().any(|s| *s != 0.0));
        assert_eq!(1, host.engine().active_voices());
    }

    #[test]
    fn test_loopback_sampling() {
        let mut host = host();
        let settings = AutoSamplerSettings {
            start_note: 60,
            end_note: 62,
            interval_semitones: 2,
            velocity_layers: 1,
            round_robins: 1,
            sustain_ms: 20.0,
            release_tail_ms: 20.0,
            preroll_ms: 5.0,
            normalize: true,
            cut_loop_at_end: false,
            ..Default::default()
        };

        let takes = host.sample_loopback(&settings).unwrap();
        assert_eq!(2, takes.len());
        assert_eq!(60, takes[0].info.identity.root_note);
        assert_eq!(62, takes[1].info.identity.root_note);
        for take in &takes {
            // 5 + 20 + 20 ms at 48 kHz.
            assert_eq!(2160, take.audio.frames());
            assert!(take.info.normalized);
            assert!((take.audio.peak() - 0.999).abs() < 1e-4);
        }

        let progress = host.engine().autosampler().progress();
        assert!(!progress.active);
        assert!(progress.input_detected);
        assert_eq!("Sampling finished.", progress.status_message());
    }
}
