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
use std::sync::Arc;

use tracing::debug;

use super::controls::{BlockSettings, Controls};
use super::events::{merge_events, TimedEvent};
use super::pool::VoicePool;
use crate::autosampler::AutoSampler;
use crate::zones::LibraryHandle;

/// The per-block entry point. Owned by whichever thread renders audio.
pub struct Engine {
    /// Where zones are published.
    library: LibraryHandle,
    /// The voices. Only touched from `process_block`.
    pool: VoicePool,
    /// Playback controls, shared with whoever sets them.
    controls: Arc<Controls>,
    /// The auto-sampler, shared with whoever drives runs.
    autosampler: Arc<AutoSampler>,
    sample_rate: f64,
    /// Pass input through to the output while a run is armed.
    monitor_input: bool,
    /// Generation of the library seen by the last block.
    last_generation: Option<u64>,
    /// Auto-sampler events for the current block, kept to avoid reallocating.
    generated: Vec<TimedEvent>,
}

impl Engine {
    /// Creates an engine. The auto-sampler is moved to the engine's sample rate if it differs.
    pub fn new(
        library: LibraryHandle,
        controls: Arc<Controls>,
        autosampler: Arc<AutoSampler>,
        sample_rate: f64,
        max_voices: usize,
    ) -> Engine {
        if autosampler.sample_rate() != sample_rate {
            autosampler.set_sample_rate(sample_rate);
        }
        Engine {
            library,
            pool: VoicePool::new(max_voices),
            controls,
            autosampler,
            sample_rate,
            monitor_input: true,
            last_generation: None,
            generated: Vec::with_capacity(64),
        }
    }

    /// Sets whether input is passed through while a run is armed.
    pub fn with_monitor_input(mut self, monitor_input: bool) -> Engine {
        self.monitor_input = monitor_input;
        self
    }

    pub fn monitor_input(&self) -> bool {
        self.monitor_input
    }

    pub fn set_monitor_input(&mut self, monitor_input: bool) {
        self.monitor_input = monitor_input;
    }

    /// Changes the sample rate. Every voice stops and any run is dropped.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.pool.stop_all();
        self.autosampler.set_sample_rate(sample_rate);
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn library(&self) -> &LibraryHandle {
        &self.library
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    pub fn autosampler(&self) -> &Arc<AutoSampler> {
        &self.autosampler
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active_voices()
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    /// The events the auto-sampler produced during the last block.
    pub fn generated_events(&self) -> &[TimedEvent] {
        &self.generated
    }

    /// Processes one block.
    ///
    /// `input` and `output` are planar; only the first `frames` frames of each output channel
    /// are written. `incoming` must be ordered by offset. `outgoing` is replaced with the
    /// incoming events merged with whatever the auto-sampler generated for this block.
    pub fn process_block(
        &mut self,
        input: &[Vec<f32>],
        output: &mut [Vec<f32>],
        frames: usize,
        incoming: &[TimedEvent],
        outgoing: &mut Vec<TimedEvent>,
    ) {
        outgoing.clear();
        if frames == 0 {
            return;
        }

        let library = self.library.load();
        if self.last_generation != Some(library.generation()) {
            if self.last_generation.is_some() {
                debug!(
                    generation = library.generation(),
                    "Zone library changed, stopping voices"
                );
            }
            self.pool.stop_all();
            self.last_generation = Some(library.generation());
        }

        self.generated.clear();
        self.autosampler
            .emit_block_events(frames, &mut self.generated);
        let armed = self
            .autosampler
            .capture_block(input, frames, &self.generated);

        for channel in output.iter_mut() {
            let len = frames.min(channel.len());
            channel[..len].fill(0.0);
        }
        if armed && self.monitor_input && !input.is_empty() {
            let monitor_channels = input.len().min(2);
            for (index, channel) in output.iter_mut().enumerate() {
                let source = &input[index.min(monitor_channels - 1)];
                let len = frames.min(channel.len()).min(source.len());
                channel[..len].copy_from_slice(&source[..len]);
            }
        }

        let settings = BlockSettings::new(&self.controls.snapshot(), self.sample_rate);

        let mut render_start = 0;
        for event in incoming {
            let offset = event.offset.min(frames).max(render_start);
            if offset > render_start {
                self.pool
                    .render(output, render_start, offset - render_start, &settings);
            }
            self.pool.handle_event(&library, &event.event, &settings);
            render_start = offset;
        }
        if render_start < frames {
            self.pool
                .render(output, render_start, frames - render_start, &settings);
        }

        merge_events(incoming, &self.generated, outgoing);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sample_rate", &self.sample_rate)
            .field("monitor_input", &self.monitor_input)
            .field("pool", &self.pool)
            .field("autosampler", &self.autosampler)
            .finish()
    }
}
