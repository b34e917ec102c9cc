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

//! Records returned audio into takes.
//!
//! Input is written into a short history ring for as long as a run is armed. When one of the
//! run's note ons arrives, a capture is opened, its pre-roll is filled from the ring and live
//! input is appended until the take is full.

use super::scheduler::{velocity_bounds_for_layer, velocity_to_layer, CapturePlan};
use super::settings::{AutoSamplerSettings, MAX_VELOCITY_LAYERS};
use super::take::{CompletedTake, TakeIdentity, TakeInfo};
use crate::audio::PcmBuffer;
use crate::engine::events::{NoteEvent, TimedEvent};

/// Input louder than this counts as signal.
const INPUT_DETECT_THRESHOLD: f32 = 0.00005;

/// Takes quieter than this are left alone by normalization.
const NORMALIZE_MIN_PEAK: f32 = 0.000001;

/// Peak level normalized takes are scaled to.
const NORMALIZE_TARGET: f32 = 0.999;

/// Shortest a take can be cut to.
const MIN_CUT_SAMPLES: usize = 4;

/// A stereo ring of the most recent input frames.
#[derive(Debug)]
pub struct InputHistory {
    left: Vec<f32>,
    right: Vec<f32>,
    write: usize,
    valid: usize,
}

impl InputHistory {
    pub fn new(size: usize) -> InputHistory {
        InputHistory {
            left: vec![0.0; size],
            right: vec![0.0; size],
            write: 0,
            valid: 0,
        }
    }

    /// Frames the ring can hold.
    pub fn size(&self) -> usize {
        self.left.len()
    }

    /// Frames written so far, up to the ring size.
    pub fn valid(&self) -> usize {
        self.valid
    }

    pub fn push(&mut self, left: f32, right: f32) {
        let size = self.size();
        if size == 0 {
            return;
        }
        self.left[self.write] = left;
        self.right[self.write] = right;
        self.write = (self.write + 1) % size;
        self.valid = (self.valid + 1).min(size);
    }

    /// Copies the most recent frames into the first `count` frames of the destinations,
    /// right-aligned so the newest frame lands at `count - 1`. Frames with no history are left
    /// untouched.
    pub fn copy_recent(&self, left: &mut [f32], right: &mut [f32], count: usize) {
        let size = self.size();
        let count = count.min(left.len()).min(right.len());
        let available = count.min(self.valid);
        if available == 0 || size == 0 {
            return;
        }

        let dest_start = count - available;
        let read_start = (self.write + size - available) % size;
        for i in 0..available {
            let read = (read_start + i) % size;
            left[dest_start + i] = self.left[read];
            right[dest_start + i] = self.right[read];
        }
    }
}

/// Silent stereo take buffers, allocated when a run is armed so recording does not allocate.
#[derive(Debug, Default)]
pub struct TakeBufferPool {
    free: Vec<Vec<Vec<f32>>>,
    take_samples: usize,
}

impl TakeBufferPool {
    pub fn new(count: usize, take_samples: usize) -> TakeBufferPool {
        TakeBufferPool {
            free: (0..count).map(|_| silent_take(take_samples)).collect(),
            take_samples,
        }
    }

    /// A silent buffer from the pool. Allocates one if the pool has run dry.
    pub fn acquire(&mut self) -> Vec<Vec<f32>> {
        self.free
            .pop()
            .unwrap_or_else(|| silent_take(self.take_samples))
    }

    /// Buffers left in the pool.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

fn silent_take(frames: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0; frames]; 2]
}

/// A take being recorded.
#[derive(Debug)]
pub struct ActiveCapture {
    pub identity: TakeIdentity,
    channels: Vec<Vec<f32>>,
    take_samples: usize,
    write_position: usize,
}

impl ActiveCapture {
    /// Opens a capture into a silent stereo buffer with the pre-roll filled from history. The
    /// take is as long as the shortest channel.
    pub fn new(
        identity: TakeIdentity,
        mut channels: Vec<Vec<f32>>,
        preroll_samples: usize,
        history: &InputHistory,
    ) -> ActiveCapture {
        let take_samples = channels.iter().map(Vec::len).min().unwrap_or(0);
        channels.resize_with(2, || vec![0.0; take_samples]);
        let preroll_samples = preroll_samples.min(take_samples);
        if let [left, right] = channels.as_mut_slice() {
            history.copy_recent(left, right, preroll_samples);
        }

        ActiveCapture {
            identity,
            channels,
            take_samples,
            write_position: preroll_samples,
        }
    }

    pub fn push(&mut self, left: f32, right: f32) {
        if self.write_position < self.take_samples {
            self.channels[0][self.write_position] = left;
            self.channels[1][self.write_position] = right;
            self.write_position += 1;
        }
    }

    pub fn is_full(&self) -> bool {
        self.write_position >= self.take_samples
    }

    pub fn write_position(&self) -> usize {
        self.write_position
    }

    /// Cuts and normalizes the recording as the settings ask and turns it into a take.
    pub fn finish(self, settings: &AutoSamplerSettings, sample_rate: f64) -> CompletedTake {
        let mut audio =
            PcmBuffer::from_planar(self.channels, sample_rate.round().max(1.0) as u32);

        if settings.loop_samples && settings.cut_loop_at_end {
            let frames = audio.frames();
            let end_ratio = (settings.loop_end_pct * 0.01).clamp(0.0, 1.0);
            let cut = ((end_ratio * frames as f32).round() as usize)
                .max(MIN_CUT_SAMPLES)
                .min(frames);
            audio.truncate(cut);
        }

        let mut normalized = false;
        if settings.normalize {
            let peak = audio.peak();
            if peak > NORMALIZE_MIN_PEAK {
                audio.apply_gain(NORMALIZE_TARGET / peak);
                normalized = true;
            }
        }

        CompletedTake {
            info: TakeInfo::new(self.identity, settings, sample_rate, normalized),
            audio,
        }
    }
}

/// What happened during one block of capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// The last capture opened in the block.
    pub started: Option<TakeIdentity>,
    /// Number of takes finished in the block.
    pub completed: usize,
}

/// Capture state for one armed run.
#[derive(Debug)]
pub struct CaptureSession {
    settings: AutoSamplerSettings,
    sample_rate: f64,
    note_mask: [bool; 128],
    preroll_samples: usize,
    history: InputHistory,
    buffers: TakeBufferPool,
    active: Vec<ActiveCapture>,
    round_robins: [[u32; MAX_VELOCITY_LAYERS as usize]; 128],
    captured_takes: usize,
    input_detected: bool,
}

impl CaptureSession {
    /// Sets up capture for the plan, with a take buffer for every take it expects.
    pub fn new(plan: &CapturePlan) -> CaptureSession {
        CaptureSession {
            settings: plan.settings.clone(),
            sample_rate: plan.sample_rate,
            note_mask: plan.note_mask,
            preroll_samples: plan.preroll_samples,
            history: InputHistory::new(plan.history_samples),
            buffers: TakeBufferPool::new(plan.expected_takes, plan.take_samples),
            active: Vec::with_capacity(plan.expected_takes),
            round_robins: [[0; MAX_VELOCITY_LAYERS as usize]; 128],
            captured_takes: 0,
            input_detected: false,
        }
    }

    pub fn captured_takes(&self) -> usize {
        self.captured_takes
    }

    pub fn input_detected(&self) -> bool {
        self.input_detected
    }

    /// Take buffers not yet used.
    pub fn spare_buffers(&self) -> usize {
        self.buffers.available()
    }

    /// Number of takes still recording.
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    /// Records one block of input. Note ons in `events` open captures at their offsets; finished
    /// takes are appended to `completed`. Missing input channels record silence and a mono
    /// input is used for both sides.
    pub fn process(
        &mut self,
        input: &[Vec<f32>],
        frames: usize,
        events: &[TimedEvent],
        completed: &mut Vec<CompletedTake>,
    ) -> CaptureReport {
        let mut report = CaptureReport::default();
        if frames == 0 {
            return report;
        }

        let left_in = input.first();
        let right_in = input.get(1).or(left_in);
        let mut note_ons = events.iter().filter_map(|e| match e.event {
            NoteEvent::NoteOn { note, velocity, .. } if velocity > 0 => {
                Some((e.offset.min(frames - 1), note, velocity))
            }
            _ => None,
        });
        let mut next = note_ons.next();

        for sample in 0..frames {
            while let Some((offset, note, velocity)) = next {
                if offset > sample {
                    break;
                }
                if let Some(identity) = self.open_capture(note, velocity) {
                    report.started = Some(identity);
                }
                next = note_ons.next();
            }

            let left = left_in
                .and_then(|c| c.get(sample))
                .copied()
                .unwrap_or(0.0);
            let right = right_in
                .and_then(|c| c.get(sample))
                .copied()
                .unwrap_or(left);

            if !self.input_detected
                && (left.abs() > INPUT_DETECT_THRESHOLD || right.abs() > INPUT_DETECT_THRESHOLD)
            {
                self.input_detected = true;
            }

            self.history.push(left, right);

            let mut i = 0;
            while i < self.active.len() {
                self.active[i].push(left, right);
                if self.active[i].is_full() {
                    let capture = self.active.remove(i);
                    completed.push(capture.finish(&self.settings, self.sample_rate));
                    self.captured_takes += 1;
                    report.completed += 1;
                    continue;
                }
                i += 1;
            }
        }

        report
    }

    fn open_capture(&mut self, note: u8, velocity: u8) -> Option<TakeIdentity> {
        let note = note.min(127);
        if !self.note_mask[note as usize] {
            return None;
        }

        let velocity = velocity.clamp(1, 127);
        let layers = self.settings.velocity_layers as u32;
        let layer = velocity_to_layer(velocity, layers);
        let counter = &mut self.round_robins[note as usize][(layer - 1) as usize];
        *counter += 1;
        let round_robin = *counter;
        if round_robin > self.settings.round_robins as u32 {
            return None;
        }

        let (velocity_low, velocity_high) = velocity_bounds_for_layer(layer, layers);
        let identity = TakeIdentity {
            root_note: note,
            velocity,
            velocity_layer: layer,
            velocity_low,
            velocity_high,
            round_robin_index: round_robin,
        };
        let buffer = self.buffers.acquire();
        self.active.push(ActiveCapture::new(
            identity,
            buffer,
            self.preroll_samples,
            &self.history,
        ));
        Some(identity)
    }
}
