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

//! Automatic sampling of an external instrument.
//!
//! A run plays a planned sequence of notes into the outgoing event stream and records the audio
//! that comes back on the input into takes. The control side starts, stops and polls a run
//! while the render side emits its events and records its input once per block.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::engine::events::{NoteEvent, TimedEvent};
use crate::util::note_name;

pub mod capture;
pub mod export;
pub mod scheduler;
pub mod settings;
pub mod take;

pub use capture::{ActiveCapture, CaptureReport, CaptureSession, InputHistory, TakeBufferPool};
pub use scheduler::{build_timeline, CapturePlan, ScheduledEvent};
pub use settings::AutoSamplerSettings;
pub use take::{CompletedTake, TakeIdentity, TakeInfo, TriggeredTake};

/// The channel runs are played on.
pub const OUTPUT_CHANNEL: u8 = 1;

/// How long an armed run may go without processing before progress reports it as waiting.
const WAITING_THRESHOLD: Duration = Duration::from_millis(1200);

/// Error types for the auto-sampler.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AutoSamplerError {
    #[error("No notes available for capture.")]
    NoNotes,
}

/// Where a run stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoSamplerStatus {
    Idle,
    Armed,
    Capturing {
        note: u8,
        layer: u32,
        round_robin: u32,
    },
    NoInput,
    WaitingForProcessing,
    Finished,
    Stopped,
    Cancelled,
}

impl fmt::Display for AutoSamplerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoSamplerStatus::Idle => write!(f, "Idle."),
            AutoSamplerStatus::Armed => {
                write!(f, "Sampling armed. Sending MIDI notes to target instrument.")
            }
            AutoSamplerStatus::Capturing {
                note,
                layer,
                round_robin,
            } => write!(f, "Capturing {} V{} RR{}...", note_name(*note), layer, round_robin),
            AutoSamplerStatus::NoInput => write!(
                f,
                "No input audio detected. Capturing silence; route source audio to the sampler input."
            ),
            AutoSamplerStatus::WaitingForProcessing => write!(
                f,
                "Waiting for audio processing. Make sure the engine is being driven."
            ),
            AutoSamplerStatus::Finished => write!(f, "Sampling finished."),
            AutoSamplerStatus::Stopped => write!(f, "Sampling stopped."),
            AutoSamplerStatus::Cancelled => write!(f, "Sampling cancelled."),
        }
    }
}

/// A point-in-time view of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct AutoSamplerProgress {
    pub active: bool,
    pub expected_takes: usize,
    pub captured_takes: usize,
    pub input_detected: bool,
    pub status: AutoSamplerStatus,
}

impl AutoSamplerProgress {
    /// The status as text.
    pub fn status_message(&self) -> String {
        self.status.to_string()
    }
}

struct State {
    sample_rate: f64,
    active: bool,
    plan: Option<CapturePlan>,
    capture: Option<CaptureSession>,
    schedule_index: usize,
    timeline_sample: u64,
    started_at: Option<Instant>,
    held_notes: [bool; 128],
    send_all_notes_off: bool,
    expected_takes: usize,
    captured_takes: usize,
    input_detected: bool,
    status: AutoSamplerStatus,
    triggered: Vec<TriggeredTake>,
    completed: Vec<CompletedTake>,
}

impl State {
    fn new(sample_rate: f64) -> State {
        State {
            sample_rate,
            active: false,
            plan: None,
            capture: None,
            schedule_index: 0,
            timeline_sample: 0,
            started_at: None,
            held_notes: [false; 128],
            send_all_notes_off: false,
            expected_takes: 0,
            captured_takes: 0,
            input_detected: false,
            status: AutoSamplerStatus::Idle,
            triggered: Vec::new(),
            completed: Vec::new(),
        }
    }

    fn end_run(&mut self, status: AutoSamplerStatus) {
        self.active = false;
        self.plan = None;
        self.capture = None;
        self.schedule_index = 0;
        self.timeline_sample = 0;
        self.started_at = None;
        self.send_all_notes_off = true;
        self.status = status;
    }
}

/// Runs auto-sampling. All state sits behind one lock that each method takes once.
pub struct AutoSampler {
    state: Mutex<State>,
}

impl AutoSampler {
    /// Creates an idle auto-sampler at the given sample rate.
    pub fn new(sample_rate: f64) -> AutoSampler {
        AutoSampler {
            state: Mutex::new(State::new(sanitize_rate(sample_rate))),
        }
    }

    /// Changes the sample rate. Any run in progress is dropped along with its takes.
    pub fn set_sample_rate(&self, sample_rate: f64) {
        let mut state = self.state.lock();
        *state = State::new(sanitize_rate(sample_rate));
    }

    pub fn sample_rate(&self) -> f64 {
        self.state.lock().sample_rate
    }

    /// Arms a run. Returns the number of takes it will capture. Settings that resolve to no
    /// notes fail without touching the current state.
    pub fn start(&self, settings: &AutoSamplerSettings) -> Result<usize, AutoSamplerError> {
        // Take buffers are allocated before locking so the render thread is not held up.
        let (plan, capture, mut state) = loop {
            let sample_rate = self.sample_rate();
            let plan = CapturePlan::new(settings, sample_rate)?;
            let capture = CaptureSession::new(&plan);
            let state = self.state.lock();
            if state.sample_rate == sample_rate {
                break (plan, capture, state);
            }
        };
        let expected_takes = plan.expected_takes;

        info!(
            notes = plan.notes.len(),
            layers = plan.settings.velocity_layers,
            round_robins = plan.settings.round_robins,
            takes = expected_takes,
            take_samples = plan.take_samples,
            "Starting auto-sampler"
        );

        state.active = true;
        state.expected_takes = expected_takes;
        state.captured_takes = 0;
        state.input_detected = false;
        state.status = AutoSamplerStatus::Armed;
        state.schedule_index = 0;
        state.timeline_sample = 0;
        state.started_at = Some(Instant::now());
        state.held_notes = [false; 128];
        state.send_all_notes_off = false;
        state.triggered.clear();
        state.triggered.reserve(expected_takes);
        state.completed.clear();
        state.completed.reserve(expected_takes);
        state.capture = Some(capture);
        state.plan = Some(plan);
        Ok(expected_takes)
    }

    /// Ends the run. Takes still recording and triggered takes not yet popped are dropped;
    /// completed takes stay available. The next block releases every held note.
    pub fn stop(&self, cancelled: bool) {
        let mut state = self.state.lock();
        let status = if cancelled {
            AutoSamplerStatus::Cancelled
        } else {
            AutoSamplerStatus::Stopped
        };
        info!(
            cancelled,
            captured = state.captured_takes,
            expected = state.expected_takes,
            "Stopping auto-sampler"
        );
        state.triggered.clear();
        state.end_run(status);
    }

    pub fn progress(&self) -> AutoSamplerProgress {
        let state = self.state.lock();
        let mut status = state.status;
        if state.active
            && state.timeline_sample == 0
            && state
                .started_at
                .is_some_and(|started| started.elapsed() > WAITING_THRESHOLD)
        {
            status = AutoSamplerStatus::WaitingForProcessing;
        }

        AutoSamplerProgress {
            active: state.active,
            expected_takes: state.expected_takes,
            captured_takes: state.captured_takes,
            input_detected: state.input_detected,
            status,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Takes whose note has been sent since the last call. The run keeps its reserved space.
    pub fn pop_triggered_takes(&self) -> Vec<TriggeredTake> {
        self.state.lock().triggered.drain(..).collect()
    }

    /// Takes finished since the last call. The run keeps its reserved space.
    pub fn pop_completed_takes(&self) -> Vec<CompletedTake> {
        self.state.lock().completed.drain(..).collect()
    }

    /// Appends the run's events for the next `frames` frames to `out`, ordered by offset.
    /// Pending releases from a finished or stopped run come first, at offset zero.
    pub fn emit_block_events(&self, frames: usize, out: &mut Vec<TimedEvent>) {
        if frames == 0 {
            return;
        }

        let mut state = self.state.lock();
        let state = &mut *state;

        if state.send_all_notes_off {
            for note in 0..128u8 {
                if std::mem::replace(&mut state.held_notes[note as usize], false) {
                    out.push(TimedEvent::new(
                        0,
                        NoteEvent::NoteOff {
                            channel: OUTPUT_CHANNEL,
                            note,
                        },
                    ));
                }
            }
            out.push(TimedEvent::new(
                0,
                NoteEvent::AllNotesOff {
                    channel: OUTPUT_CHANNEL,
                },
            ));
            state.send_all_notes_off = false;
        }

        if !state.active {
            return;
        }
        let Some(plan) = state.plan.as_ref() else {
            return;
        };

        let block_start = state.timeline_sample;
        let block_end = block_start + frames as u64;
        while let Some(event) = plan.events.get(state.schedule_index) {
            if event.sample_position >= block_end {
                break;
            }
            state.schedule_index += 1;
            if event.sample_position < block_start {
                continue;
            }

            let offset = (event.sample_position - block_start) as usize;
            out.push(TimedEvent::new(offset, event.note_event()));
            if event.note_on {
                state.held_notes[event.note as usize] = true;

                let identity = TakeIdentity {
                    root_note: event.note,
                    velocity: event.velocity,
                    velocity_layer: event.velocity_layer,
                    velocity_low: event.velocity_low,
                    velocity_high: event.velocity_high,
                    round_robin_index: event.round_robin,
                };
                state.triggered.push(TriggeredTake {
                    info: TakeInfo::new(
                        identity,
                        &plan.settings,
                        plan.sample_rate,
                        plan.settings.normalize,
                    ),
                });
                debug!(
                    note = event.note,
                    velocity = event.velocity,
                    offset,
                    "Auto-sampler note on"
                );
            } else {
                state.held_notes[event.note as usize] = false;
            }
        }

        state.timeline_sample = block_end;
    }

    /// Records one block of input and returns whether the run is still armed afterwards.
    /// `events` should hold only what [`emit_block_events`] produced for the same block, so
    /// outside notes cannot disturb the run.
    ///
    /// [`emit_block_events`]: AutoSampler::emit_block_events
    pub fn capture_block(
        &self,
        input: &[Vec<f32>],
        frames: usize,
        events: &[TimedEvent],
    ) -> bool {
        let mut state = self.state.lock();
        let state = &mut *state;
        if !state.active || frames == 0 {
            return state.active;
        }
        let Some(capture) = state.capture.as_mut() else {
            return state.active;
        };

        if input.is_empty() {
            state.status = AutoSamplerStatus::NoInput;
        }

        let report = capture.process(input, frames, events, &mut state.completed);
        if let Some(identity) = report.started {
            state.status = AutoSamplerStatus::Capturing {
                note: identity.root_note,
                layer: identity.velocity_layer,
                round_robin: identity.round_robin_index,
            };
        }
        state.captured_takes = capture.captured_takes();
        state.input_detected = capture.input_detected();
        let in_flight = capture.in_flight();

        if report.completed > 0 {
            debug!(
                completed = report.completed,
                captured = state.captured_takes,
                expected = state.expected_takes,
                "Auto-sampler takes completed"
            );
        }

        if state.expected_takes > 0
            && state.captured_takes >= state.expected_takes
            && in_flight == 0
        {
            info!(takes = state.captured_takes, "Auto-sampler finished");
            state.end_run(AutoSamplerStatus::Finished);
        }
        state.active
    }
}

impl fmt::Debug for AutoSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = self.progress();
        f.debug_struct("AutoSampler")
            .field("active", &progress.active)
            .field("captured_takes", &progress.captured_takes)
            .field("expected_takes", &progress.expected_takes)
            .finish()
    }
}

fn sanitize_rate(sample_rate: f64) -> f64 {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        sample_rate
    } else {
        44100.0
    }
}
