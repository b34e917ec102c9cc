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

use super::*;
use crate::autosampler::{AutoSampler, AutoSamplerSettings};
use crate::zones::library::tests::zone;
use crate::zones::{LibraryHandle, ZoneMetadata};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 256;

fn full_range(root_note: u8, round_robin_index: u32) -> ZoneMetadata {
    ZoneMetadata {
        root_note,
        low_note: 0,
        high_note: 127,
        round_robin_index,
        ..Default::default()
    }
}

fn engine(library: &LibraryHandle) -> Engine {
    Engine::new(
        library.clone(),
        Arc::new(Controls::new()),
        Arc::new(AutoSampler::new(SAMPLE_RATE)),
        SAMPLE_RATE,
        8,
    )
}

fn note_on(offset: usize, note: u8) -> TimedEvent {
    TimedEvent::new(
        offset,
        NoteEvent::NoteOn {
            channel: 1,
            note,
            velocity: 100,
        },
    )
}

fn note_off(offset: usize, note: u8) -> TimedEvent {
    TimedEvent::new(offset, NoteEvent::NoteOff { channel: 1, note })
}

fn process(
    engine: &mut Engine,
    input: &[Vec<f32>],
    incoming: &[TimedEvent],
) -> (Vec<Vec<f32>>, Vec<TimedEvent>) {
    let mut output = vec![vec![1.0f32; BLOCK]; 2];
    let mut outgoing = Vec::new();
    engine.process_block(input, &mut output, BLOCK, incoming, &mut outgoing);
    (output, outgoing)
}

fn newest_zone_name(engine: &Engine) -> String {
    engine
        .pool()
        .voices()
        .iter()
        .filter(|v| v.is_active())
        .max_by_key(|v| v.age())
        .and_then(|v| v.zone())
        .map(|z| z.name().to_string())
        .unwrap_or_default()
}

#[test]
fn test_round_robin_alternates() {
    let library = LibraryHandle::new();
    library.publish(vec![
        zone("rr2", full_range(60, 2)),
        zone("rr1", full_range(60, 1)),
    ]);
    let mut engine = engine(&library);

    let mut names = Vec::new();
    for _ in 0..3 {
        process(&mut engine, &[], &[note_on(0, 60), note_off(10, 60)]);
        names.push(newest_zone_name(&engine));
    }
    assert_eq!(vec!["rr1", "rr2", "rr1"], names);
}

#[test]
fn test_envelope_reaches_sustain() {
    let library = LibraryHandle::new();
    library.publish(vec![zone("pad", full_range(60, 1))]);
    let mut engine = engine(&library);
    engine.controls().set(ControlId::AttackMs, 1.0);
    engine.controls().set(ControlId::DecayMs, 1.0);
    engine.controls().set(ControlId::Sustain, 0.5);

    let (output, _) = process(&mut engine, &[], &[note_on(0, 60)]);
    // 48 frames of attack and 48 of decay fit easily in one block.
    let voice = engine
        .pool()
        .voices()
        .iter()
        .find(|v| v.is_active())
        .unwrap();
    assert_eq!(0.5, voice.envelope_level());
    assert!(output[0].iter().any(|s| *s != 0.0));
    assert_eq!(output[0], output[1]);
}

#[test]
fn test_release_finishes() {
    let library = LibraryHandle::new();
    library.publish(vec![zone("pluck", full_range(60, 1))]);
    let mut engine = engine(&library);
    engine.controls().set(ControlId::ReleaseMs, 1.0);

    process(&mut engine, &[], &[note_on(0, 60)]);
    assert_eq!(1, engine.active_voices());

    let (output, _) = process(&mut engine, &[], &[note_off(0, 60)]);
    assert_eq!(0, engine.active_voices());
    assert!(output[0][100..].iter().all(|s| *s == 0.0));
}

#[test]
fn test_library_change_stops_voices() {
    let library = LibraryHandle::new();
    library.publish(vec![zone("a", full_range(60, 1))]);
    let mut engine = engine(&library);

    process(&mut engine, &[], &[note_on(0, 60), note_on(0, 64)]);
    assert_eq!(2, engine.active_voices());

    library.publish(vec![zone("b", full_range(60, 1))]);
    let (output, _) = process(&mut engine, &[], &[]);
    assert_eq!(0, engine.active_voices());
    assert!(output.iter().flatten().all(|s| *s == 0.0));
}

#[test]
fn test_missing_zone_is_silent() {
    let library = LibraryHandle::new();
    let mut engine = engine(&library);
    let (output, outgoing) = process(&mut engine, &[], &[note_on(0, 60)]);
    assert_eq!(0, engine.active_voices());
    assert!(output.iter().flatten().all(|s| *s == 0.0));
    assert_eq!(vec![note_on(0, 60)], outgoing);
}

#[test]
fn test_events_split_rendering() {
    let library = LibraryHandle::new();
    library.publish(vec![zone("a", full_range(60, 1))]);
    let mut engine = engine(&library);
    engine.controls().set(ControlId::AttackMs, 0.0);

    let (output, _) = process(&mut engine, &[], &[note_on(100, 60)]);
    assert!(output[0][..100].iter().all(|s| *s == 0.0));
    // The ramp zone starts at zero, so the first audible frame is the one after the note on.
    assert_eq!(0.0, output[0][100]);
    assert!(output[0][101] > 0.0);
}

#[test]
fn test_deterministic() {
    let render = || {
        let library = LibraryHandle::new();
        library.publish(vec![
            zone("a", full_range(60, 1)),
            zone("b", full_range(64, 1)),
        ]);
        let mut engine = engine(&library);
        engine.controls().set(ControlId::FilterEnabled, 1.0);
        engine.controls().set(ControlId::FilterEnvAmount, 2.0);

        let blocks = [
            vec![note_on(0, 60), note_on(17, 67)],
            vec![note_off(30, 60)],
            vec![note_on(5, 55), note_off(200, 67)],
            vec![],
        ];
        blocks
            .iter()
            .flat_map(|events| process(&mut engine, &[], events).0)
            .collect::<Vec<_>>()
    };
    assert_eq!(render(), render());
}

#[test]
fn test_monitor_input_while_armed() {
    let library = LibraryHandle::new();
    let mut engine = engine(&library);
    let input = vec![vec![0.25f32; BLOCK]];

    // Not armed: nothing is passed through.
    let (output, _) = process(&mut engine, &input, &[]);
    assert!(output.iter().flatten().all(|s| *s == 0.0));

    let settings = AutoSamplerSettings {
        start_note: 60,
        end_note: 60,
        sustain_ms: 100.0,
        release_tail_ms: 10.0,
        ..Default::default()
    };
    engine.autosampler().start(&settings).unwrap();

    let incoming = [TimedEvent::new(
        5,
        NoteEvent::NoteOn {
            channel: 2,
            note: 40,
            velocity: 90,
        },
    )];
    let (output, outgoing) = process(&mut engine, &input, &incoming);
    assert!(output.iter().flatten().all(|s| *s == 0.25));
    assert_eq!(
        vec![
            TimedEvent::new(
                0,
                NoteEvent::NoteOn {
                    channel: 1,
                    note: 60,
                    velocity: 64
                }
            ),
            incoming[0],
        ],
        outgoing
    );

    engine.set_monitor_input(false);
    let (output, _) = process(&mut engine, &input, &[]);
    assert!(output.iter().flatten().all(|s| *s == 0.0));
}

#[test]
fn test_outside_notes_do_not_capture() {
    let library = LibraryHandle::new();
    let mut engine = engine(&library);
    let settings = AutoSamplerSettings {
        start_note: 72,
        end_note: 72,
        sustain_ms: 1.0,
        release_tail_ms: 0.0,
        preroll_ms: 0.0,
        ..Default::default()
    };
    engine.autosampler().start(&settings).unwrap();

    let input = vec![vec![0.5f32; BLOCK]; 2];
    // An incoming note on for the planned note must not open a second take.
    process(&mut engine, &input, &[note_on(10, 72)]);
    let takes = engine.autosampler().pop_completed_takes();
    assert_eq!(1, takes.len());
    assert_eq!(1, takes[0].info.identity.round_robin_index);
    assert!(!engine.autosampler().is_active());
}
