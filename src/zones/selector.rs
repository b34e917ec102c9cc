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

//! Zone selection with per-note round-robin cycling.

use std::sync::Arc;

use super::library::{Zone, ZoneLibrary};

/// Round-robin counters wrap here so they never grow without bound.
const ROUND_ROBIN_MODULUS: u32 = 8192;

/// Picks the zone to play for a note and velocity.
///
/// Round-robin counters belong to the library generation they were advanced under and are
/// reset when a different generation is passed in.
pub struct ZoneSelector {
    counters: [u32; 128],
    generation: u64,
    candidates: Vec<usize>,
}

impl ZoneSelector {
    /// Creates a selector with room for the given number of candidates before it
    /// needs to grow its scratch space.
    pub fn new(capacity: usize) -> ZoneSelector {
        ZoneSelector {
            counters: [0; 128],
            generation: 0,
            candidates: Vec::with_capacity(capacity),
        }
    }

    /// Clears every round-robin counter.
    pub fn reset(&mut self) {
        self.counters = [0; 128];
    }

    /// Returns the zone for the note and velocity, or None if the library is empty.
    pub fn pick_zone(
        &mut self,
        library: &ZoneLibrary,
        note: u8,
        velocity: u8,
    ) -> Option<Arc<Zone>> {
        if library.generation() != self.generation {
            self.generation = library.generation();
            self.reset();
        }

        let zones = library.zones();
        if zones.is_empty() {
            return None;
        }
        let note = note.min(127);

        self.candidates.clear();
        self.candidates.extend(zones.iter().enumerate().filter_map(|(index, zone)| {
            let metadata = zone.metadata();
            (metadata.contains_note(note) && metadata.contains_velocity(velocity)).then_some(index)
        }));
        if self.candidates.is_empty() {
            self.candidates.extend(
                zones
                    .iter()
                    .enumerate()
                    .filter_map(|(index, zone)| zone.metadata().contains_note(note).then_some(index)),
            );
        }
        if self.candidates.is_empty() {
            return nearest_root(zones, note);
        }

        self.candidates.sort_unstable_by(|&a, &b| {
            let (za, zb) = (&zones[a], &zones[b]);
            let (ma, mb) = (za.metadata(), zb.metadata());
            ma.round_robin_index
                .cmp(&mb.round_robin_index)
                .then(ma.low_velocity.cmp(&mb.low_velocity))
                .then_with(|| za.name().cmp(zb.name()))
                .then(a.cmp(&b))
        });

        let counter = &mut self.counters[note as usize];
        let chosen = self.candidates[*counter as usize % self.candidates.len()];
        *counter = (*counter + 1) % ROUND_ROBIN_MODULUS;

        Some(zones[chosen].clone())
    }
}

impl Default for ZoneSelector {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Returns the first zone whose root is closest to the note.
fn nearest_root(zones: &[Arc<Zone>], note: u8) -> Option<Arc<Zone>> {
    let mut best: Option<(&Arc<Zone>, u8)> = None;
    for zone in zones {
        let distance = zone.metadata().root_note.abs_diff(note);
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((zone, distance));
        }
    }
    best.map(|(zone, _)| zone.clone())
}
