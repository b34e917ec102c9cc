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

//! Immutable zone library snapshots and their lock-free publication.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::metadata::{zone_naming_hint, ZoneMetadata};
use crate::audio::PcmBuffer;
use crate::util::note_name;

/// How many zones the summary lists before eliding the rest.
const SUMMARY_ROWS: usize = 96;

/// A loaded sample and the key/velocity/round-robin range it responds to.
pub struct Zone {
    source_path: PathBuf,
    name: String,
    audio: Arc<PcmBuffer>,
    metadata: ZoneMetadata,
}

impl Zone {
    /// Creates a new zone. The metadata is sanitized.
    pub fn new(
        source_path: PathBuf,
        name: String,
        audio: Arc<PcmBuffer>,
        metadata: ZoneMetadata,
    ) -> Zone {
        Zone {
            source_path,
            name,
            audio,
            metadata: metadata.sanitized(),
        }
    }

    /// Returns a new zone sharing this zone's audio with different metadata.
    pub fn with_metadata(&self, metadata: ZoneMetadata) -> Zone {
        Zone::new(
            self.source_path.clone(),
            self.name.clone(),
            self.audio.clone(),
            metadata,
        )
    }

    /// The file this zone was loaded from.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// The display name of the zone.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The decoded audio of the zone.
    pub fn audio(&self) -> &PcmBuffer {
        &self.audio
    }

    /// The zone's metadata.
    pub fn metadata(&self) -> &ZoneMetadata {
        &self.metadata
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("channels", &self.audio.channel_count())
            .field("frames", &self.audio.frames())
            .field("sample_rate", &self.audio.sample_rate())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// An immutable, sorted set of zones. Replaced wholesale, never edited in place.
#[derive(Debug, Default)]
pub struct ZoneLibrary {
    zones: Vec<Arc<Zone>>,
    summary: String,
    generation: u64,
}

impl ZoneLibrary {
    /// Builds a library from the given zones, sorting them by root, low velocity, round robin
    /// and name.
    pub fn new(mut zones: Vec<Arc<Zone>>, generation: u64) -> ZoneLibrary {
        zones.sort_by(|a, b| {
            let (ma, mb) = (a.metadata(), b.metadata());
            ma.root_note
                .cmp(&mb.root_note)
                .then(ma.low_velocity.cmp(&mb.low_velocity))
                .then(ma.round_robin_index.cmp(&mb.round_robin_index))
                .then_with(|| a.name().cmp(b.name()))
        });
        let summary = build_summary(&zones);

        ZoneLibrary {
            zones,
            summary,
            generation,
        }
    }

    /// The zones in sorted order.
    pub fn zones(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    /// The number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether the library holds no zones.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// A human readable listing of the zones.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// The generation this snapshot was published as.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn build_summary(zones: &[Arc<Zone>]) -> String {
    if zones.is_empty() {
        return format!("No zones loaded.\n\n{}", zone_naming_hint());
    }

    let mut summary = format!("{} zone(s) loaded.\n", zones.len());
    for zone in zones.iter().take(SUMMARY_ROWS) {
        let metadata = zone.metadata();
        let _ = writeln!(
            summary,
            "{}  root {} ({})  keys {}-{}  vel {}-{}  rr {}",
            zone.name(),
            note_name(metadata.root_note),
            metadata.root_note,
            metadata.low_note,
            metadata.high_note,
            metadata.low_velocity,
            metadata.high_velocity,
            metadata.round_robin_index,
        );
    }
    if zones.len() > SUMMARY_ROWS {
        let _ = writeln!(summary, "... and {} more zones", zones.len() - SUMMARY_ROWS);
    }
    summary.push('\n');
    summary.push_str(zone_naming_hint());
    summary
}

/// Shared handle through which libraries are published to the render thread.
///
/// Publication is a single atomic pointer swap. Readers load one snapshot and keep it
/// for as long as they need; replaced snapshots are freed when their last reader drops them.
#[derive(Clone)]
pub struct LibraryHandle {
    current: Arc<ArcSwap<ZoneLibrary>>,
    next_generation: Arc<AtomicU64>,
}

impl LibraryHandle {
    /// Creates a handle holding an empty library at generation 0.
    pub fn new() -> LibraryHandle {
        LibraryHandle {
            current: Arc::new(ArcSwap::from_pointee(ZoneLibrary::new(Vec::new(), 0))),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<ZoneLibrary> {
        self.current.load_full()
    }

    /// Publishes a new library built from the given zones and returns it.
    pub fn publish(&self, zones: Vec<Arc<Zone>>) -> Arc<ZoneLibrary> {
        let generation = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let library = Arc::new(ZoneLibrary::new(zones, generation));
        self.current.store(library.clone());
        library
    }

    /// Publishes an empty library.
    pub fn clear(&self) -> Arc<ZoneLibrary> {
        self.publish(Vec::new())
    }
}

impl Default for LibraryHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let library = self.current.load();
        f.debug_struct("LibraryHandle")
            .field("generation", &library.generation())
            .field("zones", &library.len())
            .finish()
    }
}
