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

//! Zone loading from files and folders.
//!
//! Every operation builds a complete replacement library before publishing it, so a failed
//! load never disturbs what the render thread is playing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::library::{LibraryHandle, Zone, ZoneLibrary};
use super::metadata::ZoneMetadata;
use crate::audio::{DecodeError, Decoder, PcmBuffer};
use crate::autosampler::export::{write_take, ExportError};
use crate::autosampler::CompletedTake;
use crate::util::filename_display;

/// File extensions the loader picks up from folders.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["wav", "aif", "aiff", "flac", "ogg"];

/// Zones shorter than this are rejected.
const MIN_ZONE_FRAMES: usize = 2;

/// Error types for zone loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("No supported audio files found in {0}")]
    NoSupportedFiles(PathBuf),

    #[error("None of the {0} selected file(s) exist with a supported extension")]
    NoSelectedFiles(usize),

    #[error("None of the {0} file(s) could be read")]
    NoReadableFiles(usize),

    #[error("None of the {0} file(s) contained enough audio to play")]
    NoReadableAudio(usize),

    #[error("Zone index {index} is out of range (library has {len} zones)")]
    InvalidZoneIndex { index: usize, len: usize },

    #[error("Unable to export take: {0}")]
    Export(#[from] ExportError),
}

/// Why a single file could not become a zone.
#[derive(Debug)]
enum ZoneFileError {
    Decode(DecodeError),
    TooShort(usize),
}

/// Loads zones and publishes them through a library handle.
pub struct ZoneLoader {
    decoder: Arc<dyn Decoder>,
    library: LibraryHandle,
}

impl ZoneLoader {
    /// Creates a loader that publishes into the given handle.
    pub fn new(decoder: Arc<dyn Decoder>, library: LibraryHandle) -> ZoneLoader {
        ZoneLoader { decoder, library }
    }

    /// The handle this loader publishes to.
    pub fn library(&self) -> &LibraryHandle {
        &self.library
    }

    /// Replaces the library with zones decoded from the given files.
    /// Duplicate paths, missing files and unsupported extensions are dropped and the rest are
    /// loaded in path order. Files that cannot be read are skipped. If none can be read the
    /// library is left alone.
    pub fn load_files(&self, paths: &[PathBuf]) -> Result<Arc<ZoneLibrary>, LoadError> {
        let selected = select_files(paths);
        if selected.is_empty() {
            return Err(LoadError::NoSelectedFiles(paths.len()));
        }

        let zones = self.decode_all(&selected, |path| {
            ZoneMetadata::from_file_name(file_stem(path))
        })?;
        let library = self.library.publish(zones);
        info!(
            zones = library.len(),
            files = selected.len(),
            generation = library.generation(),
            "Loaded zones"
        );
        Ok(library)
    }

    /// Replaces the library with every supported file under the folder, recursively.
    pub fn load_folder(&self, folder: &Path) -> Result<Arc<ZoneLibrary>, LoadError> {
        if !folder.is_dir() {
            return Err(LoadError::NotADirectory(folder.to_path_buf()));
        }

        let mut paths = Vec::new();
        collect_supported_files(folder, &mut paths);
        paths.sort();
        if paths.is_empty() {
            return Err(LoadError::NoSupportedFiles(folder.to_path_buf()));
        }

        info!(folder = ?folder, files = paths.len(), "Loading zone folder");
        self.load_files(&paths)
    }

    /// Publishes an empty library.
    pub fn clear(&self) -> Arc<ZoneLibrary> {
        info!("Clearing zones");
        self.library.clear()
    }

    /// Replaces the metadata of the zone at the given index in the current library.
    pub fn set_zone_metadata(
        &self,
        index: usize,
        metadata: ZoneMetadata,
    ) -> Result<Arc<ZoneLibrary>, LoadError> {
        let current = self.library.load();
        let Some(zone) = current.zones().get(index) else {
            return Err(LoadError::InvalidZoneIndex {
                index,
                len: current.len(),
            });
        };

        let mut zones = current.zones().to_vec();
        zones[index] = Arc::new(zone.with_metadata(metadata));
        debug!(index, zone = zone.name(), metadata = ?metadata, "Edited zone metadata");
        Ok(self.library.publish(zones))
    }

    /// Writes completed takes into the folder and adds them to the current library.
    pub fn import_takes(
        &self,
        takes: &[CompletedTake],
        folder: &Path,
    ) -> Result<Arc<ZoneLibrary>, LoadError> {
        fs::create_dir_all(folder).map_err(ExportError::from)?;

        let current = self.library.load();
        let mut zones = current.zones().to_vec();
        for take in takes {
            let path = write_take(take, folder)?;
            zones.push(Arc::new(Zone::new(
                path,
                take.info
                    .suggested_file_name()
                    .trim_end_matches(".wav")
                    .to_string(),
                Arc::new(take.audio.clone()),
                take.zone_metadata(),
            )));
        }

        let library = self.library.publish(zones);
        info!(
            takes = takes.len(),
            zones = library.len(),
            folder = ?folder,
            "Imported takes"
        );
        Ok(library)
    }

    /// Decodes the given files, using the metadata function to describe each zone.
    pub(crate) fn decode_all<F>(
        &self,
        paths: &[PathBuf],
        metadata_for: F,
    ) -> Result<Vec<Arc<Zone>>, LoadError>
    where
        F: Fn(&Path) -> ZoneMetadata,
    {
        let mut zones = Vec::with_capacity(paths.len());
        let mut decode_failures = 0;

        for path in paths {
            match self.load_zone(path, metadata_for(path)) {
                Ok(zone) => zones.push(Arc::new(zone)),
                Err(ZoneFileError::Decode(e)) => {
                    decode_failures += 1;
                    warn!(path = ?path, err = %e, "Skipping unreadable file");
                }
                Err(ZoneFileError::TooShort(frames)) => {
                    warn!(path = ?path, frames, "Skipping file with too little audio");
                }
            }
        }

        if zones.is_empty() {
            return Err(if decode_failures == paths.len() {
                LoadError::NoReadableFiles(paths.len())
            } else {
                LoadError::NoReadableAudio(paths.len())
            });
        }
        Ok(zones)
    }

    fn load_zone(&self, path: &Path, metadata: ZoneMetadata) -> Result<Zone, ZoneFileError> {
        let audio: PcmBuffer = self.decoder.decode(path).map_err(ZoneFileError::Decode)?;
        if audio.frames() < MIN_ZONE_FRAMES {
            return Err(ZoneFileError::TooShort(audio.frames()));
        }

        debug!(
            file = filename_display(path),
            channels = audio.channel_count(),
            frames = audio.frames(),
            sample_rate = audio.sample_rate(),
            "Decoded zone"
        );
        Ok(Zone::new(
            path.to_path_buf(),
            file_stem(path).to_string(),
            Arc::new(audio),
            metadata,
        ))
    }
}

impl std::fmt::Debug for ZoneLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneLoader")
            .field("library", &self.library)
            .finish()
    }
}

/// Returns true if the path has one of the supported audio extensions.
pub fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Existing supported files from the selection, sorted by path with duplicates removed.
fn select_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut selected: Vec<PathBuf> = paths
        .iter()
        .filter(|path| {
            let usable = path.is_file() && is_supported_file(path);
            if !usable {
                debug!(path = ?path, "Ignoring missing or unsupported file");
            }
            usable
        })
        .cloned()
        .collect();
    selected.sort();
    selected.dedup();
    selected
}

fn collect_supported_files(folder: &Path, paths: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(folder = ?folder, err = %e, "Unable to read folder");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_supported_files(&path, paths);
        } else if is_supported_file(&path) {
            paths.push(path);
        }
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("zone")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SymphoniaDecoder;
    use crate::testutil::{audio_test_utils::generate_ramp, write_wav};

    fn loader() -> ZoneLoader {
        ZoneLoader::new(Arc::new(SymphoniaDecoder), LibraryHandle::new())
    }

    fn write_zone(folder: &Path, name: &str, frames: usize) -> PathBuf {
        let path = folder.join(name);
        write_wav(path.clone(), vec![generate_ramp(frames)], 44100).unwrap();
        path
    }

    #[test]
    fn test_load_folder_recurses_and_parses_names() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        write_zone(dir.path(), "Piano_C4_rr1.wav", 32);
        write_zone(&nested, "Piano_C4_rr2.WAV", 32);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = loader();
        let library = loader.load_folder(dir.path()).unwrap();
        assert_eq!(2, library.len());
        assert_eq!("Piano_C4_rr1", library.zones()[0].name());
        assert_eq!(2, library.zones()[1].metadata().round_robin_index);
        assert_eq!(60, library.zones()[1].metadata().root_note);
        assert_eq!(library.generation(), loader.library().load().generation());
    }

    #[test]
    fn test_failed_load_keeps_library() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_zone(dir.path(), "good.wav", 16);
        let short = write_zone(dir.path(), "short.wav", 1);
        let broken = dir.path().join("broken.wav");
        fs::write(&broken, b"nope").unwrap();

        let loader = loader();
        let before = loader.load_files(&[good.clone(), broken.clone()]).unwrap();
        assert_eq!(1, before.len());

        let result = loader.load_files(std::slice::from_ref(&broken));
        assert!(matches!(result, Err(LoadError::NoReadableFiles(1))));
        let result = loader.load_files(&[broken, short]);
        assert!(matches!(result, Err(LoadError::NoReadableAudio(2))));

        assert_eq!(before.generation(), loader.library().load().generation());
        assert_eq!(1, loader.library().load().len());
    }

    #[test]
    fn test_load_files_selects_unique_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        let b = write_zone(dir.path(), "b_n62.wav", 16);
        let a = write_zone(dir.path(), "a_n60.wav", 16);
        let text = dir.path().join("c.txt");
        fs::write(&text, "ignored").unwrap();
        let missing = dir.path().join("missing.wav");

        let loader = loader();
        let library = loader
            .load_files(&[b.clone(), a.clone(), b.clone(), text.clone(), missing.clone(), a])
            .unwrap();
        assert_eq!(2, library.len());
        assert_eq!("a_n60", library.zones()[0].name());
        assert_eq!("b_n62", library.zones()[1].name());

        let generation = library.generation();
        let result = loader.load_files(&[text, missing]);
        assert!(matches!(result, Err(LoadError::NoSelectedFiles(2))));
        assert_eq!(generation, loader.library().load().generation());

        let library = loader.load_files(&[b.clone(), b]).unwrap();
        assert_eq!(1, library.len());
    }

    #[test]
    fn test_folder_errors() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader();

        let file = write_zone(dir.path(), "a.wav", 8);
        assert!(matches!(
            loader.load_folder(&file),
            Err(LoadError::NotADirectory(_))
        ));

        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();
        assert!(matches!(
            loader.load_folder(&empty),
            Err(LoadError::NoSupportedFiles(_))
        ));
    }

    #[test]
    fn test_set_zone_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zone(dir.path(), "a_n60.wav", 8);
        let loader = loader();
        let original = loader.load_files(&[path]).unwrap();

        let edited = loader
            .set_zone_metadata(
                0,
                ZoneMetadata {
                    root_note: 72,
                    low_note: 80,
                    high_note: 70,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(72, edited.zones()[0].metadata().root_note);
        assert_eq!(70, edited.zones()[0].metadata().low_note);
        assert_eq!(80, edited.zones()[0].metadata().high_note);
        // The previous snapshot is untouched.
        assert_eq!(60, original.zones()[0].metadata().root_note);

        let result = loader.set_zone_metadata(5, ZoneMetadata::default());
        assert!(matches!(
            result,
            Err(LoadError::InvalidZoneIndex { index: 5, len: 1 })
        ));
        assert_eq!(edited.generation(), loader.library().load().generation());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zone(dir.path(), "a.wav", 8);
        let loader = loader();
        loader.load_files(&[path]).unwrap();
        assert!(loader.clear().is_empty());
        assert!(loader.library().load().is_empty());
    }

    #[test]
    fn test_import_takes() {
        use crate::autosampler::{AutoSamplerSettings, TakeIdentity, TakeInfo};

        let dir = tempfile::tempdir().unwrap();
        let existing = write_zone(dir.path(), "pad_c3.wav", 16);
        let loader = loader();
        loader.load_files(&[existing]).unwrap();

        let take = CompletedTake {
            info: TakeInfo::new(
                TakeIdentity {
                    root_note: 62,
                    velocity: 96,
                    velocity_layer: 2,
                    velocity_low: 65,
                    velocity_high: 127,
                    round_robin_index: 1,
                },
                &AutoSamplerSettings::default(),
                44100.0,
                true,
            ),
            audio: PcmBuffer::from_planar(vec![generate_ramp(32), generate_ramp(32)], 44100),
        };

        let takes_dir = dir.path().join("takes");
        let library = loader
            .import_takes(std::slice::from_ref(&take), &takes_dir)
            .unwrap();
        assert_eq!(2, library.len());
        assert!(takes_dir.join("AUTO_D4_V2_RR1.wav").is_file());

        let imported = library
            .zones()
            .iter()
            .find(|z| z.name() == "AUTO_D4_V2_RR1")
            .unwrap();
        assert_eq!(&take.zone_metadata(), imported.metadata());
        assert_eq!(32, imported.audio().frames());
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_file(Path::new("a.wav")));
        assert!(is_supported_file(Path::new("a.AIFF")));
        assert!(is_supported_file(Path::new("a.flac")));
        assert!(!is_supported_file(Path::new("a.mp4")));
        assert!(!is_supported_file(Path::new("wav")));
    }
}
