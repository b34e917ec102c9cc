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
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::library::ZoneLibrary;
use super::loader::ZoneLoader;
use super::metadata::ZoneMetadata;

/// Error types for saving and loading zone state.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),
}

/// A single persisted zone.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ZoneStateEntry {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// The zone's metadata at the time it was saved.
    pub metadata: ZoneMetadata,
}

/// The persisted zone list, in library order.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ZoneState {
    pub zones: Vec<ZoneStateEntry>,
}

impl ZoneState {
    /// Captures the zones of a library.
    pub fn from_library(library: &ZoneLibrary) -> ZoneState {
        ZoneState {
            zones: library
                .zones()
                .iter()
                .map(|zone| ZoneStateEntry {
                    path: absolute(zone.source_path()),
                    metadata: *zone.metadata(),
                })
                .collect(),
        }
    }

    /// Serializes the state to YAML.
    pub fn to_yaml(&self) -> Result<String, PersistError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Parses state from YAML.
    pub fn from_yaml(yaml: &str) -> Result<ZoneState, PersistError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Writes the state to a YAML file.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        fs::write(path, self.to_yaml()?)?;
        info!(path = ?path, zones = self.zones.len(), "Saved zone state");
        Ok(())
    }

    /// Reads state from a YAML file.
    pub fn load(path: &Path) -> Result<ZoneState, PersistError> {
        ZoneState::from_yaml(&fs::read_to_string(path)?)
    }

    /// Rebuilds the library from this state. Missing files are dropped and the
    /// rest are reloaded with their saved metadata. If nothing can be loaded the
    /// library is cleared.
    pub fn restore(&self, loader: &ZoneLoader) -> Arc<ZoneLibrary> {
        let metadata_by_path: HashMap<&Path, ZoneMetadata> = self
            .zones
            .iter()
            .map(|entry| (entry.path.as_path(), entry.metadata))
            .collect();

        let mut paths = Vec::with_capacity(self.zones.len());
        for entry in &self.zones {
            if !entry.path.is_file() {
                warn!(path = ?entry.path, "Dropping missing zone file");
            } else if !paths.contains(&entry.path) {
                paths.push(entry.path.clone());
            }
        }

        let zones = if paths.is_empty() {
            Vec::new()
        } else {
            match loader.decode_all(&paths, |path| {
                metadata_by_path.get(path).copied().unwrap_or_default()
            }) {
                Ok(zones) => zones,
                Err(e) => {
                    warn!(err = %e, "No saved zones could be restored");
                    Vec::new()
                }
            }
        };

        let library = loader.library().publish(zones);
        info!(
            saved = self.zones.len(),
            restored = library.len(),
            "Restored zone state"
        );
        library
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
