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
use std::path::{Path, PathBuf};

use tracing::debug;

use super::take::CompletedTake;
use crate::audio::PcmBuffer;

/// Error types for writing takes to disk.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Writes the take into the folder as a 32-bit float stereo WAV named after the take.
/// Returns the path written.
pub fn write_take(take: &CompletedTake, folder: &Path) -> Result<PathBuf, ExportError> {
    let path = folder.join(take.info.suggested_file_name());
    write_wav(&take.audio, &path)?;
    debug!(path = ?path, frames = take.audio.frames(), "Wrote take");
    Ok(path)
}

/// Writes audio as a 32-bit float stereo WAV. Mono audio is written to both sides and channels
/// past the second are dropped.
pub fn write_wav(audio: &PcmBuffer, path: &Path) -> Result<(), ExportError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let empty: &[f32] = &[];
    let left = if audio.channel_count() > 0 {
        audio.channel(0)
    } else {
        empty
    };
    let right = if audio.channel_count() > 1 {
        audio.channel(1)
    } else {
        left
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for (l, r) in left.iter().zip(right.iter()) {
        writer.write_sample(*l)?;
        writer.write_sample(*r)?;
    }
    writer.finalize()?;
    Ok(())
}
