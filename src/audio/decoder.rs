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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::buffer::PcmBuffer;

/// The most channels a zone keeps. Extra channels are dropped at decode time.
pub const MAX_ZONE_CHANNELS: usize = 2;

/// Error types for decoding audio files.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio file error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("Unsupported audio file '{0}': {1}")]
    Unsupported(String, String),

    #[error("No audio track found in '{0}'")]
    NoAudioTrack(String),
}

/// Turns a file into in-memory PCM. The engine never looks at container bytes itself.
pub trait Decoder: Send + Sync {
    /// Decodes the whole file into a planar buffer at its native sample rate.
    fn decode(&self, path: &Path) -> Result<PcmBuffer, DecodeError>;
}

/// Decodes WAV, AIFF, FLAC, Ogg and the other formats symphonia supports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    /// Helper function to read the next packet with common error handling.
    /// Returns `Ok(None)` at end of stream.
    fn read_next_packet(
        format_reader: &mut dyn FormatReader,
    ) -> Result<Option<Packet>, DecodeError> {
        match format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            // Some demuxers report the end of the stream as a decode error.
            Err(SymphoniaError::DecodeError(_)) => Ok(None),
            Err(e) => Err(DecodeError::Audio(e)),
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<PcmBuffer, DecodeError> {
        let file_path = path.to_string_lossy().to_string();
        let file = File::open(path).map_err(|e| {
            DecodeError::Io(std::io::Error::new(e.kind(), format!("{}: {}", file_path, e)))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| DecodeError::Unsupported(file_path.clone(), e.to_string()))?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::NoAudioTrack(file_path.clone()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let mut decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(file_path.clone(), e.to_string()))?;

        let mut sample_rate = params.sample_rate.unwrap_or(0);
        let mut planar: Vec<Vec<f32>> = Vec::new();

        loop {
            let packet = match Self::read_next_packet(format_reader.as_mut()) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(DecodeError::Audio(SymphoniaError::ResetRequired)) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // A corrupt packet is skipped; the rest of the file may still be usable.
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!(path = file_path, error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(DecodeError::Audio(e)),
            };

            let spec = *decoded.spec();
            if sample_rate == 0 {
                sample_rate = spec.rate;
            }

            let mut converted = AudioBuffer::<f32>::new(decoded.capacity() as u64, spec);
            decoded.convert(&mut converted);

            let channels = converted.spec().channels.count().min(MAX_ZONE_CHANNELS);
            if planar.is_empty() {
                planar = vec![Vec::new(); channels];
            }
            for (index, channel) in planar.iter_mut().enumerate() {
                let source = index.min(channels.saturating_sub(1));
                channel.extend_from_slice(converted.chan(source));
            }
        }

        if planar.is_empty() {
            return Err(DecodeError::Unsupported(
                file_path,
                "no audio frames decoded".to_string(),
            ));
        }

        Ok(PcmBuffer::from_planar(
            planar,
            if sample_rate > 0 { sample_rate } else { 44100 },
        ))
    }
}
