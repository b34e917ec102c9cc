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

/// Multi-channel PCM audio held in memory in planar format.
/// Planar format stores all samples for channel 0, then all samples for channel 1, etc.
#[derive(Clone, Debug, PartialEq)]
pub struct PcmBuffer {
    /// One Vec per channel, all of the same length.
    channels: Vec<Vec<f32>>,
    /// Native sample rate of the audio data.
    sample_rate: u32,
}

impl PcmBuffer {
    /// Creates a silent buffer with the given shape.
    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
            sample_rate,
        }
    }

    /// Creates a buffer from planar channel data. Channels are truncated to the shortest one.
    pub fn from_planar(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.truncate(frames);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        if channel_count == 0 {
            return Self::from_planar(Vec::new(), sample_rate);
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Returns the native sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Returns the samples of one channel mutably.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Returns all channels.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Reads a channel at a fractional position, linearly interpolating between the two
    /// nearest stored samples. Positions outside the buffer are clamped to its ends.
    #[inline]
    pub fn read_linear(&self, channel: usize, position: f64) -> f32 {
        let samples = &self.channels[channel];
        let Some(last_index) = samples.len().checked_sub(1) else {
            return 0.0;
        };

        let position = position.clamp(0.0, last_index as f64);
        let index_a = position as usize;
        let index_b = (index_a + 1).min(last_index);
        let fraction = (position - index_a as f64) as f32;

        samples[index_a] + (samples[index_b] - samples[index_a]) * fraction
    }

    /// Returns the largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|channel| channel.iter())
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
    }

    /// Multiplies every sample by the given gain.
    pub fn apply_gain(&mut self, gain: f32) {
        for sample in self.channels.iter_mut().flat_map(|c| c.iter_mut()) {
            *sample *= gain;
        }
    }

    /// Shortens every channel to the given number of frames.
    pub fn truncate(&mut self, frames: usize) {
        for channel in self.channels.iter_mut() {
            channel.truncate(frames);
        }
    }

    /// Returns the memory size of the sample data in bytes.
    pub fn memory_size(&self) -> usize {
        self.channel_count() * self.frames() * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved() {
        let buffer = PcmBuffer::from_interleaved(&[1.0, -1.0, 0.5, -0.5, 0.25], 2, 44100);
        assert_eq!(2, buffer.channel_count());
        assert_eq!(2, buffer.frames());
        assert_eq!(&[1.0, 0.5], buffer.channel(0));
        assert_eq!(&[-1.0, -0.5], buffer.channel(1));
    }

    #[test]
    fn test_read_linear() {
        let buffer = PcmBuffer::from_planar(vec![vec![0.0, 1.0, 0.0]], 44100);
        assert_eq!(0.0, buffer.read_linear(0, 0.0));
        assert_eq!(0.5, buffer.read_linear(0, 0.5));
        assert_eq!(1.0, buffer.read_linear(0, 1.0));
        assert_eq!(0.25, buffer.read_linear(0, 1.75));
        // Clamped at both ends.
        assert_eq!(0.0, buffer.read_linear(0, -3.0));
        assert_eq!(0.0, buffer.read_linear(0, 10.0));
    }

    #[test]
    fn test_peak_gain_truncate() {
        let mut buffer = PcmBuffer::from_planar(vec![vec![0.1, -0.5], vec![0.25, 0.0]], 48000);
        assert_eq!(0.5, buffer.peak());
        buffer.apply_gain(2.0);
        assert_eq!(1.0, buffer.peak());
        buffer.truncate(1);
        assert_eq!(1, buffer.frames());
        assert_eq!(0.5, buffer.peak());
    }
}
