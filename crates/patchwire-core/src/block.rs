//! Processing blocks.
//!
//! An [`AudioBlock`] is a channel-major buffer sized once in `prepare` for the
//! maximum block length. Per invocation only the first `frames` samples of each
//! channel are live. Storage is never reallocated on the block path.
//!
//! Every block carries one extra row that is always zero. Reads of a channel
//! index past the end return a view of that row, so an out-of-range read is
//! silence rather than a panic.

use crate::bus::BusSet;
use crate::transport::Transport;
use crate::router::Connectivity;

/// Channel-major sample storage for one side of a block invocation.
#[derive(Debug, Clone, Default)]
pub struct AudioBlock {
    channels: usize,
    capacity: usize,
    frames: usize,
    /// `channels + 1` rows of `capacity` samples; the last row stays zero.
    data: Vec<f32>,
}

impl AudioBlock {
    /// Allocates a block of `channels` channels, each `max_frames` long.
    ///
    /// The live length starts at `max_frames`.
    pub fn new(channels: usize, max_frames: usize) -> Self {
        Self {
            channels,
            capacity: max_frames,
            frames: max_frames,
            data: vec![0.0; (channels + 1) * max_frames],
        }
    }

    /// Allocates a block shaped for a bus set.
    pub fn for_buses(buses: &BusSet, max_frames: usize) -> Self {
        Self::new(buses.total_channels(), max_frames)
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Maximum frames per channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live frames per channel for the current invocation.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Sets the live length, clamped to capacity. Returns the applied length.
    pub fn set_frames(&mut self, frames: usize) -> usize {
        self.frames = frames.min(self.capacity);
        self.frames
    }

    #[inline]
    fn row(&self, index: usize) -> core::ops::Range<usize> {
        let start = index * self.capacity;
        start..start + self.frames
    }

    /// Live samples of a channel, or silence if `index` is out of range.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        let row = if index < self.channels {
            index
        } else {
            self.channels
        };
        &self.data[self.row(row)]
    }

    /// Mutable live samples of a channel, or `None` if out of range.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        if index >= self.channels {
            return None;
        }
        let range = self.row(index);
        Some(&mut self.data[range])
    }

    /// Single sample, `0.0` if either index is out of range.
    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channel(channel).get(frame).copied().unwrap_or(0.0)
    }

    /// Copies `samples` into a channel, truncated to the live length.
    ///
    /// Returns the number of samples written (zero for an invalid channel).
    pub fn write_channel(&mut self, index: usize, samples: &[f32]) -> usize {
        match self.channel_mut(index) {
            Some(dst) => {
                let n = dst.len().min(samples.len());
                dst[..n].copy_from_slice(&samples[..n]);
                n
            }
            None => 0,
        }
    }

    /// Fills a channel's live samples with a constant.
    pub fn fill_channel(&mut self, index: usize, value: f32) {
        if let Some(dst) = self.channel_mut(index) {
            dst.fill(value);
        }
    }

    /// Zeroes every channel (full capacity, not just the live length).
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }
}

/// Everything a unit sees during one block invocation.
///
/// Inputs are read-only for the whole call. Units must not keep references
/// into either block once `process` returns; the borrow checker enforces this
/// because the context only lives for the call.
pub struct ProcessContext<'a> {
    inputs: &'a AudioBlock,
    outputs: &'a mut AudioBlock,
    frames: usize,
    sample_rate: f32,
    transport: &'a Transport,
    connectivity: &'a dyn Connectivity,
}

impl<'a> ProcessContext<'a> {
    /// Builds a context for `frames` samples.
    ///
    /// The frame count is clamped to what both blocks can hold, and the
    /// output block's live length is set to match.
    pub fn new(
        inputs: &'a AudioBlock,
        outputs: &'a mut AudioBlock,
        frames: usize,
        sample_rate: f32,
        transport: &'a Transport,
        connectivity: &'a dyn Connectivity,
    ) -> Self {
        let frames = frames.min(inputs.frames()).min(outputs.capacity());
        outputs.set_frames(frames);
        Self {
            inputs,
            outputs,
            frames,
            sample_rate,
            transport,
            connectivity,
        }
    }

    /// Samples in this block.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Sample rate established by `prepare`.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Transport snapshot for this block.
    #[inline]
    pub fn transport(&self) -> &Transport {
        self.transport
    }

    /// Live connectivity of this unit's inputs.
    #[inline]
    pub fn connectivity(&self) -> &dyn Connectivity {
        self.connectivity
    }

    /// Input channel by absolute index (silence if out of range).
    #[inline]
    pub fn input(&self, absolute: usize) -> &[f32] {
        let channel = self.inputs.channel(absolute);
        &channel[..self.frames.min(channel.len())]
    }

    /// Input sample by absolute channel and frame (`0.0` if out of range).
    #[inline]
    pub fn input_sample(&self, absolute: usize, frame: usize) -> f32 {
        if frame >= self.frames {
            return 0.0;
        }
        self.inputs.sample(absolute, frame)
    }

    /// Output channel by absolute index, `None` if out of range.
    #[inline]
    pub fn output(&mut self, absolute: usize) -> Option<&mut [f32]> {
        self.outputs.channel_mut(absolute)
    }

    /// Zeroes every output channel's live samples.
    pub fn silence_outputs(&mut self) {
        for ch in 0..self.outputs.channels() {
            self.outputs.fill_channel(ch, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ConnectionSet;

    #[test]
    fn out_of_range_channel_reads_silence() {
        let mut block = AudioBlock::new(2, 8);
        block.fill_channel(0, 1.0);
        block.fill_channel(1, 2.0);
        assert_eq!(block.channel(5), &[0.0; 8]);
        assert_eq!(block.sample(9, 0), 0.0);
        assert_eq!(block.sample(0, 100), 0.0);
        assert!(block.channel_mut(2).is_none());
    }

    #[test]
    fn silence_row_cannot_be_written() {
        let mut block = AudioBlock::new(1, 4);
        assert_eq!(block.write_channel(1, &[1.0; 4]), 0);
        block.fill_channel(1, 3.0);
        assert_eq!(block.channel(1), &[0.0; 4]);
    }

    #[test]
    fn live_length_is_clamped() {
        let mut block = AudioBlock::new(1, 16);
        assert_eq!(block.set_frames(64), 16);
        assert_eq!(block.set_frames(4), 4);
        assert_eq!(block.channel(0).len(), 4);
    }

    #[test]
    fn unprepared_block_is_silent() {
        let block = AudioBlock::default();
        assert!(block.channel(0).is_empty());
        assert_eq!(block.sample(0, 0), 0.0);
    }

    #[test]
    fn context_clamps_frames_to_storage() {
        let inputs = AudioBlock::new(1, 32);
        let mut outputs = AudioBlock::new(1, 16);
        let transport = Transport::default();
        let connections = ConnectionSet::new(1);
        let ctx = ProcessContext::new(&inputs, &mut outputs, 64, 48000.0, &transport, &connections);
        assert_eq!(ctx.frames(), 16);
        assert_eq!(ctx.input(0).len(), 16);
        assert_eq!(ctx.input_sample(0, 20), 0.0);
    }
}
