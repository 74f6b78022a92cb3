//! Offline block runner.
//!
//! [`BlockRunner`] drives a single unit the way a real-time host would:
//! prepare once, then one `process` call per block with preallocated input
//! and output blocks, a transport snapshot, and the live connection set read
//! from a snapshot. It is what the CLI renders with and what integration tests
//! use; it does not order multiple units.

use std::sync::Arc;

use crate::block::{AudioBlock, ProcessContext};
use crate::router::ConnectionSet;
use crate::snapshot::SnapshotSwap;
use crate::transport::{Transport, TransportClock};
use crate::unit::ProcessingUnit;

/// Drives one unit block by block.
#[derive(Debug)]
pub struct BlockRunner {
    sample_rate: f32,
    max_block_size: usize,
    inputs: AudioBlock,
    outputs: AudioBlock,
    clock: TransportClock,
    connections: Arc<SnapshotSwap<ConnectionSet>>,
    blocks: u64,
}

impl BlockRunner {
    /// Prepares `unit` and allocates blocks shaped for its buses.
    ///
    /// All inputs start disconnected.
    pub fn new(unit: &mut dyn ProcessingUnit, sample_rate: f32, max_block_size: usize) -> Self {
        unit.prepare(sample_rate, max_block_size);
        let desc = unit.descriptor();
        let inputs = AudioBlock::for_buses(desc.inputs(), max_block_size);
        let outputs = AudioBlock::for_buses(desc.outputs(), max_block_size);
        let connections = Arc::new(SnapshotSwap::new(ConnectionSet::new(
            desc.inputs().total_channels(),
        )));
        tracing::debug!(unit = desc.name(), sample_rate, max_block_size, "block runner prepared");
        Self {
            sample_rate,
            max_block_size,
            inputs,
            outputs,
            clock: TransportClock::new(sample_rate, 120.0),
            connections,
            blocks: 0,
        }
    }

    /// Sample rate passed to `prepare`.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Largest block this runner will process.
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Blocks processed so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Input block, for filling before [`run`](Self::run).
    pub fn inputs_mut(&mut self) -> &mut AudioBlock {
        &mut self.inputs
    }

    /// Output block of the last run.
    pub fn outputs(&self) -> &AudioBlock {
        &self.outputs
    }

    /// Transport producer.
    pub fn clock_mut(&mut self) -> &mut TransportClock {
        &mut self.clock
    }

    /// Transport snapshot for the next block.
    pub fn transport(&self) -> Transport {
        self.clock.snapshot()
    }

    /// Shared connection set, for an editor thread to publish cable changes.
    pub fn connections(&self) -> Arc<SnapshotSwap<ConnectionSet>> {
        Arc::clone(&self.connections)
    }

    /// Publishes a connection set with exactly `channels` connected.
    pub fn set_connected(&self, channels: impl IntoIterator<Item = usize>) {
        let total = self.inputs.channels();
        self.connections
            .publish(ConnectionSet::with_connected(total, channels));
    }

    /// Processes one block of `frames` samples and advances the transport.
    ///
    /// Returns the number of frames actually processed.
    pub fn run(&mut self, unit: &mut dyn ProcessingUnit, frames: usize) -> usize {
        let frames = frames.min(self.max_block_size);
        self.inputs.set_frames(frames);
        let transport = self.clock.snapshot();
        let connections = self.connections.read();
        let mut ctx = ProcessContext::new(
            &self.inputs,
            &mut self.outputs,
            frames,
            self.sample_rate,
            &transport,
            &**connections,
        );
        unit.process(&mut ctx);
        let processed = ctx.frames();
        drop(connections);
        self.clock.advance(processed);
        self.blocks += 1;
        processed
    }
}
