//! Ordered writeback.
//!
//! Workers finish out of order. Completed units wait in `done` until every unit submitted before
//! them is written, so the output layout is the one a single thread would have produced.

use std::io::Write;
use tracing::{debug, trace};

use super::block::{Block, BlockFlags, BlockKind};
use super::dedup::DedupKey;
use super::scheduler::State;
use super::table::BlockLocation;
use crate::error::{Error, Result};
use crate::fragments::FragmentEntry;
use crate::utils::padding_for;

impl<W: Write> State<W> {
    /// Takes a unit back from a worker and writes out every unit that is now in order.
    pub fn store_done(&mut self, mut block: Block) {
        if let Some(err) = block.error.take() {
            self.set_status(err);
        }

        if block.sequence < self.dequeue_id || self.done.contains_key(&block.sequence) {
            self.set_status(Error::OutOfOrder {
                expected: self.dequeue_id,
                found: block.sequence,
            });
            return;
        }
        self.done.insert(block.sequence, block);

        while let Some(block) = self.done.remove(&self.dequeue_id) {
            if self.status.is_none() {
                if let Err(err) = self.write_block(block) {
                    self.set_status(err);
                }
            } else {
                trace!(sequence = block.sequence, "discarding block after failure");
                self.stats.units_discarded += 1;
            }
            self.dequeue_id += 1;
            self.backlog -= 1;
        }
    }

    fn write_block(&mut self, block: Block) -> Result<()> {
        match block.kind {
            BlockKind::DataBlock => self.write_data_block(block),
            BlockKind::Fragment => self.write_fragment_block(block),
            BlockKind::Padding => {
                trace!(sequence = block.sequence, offset = self.offset, "aligning after file");
                self.align()
            }
        }
    }

    fn append(&mut self, data: &[u8]) -> Result<u64> {
        let output = self
            .output
            .as_mut()
            .ok_or(Error::Usage("output already closed"))?;
        output.write_all(data)?;

        let offset = self.offset;
        self.offset += data.len() as u64;
        self.stats.bytes_written += data.len() as u64;
        Ok(offset)
    }

    fn align(&mut self) -> Result<()> {
        let padding = padding_for(self.offset, self.device_block_size);
        if padding > 0 {
            let mut zeros = vec![0u8; padding as usize];
            self.hooks.prepare_padding(&mut zeros);
            self.append(&zeros)?;
        }
        Ok(())
    }

    fn write_data_block(&mut self, block: Block) -> Result<()> {
        let aligned = block.flags.contains(BlockFlags::ALIGN);
        if aligned && block.flags.contains(BlockFlags::FIRST_BLOCK) {
            self.align()?;
        }

        let size = block.on_disk_size();
        self.hooks.pre_block_write(block.flags, self.offset);
        let offset = self.append(&block.data)?;
        self.hooks.post_block_write(block.flags, offset, size);

        if aligned && block.flags.contains(BlockFlags::LAST_BLOCK) {
            self.align()?;
        }

        let location = BlockLocation {
            sequence: Some(block.sequence),
            offset,
            size,
            checksum: block.checksum,
            deduplicated: false,
        };
        self.blocks.resolve(block.index, location)?;
        let key = block.key();
        if self.blocks_in_flight.get(&key).map(|(row, _)| *row) == Some(block.index) {
            self.blocks_in_flight.remove(&key);
        }
        self.block_dedup.insert(key, location);
        self.stats.blocks_written += 1;

        debug!(
            sequence = block.sequence,
            offset,
            size = block.size,
            stored = block.data.len(),
            compressed = block.is_compressed(),
            "wrote data block"
        );
        Ok(())
    }

    fn write_fragment_block(&mut self, block: Block) -> Result<()> {
        let index = block.index as u32;
        if block.index != self.fragment_blocks.len() {
            return Err(Error::OutOfOrder {
                expected: self.fragment_blocks.len() as u64,
                found: block.index as u64,
            });
        }

        let size = block.on_disk_size();
        self.hooks.pre_block_write(block.flags, self.offset);
        let offset = self.append(&block.data)?;
        self.hooks.post_block_write(block.flags, offset, size);

        self.fragment_blocks
            .push(FragmentEntry::from_location(offset, size));
        let finalized = self.fragments.finalize(index);
        for location in &finalized {
            let key = DedupKey {
                checksum: location.checksum,
                size: location.size,
            };
            self.fragment_dedup.insert(key, *location);
        }
        self.stats.fragment_blocks_written += 1;

        debug!(
            sequence = block.sequence,
            index,
            offset,
            size = block.size,
            stored = block.data.len(),
            tails = finalized.len(),
            "wrote fragment block"
        );
        Ok(())
    }
}
