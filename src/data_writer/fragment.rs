use std::mem;
use tracing::debug;

use super::block::Block;
use super::dedup::DedupKey;
use super::scheduler::Scheduler;
use super::table::FragmentLocation;
use crate::error::Result;

/// Packs file tails into the one fragment block currently being filled.
///
/// Lives on the submitting thread. The index a tail gets is final as soon as it is added: fragment
/// blocks are submitted, and therefore written, in index order.
#[derive(Debug)]
pub(crate) struct FragmentAccumulator {
    buffer: Vec<u8>,
    limit: usize,
    next_index: u32,
    // tails in `buffer` and in flushed blocks the writer has not reached yet
    unwritten: Vec<FragmentLocation>,
}

impl FragmentAccumulator {
    pub fn new(limit: usize) -> Result<Self> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(limit)?;
        Ok(Self {
            buffer,
            limit,
            next_index: 0,
            unwritten: Vec::new(),
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Places `tail` into a fragment block and returns where it went.
    pub fn add_tail<W>(&mut self, scheduler: &Scheduler<W>, tail: &[u8]) -> Result<FragmentLocation> {
        debug_assert!(!tail.is_empty() && tail.len() < self.limit);
        let key = DedupKey::of(tail);

        {
            let mut state = scheduler.lock();
            state.check_status()?;
            if let Some(found) = state.fragment_dedup.lookup(&key).copied() {
                state.fragments.push_final(found);
                state.stats.fragments_deduplicated += 1;
                return Ok(found);
            }
            let written = state.fragment_blocks.len() as u32;
            self.unwritten.retain(|l| l.index >= written);
            if let Some(found) = self.unwritten_match(key) {
                state.fragments.push_provisional(found);
                state.stats.fragments_deduplicated += 1;
                return Ok(found);
            }
        }

        if self.buffer.len() + tail.len() > self.limit {
            self.flush(scheduler)?;
        }

        let location = FragmentLocation {
            index: self.next_index,
            offset: self.buffer.len() as u32,
            size: key.size,
            checksum: key.checksum,
        };
        self.buffer.extend_from_slice(tail);
        self.unwritten.push(location);
        scheduler.lock().fragments.push_provisional(location);

        if self.buffer.len() == self.limit {
            self.flush(scheduler)?;
        }
        Ok(location)
    }

    fn unwritten_match(&self, key: DedupKey) -> Option<FragmentLocation> {
        self.unwritten
            .iter()
            .find(|l| l.checksum == key.checksum && l.size == key.size)
            .copied()
    }

    /// Submits the live buffer as a fragment block, if it holds anything.
    pub fn flush<W>(&mut self, scheduler: &Scheduler<W>) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut fresh = Vec::new();
        fresh.try_reserve_exact(self.limit)?;
        let data = mem::replace(&mut self.buffer, fresh);
        let index = self.next_index;
        let tails = self.unwritten.iter().filter(|l| l.index == index).count();
        self.next_index += 1;

        debug!(index, size = data.len(), tails, "flushing fragment block");
        scheduler.submit(Block::fragment_block(data, index))?;
        Ok(())
    }
}
