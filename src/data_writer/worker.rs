use std::io::Write;
use std::mem;
use std::sync::Arc;
use tracing::trace;

use super::block::{Block, BlockFlags};
use super::scheduler::Shared;
use crate::compressors::Compress;

/// Worker thread body: pull, compress outside the lock, hand the result to the writer.
pub(crate) fn run<W: Write, C: Compress>(shared: Arc<Shared<W>>, compressor: C, block_size: usize) {
    let mut scratch = Vec::with_capacity(block_size);

    loop {
        let (mut block, failed) = {
            let mut state = shared.state.lock();
            loop {
                if let Some(block) = state.queue.pop_front() {
                    break (block, state.status.is_some());
                }
                if state.shutdown {
                    return;
                }
                shared.queue_cond.wait(&mut state);
            }
        };

        if !failed {
            process_block(&mut block, &compressor, &mut scratch);
        }

        let mut state = shared.state.lock();
        state.store_done(block);
        shared.done_cond.notify_all();
    }
}

/// Compresses `block` in place if that makes it smaller.
///
/// `scratch` receives the compressor output; when it wins it is swapped with the payload, so
/// the old payload buffer becomes the next scratch buffer.
pub(crate) fn process_block<C: Compress + ?Sized>(
    block: &mut Block,
    compressor: &C,
    scratch: &mut Vec<u8>,
) {
    if block.flags.contains(BlockFlags::DONT_COMPRESS) || block.data.is_empty() {
        return;
    }

    match compressor.compress(&block.data, scratch) {
        Ok(()) if !scratch.is_empty() && scratch.len() < block.data.len() => {
            mem::swap(&mut block.data, scratch);
            block.flags.insert(BlockFlags::IS_COMPRESSED);
        }
        Ok(()) => trace!(
            sequence = block.sequence,
            size = block.size,
            "storing block uncompressed"
        ),
        Err(err) => block.error = Some(err),
    }
}
