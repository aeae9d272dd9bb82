use super::block::BlockFlags;

/// Callbacks run by the writer around every append to the output.
///
/// They are called with the writer lock held, from whichever worker thread completes the
/// block, so they must be quick.
pub trait WriterHooks: Send + Sync {
    fn pre_block_write(&self, _flags: BlockFlags, _offset: u64) {}

    fn post_block_write(&self, _flags: BlockFlags, _offset: u64, _size: u32) {}

    /// May fill the zero bytes inserted to align a file.
    fn prepare_padding(&self, _padding: &mut [u8]) {}
}

#[derive(Debug, Default)]
pub struct NoHooks;

impl WriterHooks for NoHooks {}
