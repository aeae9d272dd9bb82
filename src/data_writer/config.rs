use std::thread;

use super::block::BlockFlags;
use crate::error::{Error, Result};
use crate::{DEFAULT_BLOCK_SIZE, DEFAULT_DEVICE_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataWriterConfig {
    /// Size of a full data block and the limit of a fragment block
    pub block_size: usize,
    /// Number of compression threads
    pub num_workers: usize,
    /// Units that may be submitted but not yet written before `submit` blocks
    pub max_backlog: usize,
    /// Alignment used for files flagged `ALIGN`
    pub device_block_size: usize,
    /// Write every tail as a data block
    pub no_fragments: bool,
}

impl Default for DataWriterConfig {
    fn default() -> Self {
        let num_workers = thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            num_workers,
            max_backlog: num_workers * 10,
            device_block_size: DEFAULT_DEVICE_BLOCK_SIZE,
            no_fragments: false,
        }
    }
}

impl DataWriterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
        {
            return Err(Error::Config(format!(
                "block size {} must be a power of two between {} and {}",
                self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }
        if self.num_workers == 0 {
            return Err(Error::Config("at least one worker is required".into()));
        }
        if self.max_backlog == 0 {
            return Err(Error::Config("backlog must allow at least one block".into()));
        }
        if !self.device_block_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "device block size {} must be a power of two",
                self.device_block_size
            )));
        }
        Ok(())
    }
}

/// Per file settings for the file submission API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileOptions {
    pub(crate) flags: BlockFlags,
}

impl FileOptions {
    /// Only `DONT_COMPRESS`, `ALIGN` and `DONT_FRAGMENT` are kept.
    pub fn new(flags: BlockFlags) -> Self {
        Self {
            flags: flags & BlockFlags::USER_SETTABLE,
        }
    }

    pub fn dont_compress(mut self) -> Self {
        self.flags.insert(BlockFlags::DONT_COMPRESS);
        self
    }

    pub fn align(mut self) -> Self {
        self.flags.insert(BlockFlags::ALIGN);
        self
    }

    pub fn dont_fragment(mut self) -> Self {
        self.flags.insert(BlockFlags::DONT_FRAGMENT);
        self
    }

    pub fn flags(&self) -> BlockFlags {
        self.flags
    }
}
