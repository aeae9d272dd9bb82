// sqsh in binary
pub const MAGIC: u32 = 0x7371_7368;
pub const VERSION_MAJOR: u16 = 4;
pub const VERSION_MINOR: u16 = 0;
pub const SUPERBLOCK_SIZE: usize = 96;
pub const METADATA_SIZE: usize = 8 * 1024;
pub const INVALID_FRAG: u32 = 0xffffffff;
pub const INVALID_XATTR: u32 = 0xffffffff;
pub const INVALID_BLK: i64 = -1;

/// Set in an on-disk block or fragment size when the bytes are stored uncompressed.
pub const BLOCK_UNCOMPRESSED: u32 = 1 << 24;

pub const MIN_BLOCK_SIZE: usize = 4 * 1024;
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;
pub const DEFAULT_DEVICE_BLOCK_SIZE: usize = 4096;

use std::io::{Read, Seek};
pub trait ReadSeek: Read + Seek {}
impl<RS: Read + Seek> ReadSeek for RS {}

pub mod compressors;
pub mod data_writer;
mod error;
pub mod fragments;
pub mod image;
pub(crate) mod metadata;
pub(crate) mod read;
pub mod superblock;
pub(crate) mod utils;

pub use compressors::{Compress, Compressor, Decompress};
pub use data_writer::{
    BlockFlags, BlockLocation, DataSummary, DataWriter, DataWriterConfig, FileOptions, FileRecord,
    FragmentLocation, NoHooks, WriterHooks, WriterStats,
};
pub use error::{Error, Result};
pub use image::{Image, ImageWriter};

#[cfg(test)]
mod tests;
