use bitflags::bitflags;

use super::dedup::DedupKey;
use crate::error::Error;
use crate::BLOCK_UNCOMPRESSED;

bitflags! {
    #[derive(Default)]
    pub struct BlockFlags: u32 {
        /// Store the file's blocks without trying to compress them
        const DONT_COMPRESS = 0x0001;
        /// Pad before the file's first block and after its last to a device block boundary
        const ALIGN = 0x0002;
        /// Write the tail as a data block instead of packing it into a fragment block
        const DONT_FRAGMENT = 0x0004;

        const IS_SPARSE = 0x0400;
        const FIRST_BLOCK = 0x0800;
        const LAST_BLOCK = 0x1000;
        const IS_FRAGMENT = 0x2000;
        const FRAGMENT_BLOCK = 0x4000;
        const IS_COMPRESSED = 0x8000;

        const USER_SETTABLE = Self::DONT_COMPRESS.bits | Self::ALIGN.bits | Self::DONT_FRAGMENT.bits;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    DataBlock,
    Fragment,
    /// No payload, only aligns the output
    Padding,
}

/// One unit of compression work.
///
/// `data` holds the raw payload until a worker swaps in the compressed bytes; `size` always
/// keeps the logical size.
#[derive(Debug)]
pub(crate) struct Block {
    pub sequence: u64,
    pub kind: BlockKind,
    pub flags: BlockFlags,
    pub data: Vec<u8>,
    pub size: u32,
    pub checksum: u32,
    /// Block table row for data blocks, fragment block index for fragment blocks
    pub index: usize,
    pub error: Option<Error>,
}

impl Block {
    pub fn data_block(data: Vec<u8>, key: DedupKey, flags: BlockFlags, row: usize) -> Self {
        Self {
            sequence: 0,
            kind: BlockKind::DataBlock,
            flags,
            size: key.size,
            checksum: key.checksum,
            data,
            index: row,
            error: None,
        }
    }

    pub fn fragment_block(data: Vec<u8>, index: u32) -> Self {
        let key = DedupKey::of(&data);
        Self {
            sequence: 0,
            kind: BlockKind::Fragment,
            flags: BlockFlags::FRAGMENT_BLOCK,
            size: key.size,
            checksum: key.checksum,
            data,
            index: index as usize,
            error: None,
        }
    }

    /// Marker that ends an aligned file whose last block was not written.
    pub fn padding() -> Self {
        Self {
            sequence: 0,
            kind: BlockKind::Padding,
            flags: BlockFlags::ALIGN | BlockFlags::LAST_BLOCK,
            data: Vec::new(),
            size: 0,
            checksum: 0,
            index: 0,
            error: None,
        }
    }

    pub fn key(&self) -> DedupKey {
        DedupKey {
            checksum: self.checksum,
            size: self.size,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(BlockFlags::IS_COMPRESSED)
    }

    /// Size field as stored in inodes and fragment entries.
    pub fn on_disk_size(&self) -> u32 {
        let stored = self.data.len() as u32;
        if self.is_compressed() {
            stored
        } else {
            stored | BLOCK_UNCOMPRESSED
        }
    }
}
