use std::fmt::{self, Display};

use crate::{utils::get_set_field_tuple, BLOCK_UNCOMPRESSED};

pub const FRAGMENT_ENTRY_SIZE: usize = 16;

// struct squashfs_fragment_entry {
// 	0 8 unsigned long long		start_block;
// 	8 4 unsigned int		size;
// 	12 4 unsigned int		unused;
// };
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentEntry([u8; FRAGMENT_ENTRY_SIZE]);

impl FragmentEntry {
    pub fn new(entry: [u8; FRAGMENT_ENTRY_SIZE]) -> Self {
        Self(entry)
    }

    /// Entry for a fragment block written at `start` with the given on-disk size field.
    pub fn from_location(start: u64, size: u32) -> Self {
        let mut entry = Self([0; FRAGMENT_ENTRY_SIZE]);
        entry.set_start_block(start);
        entry.set_size(size);
        entry
    }

    get_set_field_tuple!(start_block, set_start_block, u64, 0, 8);
    get_set_field_tuple!(size, set_size, u32, 8, 4);
    get_set_field_tuple!(unused, set_unused, u32, 12, 4);

    pub fn is_compressed(&self) -> bool {
        self.size() & BLOCK_UNCOMPRESSED == 0
    }

    /// Number of bytes the fragment block occupies in the image.
    pub fn stored_size(&self) -> u32 {
        self.size() & !BLOCK_UNCOMPRESSED
    }

    pub fn as_bytes(&self) -> &[u8; FRAGMENT_ENTRY_SIZE] {
        &self.0
    }
}

impl Display for FragmentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start {} size {} {}",
            self.start_block(),
            self.stored_size(),
            if self.is_compressed() {
                "compressed"
            } else {
                "uncompressed"
            }
        )
    }
}
