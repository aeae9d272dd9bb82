use bitflags::bitflags;

use crate::compressors::CompressorId;
use crate::utils::get_set_field;
use crate::{INVALID_BLK, MAGIC, SUPERBLOCK_SIZE, VERSION_MAJOR, VERSION_MINOR};
use std::fmt::{Debug, Display};
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::{mem, slice};

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Superblock {
    magic: [u8; 4],
    inodes: [u8; 4],
    mkfs_time: [u8; 4],
    block_size: [u8; 4],
    fragments: [u8; 4],

    compressor: [u8; 2],

    block_log: [u8; 2],
    flags: [u8; 2],

    no_ids: [u8; 2],
    version_major: [u8; 2],
    version_minor: [u8; 2],

    root_inode: [u8; 8],
    bytes_used: [u8; 8],

    id_table_start: [u8; 8],
    xattr_id_table_start: [u8; 8],
    inode_table_start: [u8; 8],
    directory_table_start: [u8; 8],
    fragment_table_start: [u8; 8],
    export_table_start: [u8; 8],
}

impl Superblock {
    /// Superblock for a fresh image. Table locations are filled in once the image is complete.
    pub fn for_image(block_size: u32, compressor: CompressorId, mkfs_time: u32) -> Self {
        let mut sb: Self = unsafe { mem::zeroed() };
        sb.set_magic(MAGIC);
        sb.set_mkfs_time(mkfs_time);
        sb.set_block_size(block_size);
        sb.set_block_log(block_size.trailing_zeros() as u16);
        sb.set_compressor(compressor as u16);
        sb.set_version_major(VERSION_MAJOR);
        sb.set_version_minor(VERSION_MINOR);
        sb.set_xattr_id_table_start(INVALID_BLK);
        sb.set_export_table_start(INVALID_BLK);
        sb.set_flags(Flags::NO_XATTRS_IN_ARCHIVE);
        sb
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut sb: Self = unsafe { mem::zeroed() };
        unsafe {
            let sb_slice = slice::from_raw_parts_mut(&mut sb as *mut _ as *mut u8, SUPERBLOCK_SIZE);
            reader.read_exact(sb_slice)?;
        }

        if sb.magic() != MAGIC {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("invalid magic {:#x}", sb.magic()),
            ));
        }
        if sb.block_size().checked_ilog2() != Some(sb.block_log().into()) {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("invalid block size {}", sb.block_size()),
            ));
        }
        if sb.xattr_id_table_start() != INVALID_BLK {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "xattrs in filesystem are not supported",
            ));
        }
        Ok(sb)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        // every field is a byte array, so the struct has no padding
        unsafe { slice::from_raw_parts(self as *const _ as *const u8, SUPERBLOCK_SIZE) }
    }

    get_set_field!(magic, set_magic, u32);
    get_set_field!(inodes, set_inodes, u32);
    get_set_field!(mkfs_time, set_mkfs_time, u32);
    get_set_field!(block_size, set_block_size, u32);
    get_set_field!(fragments, set_fragments, u32);
    get_set_field!(block_log, set_block_log, u16);
    get_set_field!(compressor, set_compressor, u16);
    get_set_field!(flags, set_flags, Flags);
    get_set_field!(no_ids, set_no_ids, u16);
    get_set_field!(version_major, set_version_major, u16);
    get_set_field!(version_minor, set_version_minor, u16);
    get_set_field!(root_inode, set_root_inode, i64);
    get_set_field!(bytes_used, set_bytes_used, u64);
    get_set_field!(id_table_start, set_id_table_start, u64);
    get_set_field!(xattr_id_table_start, set_xattr_id_table_start, i64);
    get_set_field!(inode_table_start, set_inode_table_start, u64);
    get_set_field!(directory_table_start, set_directory_table_start, u64);
    get_set_field!(fragment_table_start, set_fragment_table_start, u64);
    get_set_field!(export_table_start, set_export_table_start, i64);
}

bitflags! {
    #[derive(Default)]
    pub struct Flags: u16 {
        const INODES_STORED_UNCOMPRESSED = 0x0001;
        const DATA_BLOCKS_STORED_UNCOMPRESSED = 0x0002;
        const UNUSED = 0x0004;
        const FRAGMENTS_STORED_UNCOMPRESSED = 0x0008;
        const FRAGMENTS_ARE_NOT_USED = 0x0010;
        const FRAGMENTS_ALWAYS_GENERATED = 0x0020;
        const DATA_DEDUPLICATED = 0x0040;
        const NFSEXPORT_TABLE_EXISTS = 0x0080;
        const XATTRS_STORED_UNCOMPRESSED = 0x0100;
        const NO_XATTRS_IN_ARCHIVE = 0x0200;
        const COMPRESSOR_OPTIONS_PRESENT = 0x0400;
        const IDTABLE_UNCOMPRESSED = 0x0800;
    }
}

impl Flags {
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self::from_bits_truncate(u16::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 2] {
        self.bits.to_le_bytes()
    }
}

impl Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl Display for Superblock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "squashfs {}.{}, block size {} (log {}), compressor {}, flags {}",
            self.version_major(),
            self.version_minor(),
            self.block_size(),
            self.block_log(),
            self.compressor(),
            self.flags()
        )?;
        writeln!(
            f,
            "inodes {}, fragments {}, ids {}, mkfs_time {}, bytes_used {}",
            self.inodes(),
            self.fragments(),
            self.no_ids(),
            self.mkfs_time(),
            self.bytes_used()
        )?;
        write!(
            f,
            "tables: inode {} directory {} fragment {} id {} export {} xattr {}",
            self.inode_table_start(),
            self.directory_table_start(),
            self.fragment_table_start(),
            self.id_table_start(),
            self.export_table_start(),
            self.xattr_id_table_start()
        )
    }
}
