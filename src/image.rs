use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::DerefMut;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::compressors::Compressor;
use crate::data_writer::{
    BlockLocation, DataSummary, DataWriter, DataWriterConfig, FileOptions, FileRecord,
    FragmentLocation,
};
use crate::error::Result;
use crate::fragments::{FragmentEntry, FRAGMENT_ENTRY_SIZE};
use crate::metadata::METADATA_UNCOMPRESSED;
use crate::read::{read_block, read_data_block, FragmentTableReader};
use crate::superblock::{Flags, Superblock};
use crate::utils::padding_for;
use crate::{ReadSeek, SUPERBLOCK_SIZE};

/// Builds the data area of an image: superblock, compressor options, file data and the fragment
/// table.
///
/// The image starts at the beginning of `output`. Inode, directory and id tables are not
/// written; their start offsets all point at the end of the data.
pub struct ImageWriter<W>
where
    W: Write + Seek + Send + 'static,
{
    superblock: Superblock,
    data: DataWriter<W, Compressor>,
    files: u64,
}

impl<W> ImageWriter<W>
where
    W: Write + Seek + Send + 'static,
{
    pub fn create(mut output: W, config: DataWriterConfig, compressor: Compressor) -> Result<Self> {
        let mkfs_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as u32);
        let mut superblock =
            Superblock::for_image(config.block_size as u32, compressor.id(), mkfs_time);

        let mut flags = superblock.flags() | Flags::DATA_DEDUPLICATED;
        if config.no_fragments {
            flags |= Flags::FRAGMENTS_ARE_NOT_USED;
        }
        let options = compressor.options();
        if !options.is_empty() {
            flags |= Flags::COMPRESSOR_OPTIONS_PRESENT;
        }
        superblock.set_flags(flags);

        // placeholder, rewritten by finish
        output.seek(SeekFrom::Start(0))?;
        superblock.write(&mut output)?;
        if !options.is_empty() {
            let header = options.len() as u16 | METADATA_UNCOMPRESSED;
            output.write_all(&header.to_le_bytes())?;
            output.write_all(options)?;
        }

        debug!(%compressor, block_size = config.block_size, "creating image");
        let data = DataWriter::new(config, compressor, output)?;
        Ok(Self {
            superblock,
            data,
            files: 0,
        })
    }

    pub fn set_mkfs_time(&mut self, mkfs_time: u32) {
        self.superblock.set_mkfs_time(mkfs_time);
    }

    pub fn add_file<R: Read>(&mut self, reader: R, options: FileOptions) -> Result<FileRecord> {
        let record = self.data.write_file(reader, options)?;
        self.files += 1;
        Ok(record)
    }

    /// The underlying data writer, for streaming a file with `begin_file`, `append` and
    /// `end_file`.
    pub fn data(&mut self) -> &mut DataWriter<W, Compressor> {
        &mut self.data
    }

    /// Writes the fragment table, pads the image to a whole device block and writes the final
    /// superblock.
    pub fn finish(self) -> Result<W> {
        let Self {
            mut superblock,
            data,
            files,
        } = self;
        let device_block_size = data.config().device_block_size as u64;
        let (mut output, summary) = data.finish()?;
        let DataSummary {
            end,
            fragment_table_start,
            ref fragment_blocks,
            stats,
            ..
        } = summary;

        superblock.set_fragments(fragment_blocks.len() as u32);
        superblock.set_fragment_table_start(fragment_table_start.unwrap_or(u64::MAX));
        superblock.set_inode_table_start(end);
        superblock.set_directory_table_start(end);
        superblock.set_id_table_start(end);
        superblock.set_bytes_used(end);

        let padding = padding_for(end, device_block_size);
        output.write_all(&vec![0u8; padding as usize])?;
        output.seek(SeekFrom::Start(0))?;
        superblock.write(&mut output)?;
        output.seek(SeekFrom::Start(end + padding))?;
        output.flush()?;

        info!(
            files,
            bytes_used = end,
            fragments = fragment_blocks.len(),
            deduplicated = stats.blocks_deduplicated,
            "image written"
        );
        Ok(output)
    }
}

/// Read access to the data area of an image.
#[derive(Debug)]
pub struct Image<R: ReadSeek> {
    reader: RefCell<R>,
    superblock: Superblock,
    compressor: Compressor,
}

impl<'a, R: ReadSeek> Image<R> {
    pub fn new(mut reader: R) -> io::Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let superblock = Superblock::read(&mut reader)?;

        let compressor = if superblock
            .flags()
            .contains(Flags::COMPRESSOR_OPTIONS_PRESENT)
        {
            let defaults = Compressor::new(superblock.compressor(), None)?;
            let mut options = Vec::new();
            read_block(
                &mut reader,
                &mut options,
                &defaults,
                SUPERBLOCK_SIZE as u64,
                None,
            )?;
            Compressor::new(superblock.compressor(), Some(&options))?
        } else {
            Compressor::new(superblock.compressor(), None)?
        };

        Ok(Self {
            reader: reader.into(),
            superblock,
            compressor,
        })
    }

    pub fn superblock(&'a self) -> &'a Superblock {
        &self.superblock
    }

    pub fn compressor(&'a self) -> &'a Compressor {
        &self.compressor
    }

    pub fn fragments(&self) -> io::Result<Vec<FragmentEntry>> {
        let mut reader = self.reader.borrow_mut();
        let reader = reader.deref_mut();

        let mut ftr = FragmentTableReader::new(reader, &self.compressor, &self.superblock)?;
        let fragments = ftr.fragments();
        let mut list = Vec::with_capacity(fragments);
        for _ in 0..fragments {
            let mut buf = [0; FRAGMENT_ENTRY_SIZE];
            ftr.read_exact(&mut buf[..])?;
            list.push(FragmentEntry::new(buf));
        }
        Ok(list)
    }

    /// Reads one data block. Sparse blocks come back as `expected` zero bytes.
    pub fn read_block(&self, location: &BlockLocation, expected: u32) -> io::Result<Vec<u8>> {
        if location.is_sparse() {
            return Ok(vec![0; expected as usize]);
        }
        let mut out = Vec::with_capacity(expected as usize);
        read_data_block(
            self.reader.borrow_mut().deref_mut(),
            &mut out,
            &self.compressor,
            location.offset,
            location.size,
            Some(expected),
        )?;
        Ok(out)
    }

    /// Reads the fragment block holding `location` and cuts the tail out of it.
    pub fn read_fragment(
        &self,
        entries: &[FragmentEntry],
        location: &FragmentLocation,
    ) -> io::Result<Vec<u8>> {
        let entry = entries.get(location.index as usize).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("fragment block {} out of range", location.index),
            )
        })?;

        let mut block = Vec::with_capacity(self.superblock.block_size() as usize);
        read_data_block(
            self.reader.borrow_mut().deref_mut(),
            &mut block,
            &self.compressor,
            entry.start_block(),
            entry.size(),
            None,
        )?;

        let start = location.offset as usize;
        let end = start + location.size as usize;
        block.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "fragment {}..{} past the end of block {} ({} bytes)",
                    start,
                    end,
                    location.index,
                    block.len()
                ),
            )
        })
    }

    /// Reassembles the contents of a file from its record.
    pub fn read_file(&self, record: &FileRecord) -> io::Result<Vec<u8>> {
        let block_size = self.superblock.block_size() as u64;
        let mut out = Vec::with_capacity(record.size as usize);

        for location in &record.blocks {
            let remaining = record.size.saturating_sub(out.len() as u64);
            if remaining == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} blocks for a {} byte file", record.blocks.len(), record.size),
                ));
            }
            let expected = remaining.min(block_size) as u32;
            out.extend(self.read_block(location, expected)?);
        }
        if let Some(fragment) = &record.fragment {
            let entries = self.fragments()?;
            out.extend(self.read_fragment(&entries, fragment)?);
        }

        if out.len() as u64 != record.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file is {} bytes, record says {}", out.len(), record.size),
            ));
        }
        Ok(out)
    }
}
