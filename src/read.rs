use crate::compressors::{Compressor, Decompress};
use crate::fragments::FRAGMENT_ENTRY_SIZE;
use crate::metadata::METADATA_UNCOMPRESSED;
use crate::superblock::Superblock;
use crate::{ReadSeek, BLOCK_UNCOMPRESSED, METADATA_SIZE};
use std::io::{copy, Error, ErrorKind, Read, Result, Seek, SeekFrom, Write};

fn read_block_header<R: ReadSeek + ?Sized>(reader: &mut R) -> Result<(bool, u16)> {
    let mut block_header: [u8; 2] = [0; 2];
    reader.read_exact(&mut block_header[..])?;
    let block_header = u16::from_le_bytes(block_header);

    let compressed = (block_header & METADATA_UNCOMPRESSED) == 0;
    let compressed_size = block_header & !(METADATA_UNCOMPRESSED);

    if compressed_size as usize > METADATA_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("bad metadata size {}", compressed_size),
        ));
    }

    Ok((compressed, compressed_size))
}

fn check_expected(expected: Option<u32>, written: u64) -> Result<()> {
    match expected {
        Some(expected) if expected as u64 != written => Err(Error::new(
            ErrorKind::InvalidData,
            format!("expected ({}) != written ({})", expected, written),
        )),
        _ => Ok(()),
    }
}

/// Reads the metadata block at `start` into `writer`, returning the bytes it occupies on disk.
pub fn read_block<R: ReadSeek + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    compressor: &Compressor,
    start: u64,
    expected: Option<u32>,
) -> Result<u16> {
    reader.seek(SeekFrom::Start(start))?;
    let (compressed, compressed_size) = read_block_header(reader)?;

    let written = if compressed {
        let mut buf = Vec::with_capacity(compressed_size as usize);
        copy(&mut reader.take(compressed_size as u64), &mut buf)?;
        compressor.decompress(&mut (&buf[..]), writer)?
    } else {
        copy(&mut reader.take(compressed_size as u64), writer)?
    };
    check_expected(expected, written)?;
    Ok(compressed_size + 2)
}

/// Reads a data or fragment block of `size` (on-disk size field, bit 24 marking uncompressed
/// bytes) stored at `start`.
pub fn read_data_block<R: ReadSeek + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    compressor: &Compressor,
    start: u64,
    size: u32,
    expected: Option<u32>,
) -> Result<u64> {
    let stored = (size & !BLOCK_UNCOMPRESSED) as u64;
    reader.seek(SeekFrom::Start(start))?;

    let written = if size & BLOCK_UNCOMPRESSED != 0 {
        copy(&mut reader.take(stored), writer)?
    } else {
        let mut buf = Vec::with_capacity(stored as usize);
        copy(&mut reader.take(stored), &mut buf)?;
        if (buf.len() as u64) < stored {
            return Err(Error::new(ErrorKind::UnexpectedEof, "truncated data block"));
        }
        compressor.decompress(&mut (&buf[..]), writer)?
    };
    check_expected(expected, written)?;
    Ok(written)
}

#[derive(Debug)]
pub struct FragmentTableReader<'a, R: ReadSeek> {
    reader: R,
    compressor: &'a Compressor,
    position: usize,
    index: Vec<u64>,
    fragments: usize,
    buffer_position: usize,
    buffer: Vec<u8>,
}

impl<'a, R: ReadSeek> FragmentTableReader<'a, R> {
    pub fn new(mut reader: R, compressor: &'a Compressor, superblock: &Superblock) -> Result<Self> {
        let fragments = superblock.fragments() as usize;
        let indexes = (fragments * FRAGMENT_ENTRY_SIZE).div_ceil(METADATA_SIZE);
        let indexes_bytes = indexes * 8;

        let mut index = Vec::with_capacity(indexes_bytes);
        if indexes > 0 {
            reader.seek(SeekFrom::Start(superblock.fragment_table_start()))?;
            copy(&mut (&mut reader).take(indexes_bytes as u64), &mut index)?;
        }
        if index.len() != indexes_bytes {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "truncated fragment table index",
            ));
        }

        let index = index
            .chunks_exact(8)
            .map(|x| {
                let mut v = [0u8; 8];
                v.copy_from_slice(x);
                u64::from_le_bytes(v)
            })
            .collect();

        Ok(Self {
            reader,
            compressor,
            position: 0,
            index,
            fragments,
            buffer_position: 0,
            buffer: Vec::with_capacity(METADATA_SIZE),
        })
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    fn expected_block_size(&self) -> u32 {
        let total = self.fragments * FRAGMENT_ENTRY_SIZE;
        if self.position + 1 != self.index.len() {
            METADATA_SIZE as u32
        } else {
            (total - self.position * METADATA_SIZE) as u32
        }
    }
}

impl<'a, R: ReadSeek> Read for FragmentTableReader<'a, R> {
    fn read(&mut self, writer: &mut [u8]) -> Result<usize> {
        if self.buffer_position == self.buffer.len() {
            if self.position == self.index.len() {
                return Ok(0);
            }

            self.buffer.clear();
            self.buffer_position = 0;
            let expected = self.expected_block_size();
            read_block(
                &mut self.reader,
                &mut self.buffer,
                self.compressor,
                self.index[self.position],
                Some(expected),
            )?;
            self.position += 1;
        }

        let available = &self.buffer[self.buffer_position..];
        let n = available.len().min(writer.len());
        writer[..n].copy_from_slice(&available[..n]);
        self.buffer_position += n;
        Ok(n)
    }
}
