//! File submission API: cuts a file's data into blocks and a tail and feeds the pipeline.

use std::io::{ErrorKind, Read, Seek, Write};
use std::mem;
use tracing::trace;

use super::block::{Block, BlockFlags};
use super::config::FileOptions;
use super::dedup::DedupKey;
use super::table::{BlockLocation, FragmentLocation};
use super::DataWriter;
use crate::compressors::Compress;
use crate::error::{Error, Result};
use crate::utils::is_zero;

/// What the inode of a finished file needs to know about its data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub size: u64,
    pub blocks: Vec<BlockLocation>,
    pub fragment: Option<FragmentLocation>,
}

impl FileRecord {
    /// Offset of the first block that has bytes on disk.
    pub fn blocks_start(&self) -> Option<u64> {
        self.blocks
            .iter()
            .find(|b| !b.is_sparse())
            .map(|b| b.offset)
    }

    /// On-disk size fields, as listed in a regular file inode.
    pub fn block_sizes(&self) -> Vec<u32> {
        self.blocks.iter().map(|b| b.size).collect()
    }
}

#[derive(Debug)]
pub(crate) struct OpenFile {
    options: FileOptions,
    pending: Vec<u8>,
    // last full block, held back until we know whether it ends the file
    held: Option<Vec<u8>>,
    first_row: usize,
    submitted_any: bool,
    // the most recent unit of this file carried LAST_BLOCK
    last_flagged: bool,
    last_sequence: Option<u64>,
    size: u64,
}

impl OpenFile {
    fn depends_on(&mut self, sequence: u64) {
        self.last_sequence = self.last_sequence.max(Some(sequence));
    }
}

fn block_buffer(block_size: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(block_size)?;
    Ok(buffer)
}

impl<W, C> DataWriter<W, C>
where
    W: Write + Seek + Send + 'static,
    C: Compress + Clone + Send + 'static,
{
    pub fn begin_file(&mut self, options: FileOptions) -> Result<()> {
        if self.file.is_some() {
            return Err(Error::Usage("a file is already open"));
        }
        self.scheduler.status()?;

        let first_row = self.scheduler.lock().blocks.len();
        self.file = Some(OpenFile {
            options,
            pending: block_buffer(self.config.block_size)?,
            held: None,
            first_row,
            submitted_any: false,
            last_flagged: false,
            last_sequence: None,
            size: 0,
        });
        Ok(())
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let mut file = self.file.take().ok_or(Error::Usage("no file is open"))?;
        let result = self.append_to(&mut file, data);
        self.file = Some(file);
        result
    }

    fn append_to(&mut self, file: &mut OpenFile, mut data: &[u8]) -> Result<()> {
        self.scheduler.status()?;
        let block_size = self.config.block_size;
        file.size += data.len() as u64;

        while !data.is_empty() {
            let n = (block_size - file.pending.len()).min(data.len());
            file.pending.extend_from_slice(&data[..n]);
            data = &data[n..];

            if file.pending.len() == block_size {
                let full = mem::replace(&mut file.pending, block_buffer(block_size)?);
                if let Some(previous) = file.held.replace(full) {
                    self.flush_block(file, previous, false)?;
                }
            }
        }
        Ok(())
    }

    /// Finishes the open file and waits until all of its blocks are on disk.
    pub fn end_file(&mut self) -> Result<FileRecord> {
        let mut file = self.file.take().ok_or(Error::Usage("no file is open"))?;
        let tail = mem::take(&mut file.pending);
        let fragment_tail = !tail.is_empty()
            && !self.config.no_fragments
            && !file.options.flags.contains(BlockFlags::DONT_FRAGMENT);

        if let Some(held) = file.held.take() {
            self.flush_block(&mut file, held, tail.is_empty() || fragment_tail)?;
        }

        let fragment = if tail.is_empty() {
            None
        } else if fragment_tail {
            Some(self.fragments.add_tail(&self.scheduler, &tail)?)
        } else {
            self.flush_block(&mut file, tail, true)?;
            None
        };

        // final block was sparse or a duplicate, so no written unit carried LAST_BLOCK
        if file.options.flags.contains(BlockFlags::ALIGN) && file.submitted_any && !file.last_flagged
        {
            let sequence = self.scheduler.submit(Block::padding())?;
            file.depends_on(sequence);
        }

        match file.last_sequence {
            Some(sequence) => self.scheduler.wait_for(sequence)?,
            None => self.scheduler.status()?,
        }

        let blocks = self.scheduler.lock().blocks.locations(file.first_row..)?;
        trace!(
            size = file.size,
            blocks = blocks.len(),
            fragment = fragment.is_some(),
            "file complete"
        );
        Ok(FileRecord {
            size: file.size,
            blocks,
            fragment,
        })
    }

    /// Streams `reader` into a new file.
    pub fn write_file<R: Read>(&mut self, mut reader: R, options: FileOptions) -> Result<FileRecord> {
        self.begin_file(options)?;
        let mut buf = vec![0u8; self.config.block_size];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.file = None;
                    return Err(e.into());
                }
            };
            if let Err(e) = self.append(&buf[..n]) {
                self.file = None;
                return Err(e);
            }
        }
        self.end_file()
    }

    /// Records one block of the open file: sparse, a back-reference, or a new unit.
    fn flush_block(&mut self, file: &mut OpenFile, data: Vec<u8>, last: bool) -> Result<()> {
        if is_zero(&data) {
            let mut state = self.scheduler.lock();
            state.blocks.push(BlockLocation::sparse());
            state.stats.sparse_blocks += 1;
            return Ok(());
        }

        let key = DedupKey::of(&data);
        let row = {
            let mut state = self.scheduler.lock();
            state.check_status()?;
            if let Some(found) = state.block_dedup.lookup(&key).copied() {
                state.blocks.push(found.back_reference());
                state.stats.blocks_deduplicated += 1;
                return Ok(());
            }
            if let Some((original, sequence)) = state.blocks_in_flight.get(&key).copied() {
                state.blocks.alias(original);
                state.stats.blocks_deduplicated += 1;
                file.depends_on(sequence);
                return Ok(());
            }
            state.blocks.reserve()
        };

        let mut flags = file.options.flags;
        if !file.submitted_any {
            flags |= BlockFlags::FIRST_BLOCK;
        }
        if last {
            flags |= BlockFlags::LAST_BLOCK;
        }

        let sequence = self
            .scheduler
            .submit(Block::data_block(data, key, flags, row))?;
        {
            let mut state = self.scheduler.lock();
            if state.dequeue_id <= sequence {
                state.blocks_in_flight.insert(key, (row, sequence));
            }
        }
        file.submitted_any = true;
        file.last_flagged = last;
        file.depends_on(sequence);
        Ok(())
    }
}
