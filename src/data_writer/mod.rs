//! Parallel block compression with ordered, deduplicating writeback.
//!
//! Files go in through [`DataWriter::begin_file`], [`DataWriter::append`] and
//! [`DataWriter::end_file`]. Full blocks are compressed by a pool of worker threads, file tails
//! are packed into shared fragment blocks, and everything is appended to the output in the order
//! it was submitted, so the result does not depend on the number of workers.

mod block;
mod config;
mod dedup;
mod file;
mod fragment;
mod hooks;
mod scheduler;
mod table;
mod worker;
mod writeback;

use std::io::{Seek, Write};
use std::sync::Arc;
use tracing::info;

pub use block::{BlockFlags, BlockKind};
pub use config::{DataWriterConfig, FileOptions};
pub use file::FileRecord;
pub use hooks::{NoHooks, WriterHooks};
pub use table::{BlockLocation, FragmentLocation};

use crate::compressors::{Compress, Compressor};
use crate::error::{Error, Result};
use crate::fragments::{FragmentEntry, FRAGMENT_ENTRY_SIZE};
use crate::metadata;
use file::OpenFile;
use fragment::FragmentAccumulator;
use scheduler::Scheduler;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub units_submitted: u64,
    pub units_discarded: u64,
    pub blocks_written: u64,
    pub blocks_deduplicated: u64,
    pub sparse_blocks: u64,
    pub fragment_blocks_written: u64,
    pub fragments_deduplicated: u64,
    pub bytes_written: u64,
}

/// Result of [`DataWriter::finish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSummary {
    /// Offset just past everything the writer produced
    pub end: u64,
    /// Offset of the fragment table index, if any fragment block was written
    pub fragment_table_start: Option<u64>,
    pub fragment_blocks: Vec<FragmentEntry>,
    pub fragments: Vec<FragmentLocation>,
    pub stats: WriterStats,
}

pub struct DataWriter<W, C = Compressor>
where
    W: Write + Seek + Send + 'static,
    C: Compress + Clone + Send + 'static,
{
    config: DataWriterConfig,
    compressor: C,
    scheduler: Scheduler<W>,
    fragments: FragmentAccumulator,
    file: Option<OpenFile>,
}

impl<W, C> DataWriter<W, C>
where
    W: Write + Seek + Send + 'static,
    C: Compress + Clone + Send + 'static,
{
    /// Starts the worker pool. Blocks are appended at the current position of `output`.
    pub fn new(config: DataWriterConfig, compressor: C, output: W) -> Result<Self> {
        Self::with_hooks(config, compressor, output, Arc::new(NoHooks))
    }

    pub fn with_hooks(
        config: DataWriterConfig,
        compressor: C,
        mut output: W,
        hooks: Arc<dyn WriterHooks>,
    ) -> Result<Self> {
        config.validate()?;
        let offset = output.stream_position()?;
        let fragments = FragmentAccumulator::new(config.block_size)?;
        let scheduler = Scheduler::start(&config, &compressor, output, offset, hooks)?;
        info!(
            block_size = config.block_size,
            workers = config.num_workers,
            max_backlog = config.max_backlog,
            offset,
            "data writer started"
        );

        Ok(Self {
            config,
            compressor,
            scheduler,
            fragments,
            file: None,
        })
    }

    pub fn config(&self) -> &DataWriterConfig {
        &self.config
    }

    pub fn stats(&self) -> WriterStats {
        self.scheduler.lock().stats
    }

    /// Fragment blocks written so far.
    pub fn fragment_blocks(&self) -> Vec<FragmentEntry> {
        self.scheduler.lock().fragment_blocks.clone()
    }

    /// Every tail placed so far, including ones whose fragment block is still pending.
    pub fn fragment_table(&self) -> Vec<FragmentLocation> {
        self.scheduler.lock().fragments.locations()
    }

    /// Forces the live fragment block out, even if it is not full.
    pub fn flush_fragments(&mut self) -> Result<()> {
        self.fragments.flush(&self.scheduler)
    }

    /// Flushes the last fragment block, waits for every unit, stops the workers and writes the
    /// fragment table after the data. Returns the output and where things ended up.
    pub fn finish(mut self) -> Result<(W, DataSummary)> {
        if self.file.is_some() {
            return Err(Error::Usage("a file is still open"));
        }
        self.fragments.flush(&self.scheduler)?;
        self.scheduler.wait_idle()?;
        self.scheduler.shutdown();

        let (mut output, mut offset, fragment_blocks, fragments, stats) = {
            let mut state = self.scheduler.lock();
            state.check_status()?;
            if !state.fragments.is_final() {
                return Err(Error::OutOfOrder {
                    expected: state.fragment_blocks.len() as u64,
                    found: state.fragments.len() as u64,
                });
            }
            let output = state
                .output
                .take()
                .ok_or(Error::Usage("output already closed"))?;
            (
                output,
                state.offset,
                state.fragment_blocks.clone(),
                state.fragments.locations(),
                state.stats,
            )
        };

        let fragment_table_start = if fragment_blocks.is_empty() {
            None
        } else {
            let mut table = Vec::with_capacity(fragment_blocks.len() * FRAGMENT_ENTRY_SIZE);
            for entry in &fragment_blocks {
                table.extend_from_slice(entry.as_bytes());
            }
            let (start, written) =
                metadata::write_table(&mut output, offset, &self.compressor, &table)?;
            offset += written;
            Some(start)
        };
        output.flush()?;

        info!(
            blocks = stats.blocks_written,
            deduplicated = stats.blocks_deduplicated,
            sparse = stats.sparse_blocks,
            fragment_blocks = stats.fragment_blocks_written,
            fragments_deduplicated = stats.fragments_deduplicated,
            bytes = stats.bytes_written,
            "data writer finished"
        );

        Ok((
            output,
            DataSummary {
                end: offset,
                fragment_table_start,
                fragment_blocks,
                fragments,
                stats,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn writer(block_size: usize, num_workers: usize) -> DataWriter<Cursor<Vec<u8>>> {
        let config = DataWriterConfig {
            block_size,
            num_workers,
            max_backlog: 4,
            ..Default::default()
        };
        DataWriter::new(config, Compressor::gzip(9), Cursor::new(Vec::new())).unwrap()
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| ((i / 3) as u8).wrapping_add(seed)).collect()
    }

    #[test]
    fn splits_files_into_blocks_and_a_tail() {
        let mut w = writer(4096, 2);
        let record = w
            .write_file(&pattern(10000, 1)[..], FileOptions::default())
            .unwrap();
        assert_eq!(record.size, 10000);
        assert_eq!(record.blocks.len(), 2);
        let fragment = record.fragment.unwrap();
        assert_eq!(fragment.size, 1808);
        assert_eq!((fragment.index, fragment.offset), (0, 0));
        assert_eq!(w.stats().units_submitted, 2);

        let (_, summary) = w.finish().unwrap();
        assert_eq!(summary.fragment_blocks.len(), 1);
        assert_eq!(summary.stats.units_submitted, 3);
    }

    #[test]
    fn identical_blocks_are_written_once() {
        let mut w = writer(4096, 3);
        let block = pattern(4096, 7);
        let records: Vec<FileRecord> = (0..3)
            .map(|_| w.write_file(&block[..], FileOptions::default()).unwrap())
            .collect();

        let first = records[0].blocks[0];
        assert!(!first.deduplicated);
        for record in &records[1..] {
            assert_eq!(record.blocks[0].offset, first.offset);
            assert_eq!(record.blocks[0].size, first.size);
            assert!(record.blocks[0].deduplicated);
        }

        let (output, summary) = w.finish().unwrap();
        assert_eq!(summary.stats.blocks_written, 1);
        assert_eq!(summary.stats.blocks_deduplicated, 2);
        assert_eq!(output.into_inner().len() as u32, first.stored_size());
    }

    #[test]
    fn tails_share_fragment_blocks_until_full() {
        let mut w = writer(4096, 2);
        let a = w
            .write_file(&pattern(3000, 1)[..], FileOptions::default())
            .unwrap();
        assert_eq!(w.fragments.len(), 3000);
        let b = w
            .write_file(&pattern(3000, 2)[..], FileOptions::default())
            .unwrap();

        let a = a.fragment.unwrap();
        let b = b.fragment.unwrap();
        assert_eq!((a.index, a.offset), (0, 0));
        assert_eq!((b.index, b.offset), (1, 0));
        assert_eq!(w.fragments.len(), 3000);

        let (_, summary) = w.finish().unwrap();
        assert_eq!(summary.fragment_blocks.len(), 2);
        assert_eq!(summary.fragments, vec![a, b]);
        assert!(summary.fragment_table_start.is_some());
    }

    #[test]
    fn small_tails_pack_into_one_block() {
        let mut w = writer(4096, 1);
        let a = w.write_file(&pattern(1000, 1)[..], FileOptions::default()).unwrap();
        let b = w.write_file(&pattern(1500, 2)[..], FileOptions::default()).unwrap();
        let again = w.write_file(&pattern(1000, 1)[..], FileOptions::default()).unwrap();

        let (a, b, again) = (a.fragment.unwrap(), b.fragment.unwrap(), again.fragment.unwrap());
        assert_eq!((a.index, a.offset), (0, 0));
        assert_eq!((b.index, b.offset), (0, 1000));
        assert_eq!(again, a);

        let (_, summary) = w.finish().unwrap();
        assert_eq!(summary.fragment_blocks.len(), 1);
        assert_eq!(summary.stats.fragments_deduplicated, 1);
        assert_eq!(summary.fragments.len(), 3);
    }

    #[test]
    fn no_fragments_writes_tails_as_blocks() {
        let config = DataWriterConfig {
            block_size: 4096,
            num_workers: 2,
            no_fragments: true,
            ..Default::default()
        };
        let mut w = DataWriter::new(config, Compressor::gzip(9), Cursor::new(Vec::new())).unwrap();
        let record = w
            .write_file(&pattern(5000, 3)[..], FileOptions::default())
            .unwrap();
        assert_eq!(record.blocks.len(), 2);
        assert!(record.fragment.is_none());

        let dont = w
            .write_file(&pattern(100, 4)[..], FileOptions::default().dont_fragment())
            .unwrap();
        assert_eq!(dont.blocks.len(), 1);

        let (_, summary) = w.finish().unwrap();
        assert!(summary.fragment_table_start.is_none());
        assert!(summary.fragment_blocks.is_empty());
    }

    #[test]
    fn zero_blocks_are_sparse() {
        let mut w = writer(4096, 2);
        let mut data = vec![0u8; 4096 * 2];
        data.extend(pattern(4096, 5));
        let record = w.write_file(&data[..], FileOptions::default()).unwrap();
        assert!(record.blocks[0].is_sparse());
        assert!(record.blocks[1].is_sparse());
        assert!(!record.blocks[2].is_sparse());
        assert_eq!(record.blocks_start(), Some(record.blocks[2].offset));

        let (_, summary) = w.finish().unwrap();
        assert_eq!(summary.stats.sparse_blocks, 2);
        assert_eq!(summary.stats.blocks_written, 1);
    }

    #[test]
    fn api_misuse_is_reported() {
        let mut w = writer(4096, 1);
        assert!(matches!(w.append(b"x"), Err(Error::Usage(_))));
        assert!(matches!(w.end_file(), Err(Error::Usage(_))));
        w.begin_file(FileOptions::default()).unwrap();
        assert!(matches!(
            w.begin_file(FileOptions::default()),
            Err(Error::Usage(_))
        ));
        assert!(matches!(w.finish(), Err(Error::Usage(_))));
    }
}
