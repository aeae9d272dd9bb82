mod common;

use common::{config, memory_writer, noise, text, SlowCompressor};
use parking_lot::Mutex;
use sqfs::{BlockFlags, Compressor, DataWriter, FileOptions, WriterHooks, BLOCK_UNCOMPRESSED};
use std::io::Cursor;
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    writes: Mutex<Vec<(BlockFlags, u64, u32)>>,
}

impl WriterHooks for Recorder {
    fn post_block_write(&self, flags: BlockFlags, offset: u64, size: u32) {
        self.writes.lock().push((flags, offset, size));
    }

    fn prepare_padding(&self, padding: &mut [u8]) {
        padding.fill(0xAA);
    }
}

#[test]
fn file_is_split_into_blocks_and_a_tail() {
    let mut writer = memory_writer(config(4096, 2), Compressor::gzip(9));
    let record = writer
        .write_file(&text(10_000, 1)[..], FileOptions::default())
        .unwrap();

    assert_eq!(record.size, 10_000);
    assert_eq!(record.blocks.len(), 2);
    assert_eq!(record.fragment.map(|f| f.size), Some(1808));
    assert_eq!(writer.stats().units_submitted, 2);
    assert_eq!(record.blocks_start(), Some(0));
    assert_eq!(
        record.blocks[1].offset,
        record.blocks[0].stored_size() as u64
    );
}

#[test]
fn tail_that_does_not_fit_starts_a_new_fragment_block() {
    let mut writer = memory_writer(config(4096, 2), Compressor::gzip(9));
    let a = writer
        .write_file(&text(3000, 1)[..], FileOptions::default())
        .unwrap();
    let b = writer
        .write_file(&text(3000, 2)[..], FileOptions::default())
        .unwrap();
    let c = writer
        .write_file(&text(1096, 3)[..], FileOptions::default())
        .unwrap();

    let (a, b, c) = (a.fragment.unwrap(), b.fragment.unwrap(), c.fragment.unwrap());
    assert_eq!((a.index, a.offset, a.size), (0, 0, 3000));
    assert_eq!((b.index, b.offset, b.size), (1, 0, 3000));
    // fills block 1 exactly, which flushes it
    assert_eq!((c.index, c.offset), (1, 3000));
    assert_eq!(writer.stats().units_submitted, 2);

    let (_, summary) = writer.finish().unwrap();
    assert_eq!(summary.fragment_blocks.len(), 2);
    assert_eq!(summary.stats.units_submitted, 2);
}

#[test]
fn aligned_files_are_padded_to_device_blocks() {
    let hooks = Arc::new(Recorder::default());
    let mut writer = DataWriter::with_hooks(
        config(4096, 2),
        Compressor::gzip(9),
        Cursor::new(Vec::new()),
        hooks.clone(),
    )
    .unwrap();
    let raw = FileOptions::default().dont_compress().dont_fragment();

    let first = writer.write_file(&noise(5000, 1)[..], raw).unwrap();
    let aligned = writer.write_file(&noise(9000, 2)[..], raw.align()).unwrap();
    let last = writer.write_file(&noise(100, 3)[..], raw).unwrap();

    assert_eq!(first.blocks[1].offset, 4096);
    let offsets: Vec<u64> = aligned.blocks.iter().map(|b| b.offset).collect();
    assert_eq!(offsets, vec![8192, 12288, 16384]);
    assert_eq!(aligned.blocks[2].size, 808 | BLOCK_UNCOMPRESSED);
    assert_eq!(last.blocks[0].offset, 20480);

    let (output, summary) = writer.finish().unwrap();
    let output = output.into_inner();
    assert_eq!(summary.end, 20580);
    assert!(output[5000..8192].iter().all(|b| *b == 0xAA));
    assert!(output[17192..20480].iter().all(|b| *b == 0xAA));

    let writes = hooks.writes.lock();
    assert_eq!(writes.len(), 6);
    let (flags, offset, size) = writes[2];
    assert!(flags.contains(BlockFlags::ALIGN | BlockFlags::FIRST_BLOCK));
    assert_eq!((offset, size), (8192, 4096 | BLOCK_UNCOMPRESSED));
    assert!(writes[4].0.contains(BlockFlags::LAST_BLOCK));
}

#[test]
fn aligned_file_with_a_fragment_tail() {
    let mut writer = memory_writer(config(4096, 2), Compressor::gzip(9));
    writer
        .write_file(&noise(100, 1)[..], FileOptions::default().dont_fragment())
        .unwrap();
    let aligned = writer
        .write_file(&noise(5000, 2)[..], FileOptions::default().align())
        .unwrap();
    let next = writer
        .write_file(&noise(4096, 3)[..], FileOptions::default())
        .unwrap();

    assert_eq!(aligned.blocks[0].offset, 4096);
    assert!(aligned.fragment.is_some());
    assert_eq!(next.blocks[0].offset, 8192);
}

#[test]
fn zero_blocks_take_no_space() {
    let mut writer = memory_writer(config(4096, 2), Compressor::gzip(9));
    let mut data = vec![0u8; 4096 * 3];
    data.extend(text(4096, 1));
    data.extend(vec![0u8; 4096]);
    let record = writer.write_file(&data[..], FileOptions::default()).unwrap();

    let sparse: Vec<bool> = record.blocks.iter().map(|b| b.is_sparse()).collect();
    assert_eq!(sparse, vec![true, true, true, false, true]);
    assert_eq!(record.block_sizes()[0], 0);
    assert_eq!(record.blocks_start(), Some(0));

    let (output, summary) = writer.finish().unwrap();
    assert_eq!(summary.stats.sparse_blocks, 4);
    assert_eq!(
        output.into_inner().len() as u32,
        record.blocks[3].stored_size()
    );
}

#[test]
fn fragment_rows_become_final_once_written() {
    let mut writer = DataWriter::new(
        config(4096, 3),
        SlowCompressor(Compressor::gzip(6)),
        Cursor::new(Vec::new()),
    )
    .unwrap();

    let mut placed = Vec::new();
    for seed in 0..40u64 {
        let len = 100 + (seed as usize * 397) % 2900;
        let record = writer
            .write_file(&text(len, seed)[..], FileOptions::default())
            .unwrap();
        placed.push(record.fragment.unwrap());
    }
    assert_eq!(writer.fragment_table(), placed);
    assert!(placed.windows(2).all(|w| w[0].index <= w[1].index));

    let (_, summary) = writer.finish().unwrap();
    assert_eq!(summary.fragments, placed);
    let blocks = summary.fragment_blocks.len() as u32;
    assert_eq!(placed.last().map(|f| f.index + 1), Some(blocks));
    for entry in &summary.fragment_blocks {
        assert!(entry.is_compressed());
    }
}

#[test]
fn aligned_file_ending_in_a_duplicate_is_still_padded() {
    let mut writer = memory_writer(config(4096, 2), Compressor::gzip(9));
    let original = writer
        .write_file(&noise(100, 1)[..], FileOptions::default().dont_fragment())
        .unwrap();
    let mut data = text(4096, 2);
    data.extend(noise(100, 1));
    let aligned = writer
        .write_file(&data[..], FileOptions::default().align().dont_fragment())
        .unwrap();
    let next = writer
        .write_file(&noise(100, 3)[..], FileOptions::default().dont_fragment())
        .unwrap();

    assert_eq!(aligned.blocks[0].offset, 4096);
    assert!(aligned.blocks[0].is_compressed());
    assert!(aligned.blocks[1].deduplicated);
    assert_eq!(aligned.blocks[1].offset, original.blocks[0].offset);
    assert_eq!(next.blocks[0].offset, 8192);

    let (_, summary) = writer.finish().unwrap();
    assert_eq!(summary.end, 8292);
}

#[test]
fn aligned_file_ending_in_a_sparse_block_is_still_padded() {
    let mut writer = memory_writer(config(4096, 2), Compressor::gzip(9));
    let mut data = text(4096, 3);
    data.extend(vec![0u8; 4096]);
    let aligned = writer
        .write_file(&data[..], FileOptions::default().align())
        .unwrap();
    let next = writer
        .write_file(&noise(100, 4)[..], FileOptions::default().dont_fragment())
        .unwrap();

    assert_eq!(aligned.blocks[0].offset, 0);
    assert!(aligned.blocks[0].stored_size() < 4096);
    assert!(aligned.blocks[1].is_sparse());
    assert_eq!(next.blocks[0].offset, 4096);
}
