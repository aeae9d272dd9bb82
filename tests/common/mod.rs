//! Helpers shared by the integration tests.
#![allow(dead_code)]

use parking_lot::Mutex;
use sqfs::{Compress, Compressor, DataWriter, DataWriterConfig, Error, Result};
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// In-memory output that stays readable after the writer that owns a clone of it is gone.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().get_ref().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().seek(pos)
    }
}

/// Accepts `budget` bytes, then fails every write.
pub struct FailingWriter {
    position: u64,
    budget: u64,
}

impl FailingWriter {
    pub fn new(budget: u64) -> Self {
        Self {
            position: 0,
            budget,
        }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.position + buf.len() as u64 > self.budget {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FailingWriter {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Ok(self.position)
    }
}

/// Gzip with a delay that depends on the payload, so workers finish out of order.
#[derive(Clone)]
pub struct SlowCompressor(pub Compressor);

impl Compress for SlowCompressor {
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        let delay = crc32fast::hash(input) % 3000;
        thread::sleep(Duration::from_micros(delay as u64));
        self.0.compress(input, output)
    }
}

/// Gzip, except for payloads starting with one of the poisoned bytes.
#[derive(Clone)]
pub struct FailingCompressor {
    pub poisoned: Vec<u8>,
}

impl Compress for FailingCompressor {
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        match input.first() {
            Some(b) if self.poisoned.contains(b) => {
                Err(Error::Compression(format!("poisoned block {:#x}", b)))
            }
            _ => Compressor::gzip(6).compress(input, output),
        }
    }
}

pub fn config(block_size: usize, num_workers: usize) -> DataWriterConfig {
    DataWriterConfig {
        block_size,
        num_workers,
        max_backlog: num_workers * 2,
        ..Default::default()
    }
}

/// Incompressible bytes, different for every seed.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}

/// Compressible bytes, different for every seed.
pub fn text(len: usize, seed: u64) -> Vec<u8> {
    let words = ["alpha ", "bravo ", "charlie ", "delta ", "echo ", "foxtrot "];
    let mut out = format!("file {} ", seed).into_bytes();
    let mut x = seed;
    while out.len() < len {
        x = x
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        out.extend_from_slice(words[(x >> 33) as usize % words.len()].as_bytes());
    }
    out.truncate(len);
    out
}

pub fn memory_writer<C>(config: DataWriterConfig, compressor: C) -> DataWriter<Cursor<Vec<u8>>, C>
where
    C: Compress + Clone + Send + 'static,
{
    DataWriter::new(config, compressor, Cursor::new(Vec::new())).unwrap()
}
