//! Writes tables as metadata blocks: 8 KiB chunks, each prefixed by a 16 bit header holding the
//! stored length and an "uncompressed" bit.

use std::io::Write;

use crate::compressors::Compress;
use crate::error::Result;
use crate::METADATA_SIZE;

pub(crate) const METADATA_UNCOMPRESSED: u16 = 1 << 15;

/// Writes `data` as a sequence of metadata blocks starting at `offset`.
///
/// Returns the image offset of every block and the number of bytes written.
pub(crate) fn write_metadata_blocks<W, C>(
    writer: &mut W,
    offset: u64,
    compressor: &C,
    data: &[u8],
) -> Result<(Vec<u64>, u64)>
where
    W: Write + ?Sized,
    C: Compress + ?Sized,
{
    let mut starts = Vec::with_capacity(data.len().div_ceil(METADATA_SIZE));
    let mut written = 0u64;
    let mut scratch = Vec::with_capacity(METADATA_SIZE);

    for chunk in data.chunks(METADATA_SIZE) {
        compressor.compress(chunk, &mut scratch)?;
        let (header, payload) = if scratch.len() < chunk.len() {
            (scratch.len() as u16, &scratch[..])
        } else {
            (chunk.len() as u16 | METADATA_UNCOMPRESSED, chunk)
        };

        starts.push(offset + written);
        writer.write_all(&header.to_le_bytes())?;
        writer.write_all(payload)?;
        written += 2 + payload.len() as u64;
    }

    Ok((starts, written))
}

/// Writes `data` as metadata blocks followed by the little endian index of their offsets, the
/// two level layout used by the fragment, id and export tables.
///
/// Returns the offset of the index and the number of bytes written.
pub(crate) fn write_table<W, C>(
    writer: &mut W,
    offset: u64,
    compressor: &C,
    data: &[u8],
) -> Result<(u64, u64)>
where
    W: Write + ?Sized,
    C: Compress + ?Sized,
{
    let (starts, mut written) = write_metadata_blocks(writer, offset, compressor, data)?;
    let index_start = offset + written;
    for start in starts {
        writer.write_all(&start.to_le_bytes())?;
        written += 8;
    }
    Ok((index_start, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressors::Compressor;
    use crate::read::read_block;

    #[test]
    fn blocks_read_back_through_the_reader() {
        let compressor = Compressor::gzip(9);
        let data: Vec<u8> = (0..METADATA_SIZE * 2 + 100).map(|i| (i % 7) as u8).collect();

        let mut out = vec![0u8; 10];
        let (starts, written) = write_metadata_blocks(&mut out, 10, &compressor, &data).unwrap();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[0], 10);
        assert_eq!(out.len() as u64, 10 + written);

        let mut restored = Vec::new();
        let mut cursor = std::io::Cursor::new(&out);
        for (i, start) in starts.iter().enumerate() {
            let expected = if i == 2 { 100 } else { METADATA_SIZE as u32 };
            read_block(&mut cursor, &mut restored, &compressor, *start, Some(expected)).unwrap();
        }
        assert_eq!(restored, data);
    }

    #[test]
    fn incompressible_chunks_are_stored_raw() {
        struct Expanding;
        impl Compress for Expanding {
            fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
                output.clear();
                output.extend_from_slice(input);
                output.push(0);
                Ok(())
            }
        }

        let mut out = Vec::new();
        let (index, written) = write_table(&mut out, 0, &Expanding, &[7u8; 16]).unwrap();
        assert_eq!(index, 18);
        assert_eq!(written, 26);
        assert_eq!(&out[..2], &(16 | METADATA_UNCOMPRESSED).to_le_bytes());
        assert_eq!(&out[18..], &0u64.to_le_bytes());
    }
}
