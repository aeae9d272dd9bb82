use bitflags::bitflags;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use std::fmt::{self, Debug, Display};
use std::io::{copy, Error, ErrorKind, Read, Result, Write};
use std::mem;
use xz2::read::XzDecoder;
use xz2::stream::{Check, Filters, LzmaOptions, Stream};
use xz2::write::XzEncoder;

use crate::utils::get_set_field_tuple;

pub trait Decompress {
    fn decompress<R: Read + ?Sized, W: Write + ?Sized>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64>;
}

/// Compresses a single block.
///
/// Implementations replace the contents of `output` with the compressed form of `input`. The
/// caller decides whether the result is worth keeping.
pub trait Compress {
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> crate::Result<()>;
}

fn compression_error<E: Display>(e: E) -> crate::Error {
    crate::Error::Compression(e.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressorId {
    Gzip = 1,
    Lzo = 2,
    Lzma = 3,
    Xz = 4,
    Lz4 = 5,
    Zstd = 6,
}

impl TryFrom<u16> for CompressorId {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Lzo),
            3 => Ok(Self::Lzma),
            4 => Ok(Self::Xz),
            5 => Ok(Self::Lz4),
            6 => Ok(Self::Zstd),
            _ => Err(Error::new(
                ErrorKind::InvalidData,
                format!("bad compressor id {}", value),
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Compressor {
    GZIP(GzipCompressor),
    XZ(XZCompressor),
    ZSTD(ZSTDCompressor),
}

impl Compressor {
    /// Builds a compressor from the superblock id and the raw option bytes stored after the
    /// superblock, if any.
    pub fn new(compressor: u16, options: Option<&[u8]>) -> Result<Self> {
        match CompressorId::try_from(compressor)? {
            CompressorId::Gzip => Ok(Self::GZIP(GzipCompressor::from_options(options)?)),
            CompressorId::Xz => Ok(Self::XZ(XZCompressor::from_options(options)?)),
            CompressorId::Zstd => Ok(Self::ZSTD(ZSTDCompressor::from_options(options)?)),
            other => Err(Error::new(
                ErrorKind::Unsupported,
                format!("compressor {:?} is not supported", other),
            )),
        }
    }

    pub fn gzip(level: u32) -> Self {
        let mut c = GzipCompressor::default();
        c.set_compression_level(level.clamp(1, 9));
        Self::GZIP(c)
    }

    pub fn xz(dictionary_size: u32) -> Self {
        let mut c = XZCompressor::default();
        c.set_dictionary_size(dictionary_size);
        Self::XZ(c)
    }

    pub fn zstd(level: u32) -> Self {
        let mut c = ZSTDCompressor::default();
        c.set_compression_level(level.clamp(1, 22));
        Self::ZSTD(c)
    }

    pub fn id(&self) -> CompressorId {
        match self {
            Self::GZIP(_) => CompressorId::Gzip,
            Self::XZ(_) => CompressorId::Xz,
            Self::ZSTD(_) => CompressorId::Zstd,
        }
    }

    /// Option bytes as stored after the superblock.
    pub fn options(&self) -> &[u8] {
        match self {
            Self::GZIP(c) => &c.0,
            Self::XZ(c) => &c.0,
            Self::ZSTD(c) => &c.0,
        }
    }
}

impl Display for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GZIP(c) => write!(f, "gzip {}", c),
            Self::XZ(c) => write!(f, "xz {}", c),
            Self::ZSTD(c) => write!(f, "zstd {}", c),
        }
    }
}

impl Decompress for Compressor {
    fn decompress<R: ?Sized, W: ?Sized>(&self, reader: &mut R, writer: &mut W) -> Result<u64>
    where
        R: Read,
        W: Write,
    {
        match self {
            Compressor::GZIP(c) => Decompress::decompress(c, reader, writer),
            Compressor::XZ(c) => Decompress::decompress(c, reader, writer),
            Compressor::ZSTD(c) => Decompress::decompress(c, reader, writer),
        }
    }
}

impl Compress for Compressor {
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> crate::Result<()> {
        match self {
            Compressor::GZIP(c) => c.compress(input, output),
            Compressor::XZ(c) => c.compress(input, output),
            Compressor::ZSTD(c) => c.compress(input, output),
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::GZIP(Default::default())
    }
}

fn options_array<const N: usize>(options: Option<&[u8]>) -> Result<Option<[u8; N]>> {
    options
        .map(|bytes| {
            bytes.try_into().map_err(|_| {
                Error::new(
                    ErrorKind::InvalidData,
                    format!("expected {} option bytes, got {}", N, bytes.len()),
                )
            })
        })
        .transpose()
}

bitflags! {
    pub struct XZFilters: u32 {
        const X86 = 0x0001;
        const POWER_PC = 0x0002;
        const IA64 = 0x0004;
        const ARM = 0x0008;
        const ARM_THUMB = 0x0010;
        const SPARC = 0x0020;
    }
}

impl Display for XZFilters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

// struct squashfs_xz_options {
// 	0 4 unsigned int		dictionary_size;
// 	4 4 unsigned int		flags;
// };
#[derive(Clone, Debug)]
pub struct XZCompressor([u8; 8]);

impl XZCompressor {
    const SIZE: usize = 8;

    fn from_options(bytes: Option<&[u8]>) -> Result<Self> {
        Ok(match options_array::<8>(bytes)? {
            Some(bytes) => Self(bytes),
            None => Self::default(),
        })
    }

    get_set_field_tuple!(dictionary_size, set_dictionary_size, u32, 0, 4);
    get_set_field_tuple!(filter_bits, set_filter_bits, u32, 4, 4);

    pub fn filters(&self) -> XZFilters {
        XZFilters::from_bits_truncate(self.filter_bits())
    }

    // BCJ filters are recorded in the options but only LZMA2 is applied
    fn stream(&self) -> std::result::Result<Stream, xz2::stream::Error> {
        let mut opts = LzmaOptions::new_preset(6)?;
        opts.dict_size(self.dictionary_size());
        let mut filters = Filters::new();
        filters.lzma2(&opts);
        Stream::new_stream_encoder(&filters, Check::Crc32)
    }
}

impl Default for XZCompressor {
    fn default() -> Self {
        let mut c = Self([0; Self::SIZE]);
        c.set_dictionary_size(crate::DEFAULT_BLOCK_SIZE as u32);
        c
    }
}

impl Decompress for XZCompressor {
    fn decompress<R: Read + ?Sized, W: Write + ?Sized>(
        &self,
        compressed: &mut R,
        decompressed: &mut W,
    ) -> Result<u64> {
        let s = Stream::new_stream_decoder(u64::MAX, 0)?;
        let mut decoder = XzDecoder::new_stream(compressed, s);
        copy(&mut decoder, decompressed)
    }
}

impl Compress for XZCompressor {
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> crate::Result<()> {
        let stream = self.stream().map_err(compression_error)?;
        output.clear();
        let mut encoder = XzEncoder::new_stream(mem::take(output), stream);
        encoder.write_all(input).map_err(compression_error)?;
        *output = encoder.finish().map_err(compression_error)?;
        Ok(())
    }
}

impl Display for XZCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:#x} {}]", self.dictionary_size(), self.filters())
    }
}

bitflags! {
    pub struct GzipStrategies: u16 {
        const DEFAULT = 0x0001;
        const FILTERED = 0x0002;
        const HUFFMAN_ONLY = 0x0004;
        const RUN_LENGTH_ENCODED = 0x0008;
        const FIXED = 0x0010;
    }
}

impl Display for GzipStrategies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

// struct squashfs_gzip_options {
// 	0 4 unsigned int		compression_level;
// 	4 2 unsigned short		window_size;
// 	6 2 unsigned short		strategy;
// };
#[derive(Clone, Debug)]
pub struct GzipCompressor([u8; 8]);

impl GzipCompressor {
    const SIZE: usize = 8;

    fn from_options(bytes: Option<&[u8]>) -> Result<Self> {
        Ok(match options_array::<8>(bytes)? {
            Some(bytes) => Self(bytes),
            None => Self::default(),
        })
    }

    get_set_field_tuple!(compression_level, set_compression_level, u32, 0, 4);
    get_set_field_tuple!(window_size, set_window_size, u16, 4, 2);
    get_set_field_tuple!(strategy_bits, set_strategy_bits, u16, 6, 2);

    pub fn strategies(&self) -> GzipStrategies {
        GzipStrategies::from_bits_truncate(self.strategy_bits())
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        let mut c = Self([0; Self::SIZE]);
        c.set_compression_level(9);
        c.set_window_size(15);
        c
    }
}

impl Decompress for GzipCompressor {
    fn decompress<R: Read + ?Sized, W: Write + ?Sized>(
        &self,
        compressed: &mut R,
        decompressed: &mut W,
    ) -> Result<u64> {
        let mut decoder = ZlibDecoder::new(compressed);
        copy(&mut decoder, decompressed)
    }
}

impl Compress for GzipCompressor {
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> crate::Result<()> {
        output.clear();
        let level = Compression::new(self.compression_level().clamp(1, 9));
        let mut encoder = ZlibEncoder::new(mem::take(output), level);
        encoder.write_all(input).map_err(compression_error)?;
        *output = encoder.finish().map_err(compression_error)?;
        Ok(())
    }
}

impl Display for GzipCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {} {}]",
            self.compression_level(),
            self.window_size(),
            self.strategies()
        )
    }
}

// struct squashfs_zstd_options {
// 	0 4 unsigned int		compression_level;
// };
#[derive(Clone, Debug)]
pub struct ZSTDCompressor([u8; 4]);

impl ZSTDCompressor {
    const SIZE: usize = 4;

    fn from_options(bytes: Option<&[u8]>) -> Result<Self> {
        Ok(match options_array::<4>(bytes)? {
            Some(bytes) => Self(bytes),
            None => Self::default(),
        })
    }

    get_set_field_tuple!(compression_level, set_compression_level, u32, 0, 4);
}

impl Default for ZSTDCompressor {
    fn default() -> Self {
        let mut c = Self([0; Self::SIZE]);
        c.set_compression_level(15);
        c
    }
}

impl Decompress for ZSTDCompressor {
    fn decompress<R: Read + ?Sized, W: Write + ?Sized>(
        &self,
        compressed: &mut R,
        decompressed: &mut W,
    ) -> Result<u64> {
        let mut decoder = zstd::stream::read::Decoder::new(compressed)?;
        copy(&mut decoder, decompressed)
    }
}

impl Compress for ZSTDCompressor {
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> crate::Result<()> {
        output.clear();
        zstd::stream::copy_encode(input, &mut *output, self.compression_level() as i32)
            .map_err(compression_error)
    }
}

impl Display for ZSTDCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.compression_level())
    }
}
