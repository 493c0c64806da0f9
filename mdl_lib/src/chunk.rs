//! Independently compressed chunks of section data.
//!
//! Each chunk stores at most [MAX_CHUNK_SIZE] decompressed bytes as a raw deflate stream.
//! The record is a 16 byte [ChunkHeader] followed by the stream
//! and zero padding so the total record size is a multiple of [CHUNK_ALIGNMENT].
use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinReaderExt, BinResult, BinWrite};
use flate2::{Compression, bufread::DeflateEncoder};
use zune_inflate::{DeflateDecoder, DeflateOptions};

use crate::error::DecompressChunkError;

/// The maximum number of decompressed bytes in a single chunk.
pub const MAX_CHUNK_SIZE: usize = 16000;

/// The size in bytes of [ChunkHeader].
pub const CHUNK_HEADER_SIZE: u32 = 16;

/// Chunk records are zero padded to a multiple of this size.
pub const CHUNK_ALIGNMENT: u64 = 128;

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct ChunkHeader {
    #[br(assert(header_size == CHUNK_HEADER_SIZE, "unexpected chunk header size {}", header_size))]
    pub header_size: u32,
    // Always 0.
    pub unk1: u32,
    pub compressed_size: u32,
    pub decompressed_size: u32,
}

/// A single compressed chunk.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Chunk {
    /// The length of the data after decompressing [deflate_stream](#structfield.deflate_stream).
    pub decompressed_size: u32,
    /// A raw deflate stream without any zlib header or checksum.
    pub deflate_stream: Vec<u8>,
}

impl Chunk {
    /// Compress at most [MAX_CHUNK_SIZE] bytes.
    pub fn from_decompressed(decompressed: &[u8]) -> std::io::Result<Self> {
        debug_assert!(decompressed.len() <= MAX_CHUNK_SIZE);

        let mut encoder = DeflateEncoder::new(decompressed, Compression::best());
        let mut deflate_stream = Vec::new();
        encoder.read_to_end(&mut deflate_stream)?;

        Ok(Self {
            decompressed_size: decompressed.len() as u32,
            deflate_stream,
        })
    }

    /// Inflate the stream and check that it has the declared length.
    pub fn decompress(&self) -> Result<Vec<u8>, DecompressChunkError> {
        let mut decoder = DeflateDecoder::new_with_options(
            &self.deflate_stream,
            DeflateOptions::default().set_size_hint(self.decompressed_size as usize),
        );
        let decompressed = decoder.decode_deflate()?;
        if decompressed.len() != self.decompressed_size as usize {
            return Err(DecompressChunkError::LengthMismatch {
                expected: self.decompressed_size as usize,
                actual: decompressed.len(),
            });
        }
        Ok(decompressed)
    }

    /// The size in bytes of the record including the header and trailing padding.
    pub fn padded_size(&self) -> u32 {
        let size = CHUNK_HEADER_SIZE as u64 + self.deflate_stream.len() as u64;
        (size + padding_size(self.deflate_stream.len() as u64)) as u32
    }

    pub fn header(&self) -> ChunkHeader {
        ChunkHeader {
            header_size: CHUNK_HEADER_SIZE,
            unk1: 0,
            compressed_size: self.deflate_stream.len() as u32,
            decompressed_size: self.decompressed_size,
        }
    }

    /// Read a chunk record and skip its trailing padding.
    pub fn read<R: Read + Seek>(reader: &mut R) -> BinResult<Self> {
        let header: ChunkHeader = reader.read_le()?;

        let mut deflate_stream = vec![0u8; header.compressed_size as usize];
        reader.read_exact(&mut deflate_stream)?;

        let padding = padding_size(header.compressed_size as u64);
        reader.seek(SeekFrom::Current(padding as i64))?;

        Ok(Self {
            decompressed_size: header.decompressed_size,
            deflate_stream,
        })
    }

    /// Write the chunk record including zero padding.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        self.header().write_le(writer)?;
        writer.write_all(&self.deflate_stream)?;

        let padding = padding_size(self.deflate_stream.len() as u64);
        writer.write_all(&vec![0u8; padding as usize])?;
        Ok(())
    }
}

/// The number of zero bytes after a compressed stream of `compressed_size` bytes.
pub const fn padding_size(compressed_size: u64) -> u64 {
    let remainder = (compressed_size + CHUNK_HEADER_SIZE as u64) % CHUNK_ALIGNMENT;
    if remainder == 0 {
        0
    } else {
        CHUNK_ALIGNMENT - remainder
    }
}
