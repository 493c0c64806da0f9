//! Splitting section data into compressed chunks.
use rayon::prelude::*;

use crate::{
    chunk::{Chunk, MAX_CHUNK_SIZE},
    error::DecompressChunkError,
};

/// The ordered compressed chunks for a single logical section.
///
/// Only the last chunk may contain fewer than [MAX_CHUNK_SIZE] bytes.
/// An empty section has no chunks.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct FramedSection {
    pub chunks: Vec<Chunk>,
}

impl FramedSection {
    /// Compress `data` into consecutive chunks of at most [MAX_CHUNK_SIZE] bytes.
    pub fn frame(data: &[u8]) -> std::io::Result<Self> {
        // Chunks compress independently, so the order only matters when collecting.
        let chunks = data
            .par_chunks(MAX_CHUNK_SIZE)
            .map(Chunk::from_decompressed)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { chunks })
    }

    /// Decompress and concatenate all chunks in order.
    pub fn unframe(&self) -> Result<Vec<u8>, DecompressChunkError> {
        let mut data = Vec::with_capacity(self.decompressed_size() as usize);
        for chunk in &self.chunks {
            data.extend_from_slice(&chunk.decompress()?);
        }
        Ok(data)
    }

    pub fn decompressed_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.decompressed_size as u64).sum()
    }

    /// The total size of all chunk records including headers and padding.
    pub fn compressed_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.padded_size() as u64).sum()
    }

    /// The largest decompressed chunk size or 0 for an empty section.
    pub fn max_chunk_size(&self) -> u32 {
        self.chunks
            .iter()
            .map(|c| c.decompressed_size)
            .max()
            .unwrap_or_default()
    }
}
