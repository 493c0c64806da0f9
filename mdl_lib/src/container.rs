//! The top level compressed container.
//!
//! # File Layout
//! A fixed size [ContainerHeader] is followed by the compressed chunk records of each section.
//! Sections are stored in [SectionKind::PHYSICAL_ORDER].
//! Header fields indexed by section use [SectionKind::slot] instead.
//!
//! ```text
//! header (256 or 384 bytes)
//! vertex info chunks
//! model data chunks
//! lod 0 vertex buffer chunks
//! lod 0 index buffer chunks
//! ...
//! ```
//!
//! Decompressing each section produces the logical [Sections].
//! Compressing is never exactly reversible, so [Container] stores the compressed chunks
//! and [Container::decompress_sections] and [Container::from_sections] convert explicitly.
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinReaderExt, BinWrite};
use log::trace;

use crate::{
    chunk::{CHUNK_ALIGNMENT, Chunk},
    error::{ReadContainerError, WriteContainerError},
    round_up,
    section::FramedSection,
};

/// The [file_type](struct.ContainerHeader.html#structfield.file_type) for model containers.
pub const FILE_TYPE_MODEL: u32 = 3;

/// The number of logical section groups written to the header.
pub const SECTION_GROUP_COUNT: u32 = 5;

/// The number of level of detail vertex and index buffer pairs.
pub const LOD_COUNT: usize = 3;

/// The number of per section entries in the header tables.
pub const SLOT_COUNT: usize = 2 + 2 * LOD_COUNT;

/// The size of the header before the chunk size table.
pub const HEADER_FIXED_SIZE: u64 = 0xA0;

/// The minimum size of the header.
pub const HEADER_MIN_SIZE: u32 = 256;

/// A single logical section of the container.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SectionKind {
    VertexInfo,
    ModelData,
    /// The vertex buffer for the given level of detail.
    VertexBuffer(usize),
    /// The index buffer for the given level of detail.
    IndexBuffer(usize),
}

impl SectionKind {
    /// The order of sections in the file and the decompressed logical stream.
    pub const PHYSICAL_ORDER: [SectionKind; SLOT_COUNT] = [
        SectionKind::VertexInfo,
        SectionKind::ModelData,
        SectionKind::VertexBuffer(0),
        SectionKind::IndexBuffer(0),
        SectionKind::VertexBuffer(1),
        SectionKind::IndexBuffer(1),
        SectionKind::VertexBuffer(2),
        SectionKind::IndexBuffer(2),
    ];

    /// The index into the per section header tables.
    pub fn slot(self) -> usize {
        match self {
            SectionKind::VertexInfo => 0,
            SectionKind::ModelData => 1,
            SectionKind::VertexBuffer(lod) => 2 + lod,
            SectionKind::IndexBuffer(lod) => 2 + LOD_COUNT + lod,
        }
    }
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone)]
pub struct ContainerHeader {
    /// The size of this header including the chunk table and zero padding.
    pub header_size: u32,
    pub file_type: u32,
    /// The sum of all section [uncompressed_sizes](#structfield.uncompressed_sizes).
    pub uncompressed_size: u32,
    /// The total file size in units of [CHUNK_ALIGNMENT] bytes.
    pub block_span: u32,
    /// The largest decompressed chunk size.
    pub max_chunk_size: u32,
    pub section_count: u32,

    // Section tables indexed by SectionKind::slot.
    pub uncompressed_sizes: [u32; SLOT_COUNT],
    /// The total size of all chunk records for each section.
    pub compressed_sizes: [u32; SLOT_COUNT],
    /// Offsets relative to the end of the header.
    pub offsets: [u32; SLOT_COUNT],
    pub chunk_starts: [u16; SLOT_COUNT],
    pub chunk_counts: [u16; SLOT_COUNT],

    pub mesh_count: u16,
    pub material_count: u16,
    pub lod_count: u8,
    pub flags: [u8; 3],

    /// The padded record size of every chunk in file order.
    #[br(count = chunk_counts.iter().map(|c| *c as usize).sum::<usize>())]
    pub chunk_sizes: Vec<u32>,
}

/// Header fields that do not depend on the compressed data.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ContainerInfo {
    pub mesh_count: u16,
    pub material_count: u16,
    pub lod_count: u8,
    pub flags: [u8; 3],
}

/// The decompressed data for each section.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Sections {
    pub vertex_info: Vec<u8>,
    pub model_data: Vec<u8>,
    pub vertex_buffers: [Vec<u8>; LOD_COUNT],
    pub index_buffers: [Vec<u8>; LOD_COUNT],
}

impl Sections {
    pub fn get(&self, kind: SectionKind) -> &[u8] {
        match kind {
            SectionKind::VertexInfo => &self.vertex_info,
            SectionKind::ModelData => &self.model_data,
            SectionKind::VertexBuffer(lod) => &self.vertex_buffers[lod],
            SectionKind::IndexBuffer(lod) => &self.index_buffers[lod],
        }
    }

    fn get_mut(&mut self, kind: SectionKind) -> &mut Vec<u8> {
        match kind {
            SectionKind::VertexInfo => &mut self.vertex_info,
            SectionKind::ModelData => &mut self.model_data,
            SectionKind::VertexBuffer(lod) => &mut self.vertex_buffers[lod],
            SectionKind::IndexBuffer(lod) => &mut self.index_buffers[lod],
        }
    }

    /// The absolute offset of `kind` in the concatenation of all sections in [SectionKind::PHYSICAL_ORDER].
    pub fn logical_offset(&self, kind: SectionKind) -> u64 {
        SectionKind::PHYSICAL_ORDER
            .iter()
            .take_while(|k| **k != kind)
            .map(|k| self.get(*k).len() as u64)
            .sum()
    }
}

/// A model container with compressed section data.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Container {
    pub header: ContainerHeader,
    /// The compressed chunks for each section indexed by [SectionKind::slot].
    pub sections: [FramedSection; SLOT_COUNT],
}

impl Container {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, ReadContainerError> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let header: ContainerHeader = reader.read_le()?;
        validate_header(&header)?;

        let mut sections: [FramedSection; SLOT_COUNT] = Default::default();
        for kind in SectionKind::PHYSICAL_ORDER {
            let slot = kind.slot();
            let start = header.chunk_starts[slot] as usize;
            let count = header.chunk_counts[slot] as usize;

            let mut offset = header.header_size as u64 + header.offsets[slot] as u64;
            reader.seek(SeekFrom::Start(offset))?;

            let mut chunks = Vec::with_capacity(count);
            for declared_size in &header.chunk_sizes[start..start + count] {
                if offset + *declared_size as u64 > file_size {
                    return Err(ReadContainerError::TruncatedSection {
                        section: kind,
                        offset,
                    });
                }

                let chunk = Chunk::read(reader)?;
                if chunk.padded_size() != *declared_size {
                    return Err(ReadContainerError::HeaderInconsistent {
                        offset,
                        reason: format!(
                            "chunk record has size {} but the header declares {declared_size}",
                            chunk.padded_size()
                        ),
                    });
                }
                offset += *declared_size as u64;
                chunks.push(chunk);
            }

            let section = FramedSection { chunks };
            if section.decompressed_size() != header.uncompressed_sizes[slot] as u64 {
                return Err(ReadContainerError::HeaderInconsistent {
                    offset: 0x18 + 4 * slot as u64,
                    reason: format!(
                        "{kind:?} chunks decompress to {} bytes but the header declares {}",
                        section.decompressed_size(),
                        header.uncompressed_sizes[slot]
                    ),
                });
            }
            trace!("{kind:?}: {} chunks, {} bytes", count, section.decompressed_size());
            sections[slot] = section;
        }

        Ok(Self { header, sections })
    }

    /// Read from `path` using a fully buffered reader for performance.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ReadContainerError> {
        let mut reader = Cursor::new(std::fs::read(path)?);
        Self::read(&mut reader)
    }

    /// Read from `bytes` using a fully buffered reader for performance.
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, ReadContainerError> {
        Self::read(&mut Cursor::new(bytes))
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteContainerError> {
        self.header.write_le(writer)?;
        let header_end = writer.stream_position()?;
        let padding = (self.header.header_size as u64).saturating_sub(header_end);
        writer.write_all(&vec![0u8; padding as usize])?;

        for kind in SectionKind::PHYSICAL_ORDER {
            let slot = kind.slot();
            let offset = self.header.header_size as u64 + self.header.offsets[slot] as u64;
            writer.seek(SeekFrom::Start(offset))?;
            for chunk in &self.sections[slot].chunks {
                chunk.write(writer)?;
            }
        }
        Ok(())
    }

    /// Write to `path` using a buffered writer for better performance.
    pub fn write_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), WriteContainerError> {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write(&mut writer)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteContainerError> {
        let mut writer = Cursor::new(Vec::new());
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    /// Compress each section and calculate the header tables from the compressed chunks.
    pub fn from_sections(
        sections: &Sections,
        info: ContainerInfo,
    ) -> Result<Self, WriteContainerError> {
        let mut framed: [FramedSection; SLOT_COUNT] = Default::default();

        let mut uncompressed_sizes = [0; SLOT_COUNT];
        let mut compressed_sizes = [0; SLOT_COUNT];
        let mut offsets = [0; SLOT_COUNT];
        let mut chunk_starts = [0; SLOT_COUNT];
        let mut chunk_counts = [0; SLOT_COUNT];
        let mut chunk_sizes = Vec::new();

        let mut offset = 0u64;
        for kind in SectionKind::PHYSICAL_ORDER {
            let slot = kind.slot();
            let data = sections.get(kind);
            if data.len() > u32::MAX as usize {
                return Err(WriteContainerError::SectionTooLarge {
                    section: kind,
                    size: data.len(),
                });
            }

            let section = FramedSection::frame(data)?;

            let compressed_size = section.compressed_size();
            if offset + compressed_size > u32::MAX as u64 {
                return Err(WriteContainerError::SectionTooLarge {
                    section: kind,
                    size: compressed_size as usize,
                });
            }

            uncompressed_sizes[slot] = data.len() as u32;
            compressed_sizes[slot] = compressed_size as u32;
            offsets[slot] = offset as u32;
            chunk_starts[slot] = chunk_sizes.len() as u16;
            chunk_counts[slot] = section.chunks.len() as u16;
            chunk_sizes.extend(section.chunks.iter().map(|c| c.padded_size()));

            if chunk_sizes.len() > u16::MAX as usize {
                return Err(WriteContainerError::TooManyChunks {
                    count: chunk_sizes.len(),
                });
            }

            offset += compressed_size;
            framed[slot] = section;
        }

        let header_size = header_size(chunk_sizes.len());
        let total_size = header_size as u64 + offset;

        let header = ContainerHeader {
            header_size,
            file_type: FILE_TYPE_MODEL,
            uncompressed_size: uncompressed_sizes.iter().sum(),
            block_span: (total_size / CHUNK_ALIGNMENT) as u32,
            max_chunk_size: framed
                .iter()
                .map(|s| s.max_chunk_size())
                .max()
                .unwrap_or_default(),
            section_count: SECTION_GROUP_COUNT,
            uncompressed_sizes,
            compressed_sizes,
            offsets,
            chunk_starts,
            chunk_counts,
            mesh_count: info.mesh_count,
            material_count: info.material_count,
            lod_count: info.lod_count,
            flags: info.flags,
            chunk_sizes,
        };

        Ok(Self {
            header,
            sections: framed,
        })
    }

    /// Decompress every section.
    pub fn decompress_sections(&self) -> Result<Sections, ReadContainerError> {
        let mut sections = Sections::default();
        for kind in SectionKind::PHYSICAL_ORDER {
            let slot = kind.slot();
            let data = sections.get_mut(kind);
            data.reserve(self.header.uncompressed_sizes[slot] as usize);

            let mut offset = self.header.header_size as u64 + self.header.offsets[slot] as u64;
            for chunk in &self.sections[slot].chunks {
                let decompressed =
                    chunk
                        .decompress()
                        .map_err(|source| ReadContainerError::CorruptChunk {
                            section: kind,
                            offset,
                            source,
                        })?;
                data.extend_from_slice(&decompressed);
                offset += chunk.padded_size() as u64;
            }
        }
        Ok(sections)
    }

    pub fn info(&self) -> ContainerInfo {
        ContainerInfo {
            mesh_count: self.header.mesh_count,
            material_count: self.header.material_count,
            lod_count: self.header.lod_count,
            flags: self.header.flags,
        }
    }

    pub fn section(&self, kind: SectionKind) -> &FramedSection {
        &self.sections[kind.slot()]
    }

    /// The compressed chunks of `kind` in file order.
    pub fn section_chunks(&self, kind: SectionKind) -> &[Chunk] {
        &self.sections[kind.slot()].chunks
    }
}

/// The header size required for `chunk_count` chunks.
pub fn header_size(chunk_count: usize) -> u32 {
    let size = HEADER_FIXED_SIZE + 4 * chunk_count as u64;
    if size <= HEADER_MIN_SIZE as u64 {
        HEADER_MIN_SIZE
    } else {
        round_up(size, CHUNK_ALIGNMENT) as u32
    }
}

fn validate_header(header: &ContainerHeader) -> Result<(), ReadContainerError> {
    let inconsistent =
        |offset, reason: String| ReadContainerError::HeaderInconsistent { offset, reason };

    if header.file_type != FILE_TYPE_MODEL {
        return Err(inconsistent(
            0x4,
            format!("unexpected file type {}", header.file_type),
        ));
    }

    let table_end = HEADER_FIXED_SIZE + 4 * header.chunk_sizes.len() as u64;
    if (header.header_size as u64) < table_end
        || header.header_size as u64 % CHUNK_ALIGNMENT != 0
    {
        return Err(inconsistent(
            0x0,
            format!(
                "header size {} does not fit {} chunks",
                header.header_size,
                header.chunk_sizes.len()
            ),
        ));
    }

    let uncompressed_size: u64 = header.uncompressed_sizes.iter().map(|s| *s as u64).sum();
    if uncompressed_size != header.uncompressed_size as u64 {
        return Err(inconsistent(
            0x8,
            format!(
                "total size {} does not match section sizes {uncompressed_size}",
                header.uncompressed_size
            ),
        ));
    }

    for slot in 0..SLOT_COUNT {
        let start = header.chunk_starts[slot] as usize;
        let end = start + header.chunk_counts[slot] as usize;
        if end > header.chunk_sizes.len() {
            return Err(inconsistent(
                0x78 + 2 * slot as u64,
                format!("chunk range {start}..{end} is out of range"),
            ));
        }

        let compressed_size: u64 = header.chunk_sizes[start..end]
            .iter()
            .map(|s| *s as u64)
            .sum();
        if compressed_size != header.compressed_sizes[slot] as u64 {
            return Err(inconsistent(
                0x38 + 4 * slot as u64,
                format!(
                    "chunk sizes sum to {compressed_size} but the section declares {}",
                    header.compressed_sizes[slot]
                ),
            ));
        }
    }

    Ok(())
}
