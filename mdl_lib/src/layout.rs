//! The model data section describing meshes, skinning, and buffer layouts.
//!
//! # Overview
//! [ModelData] is a sequence of tables read with a single forward cursor.
//! The counts in [ModelHeader] determine the size of each table.
//! Every count is checked against the remaining section length before reading,
//! so malformed counts fail with [ReadLayoutError::TruncatedSection] instead of allocating.
//!
//! ```text
//! path block
//! model header
//! lod headers (3)
//! meshes
//! mesh parts
//! bone data
//! bone index sets
//! hider infos, hider data infos, hider data entries
//! bone index parts
//! padding
//! bounding boxes
//! bone transforms
//! ```
use std::io::{Cursor, Read, Seek, Write};

use binrw::{BinRead, BinReaderExt, BinWrite};

use crate::{
    container::LOD_COUNT,
    error::{ReadLayoutError, WriteLayoutError},
};

/// The maximum number of bones referenced by a [BoneIndexSet].
pub const BONE_SET_SIZE: usize = 64;

pub const MODEL_HEADER_SIZE: u64 = 56;
pub const LOD_HEADER_SIZE: u64 = 52;
pub const MESH_HEADER_SIZE: u64 = 36;
pub const MESH_PART_HEADER_SIZE: u64 = 16;
pub const BONE_DATA_SIZE: u64 = 4;
pub const BONE_INDEX_SET_SIZE: u64 = 132;
pub const HIDER_INFO_SIZE: u64 = 16;
pub const HIDER_DATA_INFO_SIZE: u64 = 12;
pub const HIDER_DATA_ENTRY_SIZE: u64 = 4;
pub const BOUNDING_BOXES_SIZE: u64 = 128;
pub const BONE_TRANSFORM_SIZE: u64 = 32;

/// Global counts for the tables in [ModelData].
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone)]
pub struct ModelHeader {
    pub unk1: [u8; 4],
    pub mesh_count: u16,
    pub attribute_count: u16,
    pub mesh_part_count: u16,
    pub material_count: u16,
    pub bone_count: u16,
    pub bone_set_count: u16,
    pub hider_info_count: u16,
    pub hider_data_info_count: u16,
    pub hider_data_entry_count: u16,
    pub unk2: [u8; 34],
}

/// The meshes and buffer locations for a single level of detail.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Default)]
pub struct LodHeader {
    /// The index of the first mesh in [meshes](struct.ModelData.html#structfield.meshes).
    pub mesh_index: u16,
    pub mesh_count: u16,
    pub unk: [u32; 7],
    pub index_data_start: u32,
    /// The size of the vertex buffer section for this level of detail.
    pub vertex_data_size: u32,
    /// The size of the index buffer section for this level of detail.
    pub index_data_size: u32,
    /// The absolute offset of the vertex buffer section in the decompressed sections.
    pub vertex_data_offset: u32,
    /// The absolute offset of the index buffer section in the decompressed sections.
    pub index_data_offset: u32,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Default)]
pub struct MeshHeader {
    pub vertex_count: u32,
    pub index_count: u32,
    pub material_index: u16,
    /// The index of the first part in [mesh_parts](struct.ModelData.html#structfield.mesh_parts).
    pub part_index: u16,
    pub part_count: u16,
    /// The index into [bone_sets](struct.ModelData.html#structfield.bone_sets).
    pub bone_set_index: u16,
    /// The offset in indices relative to the start of the index buffer for this level of detail.
    pub index_data_offset: u32,
    /// The byte offset of each vertex block relative to the start of the vertex buffer for this level of detail.
    pub vertex_data_offsets: [u32; 3],
    pub vertex_strides: [u8; 3],
    pub vertex_block_count: u8,
}

/// A range of indices drawn with a single attribute and bone range.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Default)]
pub struct MeshPartHeader {
    /// The offset in indices relative to the start of the index buffer for this level of detail.
    pub index_offset: u32,
    pub index_count: u32,
    pub attribute_index: u32,
    pub bone_start_offset: u16,
    pub bone_count: u16,
}

/// A mesh local table of global bone indices.
///
/// Vertex bone indices select a slot in [bones](#structfield.bones).
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone)]
pub struct BoneIndexSet {
    pub bones: [u16; BONE_SET_SIZE],
    pub count: u32,
}

impl Default for ModelHeader {
    fn default() -> Self {
        Self {
            unk1: [0; 4],
            mesh_count: 0,
            attribute_count: 0,
            mesh_part_count: 0,
            material_count: 0,
            bone_count: 0,
            bone_set_count: 0,
            hider_info_count: 0,
            hider_data_info_count: 0,
            hider_data_entry_count: 0,
            unk2: [0; 34],
        }
    }
}

impl Default for BoneIndexSet {
    fn default() -> Self {
        Self {
            bones: [0; BONE_SET_SIZE],
            count: 0,
        }
    }
}

impl BoneIndexSet {
    /// The global bone indices for the used slots.
    pub fn used_bones(&self) -> &[u16] {
        &self.bones[..(self.count as usize).min(BONE_SET_SIZE)]
    }
}

/// A named group of alternate vertex assignments for each level of detail.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Default)]
pub struct MeshHiderInfo {
    /// The byte offset of the name in the path block.
    pub name_offset: u32,
    /// The first [HiderDataInfo] for each level of detail.
    pub data_info_indices: [u16; LOD_COUNT],
    pub data_info_counts: [u16; LOD_COUNT],
}

/// The [HiderDataEntry] range applied to the mesh starting at a given index buffer offset.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Default)]
pub struct HiderDataInfo {
    /// The [index_data_offset](struct.MeshHeader.html#structfield.index_data_offset) of the affected mesh.
    pub index_data_offset: u32,
    pub entry_count: u32,
    pub entry_offset: u32,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy, Default)]
pub struct HiderDataEntry {
    /// The position in the index buffer for this level of detail.
    pub reference_index_offset: u16,
    /// The mesh local vertex index substituted at the referenced position.
    pub hide_index: u16,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct BoundingBoxes {
    pub values: [[f32; 4]; 8],
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct BoneTransform {
    pub values: [[f32; 4]; 2],
}

/// The strings stored in the path block.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PathTable {
    pub attributes: Vec<String>,
    pub bones: Vec<String>,
    pub materials: Vec<String>,
    /// Additional strings like hider names.
    pub extra: Vec<String>,
    /// Bytes after the last string.
    pub padding: Vec<u8>,
}

impl PathTable {
    fn from_block(
        block: &[u8],
        block_offset: u64,
        string_count: u32,
        header: &ModelHeader,
    ) -> Result<Self, ReadLayoutError> {
        let counts = [
            header.attribute_count as usize,
            header.bone_count as usize,
            header.material_count as usize,
        ];
        let required: usize = counts.iter().sum();
        if (string_count as usize) < required {
            return Err(ReadLayoutError::InvalidStringCount {
                offset: block_offset - 8,
                declared: string_count,
                required,
            });
        }

        // Each string needs at least its terminator.
        if string_count as u64 > block.len() as u64 {
            return Err(ReadLayoutError::TruncatedSection {
                context: "path strings",
                offset: block_offset,
                needed: string_count as u64,
                remaining: block.len() as u64,
            });
        }

        let mut strings = Vec::with_capacity(string_count as usize);
        let mut position = 0;
        for index in 0..string_count as usize {
            let offset = block_offset + position as u64;
            let length = block[position..]
                .iter()
                .position(|b| *b == 0)
                .ok_or(ReadLayoutError::MissingString { offset, index })?;
            let text = std::str::from_utf8(&block[position..position + length])
                .map_err(|_| ReadLayoutError::InvalidString { offset })?;
            strings.push(text.to_string());
            position += length + 1;
        }

        let mut strings = strings.into_iter();
        let mut take = |n| strings.by_ref().take(n).collect::<Vec<_>>();
        let attributes = take(counts[0]);
        let bones = take(counts[1]);
        let materials = take(counts[2]);
        let extra = strings.collect();

        Ok(Self {
            attributes,
            bones,
            materials,
            extra,
            padding: block[position..].to_vec(),
        })
    }

    fn strings(&self) -> impl Iterator<Item = &String> {
        self.attributes
            .iter()
            .chain(&self.bones)
            .chain(&self.materials)
            .chain(&self.extra)
    }

    /// The number of strings and the NUL terminated string bytes.
    fn to_block(&self) -> Result<(u32, Vec<u8>), WriteLayoutError> {
        let mut block = Vec::with_capacity(self.block_size());
        let mut count = 0;
        for text in self.strings() {
            if text.contains('\0') {
                return Err(WriteLayoutError::InvalidString(text.clone()));
            }
            block.extend_from_slice(text.as_bytes());
            block.push(0);
            count += 1;
        }
        block.extend_from_slice(&self.padding);
        Ok((count, block))
    }

    pub fn block_size(&self) -> usize {
        self.strings().map(|s| s.len() + 1).sum::<usize>() + self.padding.len()
    }

    /// The byte offset of `text` within the path block.
    pub fn offset_of(&self, text: &str) -> Option<u32> {
        let mut offset = 0;
        for s in self.strings() {
            if s == text {
                return Some(offset as u32);
            }
            offset += s.len() + 1;
        }
        None
    }
}

/// The complete model data section.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ModelData {
    pub paths: PathTable,
    pub header: ModelHeader,
    pub lods: [LodHeader; LOD_COUNT],
    pub meshes: Vec<MeshHeader>,
    pub mesh_parts: Vec<MeshPartHeader>,
    /// Opaque per bone data.
    pub bone_data: Vec<[u8; 4]>,
    pub bone_sets: Vec<BoneIndexSet>,
    pub hider_infos: Vec<MeshHiderInfo>,
    pub hider_data_infos: Vec<HiderDataInfo>,
    pub hider_entries: Vec<HiderDataEntry>,
    pub bone_index_parts: Vec<u16>,
    pub padding: Vec<u8>,
    pub bounding_boxes: BoundingBoxes,
    pub bone_transforms: Vec<BoneTransform>,
}

impl ModelData {
    pub fn read(bytes: &[u8]) -> Result<Self, ReadLayoutError> {
        let mut reader = SectionReader::new(bytes);

        let string_count: u32 = reader.read(4, "path block")?;
        let block_size: u32 = reader.read(4, "path block")?;
        let block_offset = reader.position();
        let block = reader.read_bytes(block_size as u64, "path block")?;

        let header: ModelHeader = reader.read(MODEL_HEADER_SIZE, "model header")?;
        let paths = PathTable::from_block(&block, block_offset, string_count, &header)?;

        let lods = reader.read(LOD_HEADER_SIZE * LOD_COUNT as u64, "lod headers")?;
        let meshes = reader.read_records(header.mesh_count, MESH_HEADER_SIZE, "meshes")?;
        let mesh_parts =
            reader.read_records(header.mesh_part_count, MESH_PART_HEADER_SIZE, "mesh parts")?;
        let bone_data = reader.read_records(header.bone_count, BONE_DATA_SIZE, "bone data")?;
        let bone_sets =
            reader.read_records(header.bone_set_count, BONE_INDEX_SET_SIZE, "bone index sets")?;

        let hider_infos =
            reader.read_records(header.hider_info_count, HIDER_INFO_SIZE, "hider infos")?;
        let hider_data_infos = reader.read_records(
            header.hider_data_info_count,
            HIDER_DATA_INFO_SIZE,
            "hider data infos",
        )?;
        let hider_entries = reader.read_records(
            header.hider_data_entry_count,
            HIDER_DATA_ENTRY_SIZE,
            "hider data entries",
        )?;

        let parts_offset = reader.position();
        let parts_size: u32 = reader.read(4, "bone index parts")?;
        if parts_size % 2 != 0 {
            return Err(ReadLayoutError::OddBoneIndexPartSize {
                offset: parts_offset,
                size: parts_size,
            });
        }
        let bone_index_parts = reader.read_records(parts_size / 2, 2, "bone index parts")?;

        let padding_size: u8 = reader.read(1, "padding")?;
        let padding = reader.read_bytes(padding_size as u64, "padding")?;

        let bounding_boxes = reader.read(BOUNDING_BOXES_SIZE, "bounding boxes")?;
        let bone_transforms =
            reader.read_records(header.bone_count, BONE_TRANSFORM_SIZE, "bone transforms")?;

        Ok(Self {
            paths,
            header,
            lods,
            meshes,
            mesh_parts,
            bone_data,
            bone_sets,
            hider_infos,
            hider_data_infos,
            hider_entries,
            bone_index_parts,
            padding,
            bounding_boxes,
            bone_transforms,
        })
    }

    /// Write all tables with counts calculated from the table lengths.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteLayoutError> {
        let header = self.header_with_counts()?;
        if self.padding.len() > u8::MAX as usize {
            return Err(WriteLayoutError::PaddingTooLong(self.padding.len()));
        }

        let (string_count, block) = self.paths.to_block()?;
        string_count.write_le(writer)?;
        (block.len() as u32).write_le(writer)?;
        block.write_le(writer)?;

        header.write_le(writer)?;
        self.lods.write_le(writer)?;
        self.meshes.write_le(writer)?;
        self.mesh_parts.write_le(writer)?;
        self.bone_data.write_le(writer)?;
        self.bone_sets.write_le(writer)?;
        self.hider_infos.write_le(writer)?;
        self.hider_data_infos.write_le(writer)?;
        self.hider_entries.write_le(writer)?;

        ((self.bone_index_parts.len() * 2) as u32).write_le(writer)?;
        self.bone_index_parts.write_le(writer)?;

        (self.padding.len() as u8).write_le(writer)?;
        self.padding.write_le(writer)?;

        self.bounding_boxes.write_le(writer)?;
        self.bone_transforms.write_le(writer)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteLayoutError> {
        let mut writer = Cursor::new(Vec::with_capacity(self.size_in_bytes()));
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    /// The [header](#structfield.header) with counts updated to match the tables.
    pub fn header_with_counts(&self) -> Result<ModelHeader, WriteLayoutError> {
        let bone_count = self.paths.bones.len();
        if self.bone_data.len() != bone_count || self.bone_transforms.len() != bone_count {
            return Err(WriteLayoutError::BoneCountMismatch {
                names: bone_count,
                data: self.bone_data.len(),
                transforms: self.bone_transforms.len(),
            });
        }

        Ok(ModelHeader {
            mesh_count: count16(self.meshes.len(), "meshes")?,
            attribute_count: count16(self.paths.attributes.len(), "attributes")?,
            mesh_part_count: count16(self.mesh_parts.len(), "mesh parts")?,
            material_count: count16(self.paths.materials.len(), "materials")?,
            bone_count: count16(bone_count, "bones")?,
            bone_set_count: count16(self.bone_sets.len(), "bone index sets")?,
            hider_info_count: count16(self.hider_infos.len(), "hider infos")?,
            hider_data_info_count: count16(self.hider_data_infos.len(), "hider data infos")?,
            hider_data_entry_count: count16(self.hider_entries.len(), "hider data entries")?,
            ..self.header.clone()
        })
    }

    /// The size of the section produced by [ModelData::write].
    pub fn size_in_bytes(&self) -> usize {
        let tables = [
            (1, MODEL_HEADER_SIZE),
            (LOD_COUNT, LOD_HEADER_SIZE),
            (self.meshes.len(), MESH_HEADER_SIZE),
            (self.mesh_parts.len(), MESH_PART_HEADER_SIZE),
            (self.bone_data.len(), BONE_DATA_SIZE),
            (self.bone_sets.len(), BONE_INDEX_SET_SIZE),
            (self.hider_infos.len(), HIDER_INFO_SIZE),
            (self.hider_data_infos.len(), HIDER_DATA_INFO_SIZE),
            (self.hider_entries.len(), HIDER_DATA_ENTRY_SIZE),
            (1, BOUNDING_BOXES_SIZE),
            (self.bone_transforms.len(), BONE_TRANSFORM_SIZE),
        ];
        let table_size: usize = tables.iter().map(|(n, size)| n * *size as usize).sum();

        8 + self.paths.block_size()
            + table_size
            + 4
            + self.bone_index_parts.len() * 2
            + 1
            + self.padding.len()
    }

    /// The mesh indices for the given level of detail.
    pub fn lod_meshes(&self, lod: usize) -> std::ops::Range<usize> {
        let start = self.lods[lod].mesh_index as usize;
        start..start + self.lods[lod].mesh_count as usize
    }
}

fn count16(count: usize, name: &'static str) -> Result<u16, WriteLayoutError> {
    u16::try_from(count).map_err(|_| WriteLayoutError::CountOverflow(name))
}

/// A forward only reader that checks sizes against the remaining section length.
struct SectionReader<'a> {
    reader: Cursor<&'a [u8]>,
}

impl<'a> SectionReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: Cursor::new(bytes),
        }
    }

    fn position(&self) -> u64 {
        self.reader.position()
    }

    fn ensure(&self, needed: u64, context: &'static str) -> Result<(), ReadLayoutError> {
        let remaining = (self.reader.get_ref().len() as u64).saturating_sub(self.position());
        if needed > remaining {
            Err(ReadLayoutError::TruncatedSection {
                context,
                offset: self.position(),
                needed,
                remaining,
            })
        } else {
            Ok(())
        }
    }

    fn read<T>(&mut self, size: u64, context: &'static str) -> Result<T, ReadLayoutError>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        self.ensure(size, context)?;
        self.reader.read_le().map_err(Into::into)
    }

    fn read_records<T, N>(
        &mut self,
        count: N,
        size: u64,
        context: &'static str,
    ) -> Result<Vec<T>, ReadLayoutError>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
        N: Into<u64>,
    {
        let count = count.into();
        self.ensure(count * size, context)?;
        (0..count)
            .map(|_| self.reader.read_le().map_err(Into::into))
            .collect()
    }

    fn read_bytes(&mut self, size: u64, context: &'static str) -> Result<Vec<u8>, ReadLayoutError> {
        self.ensure(size, context)?;
        let mut bytes = vec![0u8; size as usize];
        self.reader
            .read_exact(&mut bytes)
            .map_err(|e| ReadLayoutError::Binrw(e.into()))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hexlit::hex;
    use pretty_assertions::assert_eq;

    fn model_data() -> ModelData {
        let mut bones = [0; BONE_SET_SIZE];
        bones[0] = 1;
        bones[1] = 0;

        ModelData {
            paths: PathTable {
                attributes: vec!["atr_a".to_string()],
                bones: vec!["j_kosi".to_string(), "j_sebo_a".to_string()],
                materials: vec!["/mt_c0101e0001_a.mtrl".to_string()],
                extra: vec!["shp_a".to_string()],
                padding: vec![0, 0, 0],
            },
            header: ModelHeader {
                unk1: [1, 2, 3, 4],
                unk2: [5; 34],
                ..Default::default()
            },
            lods: [
                LodHeader {
                    mesh_index: 0,
                    mesh_count: 1,
                    unk: [0, 0, 0, 0, 0, 0, 7],
                    index_data_start: 1000,
                    vertex_data_size: 64,
                    index_data_size: 16,
                    vertex_data_offset: 936,
                    index_data_offset: 1000,
                },
                LodHeader::default(),
                LodHeader::default(),
            ],
            meshes: vec![MeshHeader {
                vertex_count: 2,
                index_count: 3,
                material_index: 0,
                part_index: 0,
                part_count: 1,
                bone_set_index: 0,
                index_data_offset: 0,
                vertex_data_offsets: [0, 32, 0],
                vertex_strides: [16, 16, 0],
                vertex_block_count: 2,
            }],
            mesh_parts: vec![MeshPartHeader {
                index_offset: 0,
                index_count: 3,
                attribute_index: 0,
                bone_start_offset: 0,
                bone_count: 2,
            }],
            bone_data: vec![[1, 0, 0, 0], [2, 0, 0, 0]],
            bone_sets: vec![BoneIndexSet { bones, count: 2 }],
            hider_infos: vec![MeshHiderInfo {
                name_offset: 44,
                data_info_indices: [0, 1, 1],
                data_info_counts: [1, 0, 0],
            }],
            hider_data_infos: vec![HiderDataInfo {
                index_data_offset: 0,
                entry_count: 1,
                entry_offset: 0,
            }],
            hider_entries: vec![HiderDataEntry {
                reference_index_offset: 1,
                hide_index: 1,
            }],
            bone_index_parts: vec![0, 1],
            padding: vec![0; 3],
            bounding_boxes: BoundingBoxes {
                values: [
                    [-1.0, 0.0, -1.0, 1.0],
                    [1.0, 2.0, 1.0, 1.0],
                    [0.0; 4],
                    [0.0; 4],
                    [0.0; 4],
                    [0.0; 4],
                    [0.0; 4],
                    [0.0; 4],
                ],
            },
            bone_transforms: vec![BoneTransform::default(), BoneTransform::default()],
        }
    }

    #[test]
    fn write_read_model_data() {
        let data = model_data();
        let bytes = data.to_bytes().unwrap();
        assert_eq!(data.size_in_bytes(), bytes.len());

        let new_data = ModelData::read(&bytes).unwrap();
        assert_eq!(data.header_with_counts().unwrap(), new_data.header);
        assert_eq!(data.paths, new_data.paths);
        assert_eq!(data.meshes, new_data.meshes);
        assert_eq!(data.hider_entries, new_data.hider_entries);
        assert_eq!(bytes, new_data.to_bytes().unwrap());
    }

    #[test]
    fn header_counts() {
        let header = model_data().header_with_counts().unwrap();
        assert_eq!(1, header.mesh_count);
        assert_eq!(1, header.attribute_count);
        assert_eq!(1, header.mesh_part_count);
        assert_eq!(1, header.material_count);
        assert_eq!(2, header.bone_count);
        assert_eq!(1, header.bone_set_count);
        assert_eq!(1, header.hider_info_count);
        assert_eq!(1, header.hider_data_info_count);
        assert_eq!(1, header.hider_data_entry_count);
        assert_eq!([5; 34], header.unk2);
    }

    #[test]
    fn read_mesh_header() {
        let bytes = hex!(
            "04000000 06000000 0100 0200 0100 0000 0c000000 00000000 40000000 00000000 1c0c00 02"
        );
        let header: MeshHeader = Cursor::new(&bytes).read_le().unwrap();
        assert_eq!(
            MeshHeader {
                vertex_count: 4,
                index_count: 6,
                material_index: 1,
                part_index: 2,
                part_count: 1,
                bone_set_index: 0,
                index_data_offset: 12,
                vertex_data_offsets: [0, 64, 0],
                vertex_strides: [28, 12, 0],
                vertex_block_count: 2,
            },
            header
        );
    }

    #[test]
    fn read_path_block() {
        let data = model_data();
        let bytes = data.to_bytes().unwrap();
        // string count, block size, first string
        assert_eq!(hex!("05000000 35000000 6174725f6100"), bytes[..14]);
        assert_eq!(Some(0), data.paths.offset_of("atr_a"));
        assert_eq!(Some(6), data.paths.offset_of("j_kosi"));
        assert_eq!(None, data.paths.offset_of("missing"));
    }

    #[test]
    fn read_truncated_tables() {
        let bytes = model_data().to_bytes().unwrap();
        // Cut off the last bone transform.
        let result = ModelData::read(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            result,
            Err(ReadLayoutError::TruncatedSection {
                context: "bone transforms",
                needed: 64,
                remaining: 63,
                ..
            })
        ));
    }

    #[test]
    fn read_huge_count_without_allocating() {
        let mut bytes = model_data().to_bytes().unwrap();
        // Set the path block size beyond the end of the section.
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            ModelData::read(&bytes),
            Err(ReadLayoutError::TruncatedSection {
                context: "path block",
                offset: 8,
                ..
            })
        ));
    }

    #[test]
    fn read_huge_string_count_without_allocating() {
        let mut bytes = model_data().to_bytes().unwrap();
        bytes[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            ModelData::read(&bytes),
            Err(ReadLayoutError::TruncatedSection {
                context: "path strings",
                offset: 8,
                needed: 0xFFFFFFFF,
                remaining: 0x35,
            })
        ));
    }

    #[test]
    fn read_too_few_strings() {
        let mut bytes = model_data().to_bytes().unwrap();
        bytes[0] = 3;
        assert!(matches!(
            ModelData::read(&bytes),
            Err(ReadLayoutError::InvalidStringCount {
                offset: 0,
                declared: 3,
                required: 4
            })
        ));
    }

    #[test]
    fn write_bone_count_mismatch() {
        let mut data = model_data();
        data.bone_transforms.pop();
        assert!(matches!(
            data.to_bytes(),
            Err(WriteLayoutError::BoneCountMismatch {
                names: 2,
                data: 2,
                transforms: 1
            })
        ));
    }

    #[test]
    fn write_string_with_nul() {
        let mut data = model_data();
        data.paths.materials[0].push('\0');
        assert!(matches!(
            data.to_bytes(),
            Err(WriteLayoutError::InvalidString(_))
        ));
    }
}
