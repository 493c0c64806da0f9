//! Offsets and sizes for writing a modified model.
//!
//! Layouts are calculated from the final vertex counts, strides and index counts
//! before any bytes are written.
//! Mesh offsets are relative to the buffers for each level of detail.
//! Level of detail offsets are absolute in the decompressed sections laid out as
//! vertex info, model data, then the vertex and index buffer for each level of detail.
use mdl_lib::{container::LOD_COUNT, vertex::MAX_BLOCKS};

use crate::error::SaveModelError;

/// The index count for each mesh is padded to a multiple of this value.
pub const INDEX_ALIGNMENT: u32 = 8;

/// The size of a single index in bytes.
pub const INDEX_SIZE: u64 = 2;

/// The sizes for a single mesh after encoding.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct MeshSizes {
    pub vertex_count: u32,
    pub strides: [u8; MAX_BLOCKS],
    pub block_count: u8,
    pub index_count: u32,
}

/// The recalculated buffer offsets for a single mesh.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct MeshOffsets {
    /// The byte offset of each vertex block relative to the vertex buffer.
    pub vertex_data_offsets: [u32; MAX_BLOCKS],
    /// The offset in indices relative to the index buffer.
    pub index_data_offset: u32,
}

/// The mesh offsets and buffer sizes for a single level of detail.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct LodLayout {
    pub meshes: Vec<MeshOffsets>,
    pub vertex_data_size: u32,
    pub index_data_size: u32,
}

/// The absolute buffer offsets for a single level of detail.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct LodPlacement {
    pub vertex_data_offset: u32,
    pub index_data_offset: u32,
}

/// The number of zero indices after `index_count` indices.
pub const fn index_padding(index_count: u32) -> u32 {
    (INDEX_ALIGNMENT - index_count % INDEX_ALIGNMENT) % INDEX_ALIGNMENT
}

/// Calculate the buffer offsets for the meshes of a single level of detail.
///
/// Vertex blocks are stored for each mesh in order with block 0 first.
/// Indices for each mesh are followed by zeros up to the next multiple of [INDEX_ALIGNMENT].
pub fn layout_meshes(meshes: &[MeshSizes]) -> Result<LodLayout, SaveModelError> {
    let mut offsets = Vec::with_capacity(meshes.len());
    let mut vertex_offset = 0u64;
    let mut index_offset = 0u64;

    for mesh in meshes {
        let mut vertex_data_offsets = [0; MAX_BLOCKS];
        for (block, offset) in vertex_data_offsets
            .iter_mut()
            .enumerate()
            .take(mesh.block_count as usize)
        {
            *offset = to_u32(vertex_offset, "vertex data offset")?;
            vertex_offset += mesh.vertex_count as u64 * mesh.strides[block] as u64;
        }

        offsets.push(MeshOffsets {
            vertex_data_offsets,
            index_data_offset: to_u32(index_offset, "index data offset")?,
        });
        index_offset += mesh.index_count as u64 + index_padding(mesh.index_count) as u64;
    }

    Ok(LodLayout {
        meshes: offsets,
        vertex_data_size: to_u32(vertex_offset, "vertex data size")?,
        index_data_size: to_u32(index_offset * INDEX_SIZE, "index data size")?,
    })
}

/// Calculate absolute buffer offsets with each level of detail
/// placed after the buffers of all preceding levels.
pub fn place_lods(
    vertex_info_size: u64,
    model_data_size: u64,
    lods: &[LodLayout; LOD_COUNT],
) -> Result<[LodPlacement; LOD_COUNT], SaveModelError> {
    let mut placements = [LodPlacement::default(); LOD_COUNT];
    let mut offset = vertex_info_size + model_data_size;
    for (placement, lod) in placements.iter_mut().zip(lods) {
        placement.vertex_data_offset = to_u32(offset, "lod vertex data offset")?;
        offset += lod.vertex_data_size as u64;
        placement.index_data_offset = to_u32(offset, "lod index data offset")?;
        offset += lod.index_data_size as u64;
    }
    Ok(placements)
}

fn to_u32(value: u64, name: &'static str) -> Result<u32, SaveModelError> {
    u32::try_from(value).map_err(|_| SaveModelError::Overflow(name))
}
