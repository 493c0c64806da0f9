//! # mdl_model
//! mdl_model provides high level data access for compressed model containers.
//!
//! Reading decompresses every section, parses the model data tables
//! and decodes the vertex blocks for each mesh into a [VertexBuffer].
//! Writing encodes the vertex data again, recalculates every offset and size
//! and compresses the sections into a new container.
//!
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mdl_model::ModelContainer;
//!
//! let (model, warnings) = ModelContainer::from_file("c0101e0001_top.mdl")?.into_parts();
//! for warning in warnings {
//!     println!("{warning}");
//! }
//!
//! let bytes = model.to_bytes()?;
//! std::fs::write("out.mdl", bytes)?;
//! # Ok(())
//! # }
//! ```
use std::path::Path;

use ahash::AHashMap;
use log::{debug, warn};
use mdl_lib::{
    container::{Container, ContainerInfo, LOD_COUNT, SectionKind, Sections},
    layout::{
        BoneIndexSet, BoneTransform, BoundingBoxes, LOD_HEADER_SIZE, LodHeader, MODEL_HEADER_SIZE,
        MeshHeader, MeshPartHeader, ModelData, ModelHeader, PathTable,
    },
    vertex::{MAX_BLOCKS, VertexDeclaration, read_declarations, write_declarations},
};
use thiserror::Error;

use error::{DecodeMeshError, HiderError, LoadModelError, SaveModelError};
use hider::{HiddenVertex, HiderTables, ResolvedHide, record_hidden_vertices};
use recalculate::{INDEX_SIZE, LodLayout, MeshSizes, index_padding, layout_meshes, place_lods};
use vertex::{VertexBuffer, output_declaration, read_vertex_buffer, write_vertex_buffer};

pub use import::ImportedMesh;

pub mod error;
pub mod hider;
mod import;
pub mod recalculate;
pub mod skinning;
pub mod vertex;

/// A successful result with any non fatal problems found along the way.
#[derive(Debug)]
pub enum Outcome<T> {
    Clean(T),
    WithWarnings(T, Vec<Warning>),
}

impl<T> Outcome<T> {
    pub fn new(value: T, warnings: Vec<Warning>) -> Self {
        if warnings.is_empty() {
            Self::Clean(value)
        } else {
            Self::WithWarnings(value, warnings)
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Clean(value) => value,
            Self::WithWarnings(value, _) => value,
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            Self::Clean(_) => &[],
            Self::WithWarnings(_, warnings) => warnings,
        }
    }

    pub fn into_parts(self) -> (T, Vec<Warning>) {
        match self {
            Self::Clean(value) => (value, Vec::new()),
            Self::WithWarnings(value, warnings) => (value, warnings),
        }
    }

    pub fn into_value(self) -> T {
        self.into_parts().0
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        let (value, warnings) = self.into_parts();
        Outcome::new(f(value), warnings)
    }
}

/// A recoverable problem with part of the model.
///
/// `mesh` is the index within the level of detail for variants with a `lod`
/// and the index into all meshes otherwise.
#[derive(Debug, Error)]
pub enum Warning {
    #[error("lod {lod} mesh {mesh} keeps its raw vertex data: {source}")]
    UndecodedMesh {
        lod: usize,
        mesh: usize,
        #[source]
        source: DecodeMeshError,
    },

    #[error("lod {lod} mesh {mesh} skipped a hider entry: {source}")]
    HiderEntrySkipped {
        lod: usize,
        mesh: usize,
        #[source]
        source: HiderError,
    },

    #[error("lod {lod} mesh {mesh} dropped hider entry {entry} outside the new geometry")]
    HiderEntryDropped { lod: usize, mesh: usize, entry: usize },

    #[error("Weight Correction: vertex {vertex}, correction {correction}")]
    WeightCorrection {
        mesh: usize,
        vertex: usize,
        correction: i32,
    },

    #[error("mesh {mesh} uses bone index set {bone_set_index} for unknown bones")]
    BoneSetFallback { mesh: usize, bone_set_index: usize },

    #[error("mesh {mesh} dropped unknown bone influences for vertices {vertices:?}")]
    UnresolvedBones { mesh: usize, vertices: Vec<usize> },
}

/// A decoded model with all tables needed to write it back.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ModelContainer {
    /// Container header fields not derived from the sections.
    pub info: ContainerInfo,
    pub paths: PathTable,
    /// Counts are recalculated on write. The remaining fields are preserved.
    pub header: ModelHeader,
    pub lods: [LevelOfDetail; LOD_COUNT],
    /// Opaque per bone data.
    pub bone_data: Vec<[u8; 4]>,
    pub bone_sets: Vec<BoneIndexSet>,
    /// Empty for models without hider data.
    pub hider: HiderTables,
    pub bone_index_parts: Vec<u16>,
    pub padding: Vec<u8>,
    pub bounding_boxes: BoundingBoxes,
    pub bone_transforms: Vec<BoneTransform>,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct LevelOfDetail {
    pub unk: [u32; 7],
    /// The index data start from the last read.
    /// This follows the index buffer offset on write if both were equal.
    pub index_data_start: u32,
    pub meshes: Vec<MeshEntry>,
    /// The buffer locations from the last read.
    pub buffers: BufferLocations,
}

/// Absolute offsets and sizes for the buffers of a level of detail.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct BufferLocations {
    pub vertex_data_offset: u32,
    pub vertex_data_size: u32,
    pub index_data_offset: u32,
    pub index_data_size: u32,
    /// Padded compressed sizes or 0 if the model was not read from a [Container].
    pub vertex_compressed_size: u32,
    pub index_compressed_size: u32,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MeshEntry {
    pub material_index: u16,
    /// The index into [bone_sets](struct.ModelContainer.html#structfield.bone_sets).
    pub bone_set_index: u16,
    /// The declaration from the last read.
    /// Normals and texture coordinates are upgraded to floats on write.
    pub declaration: VertexDeclaration,
    pub strides: [u8; MAX_BLOCKS],
    pub block_count: u8,
    pub vertices: MeshVertices,
    /// Triangle list vertex indices.
    pub indices: Vec<u16>,
    pub parts: Vec<MeshPart>,
    /// The index buffer offset from the last read used to find hider entries.
    pub index_data_offset: u32,
    /// Hider entries for this mesh.
    pub hides: Vec<ResolvedHide>,
    /// Attributes for the alternate vertices of [hides](#structfield.hides).
    pub hidden_vertices: Vec<HiddenVertex>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MeshVertices {
    Decoded(VertexBuffer),
    /// Vertex blocks for a declaration that could not be decoded.
    Raw {
        vertex_count: u32,
        blocks: Vec<Vec<u8>>,
    },
}

/// A range of a mesh's indices.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct MeshPart {
    /// The offset into [indices](struct.MeshEntry.html#structfield.indices).
    pub index_offset: u32,
    pub index_count: u32,
    pub attribute_index: u32,
    pub bone_start_offset: u16,
    pub bone_count: u16,
}

impl MeshEntry {
    pub fn vertex_count(&self) -> usize {
        match &self.vertices {
            MeshVertices::Decoded(buffer) => buffer.len(),
            MeshVertices::Raw { vertex_count, .. } => *vertex_count as usize,
        }
    }

    /// The decoded vertices or [None] if the mesh keeps its raw vertex data.
    pub fn vertex_buffer(&self) -> Option<&VertexBuffer> {
        match &self.vertices {
            MeshVertices::Decoded(buffer) => Some(buffer),
            MeshVertices::Raw { .. } => None,
        }
    }

    /// The alternate vertex used at each position in [indices](#structfield.indices) when hiding.
    pub fn hider_map(&self) -> AHashMap<u32, u32> {
        self.hides
            .iter()
            .map(|h| (h.index_position, h.hide_vertex))
            .collect()
    }
}

/// The vertex blocks and declaration for a single mesh ready for writing.
struct EncodedMesh {
    declaration: VertexDeclaration,
    strides: [u8; MAX_BLOCKS],
    blocks: Vec<Vec<u8>>,
}

impl ModelContainer {
    /// Read and decode the container at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Outcome<Self>, LoadModelError> {
        let container = Container::from_file(path)?;
        Self::from_container(&container)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Outcome<Self>, LoadModelError> {
        let container = Container::from_bytes(bytes)?;
        Self::from_container(&container)
    }

    #[tracing::instrument(skip_all)]
    pub fn from_container(container: &Container) -> Result<Outcome<Self>, LoadModelError> {
        let sections = container.decompress_sections()?;
        let outcome = Self::from_sections(&sections, container.info())?;

        let (mut model, warnings) = outcome.into_parts();
        for (lod, level) in model.lods.iter_mut().enumerate() {
            level.buffers.vertex_compressed_size =
                container.header.compressed_sizes[SectionKind::VertexBuffer(lod).slot()];
            level.buffers.index_compressed_size =
                container.header.compressed_sizes[SectionKind::IndexBuffer(lod).slot()];
        }
        Ok(Outcome::new(model, warnings))
    }

    /// Decode the model from decompressed sections.
    pub fn from_sections(
        sections: &Sections,
        info: ContainerInfo,
    ) -> Result<Outcome<Self>, LoadModelError> {
        let data = ModelData::read(&sections.model_data)?;
        let declarations = read_declarations(&sections.vertex_info, data.meshes.len())?;

        let hider = HiderTables {
            infos: data.hider_infos.clone(),
            data_infos: data.hider_data_infos.clone(),
            entries: data.hider_entries.clone(),
        };

        let mut warnings = Vec::new();
        let mut lods: [LevelOfDetail; LOD_COUNT] = Default::default();
        for (lod, level) in lods.iter_mut().enumerate() {
            *level = read_lod(lod, &data, &declarations, sections, &hider, &mut warnings)?;
            debug!("lod {lod}: {} meshes", level.meshes.len());
        }

        let model = Self {
            info,
            paths: data.paths,
            header: data.header,
            lods,
            bone_data: data.bone_data,
            bone_sets: data.bone_sets,
            hider,
            bone_index_parts: data.bone_index_parts,
            padding: data.padding,
            bounding_boxes: data.bounding_boxes,
            bone_transforms: data.bone_transforms,
        };
        Ok(Outcome::new(model, warnings))
    }

    pub fn has_hider_data(&self) -> bool {
        !self.hider.infos.is_empty()
    }

    /// The bone index set used as a fallback for unknown bones.
    /// The first mesh conventionally uses a set containing every skinned bone.
    pub fn fallback_bone_set_index(&self) -> usize {
        self.lods[0]
            .meshes
            .first()
            .map(|m| m.bone_set_index as usize)
            .unwrap_or_default()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveModelError> {
        self.to_container()?.write_to_file(path)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SaveModelError> {
        Ok(self.to_container()?.to_bytes()?)
    }

    pub fn to_container(&self) -> Result<Container, SaveModelError> {
        let (sections, info) = self.to_sections()?;
        Ok(Container::from_sections(&sections, info)?)
    }

    /// Encode the model into decompressed sections with recalculated offsets and sizes.
    #[tracing::instrument(skip_all)]
    pub fn to_sections(&self) -> Result<(Sections, ContainerInfo), SaveModelError> {
        let mut encoded: [Vec<EncodedMesh>; LOD_COUNT] = Default::default();
        let mut layouts: [LodLayout; LOD_COUNT] = Default::default();
        for (lod, level) in self.lods.iter().enumerate() {
            for (i, mesh) in level.meshes.iter().enumerate() {
                encoded[lod].push(encode_mesh(lod, i, mesh)?);
            }

            let sizes = level
                .meshes
                .iter()
                .zip(&encoded[lod])
                .map(|(mesh, e)| {
                    Ok(MeshSizes {
                        vertex_count: u32::try_from(mesh.vertex_count())
                            .map_err(|_| SaveModelError::Overflow("vertex count"))?,
                        strides: e.strides,
                        block_count: mesh.block_count,
                        index_count: u32::try_from(mesh.indices.len())
                            .map_err(|_| SaveModelError::Overflow("index count"))?,
                    })
                })
                .collect::<Result<Vec<_>, SaveModelError>>()?;
            layouts[lod] = layout_meshes(&sizes)?;
        }

        let mut lod_headers: [LodHeader; LOD_COUNT] = Default::default();
        let mut meshes = Vec::new();
        let mut mesh_parts = Vec::new();
        let mut declarations = Vec::new();
        let mut index_offsets: [AHashMap<u32, u32>; LOD_COUNT] = Default::default();
        for (lod, level) in self.lods.iter().enumerate() {
            lod_headers[lod].mesh_index = count16(meshes.len(), "mesh index")?;
            lod_headers[lod].mesh_count = count16(level.meshes.len(), "mesh count")?;
            lod_headers[lod].unk = level.unk;

            for ((mesh, encoded), offsets) in level
                .meshes
                .iter()
                .zip(&encoded[lod])
                .zip(&layouts[lod].meshes)
            {
                index_offsets[lod].insert(mesh.index_data_offset, offsets.index_data_offset);

                let part_index = count16(mesh_parts.len(), "part index")?;
                mesh_parts.extend(mesh.parts.iter().map(|p| MeshPartHeader {
                    index_offset: offsets.index_data_offset + p.index_offset,
                    index_count: p.index_count,
                    attribute_index: p.attribute_index,
                    bone_start_offset: p.bone_start_offset,
                    bone_count: p.bone_count,
                }));

                meshes.push(MeshHeader {
                    vertex_count: mesh.vertex_count() as u32,
                    index_count: mesh.indices.len() as u32,
                    material_index: mesh.material_index,
                    part_index,
                    part_count: count16(mesh.parts.len(), "part count")?,
                    bone_set_index: mesh.bone_set_index,
                    index_data_offset: offsets.index_data_offset,
                    vertex_data_offsets: offsets.vertex_data_offsets,
                    vertex_strides: encoded.strides,
                    vertex_block_count: mesh.block_count,
                });
                declarations.push(encoded.declaration.clone());
            }
        }

        let mut hider = self.hider.clone();
        hider.rebase_all(&index_offsets)?;

        let mut data = ModelData {
            paths: self.paths.clone(),
            header: self.header.clone(),
            lods: Default::default(),
            meshes,
            mesh_parts,
            bone_data: self.bone_data.clone(),
            bone_sets: self.bone_sets.clone(),
            hider_infos: hider.infos,
            hider_data_infos: hider.data_infos,
            hider_entries: hider.entries,
            bone_index_parts: self.bone_index_parts.clone(),
            padding: self.padding.clone(),
            bounding_boxes: self.bounding_boxes.clone(),
            bone_transforms: self.bone_transforms.clone(),
        };

        let vertex_info = write_declarations(&declarations)?;
        // Table sizes only depend on the table lengths, so the placement is final.
        let placements = place_lods(
            vertex_info.len() as u64,
            data.size_in_bytes() as u64,
            &layouts,
        )?;
        for (((header, level), layout), placement) in lod_headers
            .iter_mut()
            .zip(&self.lods)
            .zip(&layouts)
            .zip(placements)
        {
            header.index_data_start = if level.index_data_start == level.buffers.index_data_offset
            {
                placement.index_data_offset
            } else {
                level.index_data_start
            };
            header.vertex_data_size = layout.vertex_data_size;
            header.index_data_size = layout.index_data_size;
            header.vertex_data_offset = placement.vertex_data_offset;
            header.index_data_offset = placement.index_data_offset;
        }
        data.lods = lod_headers;

        let mut sections = Sections {
            vertex_info,
            model_data: data.to_bytes()?,
            ..Default::default()
        };
        for (lod, level) in self.lods.iter().enumerate() {
            let vertex_buffer = &mut sections.vertex_buffers[lod];
            vertex_buffer.reserve(layouts[lod].vertex_data_size as usize);
            for encoded in &encoded[lod] {
                for block in &encoded.blocks {
                    vertex_buffer.extend_from_slice(block);
                }
            }

            let index_buffer = &mut sections.index_buffers[lod];
            index_buffer.reserve(layouts[lod].index_data_size as usize);
            for mesh in &level.meshes {
                for index in &mesh.indices {
                    index_buffer.extend_from_slice(&index.to_le_bytes());
                }
                let padding = index_padding(mesh.indices.len() as u32) as u64 * INDEX_SIZE;
                index_buffer.resize(index_buffer.len() + padding as usize, 0);
            }
        }

        let info = ContainerInfo {
            mesh_count: count16(declarations.len(), "mesh count")?,
            ..self.info
        };
        Ok((sections, info))
    }
}

fn read_lod(
    lod: usize,
    data: &ModelData,
    declarations: &[VertexDeclaration],
    sections: &Sections,
    hider: &HiderTables,
    warnings: &mut Vec<Warning>,
) -> Result<LevelOfDetail, LoadModelError> {
    let header = &data.lods[lod];
    let header_offset = sections.logical_offset(SectionKind::ModelData)
        + 8
        + data.paths.block_size() as u64
        + MODEL_HEADER_SIZE
        + lod as u64 * LOD_HEADER_SIZE;
    check_lod_buffers(lod, header, header_offset, sections)?;

    let range = data.lod_meshes(lod);
    if range.end > data.meshes.len() {
        return Err(LoadModelError::LodMeshRange {
            lod,
            start: range.start,
            end: range.end,
            count: data.meshes.len(),
        });
    }

    let meshes = range
        .enumerate()
        .map(|(i, global)| read_mesh(lod, i, global, data, declarations, sections, hider, warnings))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LevelOfDetail {
        unk: header.unk,
        index_data_start: header.index_data_start,
        meshes,
        buffers: BufferLocations {
            vertex_data_offset: header.vertex_data_offset,
            vertex_data_size: header.vertex_data_size,
            index_data_offset: header.index_data_offset,
            index_data_size: header.index_data_size,
            vertex_compressed_size: 0,
            index_compressed_size: 0,
        },
    })
}

fn check_lod_buffers(
    lod: usize,
    header: &LodHeader,
    header_offset: u64,
    sections: &Sections,
) -> Result<(), LoadModelError> {
    let buffers = [
        (
            SectionKind::VertexBuffer(lod),
            header.vertex_data_size,
            header.vertex_data_offset,
            36,
            44,
        ),
        (
            SectionKind::IndexBuffer(lod),
            header.index_data_size,
            header.index_data_offset,
            40,
            48,
        ),
    ];
    for (kind, size, offset, size_field, offset_field) in buffers {
        let actual_size = sections.get(kind).len();
        if size as usize != actual_size {
            return Err(LoadModelError::HeaderInconsistent {
                offset: header_offset + size_field,
                reason: format!("{kind:?} has {actual_size} bytes but the header declares {size}"),
            });
        }

        let actual_offset = sections.logical_offset(kind);
        if size > 0 && offset as u64 != actual_offset {
            return Err(LoadModelError::HeaderInconsistent {
                offset: header_offset + offset_field,
                reason: format!("{kind:?} starts at {actual_offset} but the header declares {offset}"),
            });
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn read_mesh(
    lod: usize,
    mesh_index: usize,
    global_index: usize,
    data: &ModelData,
    declarations: &[VertexDeclaration],
    sections: &Sections,
    hider: &HiderTables,
    warnings: &mut Vec<Warning>,
) -> Result<MeshEntry, LoadModelError> {
    let header = &data.meshes[global_index];
    let vertex_count = header.vertex_count as usize;

    let block_count = header.vertex_block_count as usize;
    if block_count > MAX_BLOCKS {
        return Err(LoadModelError::HeaderInconsistent {
            offset: sections.logical_offset(SectionKind::ModelData),
            reason: format!("mesh {global_index} has {block_count} vertex blocks"),
        });
    }

    let vertex_kind = SectionKind::VertexBuffer(lod);
    let vertex_section = sections.get(vertex_kind);
    let mut blocks = Vec::with_capacity(block_count);
    for block in 0..block_count {
        let start = header.vertex_data_offsets[block] as usize;
        let end = start + vertex_count * header.vertex_strides[block] as usize;
        let bytes = vertex_section
            .get(start..end)
            .ok_or(LoadModelError::TruncatedSection {
                section: vertex_kind,
                offset: sections.logical_offset(vertex_kind) + start as u64,
            })?;
        blocks.push(bytes);
    }

    let index_kind = SectionKind::IndexBuffer(lod);
    let start = header.index_data_offset as usize * INDEX_SIZE as usize;
    let end = start + header.index_count as usize * INDEX_SIZE as usize;
    let indices: Vec<u16> = sections
        .get(index_kind)
        .get(start..end)
        .ok_or(LoadModelError::TruncatedSection {
            section: index_kind,
            offset: sections.logical_offset(index_kind) + start as u64,
        })?
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();

    let parts = read_parts(global_index, header, data)?;

    let declaration = declarations[global_index].clone();
    let vertices = match read_vertex_buffer(
        &declaration,
        header.vertex_strides,
        &blocks,
        vertex_count,
    ) {
        Ok(buffer) => MeshVertices::Decoded(buffer),
        Err(e) => {
            warn!("lod {lod} mesh {mesh_index}: {e}");
            warnings.push(Warning::UndecodedMesh {
                lod,
                mesh: mesh_index,
                source: e,
            });
            MeshVertices::Raw {
                vertex_count: header.vertex_count,
                blocks: blocks.iter().map(|b| b.to_vec()).collect(),
            }
        }
    };

    let (hides, errors) =
        hider.resolve_mesh(lod, header.index_data_offset, &indices, header.vertex_count);
    for e in errors {
        warn!("lod {lod} mesh {mesh_index}: {e}");
        warnings.push(Warning::HiderEntrySkipped {
            lod,
            mesh: mesh_index,
            source: e,
        });
    }
    let hidden_vertices = match &vertices {
        MeshVertices::Decoded(buffer) => record_hidden_vertices(&hides, buffer),
        MeshVertices::Raw { .. } => Vec::new(),
    };

    Ok(MeshEntry {
        material_index: header.material_index,
        bone_set_index: header.bone_set_index,
        declaration,
        strides: header.vertex_strides,
        block_count: header.vertex_block_count,
        vertices,
        indices,
        parts,
        index_data_offset: header.index_data_offset,
        hides,
        hidden_vertices,
    })
}

fn read_parts(
    mesh: usize,
    header: &MeshHeader,
    data: &ModelData,
) -> Result<Vec<MeshPart>, LoadModelError> {
    let start = header.part_index as usize;
    let end = start + header.part_count as usize;
    let mesh_end = header.index_data_offset as u64 + header.index_count as u64;
    // The last part also covers the zero indices aligning the next mesh.
    let padded_end = mesh_end + index_padding(header.index_count) as u64;

    (start..end)
        .map(|part| {
            let p = data
                .mesh_parts
                .get(part)
                .ok_or(LoadModelError::MeshPartOutOfRange { mesh, part })?;
            let part_end = if part + 1 == end { padded_end } else { mesh_end };
            if p.index_offset < header.index_data_offset
                || p.index_offset as u64 + p.index_count as u64 > part_end
            {
                return Err(LoadModelError::MeshPartOutOfRange { mesh, part });
            }
            Ok(MeshPart {
                index_offset: p.index_offset - header.index_data_offset,
                index_count: p.index_count,
                attribute_index: p.attribute_index,
                bone_start_offset: p.bone_start_offset,
                bone_count: p.bone_count,
            })
        })
        .collect()
}

fn encode_mesh(
    lod: usize,
    mesh_index: usize,
    mesh: &MeshEntry,
) -> Result<EncodedMesh, SaveModelError> {
    let block_count = mesh.block_count as usize;
    if block_count > MAX_BLOCKS {
        return Err(SaveModelError::Overflow("vertex block count"));
    }

    match &mesh.vertices {
        MeshVertices::Decoded(buffer) => {
            let encode_error = |source| SaveModelError::EncodeMesh {
                lod,
                mesh: mesh_index,
                source,
            };
            let (declaration, strides) =
                output_declaration(&mesh.declaration, mesh.strides).map_err(encode_error)?;
            let mut blocks =
                write_vertex_buffer(&declaration, strides, buffer).map_err(encode_error)?;

            // Blocks without attributes are still stored.
            for block in blocks.len()..block_count {
                blocks.push(vec![0u8; buffer.len() * strides[block] as usize]);
            }
            blocks.truncate(block_count);

            Ok(EncodedMesh {
                declaration,
                strides,
                blocks,
            })
        }
        MeshVertices::Raw {
            vertex_count,
            blocks,
        } => {
            for block in 0..block_count {
                let expected = *vertex_count as usize * mesh.strides[block] as usize;
                let actual = blocks.get(block).map(|b| b.len()).unwrap_or_default();
                if actual != expected {
                    return Err(SaveModelError::RawBlockSize {
                        lod,
                        mesh: mesh_index,
                        block,
                        expected,
                        actual,
                    });
                }
            }
            Ok(EncodedMesh {
                declaration: mesh.declaration.clone(),
                strides: mesh.strides,
                blocks: blocks.iter().take(block_count).cloned().collect(),
            })
        }
    }
}

fn count16(count: usize, name: &'static str) -> Result<u16, SaveModelError> {
    u16::try_from(count).map_err(|_| SaveModelError::Overflow(name))
}
