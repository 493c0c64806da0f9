use mdl_lib::{
    container::SectionKind,
    error::{ReadContainerError, ReadLayoutError, WriteContainerError, WriteLayoutError},
    vertex::{DataType, VertexUsage},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadModelError {
    #[error("error reading container")]
    Container(#[from] ReadContainerError),

    #[error("error reading model layout")]
    Layout(#[from] ReadLayoutError),

    #[error("inconsistent model data at offset {offset}: {reason}")]
    HeaderInconsistent { offset: u64, reason: String },

    #[error("{section:?} truncated at offset {offset}")]
    TruncatedSection { section: SectionKind, offset: u64 },

    #[error("lod {lod} mesh range {start}..{end} is out of range for {count} meshes")]
    LodMeshRange {
        lod: usize,
        start: usize,
        end: usize,
        count: usize,
    },

    #[error("mesh {mesh} part {part} is outside the mesh's index range")]
    MeshPartOutOfRange { mesh: usize, part: usize },
}

/// Errors for a single mesh that prevent decoding its vertex blocks.
#[derive(Debug, Error)]
pub enum DecodeMeshError {
    #[error("missing required attribute {usage:?}")]
    MissingRequiredAttribute { usage: VertexUsage },

    #[error("attribute {usage:?} appears more than once")]
    AmbiguousAttribute { usage: VertexUsage },

    #[error("attribute {usage:?} does not support data type {data_type:?}")]
    UnsupportedDataType {
        usage: VertexUsage,
        data_type: DataType,
    },

    #[error("attribute {usage:?} at block {block} offset {offset} does not fit in stride {stride}")]
    ElementOutOfBounds {
        usage: VertexUsage,
        block: u8,
        offset: u8,
        stride: u8,
    },

    #[error("attribute {usage:?} uses vertex block {block} but the mesh has {block_count} blocks")]
    MissingVertexBlock {
        usage: VertexUsage,
        block: u8,
        block_count: usize,
    },

    #[error("vertex block {block} requires {needed} bytes but only {available} are available")]
    TruncatedVertexData {
        block: u8,
        needed: usize,
        available: usize,
    },

    #[error("error reading vertex data: {0}")]
    Binrw(#[from] binrw::Error),
}

#[derive(Debug, Error)]
pub enum EncodeMeshError {
    #[error("attribute {usage:?} has {actual} values but the mesh has {expected} vertices")]
    AttributeLength {
        usage: VertexUsage,
        expected: usize,
        actual: usize,
    },

    #[error("attribute {usage:?} does not support data type {data_type:?}")]
    UnsupportedDataType {
        usage: VertexUsage,
        data_type: DataType,
    },

    #[error("attribute {usage:?} uses invalid vertex block {block}")]
    InvalidBlock { usage: VertexUsage, block: u8 },

    #[error("vertex block {block} stride or offsets exceed 255 bytes")]
    StrideOverflow { block: u8 },

    #[error("error writing vertex data: {0}")]
    Io(#[from] std::io::Error),

    #[error("error writing vertex data: {0}")]
    Binrw(#[from] binrw::Error),
}

#[derive(Debug, Error)]
pub enum SkinningError {
    #[error("vertex {vertex} references bone {bone} which is not in the mesh's bone index set")]
    UnknownBoneReference { vertex: usize, bone: u32 },
}

#[derive(Debug, Error)]
pub enum HiderError {
    #[error("hider entry {entry} references index {index} but the limit is {limit}")]
    HiderIndexOutOfRange { entry: usize, index: u32, limit: u32 },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("lod {lod} does not exist")]
    LodOutOfRange { lod: usize },

    #[error("mesh {mesh} does not exist in lod {lod}")]
    MeshOutOfRange { lod: usize, mesh: usize },

    #[error("mesh {mesh} in lod {lod} has undecoded vertex data")]
    UndecodedMesh { lod: usize, mesh: usize },

    #[error("{name} has {actual} values but there are {expected} positions")]
    AttributeLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("vertex index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u16, vertex_count: usize },

    #[error("{actual} part index counts do not match the mesh's {expected} parts")]
    PartCountMismatch { expected: usize, actual: usize },

    #[error("part index counts sum to {actual} but there are {expected} indices")]
    PartIndexCount { expected: usize, actual: usize },

    #[error("{count} vertices do not fit in 16-bit indices")]
    TooManyVertices { count: usize },
}

#[derive(Debug, Error)]
pub enum SaveModelError {
    #[error("error encoding mesh {mesh} in lod {lod}")]
    EncodeMesh {
        lod: usize,
        mesh: usize,
        #[source]
        source: EncodeMeshError,
    },

    #[error("mesh {mesh} in lod {lod} has {actual} bytes in vertex block {block} but requires {expected}")]
    RawBlockSize {
        lod: usize,
        mesh: usize,
        block: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{0} does not fit in its 32-bit or 16-bit field")]
    Overflow(&'static str),

    #[error("error writing model layout")]
    Layout(#[from] WriteLayoutError),

    #[error("error writing container")]
    Container(#[from] WriteContainerError),
}
