//! Decoding and encoding interleaved vertex blocks.
//!
//! The main type for representing vertex data is [VertexBuffer].
//! Storing the values separately like this is often called a "struct of arrays" layout.
//! This makes editing individual attributes cache friendly and makes it easy to replace geometry.
//!
//! The vertex blocks in game use an interleaved or "array of structs" approach
//! described by a [VertexDeclaration].
//! Decoding reads each [VertexElement] for each vertex.
//! Encoding uses the declaration from [output_declaration],
//! which always stores normals and texture coordinates as full precision floats.
use std::io::{Cursor, Seek, SeekFrom};

use binrw::{BinReaderExt, BinResult, BinWrite};
use glam::{Vec2, Vec3};
use half::f16;
use mdl_lib::vertex::{DataType, MAX_BLOCKS, VertexDeclaration, VertexElement, VertexUsage};

use crate::error::{DecodeMeshError, EncodeMeshError};

/// Usages that must appear exactly once for a mesh to decode.
pub const REQUIRED_USAGES: [VertexUsage; 5] = [
    VertexUsage::Position,
    VertexUsage::BoneWeight,
    VertexUsage::BoneIndex,
    VertexUsage::Normal,
    VertexUsage::TextureCoordinate,
];

/// The byte order for [DataType::UByte8] influences.
/// Output influence `i` is stored at byte `UBYTE8_ORDER[i]`.
pub const UBYTE8_ORDER: [usize; 8] = [0, 4, 1, 5, 2, 6, 3, 7];

/// The decoded per vertex values for a mesh.
///
/// Each attribute has exactly one value per vertex.
/// Attributes not present in the declaration use [Vertex::default] values.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct VertexBuffer {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    /// The raw fourth byte for each tangent.
    pub tangent_handedness: Vec<u8>,
    pub binormals: Vec<Vec3>,
    /// The raw fourth byte for each binormal.
    pub binormal_handedness: Vec<u8>,
    /// RGBA colors.
    pub colors: Vec<[u8; 4]>,
    pub uv0: Vec<Vec2>,
    pub uv1: Vec<Vec2>,
    pub bone_weights: Vec<[f32; 8]>,
    /// Indices into the mesh's [BoneIndexSet](mdl_lib::layout::BoneIndexSet).
    pub bone_indices: Vec<[u8; 8]>,
}

/// All attributes for a single vertex.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub tangent_handedness: u8,
    pub binormal: Vec3,
    pub binormal_handedness: u8,
    pub color: [u8; 4],
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub bone_weights: [f32; 8],
    pub bone_indices: [u8; 8],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            tangent: Vec3::ZERO,
            tangent_handedness: 0,
            binormal: Vec3::ZERO,
            binormal_handedness: 0,
            color: [255; 4],
            uv0: Vec2::ZERO,
            uv1: Vec2::ZERO,
            bone_weights: [0.0; 8],
            bone_indices: [0; 8],
        }
    }
}

impl VertexBuffer {
    /// A buffer with `count` default vertices.
    pub fn with_len(count: usize) -> Self {
        let mut buffer = Self::default();
        for _ in 0..count {
            buffer.push(Vertex::default());
        }
        buffer
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vertex(&self, index: usize) -> Option<Vertex> {
        Some(Vertex {
            position: *self.positions.get(index)?,
            normal: *self.normals.get(index)?,
            tangent: *self.tangents.get(index)?,
            tangent_handedness: *self.tangent_handedness.get(index)?,
            binormal: *self.binormals.get(index)?,
            binormal_handedness: *self.binormal_handedness.get(index)?,
            color: *self.colors.get(index)?,
            uv0: *self.uv0.get(index)?,
            uv1: *self.uv1.get(index)?,
            bone_weights: *self.bone_weights.get(index)?,
            bone_indices: *self.bone_indices.get(index)?,
        })
    }

    pub fn push(&mut self, vertex: Vertex) {
        self.positions.push(vertex.position);
        self.normals.push(vertex.normal);
        self.tangents.push(vertex.tangent);
        self.tangent_handedness.push(vertex.tangent_handedness);
        self.binormals.push(vertex.binormal);
        self.binormal_handedness.push(vertex.binormal_handedness);
        self.colors.push(vertex.color);
        self.uv0.push(vertex.uv0);
        self.uv1.push(vertex.uv1);
        self.bone_weights.push(vertex.bone_weights);
        self.bone_indices.push(vertex.bone_indices);
    }

    /// Find the first attribute whose length differs from the position count.
    fn check_lengths(&self) -> Result<(), EncodeMeshError> {
        let expected = self.len();
        let lengths = [
            (VertexUsage::Normal, self.normals.len()),
            (VertexUsage::Tangent, self.tangents.len()),
            (VertexUsage::Tangent, self.tangent_handedness.len()),
            (VertexUsage::Binormal, self.binormals.len()),
            (VertexUsage::Binormal, self.binormal_handedness.len()),
            (VertexUsage::Color, self.colors.len()),
            (VertexUsage::TextureCoordinate, self.uv0.len()),
            (VertexUsage::TextureCoordinate, self.uv1.len()),
            (VertexUsage::BoneWeight, self.bone_weights.len()),
            (VertexUsage::BoneIndex, self.bone_indices.len()),
        ];
        match lengths.iter().find(|(_, len)| *len != expected) {
            Some((usage, actual)) => Err(EncodeMeshError::AttributeLength {
                usage: *usage,
                expected,
                actual: *actual,
            }),
            None => Ok(()),
        }
    }
}

/// Check that the declaration can be decoded or encoded by this module.
pub fn validate_declaration(
    declaration: &VertexDeclaration,
    strides: [u8; MAX_BLOCKS],
) -> Result<(), DecodeMeshError> {
    for usage in REQUIRED_USAGES {
        if declaration.element(usage).is_none() {
            return Err(DecodeMeshError::MissingRequiredAttribute { usage });
        }
    }

    for (i, element) in declaration.elements.iter().enumerate() {
        if declaration.elements[..i].iter().any(|e| e.usage == element.usage) {
            return Err(DecodeMeshError::AmbiguousAttribute {
                usage: element.usage,
            });
        }

        if !is_supported(element.usage, element.data_type) {
            return Err(DecodeMeshError::UnsupportedDataType {
                usage: element.usage,
                data_type: element.data_type,
            });
        }

        let block = element.block as usize;
        let stride = strides.get(block).copied().unwrap_or_default();
        if block >= MAX_BLOCKS
            || element.offset as usize + element.data_type.size_in_bytes() > stride as usize
        {
            return Err(DecodeMeshError::ElementOutOfBounds {
                usage: element.usage,
                block: element.block,
                offset: element.offset,
                stride,
            });
        }
    }

    Ok(())
}

fn is_supported(usage: VertexUsage, data_type: DataType) -> bool {
    match usage {
        VertexUsage::Position | VertexUsage::Normal => {
            matches!(data_type, DataType::Half4 | DataType::Float3 | DataType::Float4)
        }
        VertexUsage::BoneWeight | VertexUsage::BoneIndex => matches!(
            data_type,
            DataType::UByte4 | DataType::UByte4Normalized | DataType::UByte8
        ),
        VertexUsage::Tangent | VertexUsage::Binormal | VertexUsage::Color => {
            matches!(data_type, DataType::UByte4 | DataType::UByte4Normalized)
        }
        VertexUsage::TextureCoordinate => matches!(
            data_type,
            DataType::Half2 | DataType::Half4 | DataType::Float2 | DataType::Float4
        ),
    }
}

/// Decode `vertex_count` vertices from the mesh's vertex blocks.
pub fn read_vertex_buffer(
    declaration: &VertexDeclaration,
    strides: [u8; MAX_BLOCKS],
    blocks: &[&[u8]],
    vertex_count: usize,
) -> Result<VertexBuffer, DecodeMeshError> {
    validate_declaration(declaration, strides)?;

    for element in &declaration.elements {
        let block = element.block as usize;
        let Some(available) = blocks.get(block).map(|b| b.len()) else {
            return Err(DecodeMeshError::MissingVertexBlock {
                usage: element.usage,
                block: element.block,
                block_count: blocks.len(),
            });
        };
        let needed = vertex_count * strides[block] as usize;
        if needed > available {
            return Err(DecodeMeshError::TruncatedVertexData {
                block: element.block,
                needed,
                available,
            });
        }
    }

    let mut buffer = VertexBuffer::with_len(vertex_count);
    for element in &declaration.elements {
        let block = blocks[element.block as usize];
        let stride = strides[element.block as usize] as u64;
        read_attribute(&mut buffer, element, block, stride, vertex_count)?;
    }
    Ok(buffer)
}

fn read_attribute(
    buffer: &mut VertexBuffer,
    element: &VertexElement,
    block: &[u8],
    stride: u64,
    vertex_count: usize,
) -> BinResult<()> {
    let data_type = element.data_type;
    match element.usage {
        VertexUsage::Position => {
            buffer.positions = read_data(element, stride, block, vertex_count, |r| {
                read_vec3(r, data_type)
            })?;
        }
        VertexUsage::Normal => {
            buffer.normals = read_data(element, stride, block, vertex_count, |r| {
                read_vec3(r, data_type)
            })?;
        }
        VertexUsage::BoneWeight => {
            buffer.bone_weights = read_data(element, stride, block, vertex_count, |r| {
                read_influence_bytes(r, data_type).map(|b| b.map(|u| u as f32 / 255.0))
            })?;
        }
        VertexUsage::BoneIndex => {
            buffer.bone_indices = read_data(element, stride, block, vertex_count, |r| {
                read_influence_bytes(r, data_type)
            })?;
        }
        VertexUsage::Tangent => {
            let values = read_data(element, stride, block, vertex_count, read_basis)?;
            (buffer.tangents, buffer.tangent_handedness) = values.into_iter().unzip();
        }
        VertexUsage::Binormal => {
            let values = read_data(element, stride, block, vertex_count, read_basis)?;
            (buffer.binormals, buffer.binormal_handedness) = values.into_iter().unzip();
        }
        VertexUsage::Color => {
            buffer.colors = read_data(element, stride, block, vertex_count, read_color)?;
        }
        VertexUsage::TextureCoordinate => {
            let values = read_data(element, stride, block, vertex_count, |r| {
                read_uvs(r, data_type)
            })?;
            (buffer.uv0, buffer.uv1) = values.into_iter().unzip();
        }
    }
    Ok(())
}

fn read_data<T, F>(
    element: &VertexElement,
    stride: u64,
    block: &[u8],
    vertex_count: usize,
    read_item: F,
) -> BinResult<Vec<T>>
where
    F: Fn(&mut Cursor<&[u8]>) -> BinResult<T>,
{
    let mut reader = Cursor::new(block);

    let mut values = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count as u64 {
        let offset = i * stride + element.offset as u64;
        reader.seek(SeekFrom::Start(offset))?;

        values.push(read_item(&mut reader)?);
    }
    Ok(values)
}

fn read_vec3(reader: &mut Cursor<&[u8]>, data_type: DataType) -> BinResult<Vec3> {
    let value = match data_type {
        DataType::Half4 => {
            let value: [u16; 4] = reader.read_le()?;
            Vec3::new(half(value[0]), half(value[1]), half(value[2]))
        }
        DataType::Float4 => {
            let value: [f32; 4] = reader.read_le()?;
            Vec3::new(value[0], value[1], value[2])
        }
        _ => {
            let value: [f32; 3] = reader.read_le()?;
            value.into()
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Ok(Vec3::ZERO)
    }
}

fn read_influence_bytes(reader: &mut Cursor<&[u8]>, data_type: DataType) -> BinResult<[u8; 8]> {
    match data_type {
        DataType::UByte8 => {
            let value: [u8; 8] = reader.read_le()?;
            Ok(UBYTE8_ORDER.map(|i| value[i]))
        }
        _ => {
            let value: [u8; 4] = reader.read_le()?;
            Ok([value[0], value[1], value[2], value[3], 0, 0, 0, 0])
        }
    }
}

fn read_basis(reader: &mut Cursor<&[u8]>) -> BinResult<(Vec3, u8)> {
    let value: [u8; 4] = reader.read_le()?;
    let v = Vec3::new(value[0] as f32, value[1] as f32, value[2] as f32);
    Ok((v * 2.0 / 255.0 - 1.0, value[3]))
}

fn read_color(reader: &mut Cursor<&[u8]>) -> BinResult<[u8; 4]> {
    let [a, r, g, b]: [u8; 4] = reader.read_le()?;
    Ok([r, g, b, a])
}

fn read_uvs(reader: &mut Cursor<&[u8]>, data_type: DataType) -> BinResult<(Vec2, Vec2)> {
    match data_type {
        DataType::Half2 => {
            let value: [u16; 2] = reader.read_le()?;
            Ok((Vec2::new(half(value[0]), half(value[1])), Vec2::ZERO))
        }
        DataType::Half4 => {
            let value: [u16; 4] = reader.read_le()?;
            Ok((
                Vec2::new(half(value[0]), half(value[1])),
                Vec2::new(half(value[2]), half(value[3])),
            ))
        }
        DataType::Float2 => {
            let value: [f32; 2] = reader.read_le()?;
            Ok((value.into(), Vec2::ZERO))
        }
        _ => {
            let value: [f32; 4] = reader.read_le()?;
            Ok((
                Vec2::new(value[0], value[1]),
                Vec2::new(value[2], value[3]),
            ))
        }
    }
}

fn half(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// The declaration and strides used for writing.
///
/// Normals are stored as [DataType::Float3] and texture coordinates as [DataType::Float4].
/// The stride of the containing block changes by the size difference
/// and later elements in the same block move by the same amount.
pub fn output_declaration(
    declaration: &VertexDeclaration,
    strides: [u8; MAX_BLOCKS],
) -> Result<(VertexDeclaration, [u8; MAX_BLOCKS]), EncodeMeshError> {
    let mut new_declaration = declaration.clone();
    let mut new_strides = strides.map(|s| s as i32);
    let mut offset_deltas = vec![0i32; declaration.elements.len()];

    for element in &declaration.elements {
        let target = match element.usage {
            VertexUsage::Normal => DataType::Float3,
            VertexUsage::TextureCoordinate => DataType::Float4,
            _ => continue,
        };
        let delta = target.size_in_bytes() as i32 - element.data_type.size_in_bytes() as i32;
        if element.data_type == target {
            continue;
        }

        for (other, offset_delta) in declaration.elements.iter().zip(&mut offset_deltas) {
            if other.block == element.block && other.offset > element.offset {
                *offset_delta += delta;
            }
        }
        if let Some(stride) = new_strides.get_mut(element.block as usize) {
            *stride += delta;
        }
    }

    for (element, delta) in new_declaration.elements.iter_mut().zip(offset_deltas) {
        element.offset = u8::try_from(element.offset as i32 + delta)
            .map_err(|_| EncodeMeshError::StrideOverflow { block: element.block })?;
        match element.usage {
            VertexUsage::Normal => element.data_type = DataType::Float3,
            VertexUsage::TextureCoordinate => element.data_type = DataType::Float4,
            _ => (),
        }
    }

    let mut output_strides = [0u8; MAX_BLOCKS];
    for (block, (output, stride)) in output_strides.iter_mut().zip(new_strides).enumerate() {
        *output = u8::try_from(stride).map_err(|_| EncodeMeshError::StrideOverflow {
            block: block as u8,
        })?;
    }

    Ok((new_declaration, output_strides))
}

/// Encode all vertices into one byte buffer per block using an output declaration.
pub fn write_vertex_buffer(
    declaration: &VertexDeclaration,
    strides: [u8; MAX_BLOCKS],
    buffer: &VertexBuffer,
) -> Result<Vec<Vec<u8>>, EncodeMeshError> {
    buffer.check_lengths()?;
    for element in &declaration.elements {
        if element.block as usize >= MAX_BLOCKS {
            return Err(EncodeMeshError::InvalidBlock {
                usage: element.usage,
                block: element.block,
            });
        }
        if !is_supported(element.usage, element.data_type) {
            return Err(EncodeMeshError::UnsupportedDataType {
                usage: element.usage,
                data_type: element.data_type,
            });
        }
    }

    let block_count = declaration.block_count();
    let mut writers: Vec<_> = strides[..block_count]
        .iter()
        .map(|s| Cursor::new(vec![0u8; buffer.len() * *s as usize]))
        .collect();

    for element in &declaration.elements {
        let writer = &mut writers[element.block as usize];
        let stride = strides[element.block as usize] as u64;
        for i in 0..buffer.len() {
            writer.seek(SeekFrom::Start(i as u64 * stride + element.offset as u64))?;
            write_attribute(writer, element, buffer, i)?;
        }
    }

    Ok(writers.into_iter().map(|w| w.into_inner()).collect())
}

fn write_attribute(
    writer: &mut Cursor<Vec<u8>>,
    element: &VertexElement,
    buffer: &VertexBuffer,
    i: usize,
) -> BinResult<()> {
    let data_type = element.data_type;
    match element.usage {
        VertexUsage::Position => write_vec3(writer, buffer.positions[i], data_type, 1.0),
        VertexUsage::Normal => write_vec3(writer, buffer.normals[i], data_type, 0.0),
        VertexUsage::BoneWeight => {
            let bytes = buffer.bone_weights[i].map(|w| (w.clamp(0.0, 1.0) * 255.0).round() as u8);
            write_influence_bytes(writer, bytes, data_type)
        }
        VertexUsage::BoneIndex => write_influence_bytes(writer, buffer.bone_indices[i], data_type),
        VertexUsage::Tangent => {
            write_basis(writer, buffer.tangents[i], buffer.tangent_handedness[i])
        }
        VertexUsage::Binormal => {
            write_basis(writer, buffer.binormals[i], buffer.binormal_handedness[i])
        }
        VertexUsage::Color => {
            let [r, g, b, a] = buffer.colors[i];
            [a, r, g, b].write_le(writer)
        }
        VertexUsage::TextureCoordinate => {
            write_uvs(writer, buffer.uv0[i], buffer.uv1[i], data_type)
        }
    }
}

fn write_vec3(
    writer: &mut Cursor<Vec<u8>>,
    value: Vec3,
    data_type: DataType,
    w: f32,
) -> BinResult<()> {
    match data_type {
        DataType::Half4 => value.extend(w).to_array().map(to_half).write_le(writer),
        DataType::Float4 => value.extend(w).to_array().write_le(writer),
        _ => value.to_array().write_le(writer),
    }
}

fn write_influence_bytes(
    writer: &mut Cursor<Vec<u8>>,
    values: [u8; 8],
    data_type: DataType,
) -> BinResult<()> {
    match data_type {
        DataType::UByte8 => {
            let mut bytes = [0u8; 8];
            for (value, i) in values.iter().zip(UBYTE8_ORDER) {
                bytes[i] = *value;
            }
            bytes.write_le(writer)
        }
        _ => [values[0], values[1], values[2], values[3]].write_le(writer),
    }
}

fn write_basis(writer: &mut Cursor<Vec<u8>>, value: Vec3, handedness: u8) -> BinResult<()> {
    let bytes = ((value.clamp(Vec3::NEG_ONE, Vec3::ONE) + 1.0) * 255.0 / 2.0)
        .round()
        .to_array()
        .map(|f| f as u8);
    [bytes[0], bytes[1], bytes[2], handedness].write_le(writer)
}

fn write_uvs(
    writer: &mut Cursor<Vec<u8>>,
    uv0: Vec2,
    uv1: Vec2,
    data_type: DataType,
) -> BinResult<()> {
    match data_type {
        DataType::Half2 => uv0.to_array().map(to_half).write_le(writer),
        DataType::Half4 => [uv0.x, uv0.y, uv1.x, uv1.y].map(to_half).write_le(writer),
        DataType::Float2 => uv0.to_array().write_le(writer),
        _ => [uv0.x, uv0.y, uv1.x, uv1.y].write_le(writer),
    }
}

fn to_half(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}
