//! Vertex declarations describing the attribute layout of each mesh.
//!
//! # Overview
//! The vertex info section stores one [VertexDeclaration] per mesh in a fixed size slot of [DECLARATION_SIZE] bytes.
//! Each [VertexElement] selects a vertex block, a byte offset within a vertex of that block,
//! the [DataType] used for storage, and the [VertexUsage] describing the attribute.
//!
//! Vertex blocks are interleaved or "array of structs" buffers.
//! A mesh has up to [MAX_BLOCKS] blocks with their own stride.
//! ```text
//! block 0: position 0, weights 0, indices 0, position 1, weights 1, indices 1, ...
//! block 1: normal 0, uv 0, color 0, normal 1, uv 1, color 1, ...
//! ```
use std::io::{Seek, Write};

use binrw::BinWrite;

use crate::error::{ReadLayoutError, WriteLayoutError};

/// The size in bytes of a single [VertexElement] record.
pub const ELEMENT_SIZE: usize = 8;

/// The size in bytes of the declaration slot for each mesh.
pub const DECLARATION_SIZE: usize = 136;

/// The maximum number of elements that fit before the terminator.
pub const MAX_ELEMENTS: usize = DECLARATION_SIZE / ELEMENT_SIZE - 1;

/// The maximum number of vertex blocks for a mesh.
pub const MAX_BLOCKS: usize = 3;

/// The [block](struct.VertexElement.html#structfield.block) value marking the end of a declaration.
pub const TERMINATOR_BLOCK: u8 = 0xFF;

/// The storage format for a [VertexElement].
///
/// Converts from the element's type byte with [TryFrom], rejecting unknown values.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum DataType {
    Float1 = 0,
    Float2 = 1,
    Float3 = 2,
    Float4 = 3,
    UByte4 = 5,
    Short2 = 6,
    Short4 = 7,
    /// Unorm8x4
    UByte4Normalized = 8,
    Short2Normalized = 9,
    Short4Normalized = 10,
    /// Float16x2
    Half2 = 13,
    /// Float16x4
    Half4 = 14,
    Compressed = 15,
    /// Two interleaved groups of four bytes used for up to 8 bone influences.
    UByte8 = 17,
}

impl DataType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::Float1 => 4,
            DataType::Float2 => 8,
            DataType::Float3 => 12,
            DataType::Float4 => 16,
            DataType::UByte4 => 4,
            DataType::Short2 => 4,
            DataType::Short4 => 8,
            DataType::UByte4Normalized => 4,
            DataType::Short2Normalized => 4,
            DataType::Short4Normalized => 8,
            DataType::Half2 => 4,
            DataType::Half4 => 8,
            DataType::Compressed => 4,
            DataType::UByte8 => 8,
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DataType::Float1),
            1 => Ok(DataType::Float2),
            2 => Ok(DataType::Float3),
            3 => Ok(DataType::Float4),
            5 => Ok(DataType::UByte4),
            6 => Ok(DataType::Short2),
            7 => Ok(DataType::Short4),
            8 => Ok(DataType::UByte4Normalized),
            9 => Ok(DataType::Short2Normalized),
            10 => Ok(DataType::Short4Normalized),
            13 => Ok(DataType::Half2),
            14 => Ok(DataType::Half4),
            15 => Ok(DataType::Compressed),
            17 => Ok(DataType::UByte8),
            _ => Err(value),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        value as u8
    }
}

/// The attribute stored by a [VertexElement].
///
/// Converts from the element's usage byte with [TryFrom], rejecting unknown values.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum VertexUsage {
    Position = 0,
    BoneWeight = 1,
    BoneIndex = 2,
    Normal = 3,
    TextureCoordinate = 4,
    Tangent = 5,
    Binormal = 6,
    Color = 7,
}

impl TryFrom<u8> for VertexUsage {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VertexUsage::Position),
            1 => Ok(VertexUsage::BoneWeight),
            2 => Ok(VertexUsage::BoneIndex),
            3 => Ok(VertexUsage::Normal),
            4 => Ok(VertexUsage::TextureCoordinate),
            5 => Ok(VertexUsage::Tangent),
            6 => Ok(VertexUsage::Binormal),
            7 => Ok(VertexUsage::Color),
            _ => Err(value),
        }
    }
}

impl From<VertexUsage> for u8 {
    fn from(value: VertexUsage) -> Self {
        value as u8
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct VertexElement {
    /// The vertex block containing this element.
    pub block: u8,
    /// The byte offset within a single vertex of the block.
    pub offset: u8,
    pub data_type: DataType,
    pub usage: VertexUsage,
    pub usage_index: u8,
}

impl VertexElement {
    fn from_bytes(bytes: [u8; ELEMENT_SIZE], offset: u64) -> Result<Self, ReadLayoutError> {
        let data_type = DataType::try_from(bytes[2])
            .map_err(|value| ReadLayoutError::UnknownDataType { offset: offset + 2, value })?;
        let usage = VertexUsage::try_from(bytes[3])
            .map_err(|value| ReadLayoutError::UnknownUsage { offset: offset + 3, value })?;
        Ok(Self {
            block: bytes[0],
            offset: bytes[1],
            data_type,
            usage,
            usage_index: bytes[4],
        })
    }

    fn to_bytes(self) -> [u8; ELEMENT_SIZE] {
        [
            self.block,
            self.offset,
            self.data_type.into(),
            self.usage.into(),
            self.usage_index,
            0,
            0,
            0,
        ]
    }
}

/// The ordered attribute layout for a single mesh.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct VertexDeclaration {
    pub elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    /// Parse the declaration slot starting at `offset` in `section`.
    pub fn read(section: &[u8], offset: usize) -> Result<Self, ReadLayoutError> {
        let end = offset + DECLARATION_SIZE;
        if end > section.len() {
            return Err(ReadLayoutError::TruncatedSection {
                context: "vertex declaration",
                offset: offset as u64,
                needed: DECLARATION_SIZE as u64,
                remaining: section.len().saturating_sub(offset) as u64,
            });
        }

        let mut elements = Vec::new();
        for (i, record) in section[offset..end].chunks_exact(ELEMENT_SIZE).enumerate() {
            let record_offset = (offset + i * ELEMENT_SIZE) as u64;
            let bytes: [u8; ELEMENT_SIZE] = std::array::from_fn(|j| record[j]);
            if bytes[0] == TERMINATOR_BLOCK {
                return Ok(Self { elements });
            }
            elements.push(VertexElement::from_bytes(bytes, record_offset)?);
        }

        Err(ReadLayoutError::MissingTerminator {
            offset: offset as u64,
        })
    }

    /// Write exactly [DECLARATION_SIZE] bytes.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteLayoutError> {
        if self.elements.len() > MAX_ELEMENTS {
            return Err(WriteLayoutError::TooManyAttributes {
                count: self.elements.len(),
                max: MAX_ELEMENTS,
            });
        }

        let mut bytes = Vec::with_capacity(DECLARATION_SIZE);
        for element in &self.elements {
            bytes.extend_from_slice(&element.to_bytes());
        }
        bytes.push(TERMINATOR_BLOCK);
        bytes.resize(DECLARATION_SIZE, 0);
        bytes.write_le(writer)?;
        Ok(())
    }

    pub fn element(&self, usage: VertexUsage) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.usage == usage)
    }

    /// The number of vertex blocks referenced by the elements.
    pub fn block_count(&self) -> usize {
        self.elements
            .iter()
            .map(|e| e.block as usize + 1)
            .max()
            .unwrap_or_default()
    }
}

/// Read `count` consecutive declarations from the vertex info section.
pub fn read_declarations(
    section: &[u8],
    count: usize,
) -> Result<Vec<VertexDeclaration>, ReadLayoutError> {
    (0..count)
        .map(|i| VertexDeclaration::read(section, i * DECLARATION_SIZE))
        .collect()
}

/// Write all declarations to a new vertex info section.
pub fn write_declarations(
    declarations: &[VertexDeclaration],
) -> Result<Vec<u8>, WriteLayoutError> {
    let mut writer =
        std::io::Cursor::new(Vec::with_capacity(declarations.len() * DECLARATION_SIZE));
    for declaration in declarations {
        declaration.write(&mut writer)?;
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    use hexlit::hex;
    use pretty_assertions::assert_eq;

    fn skinned_declaration_bytes() -> Vec<u8> {
        let mut bytes = [
            // position
            hex!("00000e00 00000000"),
            // bone weight
            hex!("00080801 00000000"),
            // bone index
            hex!("000c0502 00000000"),
            // normal
            hex!("01000e03 00000000"),
            // uv
            hex!("01080e04 00000000"),
            // color
            hex!("01100807 00000000"),
            // end
            hex!("ff000000 00000000"),
        ]
        .concat();
        bytes.resize(DECLARATION_SIZE, 0);
        bytes
    }

    fn skinned_declaration() -> VertexDeclaration {
        let element = |block, offset, data_type, usage| VertexElement {
            block,
            offset,
            data_type,
            usage,
            usage_index: 0,
        };
        VertexDeclaration {
            elements: vec![
                element(0, 0, DataType::Half4, VertexUsage::Position),
                element(0, 8, DataType::UByte4Normalized, VertexUsage::BoneWeight),
                element(0, 12, DataType::UByte4, VertexUsage::BoneIndex),
                element(1, 0, DataType::Half4, VertexUsage::Normal),
                element(1, 8, DataType::Half4, VertexUsage::TextureCoordinate),
                element(1, 16, DataType::UByte4Normalized, VertexUsage::Color),
            ],
        }
    }

    #[test]
    fn read_skinned_declaration() {
        let bytes = skinned_declaration_bytes();
        let declaration = VertexDeclaration::read(&bytes, 0).unwrap();
        assert_eq!(skinned_declaration(), declaration);
        assert_eq!(2, declaration.block_count());
    }

    #[test]
    fn write_skinned_declaration() {
        let bytes = write_declarations(&[skinned_declaration()]).unwrap();
        assert_eq!(skinned_declaration_bytes(), bytes);
    }

    #[test]
    fn read_multiple_declarations() {
        let mut bytes = skinned_declaration_bytes();
        bytes.extend(skinned_declaration_bytes());
        let declarations = read_declarations(&bytes, 2).unwrap();
        assert_eq!(vec![skinned_declaration(), skinned_declaration()], declarations);
    }

    #[test]
    fn read_unknown_data_type() {
        let mut bytes = skinned_declaration_bytes();
        bytes[8 + 2] = 4;
        assert!(matches!(
            VertexDeclaration::read(&bytes, 0),
            Err(ReadLayoutError::UnknownDataType { offset: 10, value: 4 })
        ));
    }

    #[test]
    fn read_unknown_usage() {
        let mut bytes = skinned_declaration_bytes();
        bytes[3] = 8;
        assert!(matches!(
            VertexDeclaration::read(&bytes, 0),
            Err(ReadLayoutError::UnknownUsage { offset: 3, value: 8 })
        ));
    }

    #[test]
    fn read_missing_terminator() {
        let bytes = vec![0u8; DECLARATION_SIZE];
        assert!(matches!(
            VertexDeclaration::read(&bytes, 0),
            Err(ReadLayoutError::MissingTerminator { offset: 0 })
        ));
    }

    #[test]
    fn read_truncated_declaration() {
        let bytes = skinned_declaration_bytes();
        assert!(matches!(
            read_declarations(&bytes[..100], 1),
            Err(ReadLayoutError::TruncatedSection { offset: 0, .. })
        ));
    }

    #[test]
    fn write_too_many_elements() {
        let element = skinned_declaration().elements[0];
        let declaration = VertexDeclaration {
            elements: vec![element; MAX_ELEMENTS + 1],
        };
        assert!(matches!(
            write_declarations(&[declaration]),
            Err(WriteLayoutError::TooManyAttributes { count: 17, max: 16 })
        ));
    }

    #[test]
    fn data_type_codes() {
        for code in 0..=u8::MAX {
            if let Ok(data_type) = DataType::try_from(code) {
                assert_eq!(code, u8::from(data_type));
            }
        }
        assert_eq!(Err(4), DataType::try_from(4));
        assert_eq!(Err(16), DataType::try_from(16));
    }
}
