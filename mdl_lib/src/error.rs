use thiserror::Error;
use zune_inflate::errors::InflateDecodeErrors;

use crate::container::SectionKind;

#[derive(Debug, Error)]
pub enum DecompressChunkError {
    #[error("error decoding compressed stream: {0}")]
    Inflate(#[from] InflateDecodeErrors),

    #[error("decompressed chunk has {actual} bytes but the header declares {expected} bytes")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ReadContainerError {
    #[error("corrupt chunk in {section:?} at offset {offset}")]
    CorruptChunk {
        section: SectionKind,
        offset: u64,
        #[source]
        source: DecompressChunkError,
    },

    #[error("{section:?} truncated at offset {offset}")]
    TruncatedSection { section: SectionKind, offset: u64 },

    #[error("inconsistent container header at offset {offset}: {reason}")]
    HeaderInconsistent { offset: u64, reason: String },

    #[error("error reading data: {0}")]
    Io(#[from] std::io::Error),

    #[error("error reading data: {0}")]
    Binrw(#[from] binrw::Error),
}

#[derive(Debug, Error)]
pub enum WriteContainerError {
    #[error("{section:?} requires {size} bytes which exceeds the 32-bit size fields")]
    SectionTooLarge { section: SectionKind, size: usize },

    #[error("container requires {count} chunks which exceeds the 16-bit chunk index fields")]
    TooManyChunks { count: usize },

    #[error("error compressing data: {0}")]
    Io(#[from] std::io::Error),

    #[error("error writing data: {0}")]
    Binrw(#[from] binrw::Error),
}

#[derive(Debug, Error)]
pub enum ReadLayoutError {
    #[error("{context} truncated at offset {offset}: needed {needed} bytes but {remaining} remain")]
    TruncatedSection {
        context: &'static str,
        offset: u64,
        needed: u64,
        remaining: u64,
    },

    #[error("unknown vertex data type {value} at offset {offset}")]
    UnknownDataType { offset: u64, value: u8 },

    #[error("unknown vertex usage {value} at offset {offset}")]
    UnknownUsage { offset: u64, value: u8 },

    #[error("vertex declaration at offset {offset} is missing its terminator")]
    MissingTerminator { offset: u64 },

    #[error("string table at offset {offset} ends before string {index}")]
    MissingString { offset: u64, index: usize },

    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidString { offset: u64 },

    #[error("string table at offset {offset} has {declared} strings but the header requires {required}")]
    InvalidStringCount {
        offset: u64,
        declared: u32,
        required: usize,
    },

    #[error("bone index part table at offset {offset} has odd byte size {size}")]
    OddBoneIndexPartSize { offset: u64, size: u32 },

    #[error("error reading data: {0}")]
    Binrw(#[from] binrw::Error),
}

#[derive(Debug, Error)]
pub enum WriteLayoutError {
    #[error("string {0:?} contains a NUL byte")]
    InvalidString(String),

    #[error("vertex declaration has {count} attributes but at most {max} fit")]
    TooManyAttributes { count: usize, max: usize },

    #[error("padding has {0} bytes but at most 255 fit")]
    PaddingTooLong(usize),

    #[error("{names} bone names, {data} bone data entries, and {transforms} bone transforms do not match")]
    BoneCountMismatch {
        names: usize,
        data: usize,
        transforms: usize,
    },

    #[error("{0} entries do not fit in a 16-bit count")]
    CountOverflow(&'static str),

    #[error("error writing data: {0}")]
    Binrw(#[from] binrw::Error),
}
