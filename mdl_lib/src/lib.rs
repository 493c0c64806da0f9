//! A library for reading and writing compressed model containers.
//!
//! # Getting Started
//! The [Container](container::Container) stores compressed chunks for each section.
//! Decompressing produces the raw bytes for each section,
//! which are parsed separately using the types in [layout] and [vertex].
//!
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mdl_lib::{container::Container, layout::ModelData, vertex::read_declarations};
//!
//! let container = Container::from_file("c0101e0001_top.mdl")?;
//! let sections = container.decompress_sections()?;
//!
//! let model_data = ModelData::read(&sections.model_data)?;
//! let declarations = read_declarations(&sections.vertex_info, model_data.meshes.len())?;
//! println!("{declarations:#?}");
//!
//! // Compress and save to disk after making any changes.
//! let new_container = Container::from_sections(&sections, container.info())?;
//! new_container.write_to_file("out.mdl")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! Each type is intended to be as specific as possible while still being able to generate a binary identical output.
//! Enums are used instead of raw integers to reject unknown variants, for example.
//! Unknown fields are preserved as opaque values.
//! mdl_lib validates sizes and counts while parsing but cannot validate
//! higher level constraints like entry indices being in range.
//! These checks are performed by higher level libraries like mdl_model.
//!
//! Compression can not be reversed accurately and is performed as a separate step.
//! Decompressed sections can be written back without modifications to produce identical section bytes.
pub mod chunk;
pub mod container;
pub mod error;
pub mod layout;
pub mod section;
pub mod vertex;

/// Round `x` up to the next multiple of `n`.
pub(crate) const fn round_up(x: u64, n: u64) -> u64 {
    // https://en.wikipedia.org/wiki/Data_structure_alignment#Computing_padding
    x.div_ceil(n) * n
}
