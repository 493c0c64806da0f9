//! Alternate vertex assignments used to hide parts of a mesh.
//!
//! Each [HiderDataEntry] replaces the vertex referenced at a position in the index buffer
//! with a different vertex of the same mesh.
//! Entries apply to the mesh whose index buffer offset matches the [HiderDataInfo].
//! The alternate vertices are usually not referenced by the index buffer,
//! so their attributes are recorded on read and appended again after importing new geometry.
use ahash::AHashMap;
use mdl_lib::{
    container::LOD_COUNT,
    layout::{HiderDataEntry, HiderDataInfo, MeshHiderInfo},
};

use crate::{
    error::{HiderError, SaveModelError},
    vertex::{Vertex, VertexBuffer},
};

/// The hider tables of the model data section.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct HiderTables {
    pub infos: Vec<MeshHiderInfo>,
    pub data_infos: Vec<HiderDataInfo>,
    pub entries: Vec<HiderDataEntry>,
}

/// A hider entry resolved against a mesh's index buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ResolvedHide {
    /// The index into [entries](struct.HiderTables.html#structfield.entries).
    pub entry: usize,
    /// The position in the mesh's index buffer.
    pub index_position: u32,
    /// The vertex at [index_position](#structfield.index_position) without hiding.
    pub reference_vertex: u32,
    /// The vertex used at [index_position](#structfield.index_position) when hiding.
    pub hide_vertex: u32,
}

/// The recorded attributes of an alternate vertex.
#[derive(Debug, PartialEq, Clone)]
pub struct HiddenVertex {
    /// The vertex index when the attributes were recorded.
    pub index: u32,
    pub vertex: Vertex,
}

impl HiderTables {
    /// The data info indices for a level of detail.
    fn lod_data_infos(&self, lod: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .infos
            .iter()
            .flat_map(|info| {
                let start = info.data_info_indices[lod] as usize;
                let end = start + info.data_info_counts[lod] as usize;
                start..end.min(self.data_infos.len())
            })
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    fn data_info_entries(&self, data_info: &HiderDataInfo) -> std::ops::Range<usize> {
        let start = (data_info.entry_offset as usize).min(self.entries.len());
        let end = (start + data_info.entry_count as usize).min(self.entries.len());
        start..end
    }

    /// The entry indices that apply to the mesh with the given index buffer offset.
    pub fn mesh_entries(&self, lod: usize, index_data_offset: u32) -> Vec<usize> {
        let mut entries: Vec<usize> = self
            .lod_data_infos(lod)
            .into_iter()
            .filter(|i| self.data_infos[*i].index_data_offset == index_data_offset)
            .flat_map(|i| self.data_info_entries(&self.data_infos[i]))
            .collect();
        entries.sort_unstable();
        entries.dedup();
        entries
    }

    /// Resolve all entries for a mesh.
    /// Entries that fail to resolve are returned separately.
    pub fn resolve_mesh(
        &self,
        lod: usize,
        index_data_offset: u32,
        indices: &[u16],
        vertex_count: u32,
    ) -> (Vec<ResolvedHide>, Vec<HiderError>) {
        let mut resolved = Vec::new();
        let mut errors = Vec::new();
        for entry in self.mesh_entries(lod, index_data_offset) {
            match resolve_entry(
                entry,
                &self.entries[entry],
                index_data_offset,
                indices,
                vertex_count,
            ) {
                Ok(hide) => resolved.push(hide),
                Err(e) => errors.push(e),
            }
        }
        (resolved, errors)
    }

    /// Remove entries where `keep` returns `false` and update the data info ranges.
    pub fn retain_entries<F: Fn(usize) -> bool>(&mut self, keep: F) {
        // The number of kept entries before each old entry index.
        let mut kept_before = Vec::with_capacity(self.entries.len() + 1);
        let mut entries = Vec::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            kept_before.push(entries.len() as u32);
            if keep(i) {
                entries.push(*entry);
            }
        }
        kept_before.push(entries.len() as u32);

        for data_info in &mut self.data_infos {
            let start = (data_info.entry_offset as usize).min(self.entries.len());
            let end = (start + data_info.entry_count as usize).min(self.entries.len());
            data_info.entry_offset = kept_before[start];
            data_info.entry_count = kept_before[end] - kept_before[start];
        }
        self.entries = entries;
    }

    /// Update the index buffer offsets for a level of detail after moving meshes.
    /// `offsets` maps each mesh's old index buffer offset to its new offset.
    pub fn rebase(
        &mut self,
        lod: usize,
        offsets: &AHashMap<u32, u32>,
        rebased: &mut [bool],
    ) -> Result<(), SaveModelError> {
        for i in self.lod_data_infos(lod) {
            if rebased[i] {
                continue;
            }
            rebased[i] = true;

            let old = self.data_infos[i].index_data_offset;
            let Some(new) = offsets.get(&old).copied() else {
                continue;
            };
            self.data_infos[i].index_data_offset = new;

            let range = self.data_info_entries(&self.data_infos[i]);
            for entry in &mut self.entries[range] {
                let position = entry.reference_index_offset as i64 - old as i64;
                entry.reference_index_offset = u16::try_from(new as i64 + position)
                    .map_err(|_| SaveModelError::Overflow("hider reference index offset"))?;
            }
        }
        Ok(())
    }

    /// Call [HiderTables::rebase] for every level of detail.
    pub fn rebase_all(
        &mut self,
        offsets: &[AHashMap<u32, u32>; LOD_COUNT],
    ) -> Result<(), SaveModelError> {
        let mut rebased = vec![false; self.data_infos.len()];
        for (lod, lod_offsets) in offsets.iter().enumerate() {
            self.rebase(lod, lod_offsets, &mut rebased)?;
        }
        Ok(())
    }
}

/// Resolve a single entry against a mesh's index buffer.
pub fn resolve_entry(
    entry_index: usize,
    entry: &HiderDataEntry,
    index_data_offset: u32,
    indices: &[u16],
    vertex_count: u32,
) -> Result<ResolvedHide, HiderError> {
    let out_of_range = |index, limit| HiderError::HiderIndexOutOfRange {
        entry: entry_index,
        index,
        limit,
    };

    let reference = entry.reference_index_offset as u32;
    let end = index_data_offset + indices.len() as u32;
    if reference < index_data_offset || reference >= end {
        return Err(out_of_range(reference, end));
    }

    let index_position = reference - index_data_offset;
    let reference_vertex = indices[index_position as usize] as u32;
    if reference_vertex >= vertex_count {
        return Err(out_of_range(reference_vertex, vertex_count));
    }

    let hide_vertex = entry.hide_index as u32;
    if hide_vertex >= vertex_count {
        return Err(out_of_range(hide_vertex, vertex_count));
    }

    Ok(ResolvedHide {
        entry: entry_index,
        index_position,
        reference_vertex,
        hide_vertex,
    })
}

/// Record the attributes for each unique alternate vertex.
pub fn record_hidden_vertices(hides: &[ResolvedHide], buffer: &VertexBuffer) -> Vec<HiddenVertex> {
    let mut indices: Vec<_> = hides.iter().map(|h| h.hide_vertex).collect();
    indices.sort_unstable();
    indices.dedup();

    indices
        .into_iter()
        .filter_map(|index| {
            buffer.vertex(index as usize).map(|vertex| HiddenVertex { index, vertex })
        })
        .collect()
}

/// Append the recorded vertices after the existing vertices.
/// Returns the mapping from recorded index to new index.
pub fn append_hidden_vertices(
    buffer: &mut VertexBuffer,
    hidden: &[HiddenVertex],
) -> AHashMap<u32, u32> {
    let mut new_indices = AHashMap::new();
    for hidden_vertex in hidden {
        new_indices.insert(hidden_vertex.index, buffer.len() as u32);
        buffer.push(hidden_vertex.vertex);
    }
    new_indices
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::vec3;
    use pretty_assertions::assert_eq;

    fn tables() -> HiderTables {
        HiderTables {
            infos: vec![MeshHiderInfo {
                name_offset: 0,
                data_info_indices: [0, 2, 2],
                data_info_counts: [2, 0, 0],
            }],
            data_infos: vec![
                HiderDataInfo {
                    index_data_offset: 0,
                    entry_count: 2,
                    entry_offset: 0,
                },
                HiderDataInfo {
                    index_data_offset: 8,
                    entry_count: 1,
                    entry_offset: 2,
                },
            ],
            entries: vec![
                HiderDataEntry {
                    reference_index_offset: 1,
                    hide_index: 3,
                },
                HiderDataEntry {
                    reference_index_offset: 2,
                    hide_index: 4,
                },
                HiderDataEntry {
                    reference_index_offset: 9,
                    hide_index: 3,
                },
            ],
        }
    }

    #[test]
    fn mesh_entries_by_offset() {
        let tables = tables();
        assert_eq!(vec![0, 1], tables.mesh_entries(0, 0));
        assert_eq!(vec![2], tables.mesh_entries(0, 8));
        assert!(tables.mesh_entries(0, 16).is_empty());
        assert!(tables.mesh_entries(1, 0).is_empty());
    }

    #[test]
    fn resolve_mesh_entries() {
        let tables = tables();
        let indices = [0, 1, 2, 2, 1, 0];
        let (resolved, errors) = tables.resolve_mesh(0, 0, &indices, 5);
        assert!(errors.is_empty());
        assert_eq!(
            vec![
                ResolvedHide {
                    entry: 0,
                    index_position: 1,
                    reference_vertex: 1,
                    hide_vertex: 3
                },
                ResolvedHide {
                    entry: 1,
                    index_position: 2,
                    reference_vertex: 2,
                    hide_vertex: 4
                },
            ],
            resolved
        );

        // The second mesh starts at index 8.
        let (resolved, _) = tables.resolve_mesh(0, 8, &[0, 2, 1], 4);
        assert_eq!(1, resolved[0].index_position);
        assert_eq!(2, resolved[0].reference_vertex);
    }

    #[test]
    fn resolve_hide_index_out_of_range() {
        let tables = tables();
        let (resolved, errors) = tables.resolve_mesh(0, 0, &[0, 1, 2], 4);
        assert_eq!(1, resolved.len());
        assert!(matches!(
            errors.as_slice(),
            [HiderError::HiderIndexOutOfRange {
                entry: 1,
                index: 4,
                limit: 4
            }]
        ));
    }

    #[test]
    fn resolve_reference_out_of_range() {
        let entry = HiderDataEntry {
            reference_index_offset: 5,
            hide_index: 0,
        };
        assert!(matches!(
            resolve_entry(0, &entry, 0, &[0, 1, 2], 3),
            Err(HiderError::HiderIndexOutOfRange {
                entry: 0,
                index: 5,
                limit: 3
            })
        ));
    }

    #[test]
    fn retain_entries_updates_ranges() {
        let mut tables = tables();
        tables.retain_entries(|i| i != 0);
        assert_eq!(2, tables.entries.len());
        assert_eq!((0, 1), (tables.data_infos[0].entry_offset, tables.data_infos[0].entry_count));
        assert_eq!((1, 1), (tables.data_infos[1].entry_offset, tables.data_infos[1].entry_count));
        assert_eq!(vec![0], tables.mesh_entries(0, 0));
    }

    #[test]
    fn rebase_offsets() {
        let mut tables = tables();
        let offsets = [
            [(0, 0), (8, 16)].into_iter().collect(),
            AHashMap::new(),
            AHashMap::new(),
        ];
        tables.rebase_all(&offsets).unwrap();
        assert_eq!(16, tables.data_infos[1].index_data_offset);
        assert_eq!(17, tables.entries[2].reference_index_offset);
        assert_eq!(1, tables.entries[0].reference_index_offset);
    }

    #[test]
    fn record_and_append_hidden_vertices() {
        let mut buffer = VertexBuffer::with_len(5);
        buffer.positions[3] = vec3(3.0, 0.0, 0.0);
        buffer.positions[4] = vec3(4.0, 0.0, 0.0);

        let hides = [
            ResolvedHide {
                entry: 0,
                index_position: 0,
                reference_vertex: 0,
                hide_vertex: 4,
            },
            ResolvedHide {
                entry: 1,
                index_position: 1,
                reference_vertex: 1,
                hide_vertex: 3,
            },
            ResolvedHide {
                entry: 2,
                index_position: 2,
                reference_vertex: 2,
                hide_vertex: 4,
            },
        ];
        let hidden = record_hidden_vertices(&hides, &buffer);
        assert_eq!(vec![3, 4], hidden.iter().map(|h| h.index).collect::<Vec<_>>());

        let mut new_buffer = VertexBuffer::with_len(2);
        let new_indices = append_hidden_vertices(&mut new_buffer, &hidden);
        assert_eq!(4, new_buffer.len());
        assert_eq!(Some(&2), new_indices.get(&3));
        assert_eq!(Some(&3), new_indices.get(&4));
        assert_eq!(vec3(4.0, 0.0, 0.0), new_buffer.positions[3]);
    }
}
