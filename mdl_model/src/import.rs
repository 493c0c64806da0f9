use glam::{Vec2, Vec3};
use log::{info, warn};

use crate::{
    MeshVertices, ModelContainer, Outcome, Warning,
    error::ImportError,
    hider::append_hidden_vertices,
    recalculate::index_padding,
    skinning::{Influence, MeshWeights, SkinningContext},
    vertex::VertexBuffer,
};

/// The largest vertex count addressable by 16-bit indices.
const MAX_VERTICES: usize = u16::MAX as usize + 1;

/// Geometry for a single mesh from an external importer.
///
/// Each per vertex attribute has one value for each position.
/// Optional attributes use default values when missing.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ImportedMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Option<Vec<Vec3>>,
    pub tangent_handedness: Option<Vec<u8>>,
    pub binormals: Option<Vec<Vec3>>,
    pub binormal_handedness: Option<Vec<u8>>,
    /// RGBA colors.
    pub colors: Option<Vec<[u8; 4]>>,
    pub uv0: Vec<Vec2>,
    pub uv1: Option<Vec<Vec2>>,
    /// Influences using indices into the model's bone names.
    pub influences: Vec<Vec<Influence>>,
    /// Triangle list vertex indices.
    pub indices: Vec<u16>,
    /// The number of indices for each part of the mesh in order.
    pub part_index_counts: Vec<u32>,
}

impl ImportedMesh {
    /// Check lengths and ranges before modifying the model.
    pub fn validate(&self, part_count: usize) -> Result<(), ImportError> {
        let expected = self.positions.len();
        let lengths = [
            ("normals", Some(self.normals.len())),
            ("tangents", self.tangents.as_ref().map(Vec::len)),
            ("tangent handedness", self.tangent_handedness.as_ref().map(Vec::len)),
            ("binormals", self.binormals.as_ref().map(Vec::len)),
            ("binormal handedness", self.binormal_handedness.as_ref().map(Vec::len)),
            ("colors", self.colors.as_ref().map(Vec::len)),
            ("uv0", Some(self.uv0.len())),
            ("uv1", self.uv1.as_ref().map(Vec::len)),
            ("influences", Some(self.influences.len())),
        ];
        for (name, actual) in lengths {
            match actual {
                Some(actual) if actual != expected => {
                    return Err(ImportError::AttributeLength {
                        name,
                        expected,
                        actual,
                    });
                }
                _ => (),
            }
        }

        if let Some(index) = self.indices.iter().find(|i| **i as usize >= expected) {
            return Err(ImportError::IndexOutOfRange {
                index: *index,
                vertex_count: expected,
            });
        }

        if self.part_index_counts.len() != part_count {
            return Err(ImportError::PartCountMismatch {
                expected: part_count,
                actual: self.part_index_counts.len(),
            });
        }
        let part_total: usize = self.part_index_counts.iter().map(|c| *c as usize).sum();
        if part_total != self.indices.len() {
            return Err(ImportError::PartIndexCount {
                expected: self.indices.len(),
                actual: part_total,
            });
        }

        Ok(())
    }

    fn into_vertex_buffer(self, weights: &MeshWeights) -> VertexBuffer {
        let count = self.positions.len();
        VertexBuffer {
            positions: self.positions,
            normals: self.normals,
            tangents: self.tangents.unwrap_or_else(|| vec![Vec3::ZERO; count]),
            tangent_handedness: self.tangent_handedness.unwrap_or_else(|| vec![0; count]),
            binormals: self.binormals.unwrap_or_else(|| vec![Vec3::ZERO; count]),
            binormal_handedness: self.binormal_handedness.unwrap_or_else(|| vec![0; count]),
            colors: self.colors.unwrap_or_else(|| vec![[255; 4]; count]),
            uv0: self.uv0,
            uv1: self.uv1.unwrap_or_else(|| vec![Vec2::ZERO; count]),
            bone_weights: weights.vertices.iter().map(|w| w.weights_f32()).collect(),
            bone_indices: weights.vertices.iter().map(|w| w.indices_u8()).collect(),
        }
    }
}

impl ModelContainer {
    /// Replace the vertices, indices and part index counts for a mesh.
    ///
    /// Influences are packed using the mesh's bone index set
    /// with the set of the first mesh as a fallback.
    /// Alternate vertices used for hiding are appended after the imported vertices
    /// and hider entries outside the new index buffer are removed.
    #[tracing::instrument(skip_all)]
    pub fn replace_mesh_geometry(
        &mut self,
        lod: usize,
        mesh: usize,
        imported: ImportedMesh,
    ) -> Result<Outcome<()>, ImportError> {
        let level = self.lods.get(lod).ok_or(ImportError::LodOutOfRange { lod })?;
        let entry = level
            .meshes
            .get(mesh)
            .ok_or(ImportError::MeshOutOfRange { lod, mesh })?;
        if entry.vertex_buffer().is_none() {
            return Err(ImportError::UndecodedMesh { lod, mesh });
        }

        imported.validate(entry.parts.len())?;
        let vertex_count = imported.positions.len() + entry.hidden_vertices.len();
        if vertex_count > MAX_VERTICES {
            return Err(ImportError::TooManyVertices {
                count: vertex_count,
            });
        }

        let global_mesh = self.lods[..lod].iter().map(|l| l.meshes.len()).sum::<usize>() + mesh;
        let context = SkinningContext::new(&self.paths.bones, &self.bone_sets);
        let (weights, mut warnings) = context
            .normalize_mesh(
                global_mesh,
                entry.bone_set_index as usize,
                self.fallback_bone_set_index(),
                &imported.influences,
            )
            .into_parts();

        // Recorded vertices use slots from the previous bone index set.
        let mut hidden_vertices = entry.hidden_vertices.clone();
        if weights.bone_set_index != entry.bone_set_index as usize {
            let old_bones = self
                .bone_sets
                .get(entry.bone_set_index as usize)
                .map(|s| s.used_bones())
                .unwrap_or_default();
            let new_slots = context.local_slots(weights.bone_set_index);
            for hidden in &mut hidden_vertices {
                for slot in &mut hidden.vertex.bone_indices {
                    *slot = old_bones
                        .get(*slot as usize)
                        .and_then(|bone| new_slots.get(&(*bone as u32)))
                        .copied()
                        .unwrap_or_default();
                }
            }
        }

        let index_count = imported.indices.len();
        let part_index_counts = imported.part_index_counts.clone();
        let indices = imported.indices.clone();

        let mut buffer = imported.into_vertex_buffer(&weights);
        let new_hide_indices = append_hidden_vertices(&mut buffer, &hidden_vertices);
        for hidden in &mut hidden_vertices {
            if let Some(index) = new_hide_indices.get(&hidden.index) {
                hidden.index = *index;
            }
        }

        let entry = &mut self.lods[lod].meshes[mesh];

        let mut dropped = Vec::new();
        for i in self.hider.mesh_entries(lod, entry.index_data_offset) {
            let hider_entry = &mut self.hider.entries[i];
            let position =
                (hider_entry.reference_index_offset as u32).checked_sub(entry.index_data_offset);
            let new_hide_index = new_hide_indices.get(&(hider_entry.hide_index as u32));
            match (position, new_hide_index) {
                (Some(position), Some(index)) if (position as usize) < index_count => {
                    hider_entry.hide_index = *index as u16;
                }
                _ => dropped.push(i),
            }
        }
        if !dropped.is_empty() {
            warn!("lod {lod} mesh {mesh}: dropped {} hider entries", dropped.len());
            warnings.extend(dropped.iter().map(|entry| Warning::HiderEntryDropped {
                lod,
                mesh,
                entry: *entry,
            }));
            self.hider.retain_entries(|i| !dropped.contains(&i));
        }

        let mut offset = 0;
        for (part, count) in entry.parts.iter_mut().zip(part_index_counts) {
            part.index_offset = offset;
            part.index_count = count;
            offset += count;
        }
        if let Some(last) = entry.parts.last_mut() {
            last.index_count += index_padding(index_count as u32);
        }
        entry.vertices = MeshVertices::Decoded(buffer);
        entry.indices = indices;
        entry.hidden_vertices = hidden_vertices;
        entry.bone_set_index = weights.bone_set_index as u16;

        info!(
            "lod {lod} mesh {mesh}: imported {vertex_count} vertices and {index_count} indices"
        );

        self.refresh_hides();
        Ok(Outcome::new((), warnings))
    }

    /// Resolve the hider entries for every mesh again after changing geometry or hider tables.
    /// Entries that no longer resolve are skipped.
    pub fn refresh_hides(&mut self) {
        for (lod, level) in self.lods.iter_mut().enumerate() {
            for mesh in &mut level.meshes {
                let vertex_count = mesh.vertex_count() as u32;
                let (hides, _) = self.hider.resolve_mesh(
                    lod,
                    mesh.index_data_offset,
                    &mesh.indices,
                    vertex_count,
                );
                mesh.hides = hides;
            }
        }
    }
}
