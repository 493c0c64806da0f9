//! Converting per vertex bone influences to the byte weights stored in vertex blocks.
//!
//! Vertex bone indices select a slot in the mesh's [BoneIndexSet].
//! Importers supply influences using global bone indices into the model's bone names,
//! so each influence is first translated to a local slot before packing.
use ahash::AHashMap;
use log::warn;
use mdl_lib::layout::BoneIndexSet;

use crate::{Outcome, Warning, error::SkinningError};

/// The maximum number of influences stored for each vertex.
pub const MAX_INFLUENCES: usize = 4;

/// Corrections at most this large come from rounding four weights and are not reported.
const ROUNDING_TOLERANCE: i32 = 2;

/// A single bone influence before packing.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Influence {
    /// The index into the model's bone names.
    pub bone: u32,
    pub weight: f32,
}

impl Influence {
    pub fn new(bone: u32, weight: f32) -> Self {
        Self { bone, weight }
    }
}

/// Packed weights for a single vertex.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct VertexWeights {
    /// Slots in the mesh's [BoneIndexSet].
    pub bone_indices: [u8; MAX_INFLUENCES],
    /// Byte weights that always sum to 255.
    pub weights: [u8; MAX_INFLUENCES],
    /// The value added to the largest weight to make the sum 255.
    pub correction: i32,
}

impl VertexWeights {
    /// The weights as stored in [VertexBuffer](crate::vertex::VertexBuffer).
    pub fn weights_f32(&self) -> [f32; 8] {
        let mut values = [0.0; 8];
        for (value, w) in values.iter_mut().zip(self.weights) {
            *value = w as f32 / 255.0;
        }
        values
    }

    /// The indices as stored in [VertexBuffer](crate::vertex::VertexBuffer).
    pub fn indices_u8(&self) -> [u8; 8] {
        let mut values = [0; 8];
        values[..MAX_INFLUENCES].copy_from_slice(&self.bone_indices);
        values
    }
}

/// The packed weights for all vertices of a mesh.
#[derive(Debug, PartialEq, Clone)]
pub struct MeshWeights {
    pub vertices: Vec<VertexWeights>,
    /// The bone index set the [bone_indices](struct.VertexWeights.html#structfield.bone_indices) refer to.
    pub bone_set_index: usize,
}

/// Bone lookups for a single read or write operation.
pub struct SkinningContext<'a> {
    bone_names: &'a [String],
    bone_sets: &'a [BoneIndexSet],
    name_to_index: AHashMap<&'a str, u32>,
}

impl<'a> SkinningContext<'a> {
    pub fn new(bone_names: &'a [String], bone_sets: &'a [BoneIndexSet]) -> Self {
        let mut name_to_index = AHashMap::new();
        for (i, name) in bone_names.iter().enumerate() {
            name_to_index.entry(name.as_str()).or_insert(i as u32);
        }
        Self {
            bone_names,
            bone_sets,
            name_to_index,
        }
    }

    /// The index into the model's bone names for `name`.
    pub fn global_bone_index(&self, name: &str) -> Option<u32> {
        self.name_to_index.get(name).copied()
    }

    pub fn bone_name(&self, index: u32) -> Option<&str> {
        self.bone_names.get(index as usize).map(|n| n.as_str())
    }

    /// The mapping from global bone index to local slot for a bone index set.
    /// Missing sets produce an empty mapping.
    pub fn local_slots(&self, bone_set_index: usize) -> AHashMap<u32, u8> {
        let mut slots = AHashMap::new();
        if let Some(set) = self.bone_sets.get(bone_set_index) {
            for (slot, bone) in set.used_bones().iter().enumerate() {
                slots.entry(*bone as u32).or_insert(slot as u8);
            }
        }
        slots
    }

    /// Pack the influences for each vertex of a mesh.
    ///
    /// Unknown bones cause the whole mesh to be packed again using `fallback_set_index`,
    /// which is the bone index set of the first mesh.
    /// If bones are still unknown, those influences are dropped and reported as warnings.
    pub fn normalize_mesh(
        &self,
        mesh: usize,
        bone_set_index: usize,
        fallback_set_index: usize,
        influences: &[Vec<Influence>],
    ) -> Outcome<MeshWeights> {
        let slots = self.local_slots(bone_set_index);
        let first_error = match normalize_all(influences, &slots) {
            Ok(vertices) => {
                let warnings = correction_warnings(mesh, &vertices);
                return Outcome::new(
                    MeshWeights {
                        vertices,
                        bone_set_index,
                    },
                    warnings,
                );
            }
            Err(e) => e,
        };

        if fallback_set_index != bone_set_index {
            let fallback_slots = self.local_slots(fallback_set_index);
            if let Ok(vertices) = normalize_all(influences, &fallback_slots) {
                warn!("Mesh {mesh}: {first_error}, using bone index set {fallback_set_index}");
                let mut warnings = vec![Warning::BoneSetFallback {
                    mesh,
                    bone_set_index: fallback_set_index,
                }];
                warnings.extend(correction_warnings(mesh, &vertices));
                return Outcome::new(
                    MeshWeights {
                        vertices,
                        bone_set_index: fallback_set_index,
                    },
                    warnings,
                );
            }
        }

        // Keep the resolvable influences and report every affected vertex.
        let mut vertices = Vec::with_capacity(influences.len());
        let mut unresolved = Vec::new();
        let mut warnings = Vec::new();
        for (vertex, vertex_influences) in influences.iter().enumerate() {
            let resolved: Vec<_> = vertex_influences
                .iter()
                .filter(|i| slots.contains_key(&i.bone))
                .copied()
                .collect();
            // Lookups can't fail after filtering.
            let weights = normalize_weights(vertex, &resolved, &slots).unwrap_or_default();

            if resolved.len() != vertex_influences.len() {
                unresolved.push(vertex);
                warnings.push(Warning::WeightCorrection {
                    mesh,
                    vertex,
                    correction: weights.correction,
                });
            } else if weights.correction.abs() > ROUNDING_TOLERANCE {
                warnings.push(Warning::WeightCorrection {
                    mesh,
                    vertex,
                    correction: weights.correction,
                });
            }
            vertices.push(weights);
        }
        warn!(
            "Mesh {mesh}: {first_error}, dropped unknown influences for {} vertices",
            unresolved.len()
        );
        warnings.insert(
            0,
            Warning::UnresolvedBones {
                mesh,
                vertices: unresolved,
            },
        );

        Outcome::new(
            MeshWeights {
                vertices,
                bone_set_index,
            },
            warnings,
        )
    }
}

fn normalize_all(
    influences: &[Vec<Influence>],
    slots: &AHashMap<u32, u8>,
) -> Result<Vec<VertexWeights>, SkinningError> {
    influences
        .iter()
        .enumerate()
        .map(|(vertex, i)| normalize_weights(vertex, i, slots))
        .collect()
}

fn correction_warnings(mesh: usize, vertices: &[VertexWeights]) -> Vec<Warning> {
    vertices
        .iter()
        .enumerate()
        .filter(|(_, w)| w.correction.abs() > ROUNDING_TOLERANCE)
        .map(|(vertex, w)| Warning::WeightCorrection {
            mesh,
            vertex,
            correction: w.correction,
        })
        .collect()
}

/// Pack influences into exactly [MAX_INFLUENCES] byte weights summing to 255.
///
/// Each weight is rounded to a byte independently and zero byte weights are removed.
/// The smallest weights are removed until at most [MAX_INFLUENCES] remain.
/// Any remaining difference from 255 is added to the largest weight.
pub fn normalize_weights(
    vertex: usize,
    influences: &[Influence],
    slots: &AHashMap<u32, u8>,
) -> Result<VertexWeights, SkinningError> {
    let mut entries = Vec::with_capacity(influences.len().max(MAX_INFLUENCES));
    for influence in influences {
        let slot = slots
            .get(&influence.bone)
            .copied()
            .ok_or(SkinningError::UnknownBoneReference {
                vertex,
                bone: influence.bone,
            })?;

        let weight = (influence.weight.clamp(0.0, 1.0) * 255.0).round() as i32;
        if weight > 0 {
            entries.push((slot, weight));
        }
    }

    while entries.len() < MAX_INFLUENCES {
        entries.push((0, 0));
    }

    while entries.len() > MAX_INFLUENCES {
        let mut smallest = 0;
        for (i, (_, weight)) in entries.iter().enumerate() {
            if *weight < entries[smallest].1 {
                smallest = i;
            }
        }
        entries.remove(smallest);
    }

    let sum: i32 = entries.iter().map(|(_, w)| w).sum();
    let correction = 255 - sum;
    if correction != 0 {
        let mut largest = 0;
        for (i, (_, weight)) in entries.iter().enumerate() {
            if *weight > entries[largest].1 {
                largest = i;
            }
        }
        entries[largest].1 += correction;
    }

    let mut weights = VertexWeights {
        correction,
        ..Default::default()
    };
    for (i, (slot, weight)) in entries.into_iter().enumerate() {
        weights.bone_indices[i] = slot;
        weights.weights[i] = weight.clamp(0, 255) as u8;
    }
    Ok(weights)
}
