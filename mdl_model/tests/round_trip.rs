use approx::assert_relative_eq;
use glam::{Vec3, vec2, vec3};
use mdl_lib::{
    container::{ContainerInfo, SectionKind},
    error::ReadContainerError,
    layout::{
        BoneIndexSet, BoneTransform, HiderDataEntry, HiderDataInfo, MeshHiderInfo, ModelData,
        PathTable,
    },
    vertex::{DataType, VertexDeclaration, VertexElement, VertexUsage, read_declarations},
};
use mdl_model::{
    ImportedMesh, LevelOfDetail, MeshEntry, MeshPart, MeshVertices, ModelContainer, Outcome,
    Warning,
    error::{ImportError, LoadModelError},
    hider::HiderTables,
    skinning::Influence,
    vertex::VertexBuffer,
};
use pretty_assertions::assert_eq;

fn element(block: u8, offset: u8, data_type: DataType, usage: VertexUsage) -> VertexElement {
    VertexElement {
        block,
        offset,
        data_type,
        usage,
        usage_index: 0,
    }
}

fn float_declaration() -> (VertexDeclaration, [u8; 3]) {
    let declaration = VertexDeclaration {
        elements: vec![
            element(0, 0, DataType::Float3, VertexUsage::Position),
            element(0, 12, DataType::UByte4Normalized, VertexUsage::BoneWeight),
            element(0, 16, DataType::UByte4, VertexUsage::BoneIndex),
            element(1, 0, DataType::Float3, VertexUsage::Normal),
            element(1, 12, DataType::Float4, VertexUsage::TextureCoordinate),
            element(1, 28, DataType::UByte4, VertexUsage::Color),
        ],
    };
    (declaration, [20, 32, 0])
}

fn half_declaration() -> (VertexDeclaration, [u8; 3]) {
    let declaration = VertexDeclaration {
        elements: vec![
            element(0, 0, DataType::Float3, VertexUsage::Position),
            element(0, 12, DataType::UByte4Normalized, VertexUsage::BoneWeight),
            element(0, 16, DataType::UByte4, VertexUsage::BoneIndex),
            element(1, 0, DataType::Half4, VertexUsage::Normal),
            element(1, 8, DataType::Half4, VertexUsage::TextureCoordinate),
            element(1, 16, DataType::UByte4, VertexUsage::Color),
        ],
    };
    (declaration, [20, 20, 0])
}

fn vertex_buffer() -> VertexBuffer {
    let mut buffer = VertexBuffer::with_len(5);
    buffer.positions = vec![
        vec3(0.0, 0.0, 0.0),
        vec3(1.0, 0.0, 0.0),
        vec3(0.0, 1.0, 0.0),
        vec3(1.0, 1.0, 0.0),
        vec3(0.5, 0.5, 1.0),
    ];
    buffer.normals = vec![Vec3::Z; 5];
    buffer.uv0 = vec![
        vec2(0.0, 0.0),
        vec2(1.0, 0.0),
        vec2(0.0, 1.0),
        vec2(1.0, 1.0),
        vec2(0.5, 0.5),
    ];
    buffer.colors = vec![[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [255; 4], [0; 4]];
    buffer.bone_weights = vec![[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]; 5];
    buffer.bone_indices = vec![[1, 0, 0, 0, 0, 0, 0, 0]; 5];
    buffer
}

fn mesh(declaration: VertexDeclaration, strides: [u8; 3]) -> MeshEntry {
    MeshEntry {
        material_index: 0,
        bone_set_index: 0,
        declaration,
        strides,
        block_count: 2,
        vertices: MeshVertices::Decoded(vertex_buffer()),
        indices: vec![0, 1, 2, 2, 1, 3],
        parts: vec![MeshPart {
            index_offset: 0,
            index_count: 6,
            attribute_index: 0,
            bone_start_offset: 0,
            bone_count: 2,
        }],
        index_data_offset: 0,
        hides: Vec::new(),
        hidden_vertices: Vec::new(),
    }
}

/// A skinned model with one mesh in the first two levels of detail.
/// Index position 4 of the first mesh can be hidden using vertex 4.
fn model(declaration: VertexDeclaration, strides: [u8; 3]) -> ModelContainer {
    let paths = PathTable {
        attributes: vec!["atr_a".to_string()],
        bones: vec!["n_root".to_string(), "j_arm".to_string()],
        materials: vec!["/mt_a.mtrl".to_string()],
        extra: vec!["shp_hide".to_string()],
        padding: Vec::new(),
    };
    let name_offset = paths.offset_of("shp_hide").unwrap();

    let mut bone_set = BoneIndexSet::default();
    bone_set.bones[..2].copy_from_slice(&[0, 1]);
    bone_set.count = 2;

    ModelContainer {
        info: ContainerInfo {
            mesh_count: 2,
            material_count: 1,
            lod_count: 2,
            flags: [1, 0, 0],
        },
        paths,
        lods: [
            LevelOfDetail {
                meshes: vec![mesh(declaration.clone(), strides)],
                ..Default::default()
            },
            LevelOfDetail {
                meshes: vec![mesh(declaration, strides)],
                ..Default::default()
            },
            LevelOfDetail::default(),
        ],
        bone_data: vec![[1, 2, 3, 4], [5, 6, 7, 8]],
        bone_sets: vec![bone_set],
        hider: HiderTables {
            infos: vec![MeshHiderInfo {
                name_offset,
                data_info_indices: [0, 1, 1],
                data_info_counts: [1, 0, 0],
            }],
            data_infos: vec![HiderDataInfo {
                index_data_offset: 0,
                entry_count: 1,
                entry_offset: 0,
            }],
            entries: vec![HiderDataEntry {
                reference_index_offset: 4,
                hide_index: 4,
            }],
        },
        bone_transforms: vec![BoneTransform::default(); 2],
        ..Default::default()
    }
}

fn read(bytes: &[u8]) -> ModelContainer {
    match ModelContainer::from_bytes(bytes).unwrap() {
        Outcome::Clean(model) => model,
        Outcome::WithWarnings(_, warnings) => panic!("unexpected warnings: {warnings:?}"),
    }
}

#[test]
fn round_trip_float_model() {
    let model = model(float_declaration().0, float_declaration().1);
    let bytes = model.to_bytes().unwrap();
    let first = read(&bytes);

    let mesh = &first.lods[0].meshes[0];
    assert_eq!(Some(&vertex_buffer()), mesh.vertex_buffer());
    assert_eq!(vec![0, 1, 2, 2, 1, 3], mesh.indices);
    assert_eq!(model.lods[0].meshes[0].parts, mesh.parts);
    assert_eq!(float_declaration().0, mesh.declaration);
    assert_eq!(Some(&4), mesh.hider_map().get(&4));
    assert_eq!(1, mesh.hidden_vertices.len());
    assert_eq!(vec3(0.5, 0.5, 1.0), mesh.hidden_vertices[0].vertex.position);
    assert!(first.lods[1].meshes[0].hides.is_empty());
    assert!(first.lods[2].meshes.is_empty());

    assert_eq!(model.paths, first.paths);
    assert_eq!(model.bone_data, first.bone_data);
    assert_eq!(model.hider, first.hider);
    assert_eq!(model.info, first.info);

    // Writing the read model again is stable.
    let bytes2 = first.to_bytes().unwrap();
    assert_eq!(bytes, bytes2);
    assert_eq!(first, read(&bytes2));
}

#[test]
fn last_part_covers_index_padding() {
    let mut model = model(float_declaration().0, float_declaration().1);
    for level in &mut model.lods {
        for mesh in &mut level.meshes {
            mesh.parts[0].index_count = 8;
        }
    }

    let bytes = model.to_bytes().unwrap();
    let read_model = read(&bytes);
    let mesh = &read_model.lods[0].meshes[0];
    assert_eq!(8, mesh.parts[0].index_count);
    assert_eq!(6, mesh.indices.len());
    assert_eq!(bytes, read_model.to_bytes().unwrap());

    // Only the padding of the mesh itself can be covered.
    model.lods[0].meshes[0].parts[0].index_count = 9;
    assert!(matches!(
        ModelContainer::from_bytes(&model.to_bytes().unwrap()),
        Err(LoadModelError::MeshPartOutOfRange { mesh: 0, part: 0 })
    ));
}

#[test]
fn recalculated_offsets_match_sections() {
    let model = model(float_declaration().0, float_declaration().1);
    let (sections, info) = model.to_sections().unwrap();
    assert_eq!(2, info.mesh_count);

    // 5 vertices with strides 20 and 32.
    assert_eq!(260, sections.vertex_buffers[0].len());
    // 6 indices padded to 8.
    assert_eq!(16, sections.index_buffers[0].len());
    assert_eq!(vec![0u8; 4], sections.index_buffers[0][12..16].to_vec());
    assert!(sections.vertex_buffers[2].is_empty());

    let data = ModelData::read(&sections.model_data).unwrap();
    for lod in 0..3 {
        let header = &data.lods[lod];
        assert_eq!(
            sections.logical_offset(SectionKind::VertexBuffer(lod)),
            header.vertex_data_offset as u64
        );
        assert_eq!(
            sections.logical_offset(SectionKind::IndexBuffer(lod)),
            header.index_data_offset as u64
        );
        assert_eq!(sections.vertex_buffers[lod].len(), header.vertex_data_size as usize);
        assert_eq!(sections.index_buffers[lod].len(), header.index_data_size as usize);
    }
    assert_eq!((0, 1), (data.lods[0].mesh_index, data.lods[0].mesh_count));
    assert_eq!((1, 1), (data.lods[1].mesh_index, data.lods[1].mesh_count));
    assert_eq!((2, 0), (data.lods[2].mesh_index, data.lods[2].mesh_count));

    assert_eq!([0, 100, 0], data.meshes[0].vertex_data_offsets);
    assert_eq!(1, data.meshes[1].part_index);
    assert_eq!(2, data.header.mesh_count);
    assert_eq!(2, data.header.mesh_part_count);
    assert_eq!(1, data.header.hider_data_entry_count);

    let declarations = read_declarations(&sections.vertex_info, 2).unwrap();
    assert_eq!(float_declaration().0, declarations[1]);
}

#[test]
fn normals_and_uvs_written_as_floats() {
    let model = model(half_declaration().0, half_declaration().1);
    let read_model = read(&model.to_bytes().unwrap());

    let mesh = &read_model.lods[0].meshes[0];
    assert_eq!([20, 32, 0], mesh.strides);
    let normal = mesh.declaration.element(VertexUsage::Normal).unwrap();
    assert_eq!((DataType::Float3, 0), (normal.data_type, normal.offset));
    let uv = mesh.declaration.element(VertexUsage::TextureCoordinate).unwrap();
    assert_eq!((DataType::Float4, 12), (uv.data_type, uv.offset));
    let color = mesh.declaration.element(VertexUsage::Color).unwrap();
    assert_eq!(28, color.offset);

    let expected = vertex_buffer();
    let buffer = mesh.vertex_buffer().unwrap();
    for (expected, actual) in expected.normals.iter().zip(&buffer.normals) {
        assert_relative_eq!(expected.x, actual.x, epsilon = 0.001);
        assert_relative_eq!(expected.y, actual.y, epsilon = 0.001);
        assert_relative_eq!(expected.z, actual.z, epsilon = 0.001);
    }
    for (expected, actual) in expected.uv0.iter().zip(&buffer.uv0) {
        assert_relative_eq!(expected.x, actual.x, epsilon = 0.001);
        assert_relative_eq!(expected.y, actual.y, epsilon = 0.001);
    }
    assert_eq!(expected.positions, buffer.positions);
    assert_eq!(expected.colors, buffer.colors);
}

#[test]
fn replace_geometry_single_bone() {
    // Reading records the attributes of the alternate vertex.
    let mut model = read(&model(float_declaration().0, float_declaration().1).to_bytes().unwrap());

    let imported = ImportedMesh {
        positions: vec![
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 1.0, 0.0),
            vec3(2.0, 1.0, 0.0),
        ],
        normals: vec![Vec3::Z; 5],
        uv0: vec![vec2(0.0, 0.0); 5],
        influences: vec![vec![Influence::new(0, 1.0)]; 5],
        indices: vec![0, 1, 2, 2, 1, 3, 3, 1, 4],
        part_index_counts: vec![9],
        ..Default::default()
    };
    let outcome = model.replace_mesh_geometry(0, 0, imported).unwrap();
    assert!(matches!(outcome, Outcome::Clean(())));

    let mesh = &model.lods[0].meshes[0];
    let buffer = mesh.vertex_buffer().unwrap();
    // The alternate vertex is appended after the imported vertices.
    assert_eq!(6, buffer.len());
    assert_eq!(vec3(0.5, 0.5, 1.0), buffer.positions[5]);
    assert_eq!(Some(&5), mesh.hider_map().get(&4));
    assert_eq!(5, model.hider.entries[0].hide_index);
    for i in 0..5 {
        assert_eq!([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], buffer.bone_weights[i]);
        assert_eq!([0; 8], buffer.bone_indices[i]);
    }
    // The last part covers the zero indices aligning the next mesh.
    assert_eq!(0, mesh.parts[0].index_offset);
    assert_eq!(16, mesh.parts[0].index_count);
    assert_eq!(9, mesh.indices.len());

    let read_model = read(&model.to_bytes().unwrap());
    let mesh = &read_model.lods[0].meshes[0];
    assert_eq!(6, mesh.vertex_count());
    assert_eq!(vec![0, 1, 2, 2, 1, 3, 3, 1, 4], mesh.indices);
    assert_eq!(16, mesh.parts[0].index_count);
    assert_eq!(Some(&5), mesh.hider_map().get(&4));

    // The second level of detail moved after the longer index buffer.
    let lod1 = &read_model.lods[1].meshes[0];
    assert_eq!(Some(&vertex_buffer()), lod1.vertex_buffer());
}

#[test]
fn replace_geometry_drops_hider_entries() {
    let mut model = read(&model(float_declaration().0, float_declaration().1).to_bytes().unwrap());

    let imported = ImportedMesh {
        positions: vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)],
        normals: vec![Vec3::Z; 3],
        uv0: vec![vec2(0.0, 0.0); 3],
        influences: vec![vec![Influence::new(1, 1.0)]; 3],
        indices: vec![0, 1, 2],
        part_index_counts: vec![3],
        ..Default::default()
    };
    let (_, warnings) = model
        .replace_mesh_geometry(0, 0, imported)
        .unwrap()
        .into_parts();
    assert!(matches!(
        warnings.as_slice(),
        [Warning::HiderEntryDropped {
            lod: 0,
            mesh: 0,
            entry: 0
        }]
    ));
    assert!(model.hider.entries.is_empty());
    assert_eq!(0, model.hider.data_infos[0].entry_count);
    assert!(model.lods[0].meshes[0].hides.is_empty());

    let read_model = read(&model.to_bytes().unwrap());
    let buffer = read_model.lods[0].meshes[0].vertex_buffer().unwrap();
    assert_eq!([1, 0, 0, 0, 0, 0, 0, 0], buffer.bone_indices[0]);
}

#[test]
fn replace_geometry_unknown_bone() {
    let mut model = model(float_declaration().0, float_declaration().1);

    let imported = ImportedMesh {
        positions: vec![Vec3::ZERO; 3],
        normals: vec![Vec3::Z; 3],
        uv0: vec![vec2(0.0, 0.0); 3],
        influences: vec![
            vec![Influence::new(0, 1.0)],
            vec![Influence::new(0, 0.5), Influence::new(7, 0.5)],
            vec![Influence::new(1, 1.0)],
        ],
        indices: vec![0, 1, 2, 2, 1, 0],
        part_index_counts: vec![6],
        ..Default::default()
    };
    let (_, warnings) = model
        .replace_mesh_geometry(0, 0, imported)
        .unwrap()
        .into_parts();
    assert!(matches!(
        &warnings[0],
        Warning::UnresolvedBones { mesh: 0, vertices } if vertices == &[1]
    ));

    let buffer = model.lods[0].meshes[0].vertex_buffer().unwrap();
    assert_eq!(1.0, buffer.bone_weights[1][0]);
}

#[test]
fn replace_geometry_invalid_mesh() {
    let mut model = model(float_declaration().0, float_declaration().1);
    assert!(matches!(
        model.replace_mesh_geometry(3, 0, ImportedMesh::default()),
        Err(ImportError::LodOutOfRange { lod: 3 })
    ));
    assert!(matches!(
        model.replace_mesh_geometry(2, 0, ImportedMesh::default()),
        Err(ImportError::MeshOutOfRange { lod: 2, mesh: 0 })
    ));
}

#[test]
fn undecoded_mesh_keeps_raw_blocks() {
    let (mut declaration, strides) = float_declaration();
    declaration
        .elements
        .retain(|e| e.usage != VertexUsage::BoneIndex);

    // Encode using a decodable declaration and then remove the bone indices.
    let mut model = model(float_declaration().0, strides);
    let bytes = model.to_bytes().unwrap();
    let (sections, info) = ModelContainer::from_bytes(&bytes)
        .unwrap()
        .into_value()
        .to_sections()
        .unwrap();
    let vertex_bytes = sections.vertex_buffers[0].clone();

    for level in &mut model.lods {
        for mesh in &mut level.meshes {
            mesh.declaration = declaration.clone();
            mesh.vertices = MeshVertices::Raw {
                vertex_count: 5,
                blocks: vec![vertex_bytes[..100].to_vec(), vertex_bytes[100..].to_vec()],
            };
        }
    }
    let bytes = model.to_bytes().unwrap();

    let (read_model, warnings) = ModelContainer::from_bytes(&bytes).unwrap().into_parts();
    assert_eq!(2, warnings.len());
    assert!(matches!(
        &warnings[0],
        Warning::UndecodedMesh { lod: 0, mesh: 0, .. }
    ));
    assert!(read_model.lods[0].meshes[0].vertex_buffer().is_none());
    assert!(read_model.lods[0].meshes[0].hidden_vertices.is_empty());
    assert_eq!(Some(&4), read_model.lods[0].meshes[0].hider_map().get(&4));

    let (new_sections, new_info) = read_model.to_sections().unwrap();
    assert_eq!(vertex_bytes, new_sections.vertex_buffers[0]);
    assert_eq!(info, new_info);

    assert!(matches!(
        model.replace_mesh_geometry(0, 0, ImportedMesh::default()),
        Err(ImportError::UndecodedMesh { lod: 0, mesh: 0 })
    ));
}

#[test]
fn read_truncated_file() {
    let model = model(float_declaration().0, float_declaration().1);
    let bytes = model.to_bytes().unwrap();
    assert!(matches!(
        ModelContainer::from_bytes(&bytes[..bytes.len() - 1]),
        Err(LoadModelError::Container(
            ReadContainerError::TruncatedSection { .. }
        ))
    ));
}

#[test]
fn read_inconsistent_lod_size() {
    let model = model(float_declaration().0, float_declaration().1);
    let (mut sections, info) = model.to_sections().unwrap();
    sections.index_buffers[1].truncate(8);

    let container = mdl_lib::container::Container::from_sections(&sections, info).unwrap();
    assert!(matches!(
        ModelContainer::from_container(&container),
        Err(LoadModelError::HeaderInconsistent { .. })
    ));
}
