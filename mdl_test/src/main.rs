use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use clap::Parser;
use log::{error, info};
use mdl_lib::container::Container;
use mdl_model::{ModelContainer, Outcome};
use rayon::prelude::*;

#[derive(Parser)]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// The game dump root folder.
    root_folder: String,

    /// The glob pattern for model containers relative to the root folder.
    #[arg(long, default_value = "**/*.mdl")]
    pattern: String,

    /// Log decoding warnings and files that round trip successfully.
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Ignore most logs to avoid flooding the console.
    let level = if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .unwrap();

    let start = std::time::Instant::now();

    let paths: Vec<_> =
        globwalk::GlobWalkerBuilder::from_patterns(&cli.root_folder, &[&cli.pattern])
            .build()
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .collect();

    let failures = AtomicUsize::new(0);
    paths.par_iter().for_each(|path| {
        let mismatches = check_model(path);
        if mismatches.is_empty() {
            info!("{path:?}: ok");
        } else {
            failures.fetch_add(1, Ordering::Relaxed);
            for mismatch in mismatches {
                error!("{path:?}: {mismatch}");
            }
        }
    });

    println!(
        "Checked {} files with {} failures in {:?}",
        paths.len(),
        failures.load(Ordering::Relaxed),
        start.elapsed()
    );
}

/// Read, write and read the model again and describe any differences.
fn check_model(path: &Path) -> Vec<String> {
    let container = match Container::from_file(path) {
        Ok(container) => container,
        Err(e) => return vec![format!("error reading container: {e}")],
    };
    let sections = match container.decompress_sections() {
        Ok(sections) => sections,
        Err(e) => return vec![format!("error decompressing sections: {e}")],
    };

    let model = match ModelContainer::from_sections(&sections, container.info()) {
        Ok(Outcome::Clean(model)) => model,
        Ok(Outcome::WithWarnings(model, warnings)) => {
            for warning in warnings {
                info!("{path:?}: {warning}");
            }
            model
        }
        Err(e) => return vec![format!("error reading model: {e}")],
    };

    let new_container = match model.to_container() {
        Ok(container) => container,
        Err(e) => return vec![format!("error writing model: {e}")],
    };
    let new_sections = match new_container
        .to_bytes()
        .map_err(|e| e.to_string())
        .and_then(|bytes| Container::from_bytes(bytes).map_err(|e| e.to_string()))
        .and_then(|c| c.decompress_sections().map_err(|e| e.to_string()))
    {
        Ok(sections) => sections,
        Err(e) => return vec![format!("error reading written container: {e}")],
    };

    let new_model = match ModelContainer::from_sections(&new_sections, new_container.info()) {
        Ok(outcome) => outcome.into_value(),
        Err(e) => return vec![format!("error reading written model: {e}")],
    };

    let mut mismatches = compare_models(&model, &new_model);
    for lod in 0..sections.index_buffers.len() {
        if sections.index_buffers[lod] != new_sections.index_buffers[lod] {
            mismatches.push(format!("lod {lod} index buffer bytes differ"));
        }
    }
    if container.info() != new_container.info() {
        mismatches.push("container info differs".to_string());
    }
    mismatches
}

fn compare_models(model: &ModelContainer, new_model: &ModelContainer) -> Vec<String> {
    let mut mismatches = Vec::new();
    let mut check = |equal: bool, name: &str| {
        if !equal {
            mismatches.push(format!("{name} differ"));
        }
    };

    check(model.paths == new_model.paths, "paths");
    check(model.header.unk1 == new_model.header.unk1, "header unk1");
    check(model.header.unk2 == new_model.header.unk2, "header unk2");
    check(model.bone_data == new_model.bone_data, "bone data");
    check(model.bone_sets == new_model.bone_sets, "bone index sets");
    check(model.hider == new_model.hider, "hider tables");
    check(
        model.bone_index_parts == new_model.bone_index_parts,
        "bone index parts",
    );
    check(model.padding == new_model.padding, "padding");
    check(model.bounding_boxes == new_model.bounding_boxes, "bounding boxes");
    check(model.bone_transforms == new_model.bone_transforms, "bone transforms");

    for (lod, (level, new_level)) in model.lods.iter().zip(&new_model.lods).enumerate() {
        check(level.unk == new_level.unk, &format!("lod {lod} unk"));
        check(
            level.buffers.index_data_offset == new_level.buffers.index_data_offset
                || level.buffers.index_data_size == 0,
            &format!("lod {lod} index data offsets"),
        );
        if level.meshes.len() != new_level.meshes.len() {
            check(false, &format!("lod {lod} mesh counts"));
            continue;
        }

        for (i, (mesh, new_mesh)) in level.meshes.iter().zip(&new_level.meshes).enumerate() {
            let name = format!("lod {lod} mesh {i}");
            check(mesh.vertices == new_mesh.vertices, &format!("{name} vertices"));
            check(mesh.indices == new_mesh.indices, &format!("{name} indices"));
            check(mesh.parts == new_mesh.parts, &format!("{name} parts"));
            check(
                mesh.index_data_offset == new_mesh.index_data_offset,
                &format!("{name} index data offsets"),
            );
            check(mesh.hides == new_mesh.hides, &format!("{name} hides"));
            check(
                mesh.material_index == new_mesh.material_index
                    && mesh.bone_set_index == new_mesh.bone_set_index,
                &format!("{name} material or bone index set"),
            );
        }
    }

    mismatches
}
