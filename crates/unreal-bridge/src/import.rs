//! Geometry-cache import into the editor's content folder
//!
//! Destination comes from the content browser selection. An asset that
//! already exists under the file's name is reimported in place; anything
//! else is imported fresh as a geometry cache.

use crate::editor::{
    AbcConversionSettings, AbcImportSettings, AbcMaterialSettings, AlembicImportType,
    AssetImportTask, EditorHost,
};
use dcc_link_core::{LinkError, MaterialImportMethod, Result};
use std::path::Path;
use tracing::{error, info};

const CONTENT_ROOT: &str = "/Game";

/// Where an import landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { destination: String },
    Reimported { package_name: String, destination: String },
}

/// Map a content-browser path onto the `/Game` root.
///
/// Returns `None` for an empty path and for the content root itself, which
/// is not a usable destination.
pub fn normalize_content_path(raw: &str) -> Option<String> {
    let path = raw.strip_prefix("/All").unwrap_or(raw);
    if path.is_empty() {
        return None;
    }

    let path = if path.starts_with("/Game/") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", CONTENT_ROOT, path)
    } else {
        format!("{}/{}", CONTENT_ROOT, path)
    };
    let path = path.trim_end_matches('/');

    if path == "/Game/Game" || path == CONTENT_ROOT {
        error!("Detected default path '/Game/Game'. Please select a specific folder in Content Browser.");
        return None;
    }
    Some(path.to_string())
}

/// Destination folder from the content browser: path view first, then the
/// asset view's selected folders.
pub fn destination_folder<E: EditorHost>(editor: &mut E) -> Result<String> {
    let selected = editor
        .selected_path_view_folders()
        .into_iter()
        .next()
        .or_else(|| editor.selected_folder_paths().into_iter().next());

    let Some(raw) = selected else {
        return Err(LinkError::Import(
            "No folder selected in Content Browser. Please select a destination folder first.".into(),
        ));
    };

    let folder = normalize_content_path(&raw).ok_or_else(|| {
        LinkError::Import(format!(
            "'{}' is not a usable destination. Please select a specific folder in Content Browser.",
            raw
        ))
    })?;
    info!("Selected path (cleaned): {}", folder);
    Ok(folder)
}

/// Import options shared by fresh imports and reimports
pub fn import_settings(
    import_type: Option<AlembicImportType>,
    material_import_method: MaterialImportMethod,
) -> AbcImportSettings {
    AbcImportSettings {
        import_type,
        velocities_as_motion_vectors: true,
        conversion: AbcConversionSettings::default(),
        materials: AbcMaterialSettings::from(material_import_method),
    }
}

/// Import `file_path` into the selected content folder
pub fn import_alembic<E: EditorHost>(
    editor: &mut E,
    file_path: &Path,
    material_import_method: MaterialImportMethod,
) -> Result<ImportOutcome> {
    if !editor.file_exists(file_path) {
        return Err(LinkError::Import(format!(
            "Alembic file not found: {}",
            file_path.display()
        )));
    }

    let asset_name = file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            LinkError::Import(format!("Cannot derive asset name from {}", file_path.display()))
        })?;

    let folder = destination_folder(editor)?;
    let asset_path = format!("{}/{}", folder, asset_name);
    info!("Looking for asset at: {}", asset_path);

    let (task, outcome) = match editor.find_asset(&asset_path) {
        Some(existing) => {
            info!("Asset already exists at {}. Reimporting...", asset_path);
            let task = AssetImportTask {
                filename: file_path.to_path_buf(),
                destination_path: existing.package_path.clone(),
                replace_existing: true,
                automated: true,
                save: true,
                options: import_settings(None, material_import_method),
            };
            let outcome = ImportOutcome::Reimported {
                package_name: existing.package_name,
                destination: existing.package_path,
            };
            (task, outcome)
        }
        None => {
            info!("Importing new Alembic asset to {}", folder);
            let task = AssetImportTask {
                filename: file_path.to_path_buf(),
                destination_path: folder.clone(),
                replace_existing: true,
                automated: true,
                save: true,
                options: import_settings(
                    Some(AlembicImportType::GeometryCache),
                    material_import_method,
                ),
            };
            (task, ImportOutcome::Imported { destination: folder })
        }
    };

    info!("Executing Alembic import task...");
    editor.import_asset_tasks(vec![task])?;

    match &outcome {
        ImportOutcome::Imported { destination } => {
            info!("Successfully imported Alembic to {}", destination)
        }
        ImportOutcome::Reimported { package_name, .. } => {
            info!("Successfully reimported Alembic into {}", package_name)
        }
    }
    Ok(outcome)
}
