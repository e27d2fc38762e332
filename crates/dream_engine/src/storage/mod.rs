//! Project directory layout and document persistence
//!
//! A project lives in one directory:
//!
//! ```text
//! <root>/<project uuid>.json
//! <root>/assets/<asset type>/<asset uuid>/<format>
//! ```
//!
//! Asset files are named after their format, so a PNG texture lives at
//! `assets/texture/<uuid>/png`. Shaders keep their stage sources side by
//! side in the asset directory.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::definition::{AssetDefinition, DefinitionError, ProjectDefinition};
use crate::foundation::uuid::Uuid;

/// Directory under the project root holding asset data
pub const ASSET_DIRECTORY: &str = "assets";

/// Extension of project documents
pub const PROJECT_EXTENSION: &str = "json";

/// Errors reading or writing a project directory
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Project document is not valid JSON
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// Document path
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// Project document parsed but is not a valid project
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Resolves asset and project paths beneath a project root.
///
/// Path resolution is a pure function of the root, asset type, asset UUID
/// and format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirectory {
    root: PathBuf,
}

impl ProjectDirectory {
    /// Wrap a project root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/assets/<type>/<uuid>`
    pub fn asset_directory_path(&self, definition: &AssetDefinition) -> PathBuf {
        self.root
            .join(ASSET_DIRECTORY)
            .join(definition.asset_type().as_str())
            .join(definition.uuid().as_str())
    }

    /// `<root>/assets/<type>/<uuid>/<format>`
    pub fn asset_absolute_path(&self, definition: &AssetDefinition, format: &str) -> PathBuf {
        self.asset_directory_path(definition).join(format)
    }

    /// `<root>/<uuid>.json`
    pub fn project_file_path(&self, project_uuid: &Uuid) -> PathBuf {
        self.root
            .join(format!("{project_uuid}.{PROJECT_EXTENSION}"))
    }

    /// Read and parse the project document
    pub fn load_project(&self, project_uuid: &Uuid) -> Result<ProjectDefinition, StorageError> {
        let path = self.project_file_path(project_uuid);
        log::info!("Loading project from {}", path.display());

        let contents = fs::read_to_string(&path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        let json = serde_json::from_str(&contents).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        Ok(ProjectDefinition::from_json(json)?)
    }

    /// Write the project document
    pub fn save_project(&self, project: &ProjectDefinition) -> Result<PathBuf, StorageError> {
        let path = self.project_file_path(&project.uuid());
        let contents = serde_json::to_string_pretty(&project.to_json()).map_err(|source| {
            StorageError::Json {
                path: path.clone(),
                source,
            }
        })?;
        fs::create_dir_all(&self.root).map_err(|source| StorageError::Io {
            path: self.root.clone(),
            source,
        })?;
        fs::write(&path, contents).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        log::info!("Saved project to {}", path.display());
        Ok(path)
    }

    /// Write asset data, creating its directory
    pub fn write_asset_data(&self, definition: &AssetDefinition, format: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
        let directory = self.asset_directory_path(definition);
        fs::create_dir_all(&directory).map_err(|source| StorageError::Io {
            path: directory.clone(),
            source,
        })?;
        let path = directory.join(format);
        fs::write(&path, data).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Delete an asset's directory and everything in it
    pub fn remove_asset_data(&self, definition: &AssetDefinition) -> Result<bool, StorageError> {
        let directory = self.asset_directory_path(definition);
        if !directory.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&directory).map_err(|source| StorageError::Io {
            path: directory,
            source,
        })?;
        Ok(true)
    }
}
