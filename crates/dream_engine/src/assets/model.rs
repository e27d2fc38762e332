//! Model runtimes
//!
//! Imports model geometry, binds each mesh to the material the model
//! definition maps its material name to, and uploads the mesh buffers.

use std::sync::{Arc, Mutex, PoisonError};

use super::obj::{ImportedMesh, ModelImporter, ObjLoader};
use super::{AssetRuntime, ConstructionError, LoadContext, MaterialRuntime, RuntimeState, SharedAssetRuntime};
use crate::backend::{GraphicsBackend, MeshData, MeshId};
use crate::definition::{AssetDefinition, AssetType, ModelDefinition};
use crate::foundation::math::Vec3;
use crate::scene::bounds::AABB;

/// Importer for a model format, `None` when the format is unsupported
pub fn importer_for(format: &str) -> Option<Box<dyn ModelImporter>> {
    match format.to_ascii_lowercase().as_str() {
        "obj" => Some(Box::new(ObjLoader)),
        _ => None,
    }
}

/// One mesh of a loaded model
pub struct ModelMesh {
    /// Imported geometry
    pub data: ImportedMesh,
    /// Local space bounds
    pub bounds: AABB,
    /// Material bound through the model's material map
    pub material: Option<Arc<MaterialRuntime>>,
}

struct NativeMeshes {
    graphics: Arc<dyn GraphicsBackend>,
    ids: Vec<MeshId>,
}

/// Imported, material-bound and uploaded geometry
pub struct ModelRuntime {
    definition: Arc<AssetDefinition>,
    state: RuntimeState,
    meshes: Vec<ModelMesh>,
    bounds: Option<AABB>,
    native: Mutex<Option<NativeMeshes>>,
}

impl ModelRuntime {
    /// Meshes in file order
    pub fn meshes(&self) -> &[ModelMesh] {
        &self.meshes
    }

    /// Local space bounds of every mesh together
    pub const fn bounding_box(&self) -> Option<AABB> {
        self.bounds
    }

    /// Uploaded mesh handles, parallel to [`ModelRuntime::meshes`]
    pub fn mesh_ids(&self) -> Vec<MeshId> {
        self.native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|n| n.ids.clone())
            .unwrap_or_default()
    }

    /// Every triangle of every mesh, for collision shapes
    pub fn triangles(&self) -> Vec<[Vec3; 3]> {
        self.meshes
            .iter()
            .flat_map(|m| m.data.triangles())
            .map(|tri| tri.map(Vec3::from))
            .collect()
    }

    fn import(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let format = self.definition.format();
        let importer = importer_for(&format).ok_or_else(|| ConstructionError::UnsupportedFormat {
            owner: self.definition.describe(),
            format: format.clone(),
        })?;

        let path = ctx.directory.asset_absolute_path(&self.definition, &format);
        let mut file = std::fs::File::open(&path).map_err(|e| ConstructionError::io(&path, e))?;
        let imported = importer.import(&mut file).map_err(|e| ConstructionError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        self.meshes = imported
            .into_iter()
            .map(|data| {
                let bounds = AABB::from_points(data.vertices.iter().map(|v| Vec3::from(v.position)))
                    .unwrap_or_else(|| AABB::new(Vec3::zeros(), Vec3::zeros()));
                ModelMesh { data, bounds, material: None }
            })
            .collect();
        self.bounds = self
            .meshes
            .iter()
            .map(|m| m.bounds)
            .reduce(|a, b| a.merge(&b));
        log::debug!("Imported {} meshes from {:?}", self.meshes.len(), path);
        Ok(())
    }

    fn bind_materials(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let map: ModelDefinition = self.definition.view()?;
        let owner = self.definition.describe();
        for mesh in &mut self.meshes {
            let Some(uuid) = map.material_for(&mesh.data.material) else {
                log::debug!("{owner}: no material mapped for '{}'", mesh.data.material);
                continue;
            };
            match ctx.resolve(&ctx.caches.materials, &owner, Some(uuid)) {
                Ok(material) => mesh.material = Some(material),
                Err(e) => log::warn!("{owner}: mesh '{}' has no material: {e}", mesh.data.name),
            }
        }
        Ok(())
    }

    fn upload(&self, graphics: &Arc<dyn GraphicsBackend>) -> Result<(), ConstructionError> {
        let mut ids = Vec::with_capacity(self.meshes.len());
        for mesh in &self.meshes {
            let data = MeshData {
                vertices: &mesh.data.vertices,
                indices: &mesh.data.indices,
            };
            match graphics.create_mesh(&data) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids {
                        graphics.delete_mesh(id);
                    }
                    return Err(e.into());
                }
            }
        }
        *self.native.lock().unwrap_or_else(PoisonError::into_inner) = Some(NativeMeshes {
            graphics: Arc::clone(graphics),
            ids,
        });
        Ok(())
    }
}

impl AssetRuntime for ModelRuntime {
    fn definition(&self) -> &Arc<AssetDefinition> {
        &self.definition
    }

    fn state(&self) -> RuntimeState {
        self.state
    }
}

impl SharedAssetRuntime for ModelRuntime {
    const ASSET_TYPE: AssetType = AssetType::Model;

    fn construct(definition: Arc<AssetDefinition>) -> Self {
        Self {
            definition,
            state: RuntimeState::Constructed,
            meshes: Vec::new(),
            bounds: None,
            native: Mutex::new(None),
        }
    }

    fn decode(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let result = self.import(ctx);
        if result.is_err() {
            self.state = RuntimeState::Error;
        }
        result
    }

    fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let result = self
            .bind_materials(ctx)
            .and_then(|()| self.upload(ctx.graphics));
        self.state = if result.is_ok() { RuntimeState::Loaded } else { RuntimeState::Error };
        result
    }

    fn release(&self) {
        if let Some(native) = self.native.lock().unwrap_or_else(PoisonError::into_inner).take() {
            for id in native.ids {
                native.graphics.delete_mesh(id);
            }
        }
    }
}

impl Drop for ModelRuntime {
    fn drop(&mut self) {
        self.release();
    }
}
