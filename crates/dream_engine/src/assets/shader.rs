//! Shader runtimes
//!
//! A shader definition points at a vertex and a fragment source file in its
//! asset directory. Both stages are compiled and linked on the context
//! thread; the stage objects are deleted once the program is linked.
//!
//! A recompile reads both files again, so edited sources are picked up.
//! When the new sources do not build, the previous program stays in use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{AssetRuntime, ConstructionError, LoadContext, RuntimeState, SharedAssetRuntime};
use crate::backend::{BackendError, GraphicsBackend, ProgramId, ShaderStage};
use crate::definition::{AssetDefinition, AssetType, ShaderDefinition};
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::foundation::uuid::Uuid;

/// Value held by a named uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Scalar integer
    Int(i32),
    /// Scalar float
    Float(f32),
    /// 3 component vector
    Vec3(Vec3),
    /// 4 component vector
    Vec4(Vec4),
    /// 4x4 matrix
    Mat4(Mat4),
}

#[derive(Debug, Default)]
struct ShaderBindings {
    uniforms: BTreeMap<String, UniformValue>,
    // Material UUID and the number of live runtimes registered under it
    materials: Vec<(Uuid, usize)>,
    needs_rebind: bool,
    recompile: bool,
}

#[derive(Debug, Default)]
struct ShaderSources {
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    vertex: String,
    fragment: String,
}

struct NativeProgram {
    graphics: Arc<dyn GraphicsBackend>,
    id: ProgramId,
}

/// Compiled and linked shader program
pub struct ShaderRuntime {
    definition: Arc<AssetDefinition>,
    state: RuntimeState,
    sources: Mutex<ShaderSources>,
    bindings: Mutex<ShaderBindings>,
    native: Mutex<Option<NativeProgram>>,
}

impl ShaderRuntime {
    fn bindings(&self) -> MutexGuard<'_, ShaderBindings> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sources(&self) -> MutexGuard<'_, ShaderSources> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Linked program, once loaded
    pub fn program_id(&self) -> Option<ProgramId> {
        self.native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|n| n.id)
    }

    /// Vertex stage source the current program was built from
    pub fn vertex_source(&self) -> String {
        self.sources().vertex.clone()
    }

    /// Fragment stage source the current program was built from
    pub fn fragment_source(&self) -> String {
        self.sources().fragment.clone()
    }

    /// Set a uniform value, marking the program for rebinding when it changes
    pub fn set_uniform(&self, name: &str, value: UniformValue) {
        let mut bindings = self.bindings();
        if bindings.uniforms.get(name) != Some(&value) {
            bindings.uniforms.insert(name.to_string(), value);
            bindings.needs_rebind = true;
        }
    }

    /// Current value of a uniform
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.bindings().uniforms.get(name).cloned()
    }

    /// Whether uniforms changed since the last [`ShaderRuntime::take_rebind`]
    pub fn needs_rebind(&self) -> bool {
        self.bindings().needs_rebind
    }

    /// Clear the rebind flag, returning its previous value
    pub fn take_rebind(&self) -> bool {
        std::mem::take(&mut self.bindings().needs_rebind)
    }

    /// Record a material that draws with this shader
    pub fn add_material(&self, material: &Uuid) {
        let mut bindings = self.bindings();
        match bindings.materials.iter_mut().find(|(uuid, _)| uuid == material) {
            Some((_, count)) => *count += 1,
            None => bindings.materials.push((material.clone(), 1)),
        }
    }

    /// Drop one registration of a material. The UUID is forgotten once no
    /// runtime built from it remains.
    pub fn remove_material(&self, material: &Uuid) {
        let mut bindings = self.bindings();
        if let Some(index) = bindings.materials.iter().position(|(uuid, _)| uuid == material) {
            let count = &mut bindings.materials[index].1;
            *count -= 1;
            if *count == 0 {
                bindings.materials.remove(index);
            }
        }
    }

    /// Materials that draw with this shader
    pub fn materials(&self) -> Vec<Uuid> {
        self.bindings().materials.iter().map(|(uuid, _)| uuid.clone()).collect()
    }

    /// Request a rebuild of the program from source
    pub fn set_recompile(&self, recompile: bool) {
        self.bindings().recompile = recompile;
    }

    /// Whether a rebuild was requested
    pub fn recompile_requested(&self) -> bool {
        self.bindings().recompile
    }

    /// Rebuild the program from the source files. The request is consumed
    /// either way; on failure the previous program and sources stay in use.
    pub fn recompile(&self, graphics: &Arc<dyn GraphicsBackend>) -> Result<(), ConstructionError> {
        self.bindings().recompile = false;

        let mut sources = self.sources();
        let vertex = read_source(&sources.vertex_path)?;
        let fragment = read_source(&sources.fragment_path)?;
        let program = build_program(graphics.as_ref(), &vertex, &fragment)?;
        sources.vertex = vertex;
        sources.fragment = fragment;
        drop(sources);

        let previous = self
            .native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(NativeProgram {
                graphics: Arc::clone(graphics),
                id: program,
            });
        if let Some(previous) = previous {
            previous.graphics.delete_program(previous.id);
        }
        self.bindings().needs_rebind = true;
        Ok(())
    }

    fn read_sources(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let files: ShaderDefinition = self.definition.view()?;
        let directory = ctx.directory.asset_directory_path(&self.definition);
        let sources = self.sources.get_mut().unwrap_or_else(PoisonError::into_inner);

        sources.vertex_path = directory.join(&files.vertex_file);
        sources.vertex = read_source(&sources.vertex_path)?;
        sources.fragment_path = directory.join(&files.fragment_file);
        sources.fragment = read_source(&sources.fragment_path)?;
        Ok(())
    }
}

fn read_source(path: &Path) -> Result<String, ConstructionError> {
    std::fs::read_to_string(path).map_err(|e| ConstructionError::io(path, e))
}

/// Compile both stages and link them. Stage objects are always deleted
/// before returning, and nothing is left allocated on failure.
fn build_program(graphics: &dyn GraphicsBackend, vertex: &str, fragment: &str) -> Result<ProgramId, BackendError> {
    let vs = graphics.compile_shader(ShaderStage::Vertex, vertex)?;
    let fs = match graphics.compile_shader(ShaderStage::Fragment, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            graphics.delete_shader(vs);
            return Err(e);
        }
    };
    let program = graphics.link_program(vs, fs);
    graphics.delete_shader(vs);
    graphics.delete_shader(fs);
    program
}

impl AssetRuntime for ShaderRuntime {
    fn definition(&self) -> &Arc<AssetDefinition> {
        &self.definition
    }

    fn state(&self) -> RuntimeState {
        self.state
    }
}

impl SharedAssetRuntime for ShaderRuntime {
    const ASSET_TYPE: AssetType = AssetType::Shader;

    fn construct(definition: Arc<AssetDefinition>) -> Self {
        Self {
            definition,
            state: RuntimeState::Constructed,
            sources: Mutex::new(ShaderSources::default()),
            bindings: Mutex::new(ShaderBindings::default()),
            native: Mutex::new(None),
        }
    }

    fn decode(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let result = self.read_sources(ctx);
        if result.is_err() {
            self.state = RuntimeState::Error;
        }
        result
    }

    fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let sources = self.sources.get_mut().unwrap_or_else(PoisonError::into_inner);
        match build_program(ctx.graphics.as_ref(), &sources.vertex, &sources.fragment) {
            Ok(id) => {
                log::debug!("Linked program {:?} for {}", id, self.definition.describe());
                *self.native.lock().unwrap_or_else(PoisonError::into_inner) = Some(NativeProgram {
                    graphics: Arc::clone(ctx.graphics),
                    id,
                });
                self.state = RuntimeState::Loaded;
                Ok(())
            }
            Err(e) => {
                self.state = RuntimeState::Error;
                Err(e.into())
            }
        }
    }

    fn release(&self) {
        if let Some(native) = self.native.lock().unwrap_or_else(PoisonError::into_inner).take() {
            native.graphics.delete_program(native.id);
        }
    }
}

impl Drop for ShaderRuntime {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessGraphics;

    #[test]
    fn test_build_program_releases_stages() {
        let gfx = HeadlessGraphics::new();
        let program = build_program(&gfx, "void main() {}", "void main() {}").unwrap();
        assert_eq!(gfx.live_shader_objects(), 0);
        assert_eq!(gfx.live_programs(), 1);
        gfx.delete_program(program);
        assert_eq!(gfx.live_handles(), 0);
    }

    #[test]
    fn test_build_program_failure_leaves_nothing() {
        let gfx = HeadlessGraphics::with_compile_failure("BROKEN");
        assert!(build_program(&gfx, "void main() {}", "BROKEN").is_err());
        assert!(build_program(&gfx, "BROKEN", "void main() {}").is_err());
        assert_eq!(gfx.live_handles(), 0);
    }

    #[test]
    fn test_uniform_changes_mark_rebind() {
        let shader = ShaderRuntime::construct(Arc::new(AssetDefinition::new(
            AssetType::Shader,
            Uuid::new("s"),
            "Lit",
        )));
        shader.set_uniform("shininess", UniformValue::Float(8.0));
        assert!(shader.take_rebind());
        shader.set_uniform("shininess", UniformValue::Float(8.0));
        assert!(!shader.needs_rebind());
        assert_eq!(shader.uniform("shininess"), Some(UniformValue::Float(8.0)));

        shader.add_material(&Uuid::new("m"));
        shader.add_material(&Uuid::new("m"));
        assert_eq!(shader.materials().len(), 1);
    }

    #[test]
    fn test_material_registration_outlives_one_holder() {
        let shader = ShaderRuntime::construct(Arc::new(AssetDefinition::new(
            AssetType::Shader,
            Uuid::new("s"),
            "Lit",
        )));
        let material = Uuid::new("m");

        // An invalidated runtime and its replacement both registered
        shader.add_material(&material);
        shader.add_material(&material);
        shader.remove_material(&material);
        assert_eq!(shader.materials(), vec![material.clone()]);

        shader.remove_material(&material);
        assert!(shader.materials().is_empty());

        shader.remove_material(&material);
        assert!(shader.materials().is_empty());
    }
}
