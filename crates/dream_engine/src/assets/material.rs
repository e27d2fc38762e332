//! Material runtimes
//!
//! A material binds a shader to up to four texture slots and a set of
//! colours. The shader is mandatory; a texture slot that cannot be resolved
//! is logged and left empty.

use std::sync::Arc;

use super::{
    AssetRuntime, ConstructionError, LoadContext, RuntimeState, SharedAssetRuntime, ShaderRuntime,
    TextureRuntime,
};
use crate::definition::{AssetDefinition, AssetType, MaterialDefinition};
use crate::foundation::math::Vec3;

/// Shader, textures and colours for one surface
pub struct MaterialRuntime {
    definition: Arc<AssetDefinition>,
    state: RuntimeState,
    settings: MaterialDefinition,
    shader: Option<Arc<ShaderRuntime>>,
    diffuse: Option<Arc<TextureRuntime>>,
    specular: Option<Arc<TextureRuntime>>,
    normal: Option<Arc<TextureRuntime>>,
    displacement: Option<Arc<TextureRuntime>>,
}

impl MaterialRuntime {
    /// Shader this material draws with, once loaded
    pub fn shader(&self) -> Option<&Arc<ShaderRuntime>> {
        self.shader.as_ref()
    }

    /// Diffuse texture
    pub fn diffuse_texture(&self) -> Option<&Arc<TextureRuntime>> {
        self.diffuse.as_ref()
    }

    /// Specular texture
    pub fn specular_texture(&self) -> Option<&Arc<TextureRuntime>> {
        self.specular.as_ref()
    }

    /// Normal map
    pub fn normal_texture(&self) -> Option<&Arc<TextureRuntime>> {
        self.normal.as_ref()
    }

    /// Displacement map
    pub fn displacement_texture(&self) -> Option<&Arc<TextureRuntime>> {
        self.displacement.as_ref()
    }

    /// Diffuse colour
    pub fn diffuse_colour(&self) -> Vec3 {
        Vec3::from(self.settings.diffuse_colour)
    }

    /// Specular colour
    pub fn specular_colour(&self) -> Vec3 {
        Vec3::from(self.settings.specular_colour)
    }

    /// Ambient colour
    pub fn ambient_colour(&self) -> Vec3 {
        Vec3::from(self.settings.ambient_colour)
    }

    /// Specular exponent
    pub const fn shininess(&self) -> f32 {
        self.settings.shininess
    }

    fn resolve(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        self.settings = self.definition.view()?;
        let owner = self.definition.describe();

        let shader = ctx.resolve(&ctx.caches.shaders, &owner, self.settings.shader())?;

        let mut textures: [Option<Arc<TextureRuntime>>; 4] = Default::default();
        for (slot, (name, uuid)) in textures.iter_mut().zip(self.settings.texture_slots()) {
            let Some(uuid) = uuid else { continue };
            match ctx.resolve(&ctx.caches.textures, &owner, Some(uuid)) {
                Ok(texture) => *slot = Some(texture),
                Err(e) => log::warn!("{owner}: {name} texture slot left empty: {e}"),
            }
        }

        shader.add_material(self.definition.uuid());
        let [diffuse, specular, normal, displacement] = textures;
        self.shader = Some(shader);
        self.diffuse = diffuse;
        self.specular = specular;
        self.normal = normal;
        self.displacement = displacement;
        Ok(())
    }
}

impl AssetRuntime for MaterialRuntime {
    fn definition(&self) -> &Arc<AssetDefinition> {
        &self.definition
    }

    fn state(&self) -> RuntimeState {
        self.state
    }
}

impl SharedAssetRuntime for MaterialRuntime {
    const ASSET_TYPE: AssetType = AssetType::Material;

    fn construct(definition: Arc<AssetDefinition>) -> Self {
        Self {
            definition,
            state: RuntimeState::Constructed,
            settings: MaterialDefinition::default(),
            shader: None,
            diffuse: None,
            specular: None,
            normal: None,
            displacement: None,
        }
    }

    fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let result = self.resolve(ctx);
        self.state = if result.is_ok() { RuntimeState::Loaded } else { RuntimeState::Error };
        result
    }

    // Dependencies are shared runtimes owned by their caches
    fn release(&self) {}
}

impl Drop for MaterialRuntime {
    fn drop(&mut self) {
        if let Some(shader) = &self.shader {
            shader.remove_material(self.definition.uuid());
        }
    }
}
