//! Font runtimes

use std::sync::{Arc, Mutex, PoisonError};

use super::{AssetRuntime, ConstructionError, LoadContext, RuntimeState, SharedAssetRuntime};
use crate::backend::{FontId, GraphicsBackend};
use crate::definition::{AssetDefinition, AssetType, FontDefinition};

struct NativeFont {
    graphics: Arc<dyn GraphicsBackend>,
    id: FontId,
}

/// A font face rasterised at one size
pub struct FontRuntime {
    definition: Arc<AssetDefinition>,
    state: RuntimeState,
    size: u32,
    face: Vec<u8>,
    native: Mutex<Option<NativeFont>>,
}

impl FontRuntime {
    /// Atlas handle, once loaded
    pub fn font_id(&self) -> Option<FontId> {
        self.native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|n| n.id)
    }

    /// Pixel size
    pub const fn size(&self) -> u32 {
        self.size
    }
}

impl AssetRuntime for FontRuntime {
    fn definition(&self) -> &Arc<AssetDefinition> {
        &self.definition
    }

    fn state(&self) -> RuntimeState {
        self.state
    }
}

impl SharedAssetRuntime for FontRuntime {
    const ASSET_TYPE: AssetType = AssetType::Font;

    fn construct(definition: Arc<AssetDefinition>) -> Self {
        Self {
            definition,
            state: RuntimeState::Constructed,
            size: FontDefinition::default().size,
            face: Vec::new(),
            native: Mutex::new(None),
        }
    }

    fn decode(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let path = ctx
            .directory
            .asset_absolute_path(&self.definition, &self.definition.format());
        let result = self
            .definition
            .view::<FontDefinition>()
            .map_err(ConstructionError::from)
            .and_then(|settings| {
                self.size = settings.size;
                std::fs::read(&path).map_err(|e| ConstructionError::io(&path, e))
            });
        match result {
            Ok(face) => {
                self.face = face;
                Ok(())
            }
            Err(e) => {
                self.state = RuntimeState::Error;
                Err(e)
            }
        }
    }

    fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        match ctx.graphics.create_font(&self.face, self.size) {
            Ok(id) => {
                *self.native.lock().unwrap_or_else(PoisonError::into_inner) = Some(NativeFont {
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
            native.graphics.delete_font(native.id);
        }
    }
}

impl Drop for FontRuntime {
    fn drop(&mut self) {
        self.release();
    }
}
