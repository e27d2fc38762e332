//! Texture runtimes
//!
//! Decodes image files with the `image` crate and uploads them through the
//! graphics backend. Two texture definitions whose decoded pixels are
//! identical share one GPU texture.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use super::{AssetRuntime, ConstructionError, LoadContext, RuntimeState, SharedAssetRuntime};
use crate::backend::{GraphicsBackend, TextureData, TextureId};
use crate::definition::{AssetDefinition, AssetType};

/// Decoded image ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of colour channels
    pub channels: u8,
}

impl ImageData {
    /// Decode an encoded image held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
            channels: 4,
        })
    }

    /// Create a solid colour image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            data: color.repeat(pixel_count(width, height)),
            width,
            height,
            channels: 4,
        }
    }

    /// Hash of dimensions and pixels
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.width.hash(&mut hasher);
        self.height.hash(&mut hasher);
        self.channels.hash(&mut hasher);
        self.data.hash(&mut hasher);
        hasher.finish()
    }

    fn as_texture_data(&self) -> TextureData<'_> {
        TextureData {
            width: self.width,
            height: self.height,
            channels: self.channels,
            pixels: &self.data,
        }
    }
}

// Widened before multiplying; u32 dimensions overflow u32 area
const fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

struct NativeTexture {
    graphics: Arc<dyn GraphicsBackend>,
    id: TextureId,
}

/// A decoded texture and its GPU handle
pub struct TextureRuntime {
    definition: Arc<AssetDefinition>,
    state: RuntimeState,
    image: Option<ImageData>,
    fingerprint: Option<u64>,
    native: Mutex<Option<NativeTexture>>,
}

impl TextureRuntime {
    /// GPU handle, once loaded
    pub fn texture_id(&self) -> Option<TextureId> {
        self.native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|n| n.id)
    }

    /// Decoded pixels
    pub const fn image(&self) -> Option<&ImageData> {
        self.image.as_ref()
    }

    /// Width in pixels, zero before decoding
    pub fn width(&self) -> u32 {
        self.image.as_ref().map_or(0, |i| i.width)
    }

    /// Height in pixels, zero before decoding
    pub fn height(&self) -> u32 {
        self.image.as_ref().map_or(0, |i| i.height)
    }
}

impl AssetRuntime for TextureRuntime {
    fn definition(&self) -> &Arc<AssetDefinition> {
        &self.definition
    }

    fn state(&self) -> RuntimeState {
        self.state
    }
}

impl SharedAssetRuntime for TextureRuntime {
    const ASSET_TYPE: AssetType = AssetType::Texture;

    fn construct(definition: Arc<AssetDefinition>) -> Self {
        Self {
            definition,
            state: RuntimeState::Constructed,
            image: None,
            fingerprint: None,
            native: Mutex::new(None),
        }
    }

    fn decode(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let path = ctx
            .directory
            .asset_absolute_path(&self.definition, &self.definition.format());
        let result = std::fs::read(&path)
            .map_err(|e| ConstructionError::io(&path, e))
            .and_then(|bytes| {
                ImageData::from_bytes(&bytes).map_err(|e| ConstructionError::Decode {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            });

        match result {
            Ok(image) => {
                log::debug!("Decoded {}x{} texture from {:?}", image.width, image.height, path);
                self.fingerprint = Some(image.fingerprint());
                self.image = Some(image);
                Ok(())
            }
            Err(e) => {
                self.state = RuntimeState::Error;
                Err(e)
            }
        }
    }

    fn content_fingerprint(&self) -> Option<u64> {
        self.fingerprint
    }

    fn same_content(&self, other: &Self) -> bool {
        matches!((&self.image, &other.image), (Some(a), Some(b)) if a == b)
    }

    fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let Some(image) = &self.image else {
            self.state = RuntimeState::Error;
            return Err(ConstructionError::Decode {
                path: ctx.directory.asset_directory_path(&self.definition),
                reason: "texture was not decoded".to_string(),
            });
        };

        match ctx.graphics.create_texture(&image.as_texture_data()) {
            Ok(id) => {
                *self.native.lock().unwrap_or_else(PoisonError::into_inner) = Some(NativeTexture {
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
            log::trace!("Releasing texture {:?} of {}", native.id, self.definition.describe());
            native.graphics.delete_texture(native.id);
        }
    }
}

impl Drop for TextureRuntime {
    fn drop(&mut self) {
        self.release();
    }
}
