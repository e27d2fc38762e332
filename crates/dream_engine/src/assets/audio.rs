//! Audio runtimes

use std::sync::{Arc, Mutex, PoisonError};

use super::{AssetRuntime, ConstructionError, LoadContext, RuntimeState, SharedAssetRuntime};
use crate::backend::{AudioBackend, AudioBufferId};
use crate::definition::{AssetDefinition, AssetType, AudioDefinition};

struct NativeBuffer {
    audio: Arc<dyn AudioBackend>,
    id: AudioBufferId,
}

/// A decoded sound held by the audio device
pub struct AudioRuntime {
    definition: Arc<AssetDefinition>,
    state: RuntimeState,
    settings: AudioDefinition,
    native: Mutex<Option<NativeBuffer>>,
}

impl AudioRuntime {
    /// Device buffer, once loaded
    pub fn buffer_id(&self) -> Option<AudioBufferId> {
        self.native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|n| n.id)
    }

    /// Playback settings
    pub const fn settings(&self) -> &AudioDefinition {
        &self.settings
    }
}

impl AssetRuntime for AudioRuntime {
    fn definition(&self) -> &Arc<AssetDefinition> {
        &self.definition
    }

    fn state(&self) -> RuntimeState {
        self.state
    }
}

impl SharedAssetRuntime for AudioRuntime {
    const ASSET_TYPE: AssetType = AssetType::Audio;

    fn construct(definition: Arc<AssetDefinition>) -> Self {
        Self {
            definition,
            state: RuntimeState::Constructed,
            settings: AudioDefinition::default(),
            native: Mutex::new(None),
        }
    }

    fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        let format = self.definition.format();
        let path = ctx.directory.asset_absolute_path(&self.definition, &format);
        let result = self
            .definition
            .view::<AudioDefinition>()
            .map_err(ConstructionError::from)
            .and_then(|settings| {
                self.settings = settings;
                ctx.audio.load_buffer(&path, &format).map_err(ConstructionError::from)
            });

        match result {
            Ok(id) => {
                *self.native.lock().unwrap_or_else(PoisonError::into_inner) = Some(NativeBuffer {
                    audio: Arc::clone(ctx.audio),
                    id,
                });
                self.state = RuntimeState::Loaded;
                Ok(())
            }
            Err(e) => {
                self.state = RuntimeState::Error;
                Err(e)
            }
        }
    }

    fn release(&self) {
        if let Some(native) = self.native.lock().unwrap_or_else(PoisonError::into_inner).take() {
            native.audio.delete_buffer(native.id);
        }
    }
}

impl Drop for AudioRuntime {
    fn drop(&mut self) {
        self.release();
    }
}
