//! Headless backends
//!
//! Implementations of the backend traits that track handles in memory
//! instead of talking to a GPU or audio device. They enforce the same
//! rules a real context would (context thread, handle liveness) and expose
//! counters so callers can check for leaks.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use super::{
    AudioBackend, AudioBufferId, BackendError, BackendResult, FontId, GraphicsBackend, MeshData,
    MeshId, ProgramId, Renderer, ShaderObjectId, ShaderStage, TextureData, TextureId,
};
use crate::scene::camera::Camera;
use crate::scene::render_queue::DrawQueues;

#[derive(Debug, Default)]
struct GraphicsState {
    next_id: u32,
    textures: HashSet<u32>,
    shaders: HashSet<u32>,
    programs: HashSet<u32>,
    meshes: HashSet<u32>,
    fonts: HashSet<u32>,
    textures_created: usize,
    programs_created: usize,
}

impl GraphicsState {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory graphics context bound to the thread that created it
#[derive(Debug)]
pub struct HeadlessGraphics {
    owner: ThreadId,
    compile_failure_marker: Option<String>,
    state: Mutex<GraphicsState>,
}

impl Default for HeadlessGraphics {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessGraphics {
    /// Create a context owned by the calling thread
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            compile_failure_marker: None,
            state: Mutex::new(GraphicsState::default()),
        }
    }

    /// Fail compilation of any shader stage whose source contains `marker`
    pub fn with_compile_failure(marker: impl Into<String>) -> Self {
        Self {
            compile_failure_marker: Some(marker.into()),
            ..Self::new()
        }
    }

    fn state(&self) -> MutexGuard<'_, GraphicsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_context_thread(&self, operation: &'static str) -> BackendResult<()> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(BackendError::WrongThread { operation })
        }
    }

    fn release(&self, operation: &'static str, id: u32, select: fn(&mut GraphicsState) -> &mut HashSet<u32>) {
        if let Err(e) = self.ensure_context_thread(operation) {
            log::error!("{e}; handle {id} leaked");
            return;
        }
        let mut state = self.state();
        if !select(&mut state).remove(&id) {
            log::trace!("{operation}: handle {id} already released");
        }
    }

    /// Textures currently allocated
    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    /// Textures ever created
    pub fn textures_created(&self) -> usize {
        self.state().textures_created
    }

    /// Compiled stages currently allocated
    pub fn live_shader_objects(&self) -> usize {
        self.state().shaders.len()
    }

    /// Programs currently allocated
    pub fn live_programs(&self) -> usize {
        self.state().programs.len()
    }

    /// Programs ever linked
    pub fn programs_created(&self) -> usize {
        self.state().programs_created
    }

    /// Meshes currently allocated
    pub fn live_meshes(&self) -> usize {
        self.state().meshes.len()
    }

    /// Fonts currently allocated
    pub fn live_fonts(&self) -> usize {
        self.state().fonts.len()
    }

    /// Every handle of every kind currently allocated
    pub fn live_handles(&self) -> usize {
        let state = self.state();
        state.textures.len()
            + state.shaders.len()
            + state.programs.len()
            + state.meshes.len()
            + state.fonts.len()
    }
}

impl GraphicsBackend for HeadlessGraphics {
    fn create_texture(&self, data: &TextureData<'_>) -> BackendResult<TextureId> {
        self.ensure_context_thread("create_texture")?;
        let expected = data.width as usize * data.height as usize * data.channels as usize;
        if expected == 0 || data.pixels.len() != expected {
            return Err(BackendError::InvalidData(format!(
                "{}x{}x{} texture with {} bytes",
                data.width,
                data.height,
                data.channels,
                data.pixels.len()
            )));
        }

        let mut state = self.state();
        let id = state.allocate();
        state.textures.insert(id);
        state.textures_created += 1;
        Ok(TextureId(id))
    }

    fn delete_texture(&self, id: TextureId) {
        self.release("delete_texture", id.0, |s| &mut s.textures);
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> BackendResult<ShaderObjectId> {
        self.ensure_context_thread("compile_shader")?;
        if source.trim().is_empty() {
            return Err(BackendError::Compile {
                stage,
                log: "empty source".to_string(),
            });
        }
        if let Some(marker) = &self.compile_failure_marker {
            if source.contains(marker.as_str()) {
                return Err(BackendError::Compile {
                    stage,
                    log: format!("rejected source containing '{marker}'"),
                });
            }
        }

        let mut state = self.state();
        let id = state.allocate();
        state.shaders.insert(id);
        Ok(ShaderObjectId(id))
    }

    fn delete_shader(&self, id: ShaderObjectId) {
        self.release("delete_shader", id.0, |s| &mut s.shaders);
    }

    fn link_program(&self, vertex: ShaderObjectId, fragment: ShaderObjectId) -> BackendResult<ProgramId> {
        self.ensure_context_thread("link_program")?;
        let mut state = self.state();
        if !state.shaders.contains(&vertex.0) || !state.shaders.contains(&fragment.0) {
            return Err(BackendError::Link("stage handle is not live".to_string()));
        }
        let id = state.allocate();
        state.programs.insert(id);
        state.programs_created += 1;
        Ok(ProgramId(id))
    }

    fn delete_program(&self, id: ProgramId) {
        self.release("delete_program", id.0, |s| &mut s.programs);
    }

    fn create_mesh(&self, data: &MeshData<'_>) -> BackendResult<MeshId> {
        self.ensure_context_thread("create_mesh")?;
        let vertex_count = data.vertices.len();
        if vertex_count == 0 {
            return Err(BackendError::InvalidData("mesh has no vertices".to_string()));
        }
        if let Some(bad) = data.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(BackendError::InvalidData(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }

        let mut state = self.state();
        let id = state.allocate();
        state.meshes.insert(id);
        Ok(MeshId(id))
    }

    fn delete_mesh(&self, id: MeshId) {
        self.release("delete_mesh", id.0, |s| &mut s.meshes);
    }

    fn create_font(&self, face: &[u8], size: u32) -> BackendResult<FontId> {
        self.ensure_context_thread("create_font")?;
        if face.is_empty() || size == 0 {
            return Err(BackendError::InvalidData("empty font face or zero size".to_string()));
        }
        let mut state = self.state();
        let id = state.allocate();
        state.fonts.insert(id);
        Ok(FontId(id))
    }

    fn delete_font(&self, id: FontId) {
        self.release("delete_font", id.0, |s| &mut s.fonts);
    }
}

/// In-memory audio device
#[derive(Debug, Default)]
pub struct HeadlessAudio {
    state: Mutex<(u32, HashSet<u32>)>,
}

impl HeadlessAudio {
    /// Create a device with no buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .len()
    }
}

impl AudioBackend for HeadlessAudio {
    fn load_buffer(&self, path: &Path, format: &str) -> BackendResult<AudioBufferId> {
        if !matches!(format, "wav" | "ogg") {
            return Err(BackendError::Unsupported(format!("audio format '{format}'")));
        }
        if !path.is_file() {
            return Err(BackendError::NotFound(path.display().to_string()));
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.0 += 1;
        let id = state.0;
        state.1.insert(id);
        Ok(AudioBufferId(id))
    }

    fn delete_buffer(&self, id: AudioBufferId) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .remove(&id.0);
    }
}

/// What the headless renderer saw on the most recent frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames rendered so far
    pub frames: u64,
    /// Opaque mesh draws in the last frame
    pub opaque_draws: usize,
    /// Material batches in the last frame
    pub batches: usize,
    /// Sprites in the last frame
    pub sprites: usize,
    /// Text items in the last frame
    pub fonts: usize,
    /// Lights in the last frame
    pub lights: usize,
    /// Entities culled in the last frame
    pub culled: usize,
    /// Most recent window size
    pub viewport: (u32, u32),
}

/// Renderer that records queue sizes instead of drawing
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    stats: Arc<Mutex<RenderStats>>,
}

impl HeadlessRenderer {
    /// Create a renderer with empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the stats, readable after the renderer is boxed
    pub fn stats_handle(&self) -> Arc<Mutex<RenderStats>> {
        Arc::clone(&self.stats)
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, queues: &DrawQueues, _camera: &Camera) -> BackendResult<()> {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.frames += 1;
        stats.opaque_draws = queues.opaque_draw_count();
        stats.batches = queues.opaque.len();
        stats.sprites = queues.sprites.len();
        stats.fonts = queues.fonts.len();
        stats.lights = queues.lights.len();
        stats.culled = queues.culled;
        Ok(())
    }

    fn on_window_resized(&mut self, width: u32, height: u32) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .viewport = (width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Vertex;

    #[test]
    fn test_texture_lifecycle() {
        let gfx = HeadlessGraphics::new();
        let pixels = [255_u8; 16];
        let id = gfx
            .create_texture(&TextureData { width: 2, height: 2, channels: 4, pixels: &pixels })
            .unwrap();
        assert_eq!(gfx.live_textures(), 1);
        gfx.delete_texture(id);
        gfx.delete_texture(id);
        assert_eq!(gfx.live_textures(), 0);
        assert_eq!(gfx.textures_created(), 1);
    }

    #[test]
    fn test_texture_size_mismatch() {
        let gfx = HeadlessGraphics::new();
        let result = gfx.create_texture(&TextureData { width: 4, height: 4, channels: 4, pixels: &[0; 3] });
        assert!(matches!(result, Err(BackendError::InvalidData(_))));
        assert_eq!(gfx.live_handles(), 0);
    }

    #[test]
    fn test_wrong_thread_rejected() {
        let gfx = Arc::new(HeadlessGraphics::new());
        let remote = Arc::clone(&gfx);
        let result = thread::spawn(move || remote.compile_shader(ShaderStage::Vertex, "void main() {}"))
            .join()
            .unwrap();
        assert!(matches!(result, Err(BackendError::WrongThread { .. })));
    }

    #[test]
    fn test_compile_failure_marker() {
        let gfx = HeadlessGraphics::with_compile_failure("#error");
        assert!(gfx.compile_shader(ShaderStage::Vertex, "void main() {}").is_ok());
        assert!(matches!(
            gfx.compile_shader(ShaderStage::Fragment, "#error broken"),
            Err(BackendError::Compile { stage: ShaderStage::Fragment, .. })
        ));
    }

    #[test]
    fn test_link_requires_live_stages() {
        let gfx = HeadlessGraphics::new();
        let vs = gfx.compile_shader(ShaderStage::Vertex, "v").unwrap();
        let fs = gfx.compile_shader(ShaderStage::Fragment, "f").unwrap();
        gfx.delete_shader(fs);
        assert!(matches!(gfx.link_program(vs, fs), Err(BackendError::Link(_))));
    }

    #[test]
    fn test_mesh_index_validation() {
        let gfx = HeadlessGraphics::new();
        let vertices = [Vertex::default(); 3];
        assert!(gfx.create_mesh(&MeshData { vertices: &vertices, indices: &[0, 1, 2] }).is_ok());
        assert!(gfx.create_mesh(&MeshData { vertices: &vertices, indices: &[0, 1, 3] }).is_err());
    }

    #[test]
    fn test_audio_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ogg");
        let audio = HeadlessAudio::new();
        assert!(matches!(audio.load_buffer(&path, "ogg"), Err(BackendError::NotFound(_))));

        std::fs::write(&path, b"OggS").unwrap();
        let id = audio.load_buffer(&path, "ogg").unwrap();
        assert_eq!(audio.live_buffers(), 1);
        audio.delete_buffer(id);
        assert_eq!(audio.live_buffers(), 0);
        assert!(matches!(audio.load_buffer(&path, "mp3"), Err(BackendError::Unsupported(_))));
    }
}
