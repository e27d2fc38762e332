//! # Backend Module
//!
//! Narrow interfaces to the native collaborators the engine core drives:
//! the graphics context, the audio device and the frame renderer. Physics
//! and scripting collaborators live in their own modules.
//!
//! ## Design Principles
//!
//! - **Handles, not objects**: backends hand out small copyable ids; the
//!   runtimes that acquire them are responsible for releasing them
//! - **Context thread**: graphics calls are only valid on the thread that
//!   owns the context, and backends report violations as errors
//! - **Headless first**: [`headless`] implements every trait without a GPU
//!   or audio device so whole projects can run in tests and CI

pub mod headless;

use std::path::Path;

use thiserror::Error;

use crate::scene::camera::Camera;
use crate::scene::render_queue::DrawQueues;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Failure reported by a native collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Graphics call made away from the context-owning thread
    #[error("{operation} called off the graphics context thread")]
    WrongThread {
        /// Operation attempted
        operation: &'static str,
    },

    /// Shader stage failed to compile
    #[error("{stage:?} shader failed to compile: {log}")]
    Compile {
        /// Stage being compiled
        stage: ShaderStage,
        /// Compiler output
        log: String,
    },

    /// Shader program failed to link
    #[error("shader program failed to link: {0}")]
    Link(String),

    /// Data handed to the backend is unusable
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A file the backend was asked to read does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend cannot do what was asked
    #[error("unsupported: {0}")]
    Unsupported(String),
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// GPU texture object
    TextureId
);
handle!(
    /// Compiled shader stage
    ShaderObjectId
);
handle!(
    /// Linked shader program
    ProgramId
);
handle!(
    /// Vertex and index buffers of one mesh
    MeshId
);
handle!(
    /// Rasterised font atlas
    FontId
);
handle!(
    /// Decoded audio buffer
    AudioBufferId
);

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

/// Vertex layout shared by model import and mesh upload
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Object space position
    pub position: [f32; 3],
    /// Object space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

/// Decoded image ready for upload
#[derive(Debug, Clone, Copy)]
pub struct TextureData<'a> {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per pixel
    pub channels: u8,
    /// Tightly packed rows
    pub pixels: &'a [u8],
}

/// Geometry ready for upload
#[derive(Debug, Clone, Copy)]
pub struct MeshData<'a> {
    /// Vertices
    pub vertices: &'a [Vertex],
    /// Triangle list indices
    pub indices: &'a [u32],
}

/// Graphics context collaborator.
///
/// Creation calls return an error when made off the context thread.
/// Deletion of an unknown or already deleted handle is a no-op.
pub trait GraphicsBackend: Send + Sync {
    /// Upload a texture
    fn create_texture(&self, data: &TextureData<'_>) -> BackendResult<TextureId>;
    /// Free a texture
    fn delete_texture(&self, id: TextureId);

    /// Compile one shader stage
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> BackendResult<ShaderObjectId>;
    /// Free a compiled stage
    fn delete_shader(&self, id: ShaderObjectId);
    /// Link compiled stages into a program
    fn link_program(&self, vertex: ShaderObjectId, fragment: ShaderObjectId) -> BackendResult<ProgramId>;
    /// Free a program
    fn delete_program(&self, id: ProgramId);

    /// Upload mesh buffers
    fn create_mesh(&self, data: &MeshData<'_>) -> BackendResult<MeshId>;
    /// Free mesh buffers
    fn delete_mesh(&self, id: MeshId);

    /// Rasterise a font face
    fn create_font(&self, face: &[u8], size: u32) -> BackendResult<FontId>;
    /// Free a font atlas
    fn delete_font(&self, id: FontId);
}

/// Audio device collaborator. Decoding happens behind this interface.
pub trait AudioBackend: Send + Sync {
    /// Decode a file into a playable buffer
    fn load_buffer(&self, path: &Path, format: &str) -> BackendResult<AudioBufferId>;
    /// Free a buffer
    fn delete_buffer(&self, id: AudioBufferId);
}

/// Consumer of the per-frame draw queues
pub trait Renderer: Send {
    /// Draw one frame
    fn render(&mut self, queues: &DrawQueues, camera: &Camera) -> BackendResult<()>;

    /// The window changed size
    fn on_window_resized(&mut self, _width: u32, _height: u32) {}
}
