//! # Dream Engine
//!
//! Entity runtime, scene graph and definition-to-runtime instantiation for
//! the Dream engine.
//!
//! ## Features
//!
//! - **Definitions**: JSON-backed project, scene, entity and asset documents
//! - **Two-phase runtimes**: cheap construction, fallible loading, no native
//!   handle escapes a failed load
//! - **Shared caches**: one runtime per asset definition, deduplicated by
//!   content where it makes sense
//! - **Scene lifecycle**: a rooted entity tree updated in a fixed frame order
//!   and torn down bottom-up
//! - **Headless collaborators**: run whole projects without a GPU
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dream_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let root = std::path::Path::new("my_project");
//!     let config = EngineConfig::load_for_project(root)?;
//!     let project_uuid = Uuid::new("4f6c7d1e-8a0b-4c1e-9d2f-3a4b5c6d7e8f");
//!
//!     let mut project = ProjectRuntime::load(root, &project_uuid, config, Collaborators::headless())?;
//!     project.run()?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod assets;
pub mod backend;
pub mod config;
pub mod definition;
pub mod error;
pub mod events;
pub mod foundation;
pub mod physics;
pub mod project;
pub mod scene;
pub mod scripting;
pub mod storage;

#[cfg(test)]
mod tests;

pub use error::{EngineError, EngineResult, RuntimeOperationError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{AssetRuntime, Caches, LoadContext},
        config::{Config, EngineConfig},
        definition::{AssetDefinition, AssetType, EntityDefinition, ProjectDefinition, SceneDefinition},
        error::{EngineError, EngineResult, RuntimeOperationError},
        events::{Event, EventType},
        foundation::{
            math::{Mat4, Quat, Transform, TransformSpace, Vec3},
            time::Timer,
            uuid::Uuid,
        },
        project::{Collaborators, ProjectRuntime, Subsystem, TaskManager},
        scene::{Camera, EntityRuntime, SceneRuntime, SceneState},
        scripting::{InputState, NativeScriptEngine, ScriptBehaviour, ScriptContext},
        storage::ProjectDirectory,
    };
}
