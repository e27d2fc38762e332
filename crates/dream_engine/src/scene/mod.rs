//! Scene module
//!
//! Live scenes: the entity tree, its camera, per-frame draw queues and the
//! [`SceneRuntime`] that drives them through their lifecycle.

pub mod bounds;
pub mod camera;
pub mod entity;
pub mod render_queue;
pub mod runtime;
pub mod tree;

pub use bounds::{Frustum, Plane, AABB};
pub use camera::Camera;
pub use entity::{EntityAssets, EntityFlags, EntityKey, EntityRuntime};
pub use render_queue::{DrawQueues, LightDraw, MaterialBatch, MeshDraw, SpriteDraw, TextDraw};
pub use runtime::{FrameContext, SceneError, SceneRuntime, SceneState};
pub use tree::{EntityTree, TreeError};
