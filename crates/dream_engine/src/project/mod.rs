//! Project module
//!
//! [`ProjectRuntime`] is the top-level owner: it holds the project
//! definition, the shared runtime caches, the native collaborators, the
//! task manager and the active scene, and drives the frame loop.

pub mod runtime;
pub mod tasks;

pub use runtime::{Collaborators, ProjectRuntime};
pub use tasks::{Subsystem, TaskError, TaskHandle, TaskManager};
