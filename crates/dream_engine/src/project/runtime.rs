//! Project runtime: owner of caches, collaborators and the active scene

use std::path::PathBuf;
use std::sync::Arc;

use super::tasks::{Subsystem, TaskManager};
use crate::assets::{Caches, LoadContext};
use crate::backend::headless::{HeadlessAudio, HeadlessGraphics, HeadlessRenderer};
use crate::backend::{AudioBackend, GraphicsBackend, Renderer};
use crate::config::EngineConfig;
use crate::definition::{EntityDefinition, ProjectDefinition};
use crate::error::{EngineError, EngineResult, RuntimeOperationError};
use crate::foundation::time::Timer;
use crate::foundation::uuid::Uuid;
use crate::physics::{self, SharedPhysicsWorld, SimplePhysicsWorld};
use crate::scene::runtime::{FrameContext, SceneError, SceneRuntime, SceneState};
use crate::scripting::{self, InputState, NativeScriptEngine, ScriptEngine, SharedScriptEngine};
use crate::storage::ProjectDirectory;

/// The native systems a project drives
pub struct Collaborators {
    /// Graphics context
    pub graphics: Arc<dyn GraphicsBackend>,
    /// Audio device
    pub audio: Arc<dyn AudioBackend>,
    /// Physics world
    pub physics: SharedPhysicsWorld,
    /// Script engine
    pub scripts: SharedScriptEngine,
    /// Frame renderer
    pub renderer: Box<dyn Renderer>,
}

impl Collaborators {
    /// Collaborators that need no GPU, audio device or script interpreter
    pub fn headless() -> Self {
        Self {
            graphics: Arc::new(HeadlessGraphics::new()),
            audio: Arc::new(HeadlessAudio::new()),
            physics: physics::shared(SimplePhysicsWorld::new()),
            scripts: scripting::shared(NativeScriptEngine::new()),
            renderer: Box::new(HeadlessRenderer::new()),
        }
    }

    /// Replace the script engine
    #[must_use]
    pub fn with_scripts(mut self, engine: impl ScriptEngine + 'static) -> Self {
        self.scripts = scripting::shared(engine);
        self
    }
}

/// Top-level owner of a running project
///
/// The frame loop is [`ProjectRuntime::update_all`]: logic, then graphics,
/// then garbage collection, all against the active scene.
pub struct ProjectRuntime {
    definition: ProjectDefinition,
    directory: ProjectDirectory,
    config: EngineConfig,
    caches: Caches,
    collaborators: Collaborators,
    tasks: TaskManager,
    timer: Timer,
    input: InputState,
    active: Option<SceneRuntime>,
    done: bool,
}

impl ProjectRuntime {
    /// Wrap a loaded project definition
    pub fn new(
        definition: ProjectDefinition,
        directory: ProjectDirectory,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Self {
        log::info!("Creating runtime for project {} ({})", definition.name(), definition.uuid());

        let workers: &[Subsystem] = if config.parallel_physics {
            &[Subsystem::Physics]
        } else {
            &[]
        };

        Self {
            definition,
            directory,
            tasks: TaskManager::new(workers),
            timer: Timer::with_fixed_step(config.fixed_timestep),
            config,
            caches: Caches::new(),
            collaborators,
            input: InputState::new(),
            active: None,
            done: false,
        }
    }

    /// Read `<root>/<project uuid>.json` and wrap it
    pub fn load(
        root: impl Into<PathBuf>,
        project_uuid: &Uuid,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> EngineResult<Self> {
        let directory = ProjectDirectory::new(root);
        let definition = directory.load_project(project_uuid)?;
        Ok(Self::new(definition, directory, config, collaborators))
    }

    fn context<'a>(
        definition: &'a ProjectDefinition,
        directory: &'a ProjectDirectory,
        collaborators: &'a Collaborators,
        caches: &'a Caches,
    ) -> LoadContext<'a> {
        LoadContext {
            project: definition,
            directory,
            graphics: &collaborators.graphics,
            audio: &collaborators.audio,
            physics: &collaborators.physics,
            scripts: &collaborators.scripts,
            caches,
        }
    }

    /// Everything a runtime needs to load
    pub fn load_context(&self) -> LoadContext<'_> {
        Self::context(&self.definition, &self.directory, &self.collaborators, &self.caches)
    }

    /// Build, load and activate a scene, replacing any active one.
    /// Failing to produce the scene is fatal.
    pub fn construct_active_scene_runtime(&mut self, scene_uuid: &Uuid) -> EngineResult<()> {
        if self.active.is_some() {
            self.reset_active_scene_runtime();
        }

        let definition = self
            .definition
            .scene_definition(scene_uuid)
            .ok_or_else(|| EngineError::FatalLoad {
                scene: scene_uuid.clone(),
                reason: "scene is not defined in the project".to_string(),
            })?;

        let mut scene = SceneRuntime::construct(definition, &self.config);
        if let Some((width, height)) = self.definition.window_size() {
            scene.camera_mut().set_viewport(width, height);
        }

        let ctx = self.load_context();
        scene.use_definition(&ctx).map_err(|e| {
            log::error!("Cannot construct scene {scene_uuid}: {e}");
            EngineError::FatalLoad {
                scene: scene_uuid.clone(),
                reason: e.to_string(),
            }
        })?;
        scene.activate()?;
        scene.show_scenegraph();

        self.active = Some(scene);
        self.done = false;
        Ok(())
    }

    /// [`construct_active_scene_runtime`](Self::construct_active_scene_runtime)
    /// for the project's startup scene
    pub fn construct_startup_scene(&mut self) -> EngineResult<()> {
        let scene = self
            .definition
            .startup_scene()
            .ok_or_else(|| EngineError::FatalLoad {
                scene: Uuid::nil(),
                reason: format!("project {} has no startup scene", self.definition.name()),
            })?;
        self.construct_active_scene_runtime(&scene)
    }

    /// Advance the clock and run the active scene's logic update
    pub fn update_logic(&mut self) -> Vec<RuntimeOperationError> {
        let delta = self.timer.update();
        let Some(scene) = self.active.as_mut() else {
            return Vec::new();
        };
        let frame = FrameContext {
            load: Self::context(&self.definition, &self.directory, &self.collaborators, &self.caches),
            delta,
            input: &self.input,
            tasks: Some(&self.tasks),
        };
        scene.update_logic(&frame)
    }

    /// Build draw queues and render. A render failure is logged; the
    /// frame loop continues.
    pub fn update_graphics(&mut self) {
        let Some(scene) = self.active.as_mut() else { return };
        let collaborators = &mut self.collaborators;
        if let Err(e) = scene.update_graphics(&collaborators.graphics, collaborators.renderer.as_mut()) {
            log::error!("Rendering scene {} failed: {e}", scene.name_and_uuid());
        }
    }

    /// Remove entities deleted this frame, then evict unused shared
    /// runtimes when configured to. Returns how many entities were removed.
    pub fn collect_garbage(&mut self) -> usize {
        let removed = self.active.as_mut().map_or(0, SceneRuntime::collect_garbage);
        if self.config.evict_unused_assets {
            let evicted = self.caches.collect_garbage();
            if evicted > 0 {
                log::debug!("Evicted {evicted} unused shared runtimes");
            }
        }
        removed
    }

    /// One frame: logic, graphics, garbage collection. Stops the scene when
    /// it asked to stop or the frame limit is reached.
    pub fn update_all(&mut self) -> Vec<RuntimeOperationError> {
        let errors = self.update_logic();
        self.update_graphics();
        self.collect_garbage();

        let stop_requested = self.active.as_ref().is_some_and(SceneRuntime::is_stop_requested);
        let frame_limit = self.config.max_frames > 0 && self.timer.frame_count() >= self.config.max_frames;
        if stop_requested || frame_limit {
            log::info!("Stopping after {} frames", self.timer.frame_count());
            self.reset_active_scene_runtime();
            self.done = true;
        }
        errors
    }

    /// Destroy the active scene bottom-up, then drop cache entries no
    /// longer referenced
    pub fn reset_active_scene_runtime(&mut self) {
        let Some(mut scene) = self.active.take() else { return };
        if scene.state() != SceneState::ToDestroy && scene.state() != SceneState::Destroyed {
            if let Err(e) = scene.request_destroy() {
                log::warn!("{e}");
            }
        }
        if scene.state() == SceneState::ToDestroy {
            if let Err(e) = scene.destroy_runtime() {
                log::warn!("{e}");
            }
        }
        drop(scene);

        let evicted = self.caches.collect_garbage();
        log::debug!("Scene reset released {evicted} shared runtimes");
    }

    /// Add an entity subtree to the active scene under `parent` and load
    /// its assets
    pub fn instantiate_entity(&mut self, parent: &Uuid, definition: &EntityDefinition) -> EngineResult<Uuid> {
        let scene = self
            .active
            .as_mut()
            .ok_or_else(|| SceneError::UnknownEntity(parent.clone()))?;
        let ctx = Self::context(&self.definition, &self.directory, &self.collaborators, &self.caches);
        Ok(scene.instantiate_entity(parent, definition, &ctx)?)
    }

    /// Release every shared runtime. Safe to call repeatedly.
    pub fn clear_caches(&self) {
        self.caches.clear();
    }

    /// Propagate a window size change to the renderer and camera
    pub fn on_window_resized(&mut self, width: u32, height: u32) {
        self.collaborators.renderer.on_window_resized(width, height);
        if let Some(scene) = self.active.as_mut() {
            scene.camera_mut().set_viewport(width, height);
        }
    }

    /// Replace the input state seen by the next frame
    pub fn set_input(&mut self, input: InputState) {
        self.input = input;
    }

    /// Input state, for mutation between frames
    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Whether the frame loop has finished
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Load the startup scene when none is active, then run frames until
    /// the scene stops or the frame limit is reached
    pub fn run(&mut self) -> EngineResult<()> {
        if self.active.is_none() {
            self.construct_startup_scene()?;
        }
        log::info!("Starting frame loop");
        while !self.done {
            self.update_all();
        }
        log::info!(
            "Frame loop finished after {} frames ({:.1} fps)",
            self.timer.frame_count(),
            self.timer.average_fps()
        );
        Ok(())
    }

    /// Project definition
    pub const fn definition(&self) -> &ProjectDefinition {
        &self.definition
    }

    /// Project directory
    pub const fn directory(&self) -> &ProjectDirectory {
        &self.directory
    }

    /// Engine configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared runtime caches
    pub const fn caches(&self) -> &Caches {
        &self.caches
    }

    /// Native collaborators
    pub const fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Subsystem workers
    pub const fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Frame timer
    pub const fn timer(&self) -> &Timer {
        &self.timer
    }

    /// The scene receiving frame updates
    pub const fn active_scene_runtime(&self) -> Option<&SceneRuntime> {
        self.active.as_ref()
    }

    /// The scene receiving frame updates, for mutation
    pub fn active_scene_runtime_mut(&mut self) -> Option<&mut SceneRuntime> {
        self.active.as_mut()
    }
}

impl Drop for ProjectRuntime {
    fn drop(&mut self) {
        self.reset_active_scene_runtime();
        self.caches.clear();
        self.tasks.shutdown();
    }
}
