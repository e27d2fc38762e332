//! Scene runtimes
//!
//! A [`SceneRuntime`] is one playable instance of a [`SceneDefinition`]. It
//! owns the entity tree, the camera and the per-frame draw queues, and
//! moves through a fixed lifecycle:
//!
//! ```text
//! ToLoad --use_definition--> Loaded --activate--> Active
//!    |                          |                   |
//!    +------request_destroy-----+-------------------+--> ToDestroy --destroy_runtime--> Destroyed
//! ```
//!
//! # Frame order
//!
//! [`SceneRuntime::update_logic`] runs transforms, scripts, events and
//! physics in that order, so physics sees what scripts did this frame.
//! [`SceneRuntime::update_graphics`] then culls and queues draws, and
//! [`SceneRuntime::collect_garbage`] removes entities flagged for deletion
//! during the frame. Deletion is only a flag until that last step, so no
//! update pass ever sees a half-removed entity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

use super::bounds::Frustum;
use super::camera::Camera;
use super::entity::{EntityAssets, EntityFlags, EntityKey, EntityRuntime};
use super::render_queue::{DrawQueues, LightDraw, MeshDraw, SpriteDraw, TextDraw};
use super::tree::{EntityTree, TreeError};
use crate::assets::discrete::load_discrete;
use crate::assets::{AssetRuntime, ConstructionError, LoadContext, ShaderRuntime};
use crate::backend::{BackendResult, GraphicsBackend, Renderer};
use crate::config::EngineConfig;
use crate::definition::{AssetDefinition, AssetType, DefinitionError, EntityDefinition, SceneDefinition, UuidRegistry};
use crate::error::RuntimeOperationError;
use crate::events::Event;
use crate::foundation::math::{Transform, Vec3};
use crate::foundation::uuid::Uuid;
use crate::physics::{self, BodyId, Contact, PhysicsObjectRuntime};
use crate::project::tasks::{Subsystem, TaskManager};
use crate::scripting::{InputState, ScriptCallback, ScriptCommand, ScriptContext, ScriptError, ScriptRuntime};

/// Lifecycle state of a scene runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneState {
    /// Constructed, nothing loaded
    ToLoad,
    /// Entity tree built and assets attached
    Loaded,
    /// Receiving frame updates
    Active,
    /// Stop requested; torn down by `destroy_runtime`
    ToDestroy,
    /// Torn down; terminal
    Destroyed,
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ToLoad => "ToLoad",
            Self::Loaded => "Loaded",
            Self::Active => "Active",
            Self::ToDestroy => "ToDestroy",
            Self::Destroyed => "Destroyed",
        };
        f.write_str(name)
    }
}

/// Scene-level failures
#[derive(Debug, Error)]
pub enum SceneError {
    /// The requested lifecycle step is not valid from the current state
    #[error("scene {scene}: cannot go from {from} to {to}")]
    InvalidTransition {
        /// Scene name and UUID
        scene: String,
        /// Current state
        from: SceneState,
        /// Requested state
        to: SceneState,
    },

    /// The scene definition has no root entity
    #[error("scene {scene} has no root entity")]
    MissingRoot {
        /// Scene name and UUID
        scene: String,
    },

    /// The root entity definition is unusable
    #[error("scene {scene}: invalid root entity: {source}")]
    RootDefinition {
        /// Scene name and UUID
        scene: String,
        /// Why the definition was rejected
        #[source]
        source: DefinitionError,
    },

    /// The root entity could not be inserted
    #[error("scene {scene}: cannot insert root entity: {source}")]
    Root {
        /// Scene name and UUID
        scene: String,
        /// Why the tree rejected it
        #[source]
        source: TreeError,
    },

    /// An asset attached to the root entity failed to load
    #[error("scene {scene}: root entity {entity} failed to load {asset}: {source}")]
    RootAssets {
        /// Scene name and UUID
        scene: String,
        /// Root entity name and UUID
        entity: String,
        /// Asset that failed
        asset: Uuid,
        /// Why it failed
        #[source]
        source: ConstructionError,
    },

    /// A structural change was rejected
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// No entity has this UUID
    #[error("no entity {0} in the scene")]
    UnknownEntity(Uuid),
}

/// Everything a logic update needs from the project
pub struct FrameContext<'a> {
    /// Collaborators and caches, for lazily attached assets
    pub load: LoadContext<'a>,
    /// Seconds since the previous frame
    pub delta: f32,
    /// Input sampled for this frame
    pub input: &'a InputState,
    /// Worker threads; `None` runs every subsystem inline
    pub tasks: Option<&'a TaskManager>,
}

/// One live scene
pub struct SceneRuntime {
    uuid: Uuid,
    name: String,
    definition: SceneDefinition,
    state: SceneState,
    tree: EntityTree,
    camera: Camera,
    clear_colour: [f32; 3],
    gravity: Vec3,
    lighting_pass_shader: Option<Arc<ShaderRuntime>>,
    shadow_pass_shader: Option<Arc<ShaderRuntime>>,
    input_script: Option<ScriptRuntime>,
    bodies: HashMap<BodyId, EntityKey>,
    queues: DrawQueues,
    cleanup_queue: Vec<EntityRuntime>,
    scene_time: f64,
    started_at: Option<SystemTime>,
    frames: u64,
    stop_requested: bool,
}

impl SceneRuntime {
    /// First construction phase: copy the scene settings. Nothing is
    /// loaded and the tree is empty.
    pub fn construct(definition: &SceneDefinition, config: &EngineConfig) -> Self {
        let gravity = definition
            .gravity()
            .unwrap_or_else(|| Vec3::from(config.default_gravity));

        Self {
            uuid: definition.uuid(),
            name: definition.name(),
            definition: definition.clone(),
            state: SceneState::ToLoad,
            tree: EntityTree::new(),
            camera: Camera::from_scene(definition, config),
            clear_colour: definition.clear_colour(),
            gravity,
            lighting_pass_shader: None,
            shadow_pass_shader: None,
            input_script: None,
            bodies: HashMap::new(),
            queues: DrawQueues::new(),
            cleanup_queue: Vec::new(),
            scene_time: 0.0,
            started_at: None,
            frames: 0,
            stop_requested: false,
        }
    }

    /// Second construction phase: build the entity tree depth-first, root
    /// first, and attach every entity's assets.
    ///
    /// Failures on child entities flag that entity and are logged. A
    /// failure on the root entity tears the scene down and is returned.
    pub fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), SceneError> {
        self.check_transition(&[SceneState::ToLoad], SceneState::Loaded)?;
        let scene = self.name_and_uuid();
        log::info!("Loading scene {scene}");

        let Some(root) = self.definition.root() else {
            return Err(SceneError::MissingRoot { scene });
        };
        UuidRegistry::validate(&root.uuid()).map_err(|source| SceneError::RootDefinition {
            scene: scene.clone(),
            source,
        })?;
        let root_key = insert_definitions(&mut self.tree, None, root)
            .map_err(|source| SceneError::Root { scene: scene.clone(), source })?;

        physics::lock(ctx.physics).set_gravity(self.gravity);
        self.lighting_pass_shader = self.pass_shader(self.definition.lighting_pass_shader(), "lighting", ctx);
        self.shadow_pass_shader = self.pass_shader(self.definition.shadow_pass_shader(), "shadow", ctx);
        self.input_script = self.load_input_script(ctx);

        if let Err((asset, source)) = self.load_entity_assets(root_key, ctx) {
            let entity = self
                .tree
                .get(root_key)
                .map(EntityRuntime::name_and_uuid)
                .unwrap_or_default();
            self.teardown();
            self.state = SceneState::Destroyed;
            return Err(SceneError::RootAssets {
                scene,
                entity,
                asset,
                source,
            });
        }
        for key in self.tree.pre_order(root_key).into_iter().skip(1) {
            // Child failures are flagged and logged inside
            let _ = self.load_entity_assets(key, ctx);
        }

        self.state = SceneState::Loaded;
        log::info!("Scene {scene} loaded with {} entities", self.tree.len());
        Ok(())
    }

    fn pass_shader(&self, uuid: Option<Uuid>, pass: &str, ctx: &LoadContext<'_>) -> Option<Arc<ShaderRuntime>> {
        let uuid = uuid?;
        let owner = format!("{} {pass} pass", self.name_and_uuid());
        ctx.resolve(&ctx.caches.shaders, &owner, Some(&uuid))
            .map_err(|e| log::warn!("{e}"))
            .ok()
    }

    fn load_input_script(&self, ctx: &LoadContext<'_>) -> Option<ScriptRuntime> {
        let uuid = self.definition.input_script()?;
        let Some(definition) = ctx
            .project
            .asset_definition(&uuid)
            .filter(|d| d.asset_type() == AssetType::Script)
        else {
            log::warn!("Scene {} input script {uuid} is not a defined script", self.name_and_uuid());
            return None;
        };
        load_discrete(Arc::clone(definition), &self.uuid, ctx, &Transform::identity())
            .map_err(|e| log::error!("Scene {} input script {}: {e}", self.name_and_uuid(), definition.describe()))
            .ok()
    }

    /// Attach every pending asset of one entity. Each failure flags the
    /// entity and is logged; the first one is returned.
    fn load_entity_assets(&mut self, key: EntityKey, ctx: &LoadContext<'_>) -> Result<(), (Uuid, ConstructionError)> {
        let world = self.tree.world_transform(key);
        let Some(entity) = self.tree.get_mut(key) else {
            return Ok(());
        };
        let owner = entity.name_and_uuid();
        let uuid = entity.uuid().clone();
        let mut first_failure = None;

        for asset in entity.take_assets_to_load() {
            let Some(definition) = ctx.project.asset_definition(&asset) else {
                log::error!("{owner} references asset {asset} which is not defined");
                entity.flag_error(EntityFlags::ASSET_ERROR);
                first_failure.get_or_insert_with(|| (asset.clone(), ConstructionError::UnknownAsset(asset.clone())));
                continue;
            };

            match attach_asset(entity.assets_mut(), Arc::clone(definition), &uuid, ctx, &world) {
                Ok(Some(body)) => {
                    self.bodies.retain(|_, owner_key| *owner_key != key);
                    self.bodies.insert(body, key);
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("{owner} failed to attach {}: {e}", definition.describe());
                    entity.flag_error(EntityFlags::ASSET_ERROR);
                    if first_failure.is_none() {
                        first_failure = Some((asset, e));
                    }
                }
            }
        }
        entity.set_loaded();

        first_failure.map_or(Ok(()), Err)
    }

    fn check_transition(&self, from: &[SceneState], to: SceneState) -> Result<(), SceneError> {
        if from.contains(&self.state) {
            Ok(())
        } else {
            Err(SceneError::InvalidTransition {
                scene: self.name_and_uuid(),
                from: self.state,
                to,
            })
        }
    }

    /// Start receiving frame updates
    pub fn activate(&mut self) -> Result<(), SceneError> {
        self.check_transition(&[SceneState::Loaded], SceneState::Active)?;
        self.state = SceneState::Active;
        self.started_at = Some(SystemTime::now());
        log::info!("Scene {} is active", self.name_and_uuid());
        Ok(())
    }

    /// Ask for the scene to be torn down
    pub fn request_destroy(&mut self) -> Result<(), SceneError> {
        self.check_transition(
            &[SceneState::ToLoad, SceneState::Loaded, SceneState::Active],
            SceneState::ToDestroy,
        )?;
        self.state = SceneState::ToDestroy;
        log::debug!("Scene {} will be destroyed", self.name_and_uuid());
        Ok(())
    }

    /// Tear down bottom-up: children before parents, discrete runtimes
    /// released and shared references dropped, then the root
    pub fn destroy_runtime(&mut self) -> Result<(), SceneError> {
        self.check_transition(&[SceneState::ToDestroy], SceneState::Destroyed)?;
        self.teardown();
        self.state = SceneState::Destroyed;
        log::info!("Scene {} destroyed", self.name_and_uuid());
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(root) = self.tree.root() {
            let removed = self.tree.remove_subtree(root);
            self.cleanup_queue.extend(removed);
        }
        self.release_cleanup_queue();

        if let Some(mut script) = self.input_script.take() {
            script.release();
        }
        self.lighting_pass_shader = None;
        self.shadow_pass_shader = None;
        self.bodies.clear();
        self.queues.clear();
    }

    /// Release everything in the cleanup queue, in queue order
    fn release_cleanup_queue(&mut self) {
        let scene_time = self.scene_time;
        for mut entity in self.cleanup_queue.drain(..) {
            if let Some(mut script) = entity.assets_mut().script.take() {
                if script.is_initialised() && !entity.has_error(EntityFlags::SCRIPT_ERROR) {
                    let mut discarded = Vec::new();
                    if let Err(e) = run_callback(&mut entity, &mut script, ScriptCallback::Destroy, 0.0, scene_time, &mut discarded) {
                        log::warn!("{} {e}", entity.name_and_uuid());
                    }
                }
                script.release();
            }
            entity.assets_mut().release();
            log::trace!("Released entity {}", entity.name_and_uuid());
        }
    }

    // ---------------------------------------------------------------------
    // Logic
    // ---------------------------------------------------------------------

    /// Run one logic frame: pending asset loads, transforms, scripts,
    /// events, physics and camera follow. Returns the failures first seen
    /// this frame; each is also logged.
    pub fn update_logic(&mut self, frame: &FrameContext<'_>) -> Vec<RuntimeOperationError> {
        let mut errors = Vec::new();
        if self.state != SceneState::Active {
            return errors;
        }
        self.frames += 1;
        self.scene_time += f64::from(frame.delta);

        for key in self.tree.keys() {
            let pending = self
                .tree
                .get(key)
                .is_some_and(|e| !e.is_deleted() && !e.assets_to_load().is_empty());
            if pending {
                let _ = self.load_entity_assets(key, &frame.load);
            }
        }

        self.update_transforms(frame.delta);
        let commands = self.update_scripts(frame, &mut errors);
        self.apply_commands(commands, &mut errors);
        let commands = self.process_events(frame.delta, &mut errors);
        self.apply_commands(commands, &mut errors);
        self.update_physics(frame, &mut errors);
        self.update_camera();

        errors
    }

    fn update_transforms(&mut self, delta: f32) {
        for key in self.tree.keys() {
            let Some(entity) = self.tree.get_mut(key) else { continue };
            if entity.is_deleted() {
                continue;
            }
            if let Some(local) = entity.assets_mut().animation.as_mut().and_then(|a| a.update(delta)) {
                entity.set_transform(local);
            }
            let Some(position) = entity.assets_mut().path.as_mut().and_then(|p| p.update(delta)) else {
                continue;
            };
            let mut world = self.tree.world_transform(key);
            world.position = position;
            self.tree.set_world_transform(key, &world);
        }
    }

    fn update_scripts(&mut self, frame: &FrameContext<'_>, errors: &mut Vec<RuntimeOperationError>) -> Vec<(Uuid, ScriptCommand)> {
        let mut commands = Vec::new();
        let scene_time = self.scene_time;

        for key in self.tree.keys() {
            let Some(entity) = self.tree.get_mut(key) else { continue };
            if entity.is_deleted() || entity.has_error(EntityFlags::SCRIPT_ERROR) {
                continue;
            }
            let Some(mut script) = entity.assets_mut().script.take() else { continue };

            let mut out = Vec::new();
            let result = run_frame_callbacks(entity, &mut script, frame, scene_time, &mut out);
            entity.assets_mut().script = Some(script);
            if let Err(e) = result {
                report_script_error(entity, e, errors);
            }
            commands.extend(out.into_iter().map(|c| (entity.uuid().clone(), c)));
        }

        if let Some(mut script) = self.input_script.take() {
            let target = self.focused_key().or_else(|| self.tree.root());
            if let Some(entity) = target.and_then(|k| self.tree.get_mut(k)) {
                let mut out = Vec::new();
                let mut result = Ok(());
                if !script.is_initialised() {
                    result = run_callback(entity, &mut script, ScriptCallback::Init, frame.delta, scene_time, &mut out);
                }
                if result.is_ok() {
                    let input = ScriptCallback::Input(frame.input);
                    result = run_callback(entity, &mut script, input, frame.delta, scene_time, &mut out);
                }
                commands.extend(out.into_iter().map(|c| (entity.uuid().clone(), c)));

                match result {
                    Ok(()) => self.input_script = Some(script),
                    Err(e) => {
                        log::error!("Scene {} input script disabled: {e}", self.name_and_uuid());
                        errors.push(RuntimeOperationError::Script {
                            entity: self.name_and_uuid(),
                            source: e,
                        });
                        script.release();
                    }
                }
            } else {
                self.input_script = Some(script);
            }
        }

        commands
    }

    fn process_events(&mut self, delta: f32, errors: &mut Vec<RuntimeOperationError>) -> Vec<(Uuid, ScriptCommand)> {
        let mut commands = Vec::new();
        let scene_time = self.scene_time;

        for key in self.tree.keys() {
            let Some(entity) = self.tree.get_mut(key) else { continue };
            if entity.is_deleted() || entity.events().is_empty() {
                continue;
            }
            let events = entity.events_mut().drain();
            if entity.has_error(EntityFlags::SCRIPT_ERROR) {
                continue;
            }
            let Some(mut script) = entity.assets_mut().script.take() else { continue };

            let mut out = Vec::new();
            let mut result = Ok(());
            for event in &events {
                result = run_callback(entity, &mut script, ScriptCallback::Event(event), delta, scene_time, &mut out);
                if result.is_err() {
                    break;
                }
            }
            entity.assets_mut().script = Some(script);
            if let Err(e) = result {
                report_script_error(entity, e, errors);
            }
            commands.extend(out.into_iter().map(|c| (entity.uuid().clone(), c)));
        }
        commands
    }

    fn apply_commands(&mut self, commands: Vec<(Uuid, ScriptCommand)>, errors: &mut Vec<RuntimeOperationError>) {
        for (sender, command) in commands {
            match command {
                ScriptCommand::SendEvent { target, event } => match self.tree.find_mut(&target) {
                    Some(entity) if !entity.is_deleted() => entity.push_event(event),
                    _ => log::warn!("Event from {sender} dropped: no live entity {target}"),
                },
                ScriptCommand::RemoveEntity(target) => {
                    if let Err(e) = self.remove_entity(&target) {
                        log::warn!("Remove requested by {sender} ignored: {e}");
                    }
                }
                ScriptCommand::StopScene => {
                    log::info!("Scene {} stop requested by {sender}", self.name_and_uuid());
                    self.request_stop();
                }
                ScriptCommand::ApplyCentralImpulse(v) => self.with_body(&sender, errors, |b| b.apply_central_impulse(v)),
                ScriptCommand::ApplyCentralForce(v) => self.with_body(&sender, errors, |b| b.apply_central_force(v)),
                ScriptCommand::SetLinearVelocity(v) => self.with_body(&sender, errors, |b| b.set_linear_velocity(v)),
                ScriptCommand::SetAngularVelocity(v) => self.with_body(&sender, errors, |b| b.set_angular_velocity(v)),
            }
        }
    }

    fn with_body<F: FnOnce(&PhysicsObjectRuntime)>(&mut self, entity: &Uuid, errors: &mut Vec<RuntimeOperationError>, apply: F) {
        let Some(entity) = self.tree.find_mut(entity) else { return };
        if entity.has_error(EntityFlags::PHYSICS_ERROR) {
            return;
        }
        match entity.assets().physics.as_ref().filter(|b| b.is_in_world()) {
            Some(body) => apply(body),
            None => {
                if entity.flag_error(EntityFlags::PHYSICS_ERROR) {
                    let error = RuntimeOperationError::Physics {
                        entity: entity.name_and_uuid(),
                        reason: "no physics body in the world".to_string(),
                    };
                    log::error!("{error}");
                    errors.push(error);
                }
            }
        }
    }

    fn update_physics(&mut self, frame: &FrameContext<'_>, errors: &mut Vec<RuntimeOperationError>) {
        let keys = self.tree.keys();

        for &key in &keys {
            let world = self.tree.world_transform(key);
            let Some(entity) = self.tree.get(key) else { continue };
            if entity.is_deleted() || entity.has_error(EntityFlags::PHYSICS_ERROR) {
                continue;
            }
            if let Some(body) = entity.assets().physics.as_ref().filter(|b| b.is_kinematic()) {
                body.set_body_transform(&world);
            }
        }

        let contacts = match step_world(frame) {
            Ok(contacts) => contacts,
            Err(e) => {
                log::error!("Scene {} physics step failed: {e}", self.name_and_uuid());
                errors.push(e);
                Vec::new()
            }
        };

        for &key in &keys {
            let Some(entity) = self.tree.get(key) else { continue };
            if entity.is_deleted() || entity.has_error(EntityFlags::PHYSICS_ERROR) {
                continue;
            }
            let Some(body) = entity
                .assets()
                .physics
                .as_ref()
                .filter(|b| b.is_dynamic())
                .and_then(PhysicsObjectRuntime::body_transform)
            else {
                continue;
            };
            let mut world = self.tree.world_transform(key);
            world.position = body.position;
            world.rotation = body.rotation;
            self.tree.set_world_transform(key, &world);
        }

        for contact in contacts {
            self.dispatch_contact(&contact);
        }
    }

    /// Queue a collision event on both participants
    fn dispatch_contact(&mut self, contact: &Contact) {
        let (Some(&a), Some(&b)) = (self.bodies.get(&contact.a), self.bodies.get(&contact.b)) else {
            log::trace!("Contact between unmapped bodies {:?} and {:?}", contact.a, contact.b);
            return;
        };
        let (Some(uuid_a), Some(uuid_b)) = (
            self.tree.get(a).map(|e| e.uuid().clone()),
            self.tree.get(b).map(|e| e.uuid().clone()),
        ) else {
            return;
        };
        let now = self.scene_time;
        if let Some(entity) = self.tree.get_mut(a).filter(|e| !e.is_deleted()) {
            entity.push_event(Event::collision(&uuid_b, contact.point, contact.normal, now));
        }
        if let Some(entity) = self.tree.get_mut(b).filter(|e| !e.is_deleted()) {
            entity.push_event(Event::collision(&uuid_a, contact.point, -contact.normal, now));
        }
    }

    fn update_camera(&mut self) {
        let Some(target) = self.camera.follow_target().and_then(|uuid| self.tree.key_of(uuid)) else {
            return;
        };
        let position = self.tree.world_transform(target).position;
        self.camera.track(position);
    }

    // ---------------------------------------------------------------------
    // Graphics
    // ---------------------------------------------------------------------

    /// Cull against the camera, build the draw queues in one tree walk and
    /// hand them to the renderer
    pub fn update_graphics(&mut self, graphics: &Arc<dyn GraphicsBackend>, renderer: &mut dyn Renderer) -> BackendResult<()> {
        if self.state != SceneState::Active {
            return Ok(());
        }
        self.queues.clear();
        let frustum = self.camera.frustum();

        for key in self.tree.keys() {
            self.queue_entity(key, &frustum);
        }
        self.queues.finish();
        self.recompile_shaders(graphics);

        renderer.render(&self.queues, &self.camera)
    }

    fn queue_entity(&mut self, key: EntityKey, frustum: &Frustum) {
        let Some(entity) = self.tree.get(key) else { return };
        if entity.is_deleted() {
            return;
        }
        let world = self.tree.world_transform(key);
        let assets = entity.assets();

        if let Some(light) = &assets.light {
            let settings = light.settings();
            self.queues.push_light(LightDraw {
                entity: entity.uuid().clone(),
                light_type: light.light_type(),
                position: world.position,
                direction: light.direction(&world),
                diffuse: Vec3::from(settings.diffuse),
                specular: Vec3::from(settings.specular),
                ambient: Vec3::from(settings.ambient),
            });
        }

        if entity.is_hidden() {
            return;
        }
        if !entity.always_draw() {
            if let Some(bounds) = self.tree.bounding_box(key) {
                if !self.camera.is_visible_in(frustum, &bounds) {
                    self.queues.record_culled();
                    return;
                }
            }
        }

        let matrix = world.to_matrix();
        if let Some(model) = &assets.model {
            let distance = self.camera.distance_to(world.position);
            for (mesh, id) in model.meshes().iter().zip(model.mesh_ids()) {
                let Some(material) = assets.material.as_ref().or(mesh.material.as_ref()) else {
                    continue;
                };
                self.queues.push_mesh(
                    material,
                    MeshDraw {
                        entity: entity.uuid().clone(),
                        mesh: id,
                        world: matrix,
                        distance,
                    },
                );
            }
        } else if let Some(texture) = &assets.texture {
            self.queues.push_sprite(SpriteDraw {
                entity: entity.uuid().clone(),
                texture: Arc::clone(texture),
                world: matrix,
            });
        }

        if let Some(font) = assets.font.as_ref().filter(|_| !entity.text().is_empty()) {
            self.queues.push_text(TextDraw {
                entity: entity.uuid().clone(),
                font: Arc::clone(font),
                text: entity.text().to_string(),
                world: matrix,
            });
        }
    }

    /// Rebuild programs flagged for recompilation. Runs on the graphics
    /// context thread, between queue construction and rendering.
    fn recompile_shaders(&mut self, graphics: &Arc<dyn GraphicsBackend>) {
        let pass_shaders = [&self.lighting_pass_shader, &self.shadow_pass_shader];
        for shader in pass_shaders.into_iter().flatten() {
            recompile(shader, graphics);
        }
        for batch in &mut self.queues.opaque {
            if let Some(shader) = batch.material.shader() {
                if shader.recompile_requested() {
                    recompile(shader, graphics);
                    batch.program = shader.program_id();
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Garbage collection
    // ---------------------------------------------------------------------

    /// Detach every entity flagged for deletion into the cleanup queue,
    /// then release them children first. Returns how many were removed.
    pub fn collect_garbage(&mut self) -> usize {
        let doomed: Vec<EntityKey> = self
            .tree
            .keys()
            .into_iter()
            .filter(|&key| {
                let Some(entity) = self.tree.get(key) else { return false };
                let parent_deleted = entity
                    .parent()
                    .and_then(|p| self.tree.get(p))
                    .is_some_and(EntityRuntime::is_deleted);
                entity.is_deleted() && !parent_deleted
            })
            .collect();

        for key in doomed {
            for entity in self.tree.remove_subtree(key) {
                if let Some(body) = entity.assets().physics.as_ref().and_then(PhysicsObjectRuntime::body_id) {
                    self.bodies.remove(&body);
                }
                self.cleanup_queue.push(entity);
            }
        }

        let removed = self.cleanup_queue.len();
        if removed > 0 {
            log::debug!("Scene {} collected {removed} entities", self.name_and_uuid());
        }
        self.release_cleanup_queue();
        removed
    }

    // ---------------------------------------------------------------------
    // Tree edits and lookups
    // ---------------------------------------------------------------------

    /// Flag an entity and its descendants for removal at the end of the
    /// frame. Removing the root stops the scene instead. Returns how many
    /// entities were newly flagged.
    pub fn remove_entity(&mut self, uuid: &Uuid) -> Result<usize, SceneError> {
        let key = self
            .tree
            .key_of(uuid)
            .ok_or_else(|| SceneError::UnknownEntity(uuid.clone()))?;
        if Some(key) == self.tree.root() {
            log::warn!("Removing the root of scene {} stops the scene", self.name_and_uuid());
            self.request_stop();
            return Ok(0);
        }
        Ok(self.tree.mark_subtree_deleted(key))
    }

    /// Add an entity definition subtree under `parent` and load its assets
    pub fn instantiate_entity(
        &mut self,
        parent: &Uuid,
        definition: &EntityDefinition,
        ctx: &LoadContext<'_>,
    ) -> Result<Uuid, SceneError> {
        let parent_key = self
            .tree
            .key_of(parent)
            .ok_or_else(|| SceneError::UnknownEntity(parent.clone()))?;
        let key = insert_definitions(&mut self.tree, Some(parent_key), definition)?;
        for k in self.tree.pre_order(key) {
            let _ = self.load_entity_assets(k, ctx);
        }
        log::debug!("Instantiated {} under {parent}", definition.uuid());
        Ok(definition.uuid())
    }

    /// Ask for the scene to stop after this frame
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Whether a stop has been requested
    pub const fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Entity by UUID
    pub fn entity(&self, uuid: &Uuid) -> Option<&EntityRuntime> {
        self.tree.find(uuid)
    }

    /// Entity by UUID, for mutation
    pub fn entity_mut(&mut self, uuid: &Uuid) -> Option<&mut EntityRuntime> {
        self.tree.find_mut(uuid)
    }

    /// First entity with this name, in pre-order
    pub fn entity_by_name(&self, name: &str) -> Option<&EntityRuntime> {
        self.tree.find_by_name(name).and_then(|k| self.tree.get(k))
    }

    /// Root entity
    pub fn root(&self) -> Option<&EntityRuntime> {
        self.tree.root().and_then(|k| self.tree.get(k))
    }

    /// Number of live entities
    pub fn count_entities(&self) -> usize {
        self.tree.len()
    }

    /// Number of descendants of an entity
    pub fn count_children(&self, uuid: &Uuid) -> Option<usize> {
        self.tree.key_of(uuid).map(|k| self.tree.count_descendants(k))
    }

    /// UUIDs of entities holding a runtime built from this asset definition
    pub fn entities_using(&self, definition: &Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        self.tree.apply_to_all(|_, entity| {
            if entity.assets().holds(definition) {
                out.push(entity.uuid().clone());
            }
        });
        out
    }

    fn focused_key(&self) -> Option<EntityKey> {
        self.tree
            .find_map(|key, entity| (entity.has_focus() && !entity.is_deleted()).then_some(key))
    }

    /// The entity with input focus
    pub fn focused_entity(&self) -> Option<&EntityRuntime> {
        self.focused_key().and_then(|k| self.tree.get(k))
    }

    /// Closest entity to the camera, ignoring the root and the focused entity
    pub fn nearest_to_camera(&self) -> Option<&EntityRuntime> {
        let root = self.tree.root();
        let focused = self.focused_key();
        self.tree
            .keys()
            .into_iter()
            .filter(|&k| Some(k) != root && Some(k) != focused)
            .filter(|&k| self.tree.get(k).is_some_and(|e| !e.is_deleted()))
            .map(|k| (k, self.camera.distance_to(self.tree.world_transform(k).position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .and_then(|(k, _)| self.tree.get(k))
    }

    /// World transform of an entity
    pub fn world_transform(&self, uuid: &Uuid) -> Option<Transform> {
        self.tree.key_of(uuid).map(|k| self.tree.world_transform(k))
    }

    /// Log the entity tree, indented by depth
    pub fn show_scenegraph(&self) {
        log::debug!("Scene graph of {}", self.name_and_uuid());
        self.tree.apply_to_all(|key, entity| {
            let indent = "  ".repeat(self.tree.depth(key) + 1);
            log::debug!(
                "{indent}{} [{} assets{}]",
                entity.name_and_uuid(),
                entity.assets().count(),
                if entity.is_deleted() { ", deleted" } else { "" }
            );
        });
    }

    /// Scene UUID
    pub const fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name (uuid)`, for logs
    pub fn name_and_uuid(&self) -> String {
        format!("{} ({})", self.name, self.uuid)
    }

    /// Lifecycle state
    pub const fn state(&self) -> SceneState {
        self.state
    }

    /// The entity tree
    pub const fn tree(&self) -> &EntityTree {
        &self.tree
    }

    /// The entity tree, for mutation
    pub fn tree_mut(&mut self) -> &mut EntityTree {
        &mut self.tree
    }

    /// Active camera
    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Active camera, for mutation
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Background colour
    pub const fn clear_colour(&self) -> [f32; 3] {
        self.clear_colour
    }

    /// Gravity applied to the physics world
    pub const fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// Lighting pass shader, when the scene sets one and it loaded
    pub const fn lighting_pass_shader(&self) -> Option<&Arc<ShaderRuntime>> {
        self.lighting_pass_shader.as_ref()
    }

    /// Shadow pass shader, when the scene sets one and it loaded
    pub const fn shadow_pass_shader(&self) -> Option<&Arc<ShaderRuntime>> {
        self.shadow_pass_shader.as_ref()
    }

    /// Draw queues built by the last graphics update
    pub const fn queues(&self) -> &DrawQueues {
        &self.queues
    }

    /// Entity owning a physics body
    pub fn entity_for_body(&self, body: BodyId) -> Option<&EntityRuntime> {
        self.bodies.get(&body).and_then(|&k| self.tree.get(k))
    }

    /// Seconds of scene time simulated so far
    pub const fn scene_time(&self) -> f64 {
        self.scene_time
    }

    /// Wall clock time the scene became active
    pub const fn start_time(&self) -> Option<SystemTime> {
        self.started_at
    }

    /// Logic frames run so far
    pub const fn frame_count(&self) -> u64 {
        self.frames
    }

    /// The definition this scene was built from
    pub const fn definition(&self) -> &SceneDefinition {
        &self.definition
    }
}

impl Drop for SceneRuntime {
    fn drop(&mut self) {
        if self.state != SceneState::Destroyed {
            self.teardown();
        }
    }
}

/// Insert an entity definition and its descendants depth-first. A child
/// that cannot be inserted is logged and skipped with its subtree.
fn insert_definitions(tree: &mut EntityTree, parent: Option<EntityKey>, definition: &EntityDefinition) -> Result<EntityKey, TreeError> {
    let entity = EntityRuntime::from_definition(definition);
    let top = match parent {
        Some(parent) => tree.add_child(parent, entity)?,
        None => tree.insert_root(entity)?,
    };

    let mut stack: Vec<(EntityKey, &EntityDefinition)> =
        definition.children().iter().rev().map(|c| (top, c)).collect();
    while let Some((parent, child)) = stack.pop() {
        match tree.add_child(parent, EntityRuntime::from_definition(child)) {
            Ok(key) => stack.extend(child.children().iter().rev().map(|c| (key, c))),
            Err(e) => log::error!("Skipping entity {} ({}) and its children: {e}", child.name(), child.uuid()),
        }
    }
    Ok(top)
}

/// Build the runtime for one asset definition and attach it. Shared kinds
/// come from their cache, discrete kinds are built for this entity alone.
/// Returns the body id when a physics object was added to the world.
fn attach_asset(
    assets: &mut EntityAssets,
    definition: Arc<AssetDefinition>,
    entity: &Uuid,
    ctx: &LoadContext<'_>,
    world: &Transform,
) -> Result<Option<BodyId>, ConstructionError> {
    let caches = ctx.caches;
    match definition.asset_type() {
        AssetType::Audio => {
            let runtime = caches.audio.try_get_runtime(&definition, ctx)?;
            assets.attach_shared(definition.uuid(), runtime, |a| &mut a.audio);
        }
        AssetType::Font => {
            let runtime = caches.fonts.try_get_runtime(&definition, ctx)?;
            assets.attach_shared(definition.uuid(), runtime, |a| &mut a.font);
        }
        AssetType::Material => {
            let runtime = caches.materials.try_get_runtime(&definition, ctx)?;
            assets.attach_shared(definition.uuid(), runtime, |a| &mut a.material);
        }
        AssetType::Model => {
            let runtime = caches.models.try_get_runtime(&definition, ctx)?;
            assets.attach_shared(definition.uuid(), runtime, |a| &mut a.model);
        }
        AssetType::Shader => {
            let runtime = caches.shaders.try_get_runtime(&definition, ctx)?;
            assets.attach_shared(definition.uuid(), runtime, |a| &mut a.shader);
        }
        AssetType::Texture => {
            let runtime = caches.textures.try_get_runtime(&definition, ctx)?;
            assets.attach_shared(definition.uuid(), runtime, |a| &mut a.texture);
        }
        AssetType::Animation => assets.animation = Some(load_discrete(definition, entity, ctx, world)?),
        AssetType::Light => assets.light = Some(load_discrete(definition, entity, ctx, world)?),
        AssetType::Path => assets.path = Some(load_discrete(definition, entity, ctx, world)?),
        AssetType::Script => {
            let script: ScriptRuntime = load_discrete(definition, entity, ctx, world)?;
            if let Some(mut previous) = assets.script.replace(script) {
                previous.release();
            }
        }
        AssetType::PhysicsObject => {
            let body: PhysicsObjectRuntime = load_discrete(definition, entity, ctx, world)?;
            body.add_to_world()?;
            let id = body.body_id();
            if let Some(previous) = assets.physics.replace(body) {
                previous.release();
            }
            return Ok(id);
        }
    }
    Ok(None)
}

fn run_callback(
    entity: &mut EntityRuntime,
    script: &mut ScriptRuntime,
    callback: ScriptCallback<'_>,
    delta: f32,
    scene_time: f64,
    commands: &mut Vec<ScriptCommand>,
) -> Result<(), ScriptError> {
    let uuid = entity.uuid().clone();
    let name = entity.name().to_string();
    let mut ctx = ScriptContext::new(&uuid, &name, entity.transform_mut(), delta, scene_time, commands);
    script.call(callback, &mut ctx)
}

/// `on_init` once, then `on_update`, then `on_input` while focused
fn run_frame_callbacks(
    entity: &mut EntityRuntime,
    script: &mut ScriptRuntime,
    frame: &FrameContext<'_>,
    scene_time: f64,
    commands: &mut Vec<ScriptCommand>,
) -> Result<(), ScriptError> {
    if !script.is_initialised() {
        run_callback(entity, script, ScriptCallback::Init, frame.delta, scene_time, commands)?;
    }
    run_callback(entity, script, ScriptCallback::Update, frame.delta, scene_time, commands)?;
    if entity.has_focus() {
        run_callback(entity, script, ScriptCallback::Input(frame.input), frame.delta, scene_time, commands)?;
    }
    Ok(())
}

fn report_script_error(entity: &mut EntityRuntime, error: ScriptError, errors: &mut Vec<RuntimeOperationError>) {
    if entity.flag_error(EntityFlags::SCRIPT_ERROR) {
        let error = RuntimeOperationError::Script {
            entity: entity.name_and_uuid(),
            source: error,
        };
        log::error!("{error}");
        errors.push(error);
    }
}

/// Step the physics world on its worker when there is one
fn step_world(frame: &FrameContext<'_>) -> Result<Vec<Contact>, RuntimeOperationError> {
    let delta = frame.delta;
    match frame.tasks {
        Some(tasks) => {
            let world = Arc::clone(frame.load.physics);
            let contacts = tasks.run(Subsystem::Physics, "physics step", move || {
                let mut world = physics::lock(&world);
                world.step(delta);
                world.drain_contacts()
            })?;
            Ok(contacts)
        }
        None => {
            let mut world = physics::lock(frame.load.physics);
            world.step(delta);
            Ok(world.drain_contacts())
        }
    }
}

fn recompile(shader: &ShaderRuntime, graphics: &Arc<dyn GraphicsBackend>) {
    if !shader.recompile_requested() {
        return;
    }
    match shader.recompile(graphics) {
        Ok(()) => log::info!("Recompiled shader {}", shader.definition().describe()),
        Err(e) => log::error!("Shader {} failed to recompile: {e}", shader.definition().describe()),
    }
}
