//! Entity runtimes
//!
//! An [`EntityRuntime`] is one live node of a scene's entity tree. It owns
//! its local transform, its discrete asset runtimes and its pending events,
//! and holds shared handles to cached runtimes. Parent and child links are
//! [`EntityKey`]s into the owning [`EntityTree`](super::tree::EntityTree).

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use super::bounds::AABB;
use crate::assets::{
    AnimationRuntime, AssetRuntime, AudioRuntime, FontRuntime, LightRuntime, MaterialRuntime, ModelRuntime,
    PathRuntime, ShaderRuntime, TextureRuntime,
};
use crate::definition::{AssetType, EntityDefinition};
use crate::events::{Event, EventQueue};
use crate::foundation::math::{Transform, TransformSpace, Vec3};
use crate::foundation::uuid::Uuid;
use crate::physics::object::PhysicsObjectRuntime;
use crate::scripting::runtime::ScriptRuntime;

slotmap::new_key_type! {
    /// Handle to an entity in its scene's tree
    pub struct EntityKey;
}

bitflags! {
    /// Entity status bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntityFlags: u16 {
        /// Asset attachments have been processed
        const LOADED = 1 << 0;
        /// Flagged for removal at the end of the frame
        const DELETED = 1 << 1;
        /// Receives input callbacks
        const HAS_FOCUS = 1 << 2;
        /// Not queued for drawing
        const HIDDEN = 1 << 3;
        /// Skips culling
        const ALWAYS_DRAW = 1 << 4;
        /// A script callback failed; the script no longer runs
        const SCRIPT_ERROR = 1 << 5;
        /// The physics body failed; it is no longer synchronised
        const PHYSICS_ERROR = 1 << 6;
        /// At least one asset failed to attach
        const ASSET_ERROR = 1 << 7;
    }
}

/// Runtimes attached to an entity, at most one per asset type
#[derive(Default)]
pub struct EntityAssets {
    /// Geometry
    pub model: Option<Arc<ModelRuntime>>,
    /// Material overriding the model's own materials
    pub material: Option<Arc<MaterialRuntime>>,
    /// Texture, drawn as a sprite when there is no model
    pub texture: Option<Arc<TextureRuntime>>,
    /// Shader referenced directly by the entity
    pub shader: Option<Arc<ShaderRuntime>>,
    /// Audio buffer
    pub audio: Option<Arc<AudioRuntime>>,
    /// Font for the entity's text
    pub font: Option<Arc<FontRuntime>>,
    /// Rigid body
    pub physics: Option<PhysicsObjectRuntime>,
    /// Behaviour script
    pub script: Option<ScriptRuntime>,
    /// Light source
    pub light: Option<LightRuntime>,
    /// Path to travel along
    pub path: Option<PathRuntime>,
    /// Keyframe animation
    pub animation: Option<AnimationRuntime>,
    /// Definition each shared runtime was requested under. A cache may hand
    /// back a runtime built from another definition with the same content.
    requested: HashMap<AssetType, Uuid>,
}

impl EntityAssets {
    /// Attach a shared runtime requested under `definition`
    pub fn attach_shared<T: AssetRuntime>(
        &mut self,
        definition: &Uuid,
        runtime: Arc<T>,
        slot: impl FnOnce(&mut Self) -> &mut Option<Arc<T>>,
    ) {
        let asset_type = runtime.definition().asset_type();
        *slot(self) = Some(runtime);
        self.requested.insert(asset_type, definition.clone());
    }

    /// Definition UUID the runtime attached for a type was requested under
    pub fn definition_uuid(&self, asset_type: AssetType) -> Option<&Uuid> {
        match asset_type {
            AssetType::Animation => self.animation.as_ref().map(AssetRuntime::uuid),
            AssetType::Audio => self.shared_uuid(asset_type, self.audio.as_deref()),
            AssetType::Font => self.shared_uuid(asset_type, self.font.as_deref()),
            AssetType::Light => self.light.as_ref().map(AssetRuntime::uuid),
            AssetType::Material => self.shared_uuid(asset_type, self.material.as_deref()),
            AssetType::Model => self.shared_uuid(asset_type, self.model.as_deref()),
            AssetType::Path => self.path.as_ref().map(AssetRuntime::uuid),
            AssetType::PhysicsObject => self.physics.as_ref().map(AssetRuntime::uuid),
            AssetType::Script => self.script.as_ref().map(AssetRuntime::uuid),
            AssetType::Shader => self.shared_uuid(asset_type, self.shader.as_deref()),
            AssetType::Texture => self.shared_uuid(asset_type, self.texture.as_deref()),
        }
    }

    fn shared_uuid<'a, T: AssetRuntime>(&'a self, asset_type: AssetType, runtime: Option<&'a T>) -> Option<&'a Uuid> {
        let runtime = runtime?;
        self.requested.get(&asset_type).or_else(|| Some(runtime.uuid()))
    }

    /// Whether a runtime of this type is attached
    pub fn has(&self, asset_type: AssetType) -> bool {
        self.definition_uuid(asset_type).is_some()
    }

    /// Whether any attached runtime was built from this definition
    pub fn holds(&self, definition: &Uuid) -> bool {
        AssetType::ALL
            .into_iter()
            .any(|t| self.definition_uuid(t) == Some(definition))
    }

    /// Number of attached runtimes
    pub fn count(&self) -> usize {
        AssetType::ALL.into_iter().filter(|&t| self.has(t)).count()
    }

    /// Release native resources of discrete runtimes and drop every
    /// attachment. Shared runtimes only lose this entity's reference.
    pub fn release(&mut self) {
        if let Some(physics) = self.physics.take() {
            physics.release();
        }
        if let Some(mut script) = self.script.take() {
            script.release();
        }
        self.light = None;
        self.path = None;
        self.animation = None;

        self.model = None;
        self.material = None;
        self.texture = None;
        self.shader = None;
        self.audio = None;
        self.font = None;
        self.requested.clear();
    }
}

/// A live scene graph node
pub struct EntityRuntime {
    uuid: Uuid,
    name: String,
    transform: Transform,
    space: TransformSpace,
    pub(super) parent: Option<EntityKey>,
    pub(super) children: Vec<EntityKey>,
    assets: EntityAssets,
    assets_to_load: Vec<Uuid>,
    flags: EntityFlags,
    events: EventQueue,
    text: String,
}

impl EntityRuntime {
    /// Create an unattached entity with an identity transform
    pub fn new(uuid: &Uuid, name: &str) -> Self {
        Self {
            uuid: uuid.clone(),
            name: name.to_string(),
            transform: Transform::identity(),
            space: TransformSpace::Offset,
            parent: None,
            children: Vec::new(),
            assets: EntityAssets::default(),
            assets_to_load: Vec::new(),
            flags: EntityFlags::empty(),
            events: EventQueue::new(),
            text: String::new(),
        }
    }

    /// First construction phase: copy identity, transform, flags and the
    /// asset list out of the definition. Nothing is loaded.
    pub fn from_definition(definition: &EntityDefinition) -> Self {
        let (transform, space) = definition.transform();
        let mut flags = EntityFlags::empty();
        flags.set(EntityFlags::HAS_FOCUS, definition.has_focus());
        flags.set(EntityFlags::HIDDEN, definition.hidden());
        flags.set(EntityFlags::ALWAYS_DRAW, definition.always_draw());

        Self {
            transform,
            space,
            flags,
            text: definition.text(),
            assets_to_load: definition.asset_uuids_to_load(),
            ..Self::new(&definition.uuid(), &definition.name())
        }
    }

    /// Identifier, mirroring the definition's
    pub const fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Human label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// `name` followed by the UUID, for logs
    pub fn name_and_uuid(&self) -> String {
        format!("{} ({})", self.name, self.uuid)
    }

    /// Local transform
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Local transform for mutation
    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Replace the local transform
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// How the local transform relates to the parent
    pub const fn space(&self) -> TransformSpace {
        self.space
    }

    /// Change how the local transform relates to the parent
    pub fn set_space(&mut self, space: TransformSpace) {
        self.space = space;
    }

    /// Parent, `None` for the root
    pub const fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[EntityKey] {
        &self.children
    }

    /// Attached runtimes
    pub const fn assets(&self) -> &EntityAssets {
        &self.assets
    }

    /// Attached runtimes for mutation
    pub fn assets_mut(&mut self) -> &mut EntityAssets {
        &mut self.assets
    }

    /// Asset definitions not yet attached
    pub fn assets_to_load(&self) -> &[Uuid] {
        &self.assets_to_load
    }

    /// Take the pending asset list, leaving it empty
    pub fn take_assets_to_load(&mut self) -> Vec<Uuid> {
        std::mem::take(&mut self.assets_to_load)
    }

    /// Queue an asset definition for attachment
    pub fn add_asset_to_load(&mut self, uuid: &Uuid) {
        if !self.assets_to_load.contains(uuid) {
            self.assets_to_load.push(uuid.clone());
        }
    }

    /// Status bits
    pub const fn flags(&self) -> EntityFlags {
        self.flags
    }

    /// Whether asset attachment has been processed
    pub const fn is_loaded(&self) -> bool {
        self.flags.contains(EntityFlags::LOADED)
    }

    /// Record that asset attachment has been processed
    pub fn set_loaded(&mut self) {
        self.flags.insert(EntityFlags::LOADED);
    }

    /// Whether the entity is flagged for removal
    pub const fn is_deleted(&self) -> bool {
        self.flags.contains(EntityFlags::DELETED)
    }

    /// Flag for removal at the end of the frame
    pub fn mark_deleted(&mut self) {
        self.flags.insert(EntityFlags::DELETED);
    }

    /// Whether the entity receives input
    pub const fn has_focus(&self) -> bool {
        self.flags.contains(EntityFlags::HAS_FOCUS)
    }

    /// Give or take input focus
    pub fn set_focus(&mut self, focus: bool) {
        self.flags.set(EntityFlags::HAS_FOCUS, focus);
    }

    /// Whether the entity is excluded from drawing
    pub const fn is_hidden(&self) -> bool {
        self.flags.contains(EntityFlags::HIDDEN)
    }

    /// Hide or show
    pub fn set_hidden(&mut self, hidden: bool) {
        self.flags.set(EntityFlags::HIDDEN, hidden);
    }

    /// Whether culling is skipped
    pub const fn always_draw(&self) -> bool {
        self.flags.contains(EntityFlags::ALWAYS_DRAW)
    }

    /// Set an error bit. Returns `true` the first time, so callers log once.
    pub fn flag_error(&mut self, flag: EntityFlags) -> bool {
        let first = !self.flags.contains(flag);
        self.flags.insert(flag);
        first
    }

    /// Whether an error bit is set
    pub const fn has_error(&self, flag: EntityFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Text drawn with the attached font
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text
    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    /// Pending events
    pub const fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Pending events for mutation
    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Queue an event
    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Local space bounds of what the entity draws. Derived on every call
    /// so a replaced model is picked up immediately.
    pub fn local_bounding_box(&self) -> Option<AABB> {
        if let Some(model) = &self.assets.model {
            return model.bounding_box();
        }
        if self.assets.texture.is_some() {
            return Some(AABB::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(0.5, 0.5, 0.0)));
        }
        None
    }
}
