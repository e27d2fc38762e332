//! Definition layer
//!
//! Definitions are the declarative half of the engine: serialized
//! documents describing projects, scenes, entities and assets. Each one
//! wraps a JSON object and exposes typed accessors over it.
//!
//! Reads are permissive: [`Definition::get`] yields the type's default when
//! a key is missing or malformed. Call sites that cannot work without a
//! field use [`Definition::try_get`] instead, which reports a
//! [`DefinitionError`]. Nothing is validated up front; problems surface
//! when a runtime tries to use the field.

pub mod asset;
pub mod entity;
pub mod project;
pub mod registry;
pub mod scene;

pub use asset::{
    AnimationDefinition, AssetDefinition, AssetView, AudioDefinition, CompoundChild,
    FontDefinition, KeyframeDefinition, LightDefinition, LightType, MaterialDefinition,
    MaterialMapping, ModelDefinition, PathDefinition, PhysicsObjectDefinition, ShaderDefinition,
};
pub use entity::EntityDefinition;
pub use project::ProjectDefinition;
pub use registry::UuidRegistry;
pub use scene::{CameraDefinition, SceneDefinition};

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::foundation::math::{Transform, TransformSpace, Vec3};
use crate::foundation::uuid::Uuid;

/// Keys shared by every definition document
pub mod keys {
    /// Stable identifier
    pub const UUID: &str = "uuid";
    /// Human readable label
    pub const NAME: &str = "name";
    /// Asset kind
    pub const TYPE: &str = "type";
    /// Sub-kind of an asset, also the asset's file name on disk
    pub const FORMAT: &str = "format";
}

/// Errors raised while reading or mutating definitions
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// A field the caller requires is absent
    #[error("{owner}: required field '{key}' is missing")]
    Missing {
        /// Definition the field belongs to
        owner: String,
        /// Field name
        key: String,
    },

    /// A field is present but has the wrong shape
    #[error("{owner}: field '{key}' is malformed: {reason}")]
    Malformed {
        /// Definition the field belongs to
        owner: String,
        /// Field name
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Attempt to change a field that is fixed after creation
    #[error("{owner}: field '{key}' cannot be changed once assigned")]
    Immutable {
        /// Definition the field belongs to
        owner: String,
        /// Field name
        key: &'static str,
    },

    /// The `type` field names no known asset kind
    #[error("unknown asset type '{0}'")]
    UnknownAssetType(String),

    /// A view was requested for the wrong kind of asset
    #[error("{owner} is a {found} asset, not {expected}")]
    WrongType {
        /// Definition the view was requested on
        owner: String,
        /// Kind the view expects
        expected: AssetType,
        /// Kind of the definition
        found: AssetType,
    },

    /// A UUID is already in use within the project
    #[error("uuid {0} is already in use")]
    DuplicateUuid(Uuid),

    /// A UUID is blank
    #[error("'{0}' is not a usable uuid")]
    InvalidUuid(String),

    /// The backing document is not a JSON object
    #[error("{0} document must be a JSON object")]
    NotAnObject(DefinitionType),
}

/// Kinds of asset a project can define
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetType {
    /// Keyframed transform animation (discrete)
    Animation,
    /// Audio buffer (shared)
    Audio,
    /// Font face (shared)
    Font,
    /// Light source (discrete)
    Light,
    /// Surface material (shared)
    Material,
    /// Mesh geometry (shared)
    Model,
    /// Control-point path (discrete)
    Path,
    /// Rigid body and collision shape (discrete)
    PhysicsObject,
    /// Entity behaviour script (discrete)
    Script,
    /// Shader program (shared)
    Shader,
    /// Image texture (shared)
    Texture,
}

impl AssetType {
    /// Every asset type, in serialization order
    pub const ALL: [Self; 11] = [
        Self::Animation,
        Self::Audio,
        Self::Font,
        Self::Light,
        Self::Material,
        Self::Model,
        Self::Path,
        Self::PhysicsObject,
        Self::Script,
        Self::Shader,
        Self::Texture,
    ];

    /// Serialized name, also used as the asset's directory name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Animation => "animation",
            Self::Audio => "audio",
            Self::Font => "font",
            Self::Light => "light",
            Self::Material => "material",
            Self::Model => "model",
            Self::Path => "path",
            Self::PhysicsObject => "physicsObject",
            Self::Script => "script",
            Self::Shader => "shader",
            Self::Texture => "texture",
        }
    }

    /// Whether runtimes of this type live in a cache and are shared by entities
    pub const fn is_shared(self) -> bool {
        match self {
            Self::Audio | Self::Font | Self::Material | Self::Model | Self::Shader | Self::Texture => {
                true
            }
            Self::Animation | Self::Light | Self::Path | Self::PhysicsObject | Self::Script => false,
        }
    }

    /// Format given to newly created definitions of this type
    pub const fn default_format(self) -> &'static str {
        match self {
            Self::Animation => "keyframe",
            Self::Audio => "ogg",
            Self::Font => "ttf",
            Self::Light => "point",
            Self::Material => "standard",
            Self::Model => "obj",
            Self::Path => "linear",
            Self::PhysicsObject => "btBoxShape",
            Self::Script => "native",
            Self::Shader => "glsl",
            Self::Texture => "png",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DefinitionError::UnknownAssetType(s.to_string()))
    }
}

/// Kind of document a [`Definition`] wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionType {
    /// An asset of the given kind
    Asset(AssetType),
    /// Scene graph node
    Entity,
    /// Scene
    Scene,
    /// Project
    Project,
}

impl fmt::Display for DefinitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset(kind) => write!(f, "{kind}"),
            Self::Entity => f.write_str("entity"),
            Self::Scene => f.write_str("scene"),
            Self::Project => f.write_str("project"),
        }
    }
}

/// A UUID-identified document with typed accessors
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    kind: DefinitionType,
    json: Map<String, Value>,
}

impl Definition {
    /// Wrap a JSON object. No fields are validated.
    pub fn new(kind: DefinitionType, json: Value) -> Result<Self, DefinitionError> {
        match json {
            Value::Object(json) => Ok(Self { kind, json }),
            _ => Err(DefinitionError::NotAnObject(kind)),
        }
    }

    /// An empty document carrying only identity fields
    pub fn with_identity(kind: DefinitionType, uuid: &Uuid, name: &str) -> Self {
        let mut json = Map::new();
        json.insert(keys::UUID.to_string(), Value::String(uuid.to_string()));
        json.insert(keys::NAME.to_string(), Value::String(name.to_string()));
        Self { kind, json }
    }

    /// Kind of document
    pub const fn kind(&self) -> DefinitionType {
        self.kind
    }

    /// Identifier, empty when unassigned
    pub fn uuid(&self) -> Uuid {
        self.get(keys::UUID)
    }

    /// Human label
    pub fn name(&self) -> String {
        self.get(keys::NAME)
    }

    /// Sub-kind string
    pub fn format(&self) -> String {
        self.get(keys::FORMAT)
    }

    /// Whether this definition carries `uuid`
    pub fn has_uuid(&self, uuid: &str) -> bool {
        self.json.get(keys::UUID).and_then(Value::as_str) == Some(uuid)
    }

    /// Whether this definition is labelled `name`
    pub fn has_name(&self, name: &str) -> bool {
        self.json.get(keys::NAME).and_then(Value::as_str) == Some(name)
    }

    /// `[name : uuid]`, used in log messages
    pub fn name_and_uuid(&self) -> String {
        format!("[{} : {}]", self.name(), self.uuid())
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.json.contains_key(key)
    }

    /// Permissive read: missing or malformed values yield `T::default()`
    pub fn get<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get_or(key, T::default())
    }

    /// Permissive read with an explicit fallback
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.json.get(key) {
            Some(Value::Null) | None => fallback,
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                log::warn!("{} field '{key}' ignored: {e}", self.name_and_uuid());
                fallback
            }),
        }
    }

    /// Strict read for fields the caller cannot do without
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<T, DefinitionError> {
        self.optional(key)?.ok_or_else(|| DefinitionError::Missing {
            owner: self.name_and_uuid(),
            key: key.to_string(),
        })
    }

    /// Read a field that may be absent but must be well formed when present
    pub fn optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DefinitionError> {
        match self.json.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                DefinitionError::Malformed {
                    owner: self.name_and_uuid(),
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Write a field into the document.
    ///
    /// `uuid` can only be written while unassigned and `type` only while
    /// absent.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), DefinitionError> {
        if key == keys::UUID && self.uuid().is_valid() {
            return Err(DefinitionError::Immutable {
                owner: self.name_and_uuid(),
                key: keys::UUID,
            });
        }
        if key == keys::TYPE && self.json.contains_key(keys::TYPE) {
            return Err(DefinitionError::Immutable {
                owner: self.name_and_uuid(),
                key: keys::TYPE,
            });
        }

        let value = serde_json::to_value(value).map_err(|e| DefinitionError::Malformed {
            owner: self.name_and_uuid(),
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.json.insert(key.to_string(), value);
        Ok(())
    }

    /// Rename the definition
    pub fn set_name(&mut self, name: &str) {
        self.json
            .insert(keys::NAME.to_string(), Value::String(name.to_string()));
    }

    /// Remove a field, returning its old value. Identity fields are kept.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if key == keys::UUID || key == keys::TYPE {
            return None;
        }
        self.json.remove(key)
    }

    /// Deserialize the whole document into a typed view
    pub(crate) fn view<V: DeserializeOwned>(&self) -> Result<V, DefinitionError> {
        serde_json::from_value(Value::Object(self.json.clone())).map_err(|e| {
            DefinitionError::Malformed {
                owner: self.name_and_uuid(),
                key: self.kind.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Write a field without the identity checks, for freshly built documents
    pub(crate) fn insert_raw(&mut self, key: &str, value: Value) {
        self.json.insert(key.to_string(), value);
    }

    /// Remove and return a field including structural ones, for container parsing
    pub(crate) fn take_raw(&mut self, key: &str) -> Option<Value> {
        self.json.remove(key)
    }

    /// Borrow the backing document
    pub const fn json(&self) -> &Map<String, Value> {
        &self.json
    }

    /// Serialize back to a document
    pub fn to_json(&self) -> Value {
        Value::Object(self.json.clone())
    }
}

/// `{ "x": .., "y": .., "z": .. }` as stored in documents
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonVec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl JsonVec3 {
    /// Construct from components
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// All components set to one
    pub const fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

impl From<JsonVec3> for Vec3 {
    fn from(v: JsonVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Vec3> for JsonVec3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Serialized transform of an entity, camera or compound child.
///
/// Rotation is stored as Euler angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformDefinition {
    /// Whether the transform is relative to the parent
    #[serde(rename = "type")]
    pub space: TransformSpace,
    /// Translation
    pub translation: JsonVec3,
    /// Euler rotation in degrees
    pub rotation: JsonVec3,
    /// Scale
    pub scale: JsonVec3,
}

impl Default for TransformDefinition {
    fn default() -> Self {
        Self {
            space: TransformSpace::Offset,
            translation: JsonVec3::default(),
            rotation: JsonVec3::default(),
            scale: JsonVec3::one(),
        }
    }
}

impl TransformDefinition {
    /// Build the runtime transform
    pub fn to_transform(&self) -> Transform {
        Transform {
            position: self.translation.into(),
            rotation: Transform::rotation_from_euler_degrees(self.rotation.into()),
            scale: self.scale.into(),
        }
    }

    /// Capture a runtime transform
    pub fn from_transform(transform: &Transform, space: TransformSpace) -> Self {
        Self {
            space,
            translation: transform.position.into(),
            rotation: transform.euler_degrees().into(),
            scale: transform.scale.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn texture() -> Definition {
        Definition::new(
            DefinitionType::Asset(AssetType::Texture),
            json!({ "uuid": "t1", "name": "Bricks", "type": "texture", "format": "png", "mass": "heavy" }),
        )
        .unwrap()
    }

    #[test]
    fn test_identity_accessors() {
        let def = texture();
        assert_eq!(def.uuid(), Uuid::new("t1"));
        assert_eq!(def.name(), "Bricks");
        assert_eq!(def.format(), "png");
        assert!(def.has_uuid("t1"));
        assert!(def.has_name("Bricks"));
        assert!(!def.has_name("Stone"));
        assert_eq!(def.name_and_uuid(), "[Bricks : t1]");
    }

    #[test]
    fn test_permissive_and_strict_reads() {
        let def = texture();
        assert_eq!(def.get::<f32>("radius"), 0.0);
        assert_eq!(def.get::<f32>("mass"), 0.0);
        assert_eq!(def.get_or::<f32>("radius", 2.5), 2.5);
        assert!(matches!(def.try_get::<f32>("radius"), Err(DefinitionError::Missing { .. })));
        assert!(matches!(def.try_get::<f32>("mass"), Err(DefinitionError::Malformed { .. })));
        assert_eq!(def.optional::<f32>("radius").unwrap(), None);
    }

    #[test]
    fn test_uuid_and_type_are_immutable() {
        let mut def = texture();
        assert!(matches!(
            def.set(keys::UUID, "other"),
            Err(DefinitionError::Immutable { key: "uuid", .. })
        ));
        assert!(matches!(
            def.set(keys::TYPE, "model"),
            Err(DefinitionError::Immutable { key: "type", .. })
        ));
        assert!(def.remove(keys::UUID).is_none());
        assert_eq!(def.uuid(), Uuid::new("t1"));
    }

    #[test]
    fn test_set_writes_through() {
        let mut def = texture();
        def.set("radius", 4.0_f32).unwrap();
        assert_eq!(def.try_get::<f32>("radius").unwrap(), 4.0);
        def.set_name("Stone");
        assert!(def.has_name("Stone"));
        assert_eq!(def.to_json()["radius"], json!(4.0));
    }

    #[test]
    fn test_unassigned_uuid_can_be_set_once() {
        let mut def = Definition::new(DefinitionType::Entity, json!({ "name": "E" })).unwrap();
        assert!(!def.uuid().is_valid());
        def.set(keys::UUID, "e1").unwrap();
        assert!(def.set(keys::UUID, "e2").is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            Definition::new(DefinitionType::Scene, json!([1, 2])),
            Err(DefinitionError::NotAnObject(DefinitionType::Scene))
        ));
    }

    #[test]
    fn test_asset_type_strings() {
        for kind in AssetType::ALL {
            assert_eq!(kind.as_str().parse::<AssetType>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
        assert!("PhysicsObject".parse::<AssetType>().is_ok());
        assert!(matches!(
            "sprite".parse::<AssetType>(),
            Err(DefinitionError::UnknownAssetType(_))
        ));
    }

    #[test]
    fn test_transform_definition_defaults() {
        let def: TransformDefinition =
            serde_json::from_value(json!({ "translation": { "x": 1.0 } })).unwrap();
        assert_eq!(def.space, TransformSpace::Offset);
        let transform = def.to_transform();
        assert_eq!(transform.position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(transform.scale, Vec3::new(1.0, 1.0, 1.0));

        let absolute: TransformDefinition =
            serde_json::from_value(json!({ "type": "absolute" })).unwrap();
        assert_eq!(absolute.space, TransformSpace::Absolute);
    }
}
