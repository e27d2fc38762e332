//! Asset definitions and their typed views

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{keys, AssetType, Definition, DefinitionError, DefinitionType, JsonVec3, TransformDefinition};
use crate::foundation::uuid::Uuid;

/// Definition of one asset: identity, kind, format and kind-specific fields
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDefinition {
    definition: Definition,
    asset_type: AssetType,
    uuid: Uuid,
}

impl AssetDefinition {
    /// Parse an asset document. `uuid` and `type` are required since caches
    /// and construction dispatch depend on them.
    pub fn from_json(json: Value) -> Result<Self, DefinitionError> {
        let type_name = json
            .get(keys::TYPE)
            .and_then(Value::as_str)
            .ok_or_else(|| DefinitionError::Missing {
                owner: describe_raw(&json),
                key: keys::TYPE.to_string(),
            })?;
        let asset_type: AssetType = type_name.parse()?;
        let definition = Definition::new(DefinitionType::Asset(asset_type), json)?;
        let uuid = definition.uuid();
        super::UuidRegistry::validate(&uuid)?;

        Ok(Self {
            definition,
            asset_type,
            uuid,
        })
    }

    /// Create a definition with the type's default format
    pub fn new(asset_type: AssetType, uuid: Uuid, name: &str) -> Self {
        let mut definition =
            Definition::with_identity(DefinitionType::Asset(asset_type), &uuid, name);
        definition.insert_raw(keys::TYPE, json!(asset_type.as_str()));
        definition.insert_raw(keys::FORMAT, json!(asset_type.default_format()));

        Self {
            definition,
            asset_type,
            uuid,
        }
    }

    /// Kind of asset
    pub const fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    /// Identifier
    pub const fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Human label
    pub fn name(&self) -> String {
        self.definition.name()
    }

    /// Sub-kind string
    pub fn format(&self) -> String {
        self.definition.format()
    }

    /// Change the sub-kind
    pub fn set_format(&mut self, format: &str) {
        if let Err(e) = self.definition.set(keys::FORMAT, format) {
            log::error!("{e}");
        }
    }

    /// Underlying document
    pub const fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Underlying document for mutation; identity fields stay protected
    pub fn definition_mut(&mut self) -> &mut Definition {
        &mut self.definition
    }

    /// `[type name : uuid (format)]`, used in log messages
    pub fn describe(&self) -> String {
        format!(
            "[{} {} : {} ({})]",
            self.asset_type,
            self.name(),
            self.uuid,
            self.format()
        )
    }

    /// Typed view over the kind-specific fields
    pub fn view<V: AssetView>(&self) -> Result<V, DefinitionError> {
        if self.asset_type != V::ASSET_TYPE {
            return Err(DefinitionError::WrongType {
                owner: self.describe(),
                expected: V::ASSET_TYPE,
                found: self.asset_type,
            });
        }
        self.definition.view()
    }

    /// Serialize back to a document
    pub fn to_json(&self) -> Value {
        self.definition.to_json()
    }
}

fn describe_raw(json: &Value) -> String {
    format!(
        "[{} : {}]",
        json.get(keys::NAME).and_then(Value::as_str).unwrap_or_default(),
        json.get(keys::UUID).and_then(Value::as_str).unwrap_or_default()
    )
}

/// Typed reading of one asset kind's fields
pub trait AssetView: DeserializeOwned {
    /// Kind of asset the view applies to
    const ASSET_TYPE: AssetType;
}

fn filter_valid(uuid: Option<&Uuid>) -> Option<&Uuid> {
    uuid.filter(|u| u.is_valid())
}

/// Shader stage sources within the asset directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShaderDefinition {
    /// Vertex stage file name
    pub vertex_file: String,
    /// Fragment stage file name
    pub fragment_file: String,
}

impl Default for ShaderDefinition {
    fn default() -> Self {
        Self {
            vertex_file: "vertex.glsl".to_string(),
            fragment_file: "fragment.glsl".to_string(),
        }
    }
}

impl AssetView for ShaderDefinition {
    const ASSET_TYPE: AssetType = AssetType::Shader;
}

/// Material: a mandatory shader, optional texture slots and colours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterialDefinition {
    /// Shader program, required
    pub shader: Option<Uuid>,
    /// Diffuse texture slot
    pub diffuse_texture: Option<Uuid>,
    /// Specular texture slot
    pub specular_texture: Option<Uuid>,
    /// Normal map slot
    pub normal_texture: Option<Uuid>,
    /// Displacement map slot
    pub displacement_texture: Option<Uuid>,
    /// Diffuse colour
    pub diffuse_colour: [f32; 3],
    /// Specular colour
    pub specular_colour: [f32; 3],
    /// Ambient colour
    pub ambient_colour: [f32; 3],
    /// Specular exponent
    pub shininess: f32,
}

impl Default for MaterialDefinition {
    fn default() -> Self {
        Self {
            shader: None,
            diffuse_texture: None,
            specular_texture: None,
            normal_texture: None,
            displacement_texture: None,
            diffuse_colour: [1.0, 1.0, 1.0],
            specular_colour: [0.0, 0.0, 0.0],
            ambient_colour: [0.0, 0.0, 0.0],
            shininess: 32.0,
        }
    }
}

impl MaterialDefinition {
    /// Assigned shader, ignoring blank references
    pub fn shader(&self) -> Option<&Uuid> {
        filter_valid(self.shader.as_ref())
    }

    /// Texture slots in binding order, blank references removed
    pub fn texture_slots(&self) -> [(&'static str, Option<&Uuid>); 4] {
        [
            ("diffuse", filter_valid(self.diffuse_texture.as_ref())),
            ("specular", filter_valid(self.specular_texture.as_ref())),
            ("normal", filter_valid(self.normal_texture.as_ref())),
            ("displacement", filter_valid(self.displacement_texture.as_ref())),
        ]
    }
}

impl AssetView for MaterialDefinition {
    const ASSET_TYPE: AssetType = AssetType::Material;
}

/// Maps a material name inside model data to a material asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialMapping {
    /// Material name as written in the model file
    pub from: String,
    /// Material asset to bind
    pub to: Uuid,
}

/// Model geometry settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelDefinition {
    /// Material bindings for named mesh materials
    pub material_map: Vec<MaterialMapping>,
}

impl ModelDefinition {
    /// Material asset bound to a mesh material name
    pub fn material_for(&self, name: &str) -> Option<&Uuid> {
        self.material_map
            .iter()
            .find(|m| m.from == name)
            .map(|m| &m.to)
            .filter(|u| u.is_valid())
    }
}

impl AssetView for ModelDefinition {
    const ASSET_TYPE: AssetType = AssetType::Model;
}

/// Child shape of a compound physics object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundChild {
    /// Physics object definition supplying the child shape
    pub uuid: Uuid,
    /// Child offset within the compound
    #[serde(default)]
    pub transform: TransformDefinition,
}

/// Rigid body and collision shape settings. The format selects the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhysicsObjectDefinition {
    /// Body mass; zero makes a static body
    pub mass: f32,
    /// Collision margin
    pub margin: f32,
    /// Sphere and capsule radius
    pub radius: f32,
    /// Box and cylinder half extents
    pub half_extents: JsonVec3,
    /// Capsule height
    pub height: f32,
    /// Static plane normal
    pub normal: JsonVec3,
    /// Static plane constant
    pub constant: f32,
    /// Body follows its entity instead of simulating
    pub kinematic: bool,
    /// Body is a player controlled character
    pub controllable_character: bool,
    /// Bounciness
    pub restitution: f32,
    /// Friction coefficient
    pub friction: f32,
    /// Per-axis linear motion scale
    pub linear_factor: JsonVec3,
    /// Per-axis angular motion scale
    pub angular_factor: JsonVec3,
    /// Initial linear velocity
    pub linear_velocity: JsonVec3,
    /// Initial angular velocity
    pub angular_velocity: JsonVec3,
    /// Continuous collision detection sphere radius
    pub ccd_swept_sphere_radius: f32,
    /// Model providing triangle mesh collision data
    pub collision_model: Option<Uuid>,
    /// Children of a compound shape
    pub compound_children: Vec<CompoundChild>,
}

impl Default for PhysicsObjectDefinition {
    fn default() -> Self {
        Self {
            mass: 0.0,
            margin: 0.04,
            radius: 0.0,
            half_extents: JsonVec3::default(),
            height: 0.0,
            normal: JsonVec3::new(0.0, 1.0, 0.0),
            constant: 0.0,
            kinematic: false,
            controllable_character: false,
            restitution: 0.0,
            friction: 0.5,
            linear_factor: JsonVec3::one(),
            angular_factor: JsonVec3::one(),
            linear_velocity: JsonVec3::default(),
            angular_velocity: JsonVec3::default(),
            ccd_swept_sphere_radius: 0.0,
            collision_model: None,
            compound_children: Vec::new(),
        }
    }
}

impl PhysicsObjectDefinition {
    /// Collision model reference, ignoring blanks
    pub fn collision_model(&self) -> Option<&Uuid> {
        filter_valid(self.collision_model.as_ref())
    }
}

impl AssetView for PhysicsObjectDefinition {
    const ASSET_TYPE: AssetType = AssetType::PhysicsObject;
}

/// Audio playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioDefinition {
    /// Restart when finished
    pub looping: bool,
    /// Positioned at the owning entity
    pub spatial: bool,
    /// Gain
    pub volume: f32,
}

impl Default for AudioDefinition {
    fn default() -> Self {
        Self {
            looping: false,
            spatial: false,
            volume: 1.0,
        }
    }
}

impl AssetView for AudioDefinition {
    const ASSET_TYPE: AssetType = AssetType::Audio;
}

/// Font settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FontDefinition {
    /// Pixel size
    pub size: u32,
}

impl Default for FontDefinition {
    fn default() -> Self {
        Self { size: 24 }
    }
}

impl AssetView for FontDefinition {
    const ASSET_TYPE: AssetType = AssetType::Font;
}

/// Light source kind, taken from the light's format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Omnidirectional with attenuation
    Point,
    /// Parallel rays along the entity's forward axis
    Directional,
    /// Cone along the entity's forward axis
    Spot,
}

impl LightType {
    /// Parse a light format, `None` for unknown formats
    pub fn from_format(format: &str) -> Option<Self> {
        match format {
            "point" => Some(Self::Point),
            "directional" => Some(Self::Directional),
            "spot" | "spotlight" => Some(Self::Spot),
            _ => None,
        }
    }
}

/// Light colours and attenuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LightDefinition {
    /// Diffuse colour
    pub diffuse: [f32; 3],
    /// Specular colour
    pub specular: [f32; 3],
    /// Ambient colour
    pub ambient: [f32; 3],
    /// Constant attenuation term
    pub constant: f32,
    /// Linear attenuation term
    pub linear: f32,
    /// Quadratic attenuation term
    pub quadratic: f32,
    /// Spot cone half angle in degrees
    pub cut_off: f32,
}

impl Default for LightDefinition {
    fn default() -> Self {
        Self {
            diffuse: [1.0, 1.0, 1.0],
            specular: [1.0, 1.0, 1.0],
            ambient: [0.1, 0.1, 0.1],
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
            cut_off: 12.5,
        }
    }
}

impl AssetView for LightDefinition {
    const ASSET_TYPE: AssetType = AssetType::Light;
}

/// Control points an entity travels along
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathDefinition {
    /// Points in travel order
    pub control_points: Vec<JsonVec3>,
    /// Units per second
    pub velocity: f32,
    /// Return to the first point after the last
    pub wrap: bool,
}

impl Default for PathDefinition {
    fn default() -> Self {
        Self {
            control_points: Vec::new(),
            velocity: 1.0,
            wrap: false,
        }
    }
}

impl AssetView for PathDefinition {
    const ASSET_TYPE: AssetType = AssetType::Path;
}

/// One animation keyframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeDefinition {
    /// Seconds from the start of the animation
    pub time: f32,
    /// Entity transform at that time
    #[serde(default)]
    pub transform: TransformDefinition,
}

/// Keyframed transform animation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationDefinition {
    /// Keyframes, any order
    pub keyframes: Vec<KeyframeDefinition>,
    /// Restart after the last keyframe
    pub looping: bool,
}

impl AssetView for AnimationDefinition {
    const ASSET_TYPE: AssetType = AssetType::Animation;
}
