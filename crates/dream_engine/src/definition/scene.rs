//! Scene definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Definition, DefinitionError, DefinitionType, EntityDefinition, TransformDefinition};
use crate::foundation::math::Vec3;
use crate::foundation::uuid::Uuid;

const ROOT: &str = "root";
const CAMERA: &str = "camera";
const CLEAR_COLOUR: &str = "clearColour";
const GRAVITY: &str = "gravity";
const MIN_DRAW_DISTANCE: &str = "minDrawDistance";
const MAX_DRAW_DISTANCE: &str = "maxDrawDistance";
const MESH_CULL_DISTANCE: &str = "meshCullDistance";
const LIGHTING_PASS_SHADER: &str = "lightingPassShader";
const SHADOW_PASS_SHADER: &str = "shadowPassShader";
const INPUT_SCRIPT: &str = "inputScript";

/// Initial camera placement and behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraDefinition {
    /// Initial camera transform
    pub transform: TransformDefinition,
    /// Free-fly speed in units per second
    pub movement_speed: f32,
    /// Vertical field of view in degrees
    pub field_of_view: f32,
    /// Entity the camera tracks, if any
    pub follow_entity: Option<Uuid>,
}

impl Default for CameraDefinition {
    fn default() -> Self {
        Self {
            transform: TransformDefinition::default(),
            movement_speed: 10.0,
            field_of_view: 45.0,
            follow_entity: None,
        }
    }
}

/// A scene: rendering parameters plus the root of its entity tree
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDefinition {
    definition: Definition,
    root: Option<EntityDefinition>,
}

impl SceneDefinition {
    /// Parse a scene document. A missing root is tolerated here and
    /// reported when the scene is instantiated.
    pub fn from_json(json: Value) -> Result<Self, DefinitionError> {
        let mut definition = Definition::new(DefinitionType::Scene, json)?;
        let root = match definition.take_raw(ROOT) {
            Some(Value::Null) | None => None,
            Some(root) => Some(EntityDefinition::from_json(root)?),
        };
        Ok(Self { definition, root })
    }

    /// Create a scene with an empty root entity
    pub fn new(uuid: &Uuid, name: &str, root_uuid: &Uuid) -> Self {
        Self {
            definition: Definition::with_identity(DefinitionType::Scene, uuid, name),
            root: Some(EntityDefinition::new(root_uuid, "Root")),
        }
    }

    /// Identifier
    pub fn uuid(&self) -> Uuid {
        self.definition.uuid()
    }

    /// Human label
    pub fn name(&self) -> String {
        self.definition.name()
    }

    /// Underlying document
    pub const fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Underlying document for mutation
    pub fn definition_mut(&mut self) -> &mut Definition {
        &mut self.definition
    }

    /// Root of the entity tree
    pub const fn root(&self) -> Option<&EntityDefinition> {
        self.root.as_ref()
    }

    /// Root of the entity tree, for mutation
    pub fn root_mut(&mut self) -> Option<&mut EntityDefinition> {
        self.root.as_mut()
    }

    /// Replace the root of the entity tree
    pub fn set_root(&mut self, root: EntityDefinition) {
        self.root = Some(root);
    }

    /// Camera settings
    pub fn camera(&self) -> CameraDefinition {
        self.definition.get(CAMERA)
    }

    /// Background colour
    pub fn clear_colour(&self) -> [f32; 3] {
        self.definition.get(CLEAR_COLOUR)
    }

    /// Gravity, when set
    pub fn gravity(&self) -> Option<Vec3> {
        self.definition
            .get::<Option<[f32; 3]>>(GRAVITY)
            .map(|[x, y, z]| Vec3::new(x, y, z))
    }

    /// Near clip distance, when set
    pub fn min_draw_distance(&self) -> Option<f32> {
        self.definition.get(MIN_DRAW_DISTANCE)
    }

    /// Far clip distance, when set
    pub fn max_draw_distance(&self) -> Option<f32> {
        self.definition.get(MAX_DRAW_DISTANCE)
    }

    /// Distance beyond which meshes are culled, when set
    pub fn mesh_cull_distance(&self) -> Option<f32> {
        self.definition.get(MESH_CULL_DISTANCE)
    }

    /// Shader used for the lighting pass
    pub fn lighting_pass_shader(&self) -> Option<Uuid> {
        self.uuid_field(LIGHTING_PASS_SHADER)
    }

    /// Shader used for the shadow pass
    pub fn shadow_pass_shader(&self) -> Option<Uuid> {
        self.uuid_field(SHADOW_PASS_SHADER)
    }

    /// Scene-level script receiving input
    pub fn input_script(&self) -> Option<Uuid> {
        self.uuid_field(INPUT_SCRIPT)
    }

    fn uuid_field(&self, key: &str) -> Option<Uuid> {
        self.definition
            .get::<Option<Uuid>>(key)
            .filter(Uuid::is_valid)
    }

    /// Find an entity definition anywhere in the tree
    pub fn find_entity(&self, uuid: &Uuid) -> Option<&EntityDefinition> {
        self.root.as_ref().and_then(|r| r.find(uuid))
    }

    /// Serialize back to a document
    pub fn to_json(&self) -> Value {
        let mut json = self.definition.json().clone();
        if let Some(root) = &self.root {
            json.insert(ROOT.to_string(), root.to_json());
        }
        Value::Object(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scene() {
        let scene = SceneDefinition::from_json(json!({
            "uuid": "s1", "name": "Level 1",
            "clearColour": [0.1, 0.2, 0.3],
            "gravity": [0.0, -3.0, 0.0],
            "maxDrawDistance": 250.0,
            "lightingPassShader": "sh",
            "camera": { "fieldOfView": 60.0, "transform": { "translation": { "z": 10.0 } } },
            "root": { "uuid": "r", "name": "Root", "children": [ { "uuid": "c" } ] }
        }))
        .unwrap();

        assert_eq!(scene.clear_colour(), [0.1, 0.2, 0.3]);
        assert_eq!(scene.gravity(), Some(Vec3::new(0.0, -3.0, 0.0)));
        assert_eq!(scene.max_draw_distance(), Some(250.0));
        assert_eq!(scene.min_draw_distance(), None);
        assert_eq!(scene.lighting_pass_shader(), Some(Uuid::new("sh")));
        assert_eq!(scene.shadow_pass_shader(), None);
        assert_eq!(scene.camera().field_of_view, 60.0);
        assert_eq!(scene.camera().movement_speed, 10.0);
        assert!(scene.find_entity(&Uuid::new("c")).is_some());
    }

    #[test]
    fn test_missing_root_is_tolerated() {
        let scene = SceneDefinition::from_json(json!({ "uuid": "s", "name": "Empty" })).unwrap();
        assert!(scene.root().is_none());
    }

    #[test]
    fn test_round_trip() {
        let scene = SceneDefinition::new(&Uuid::new("s"), "New Scene", &Uuid::new("r"));
        let reparsed = SceneDefinition::from_json(scene.to_json()).unwrap();
        assert_eq!(reparsed, scene);
        assert_eq!(reparsed.root().unwrap().name(), "Root");
    }
}
