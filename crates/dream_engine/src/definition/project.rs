//! Project definitions: the top-level container of assets and scenes

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::{
    AssetDefinition, AssetType, Definition, DefinitionError, DefinitionType, EntityDefinition,
    SceneDefinition, UuidRegistry,
};
use crate::foundation::uuid::Uuid;

const AUTHOR: &str = "author";
const DESCRIPTION: &str = "description";
const STARTUP_SCENE: &str = "startupScene";
const WINDOW_WIDTH: &str = "windowWidth";
const WINDOW_HEIGHT: &str = "windowHeight";
const ASSETS: &str = "assets";
const SCENES: &str = "scenes";

/// A project: metadata, asset definitions and scene definitions.
///
/// Asset definitions are held behind `Arc` so runtimes can keep a
/// back-reference to the definition they were built from.
#[derive(Debug, Clone)]
pub struct ProjectDefinition {
    definition: Definition,
    assets: Vec<Arc<AssetDefinition>>,
    scenes: Vec<SceneDefinition>,
    registry: UuidRegistry,
}

impl ProjectDefinition {
    /// Parse a project document.
    ///
    /// Asset documents that cannot be parsed are logged and skipped. A UUID
    /// used twice anywhere in the project is an error.
    pub fn from_json(json: Value) -> Result<Self, DefinitionError> {
        let mut definition = Definition::new(DefinitionType::Project, json)?;
        let mut registry = UuidRegistry::new();
        registry.register(&definition.uuid())?;

        let mut assets = Vec::new();
        if let Some(Value::Array(raw_assets)) = definition.take_raw(ASSETS) {
            for raw in raw_assets {
                match AssetDefinition::from_json(raw) {
                    Ok(asset) => {
                        registry.register(asset.uuid())?;
                        assets.push(Arc::new(asset));
                    }
                    Err(e) => log::error!("{} skipping asset definition: {e}", definition.name_and_uuid()),
                }
            }
        }

        let mut scenes = Vec::new();
        if let Some(Value::Array(raw_scenes)) = definition.take_raw(SCENES) {
            for raw in raw_scenes {
                let scene = SceneDefinition::from_json(raw)?;
                registry.register(&scene.uuid())?;
                if let Some(root) = scene.root() {
                    let mut uuids = Vec::new();
                    root.collect_uuids(&mut uuids);
                    for uuid in &uuids {
                        registry.register(uuid)?;
                    }
                }
                scenes.push(scene);
            }
        }

        log::debug!(
            "Parsed project {} with {} assets and {} scenes",
            definition.name_and_uuid(),
            assets.len(),
            scenes.len()
        );

        Ok(Self {
            definition,
            assets,
            scenes,
            registry,
        })
    }

    /// Create an empty project
    pub fn new(name: &str) -> Self {
        let mut registry = UuidRegistry::new();
        let uuid = registry.allocate();
        Self {
            definition: Definition::with_identity(DefinitionType::Project, &uuid, name),
            assets: Vec::new(),
            scenes: Vec::new(),
            registry,
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

    /// Author credit
    pub fn author(&self) -> String {
        self.definition.get(AUTHOR)
    }

    /// Free text description
    pub fn description(&self) -> String {
        self.definition.get(DESCRIPTION)
    }

    /// Scene loaded on start
    pub fn startup_scene(&self) -> Option<Uuid> {
        self.definition
            .get::<Option<Uuid>>(STARTUP_SCENE)
            .filter(Uuid::is_valid)
    }

    /// Choose the scene loaded on start
    pub fn set_startup_scene(&mut self, uuid: &Uuid) -> Result<(), DefinitionError> {
        self.definition.set(STARTUP_SCENE, uuid)
    }

    /// Requested window size, when set
    pub fn window_size(&self) -> Option<(u32, u32)> {
        let width: u32 = self.definition.get(WINDOW_WIDTH);
        let height: u32 = self.definition.get(WINDOW_HEIGHT);
        (width > 0 && height > 0).then_some((width, height))
    }

    /// Underlying document
    pub const fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Underlying document for mutation
    pub fn definition_mut(&mut self) -> &mut Definition {
        &mut self.definition
    }

    /// Identifiers in use by this project
    pub const fn uuid_registry(&self) -> &UuidRegistry {
        &self.registry
    }

    /// Reserve a fresh identifier
    pub fn allocate_uuid(&mut self) -> Uuid {
        self.registry.allocate()
    }

    // Assets

    /// All asset definitions
    pub fn asset_definitions(&self) -> &[Arc<AssetDefinition>] {
        &self.assets
    }

    /// Number of asset definitions
    pub fn count_asset_definitions(&self) -> usize {
        self.assets.len()
    }

    /// Look up an asset definition
    pub fn asset_definition(&self, uuid: &Uuid) -> Option<&Arc<AssetDefinition>> {
        self.assets.iter().find(|a| a.uuid() == uuid)
    }

    /// Look up an asset definition by label
    pub fn asset_definition_by_name(&self, name: &str) -> Option<&Arc<AssetDefinition>> {
        self.assets.iter().find(|a| a.definition().has_name(name))
    }

    /// Asset definitions of one kind
    pub fn asset_definitions_of(&self, asset_type: AssetType) -> Vec<&Arc<AssetDefinition>> {
        self.assets
            .iter()
            .filter(|a| a.asset_type() == asset_type)
            .collect()
    }

    /// Asset UUIDs grouped by kind
    pub fn asset_definition_groups(&self) -> BTreeMap<AssetType, Vec<Uuid>> {
        let mut groups: BTreeMap<AssetType, Vec<Uuid>> = BTreeMap::new();
        for asset in &self.assets {
            groups
                .entry(asset.asset_type())
                .or_default()
                .push(asset.uuid().clone());
        }
        groups
    }

    /// Edit an asset definition. Runtimes built from the old version keep it.
    pub fn asset_definition_mut(&mut self, uuid: &Uuid) -> Option<&mut AssetDefinition> {
        self.assets
            .iter_mut()
            .find(|a| a.uuid() == uuid)
            .map(Arc::make_mut)
    }

    /// Add a parsed asset definition
    pub fn add_asset_definition(&mut self, asset: AssetDefinition) -> Result<Arc<AssetDefinition>, DefinitionError> {
        self.registry.register(asset.uuid())?;
        let asset = Arc::new(asset);
        self.assets.push(Arc::clone(&asset));
        Ok(asset)
    }

    /// Create a new asset definition with a fresh UUID and default format
    pub fn create_asset_definition(&mut self, asset_type: AssetType) -> Arc<AssetDefinition> {
        let uuid = self.registry.allocate();
        let asset = Arc::new(AssetDefinition::new(asset_type, uuid, "New Asset"));
        self.assets.push(Arc::clone(&asset));
        asset
    }

    /// Remove an asset definition
    pub fn remove_asset_definition(&mut self, uuid: &Uuid) -> Option<Arc<AssetDefinition>> {
        let index = self.assets.iter().position(|a| a.uuid() == uuid)?;
        self.registry.release(uuid);
        Some(self.assets.remove(index))
    }

    // Scenes

    /// All scene definitions
    pub fn scene_definitions(&self) -> &[SceneDefinition] {
        &self.scenes
    }

    /// Look up a scene definition
    pub fn scene_definition(&self, uuid: &Uuid) -> Option<&SceneDefinition> {
        self.scenes
            .iter()
            .find(|s| s.definition().has_uuid(uuid.as_str()))
    }

    /// Look up a scene definition by label
    pub fn scene_definition_by_name(&self, name: &str) -> Option<&SceneDefinition> {
        self.scenes.iter().find(|s| s.definition().has_name(name))
    }

    /// Look up a scene definition for mutation
    pub fn scene_definition_mut(&mut self, uuid: &Uuid) -> Option<&mut SceneDefinition> {
        self.scenes
            .iter_mut()
            .find(|s| s.definition().has_uuid(uuid.as_str()))
    }

    /// The scene loaded on start
    pub fn startup_scene_definition(&self) -> Option<&SceneDefinition> {
        self.startup_scene()
            .and_then(|uuid| self.scene_definition(&uuid))
    }

    /// Add a parsed scene definition
    pub fn add_scene_definition(&mut self, scene: SceneDefinition) -> Result<(), DefinitionError> {
        self.registry.register(&scene.uuid())?;
        if let Some(root) = scene.root() {
            let mut uuids = Vec::new();
            root.collect_uuids(&mut uuids);
            for uuid in &uuids {
                self.registry.register(uuid)?;
            }
        }
        self.scenes.push(scene);
        Ok(())
    }

    /// Create a scene with a root entity, both with fresh UUIDs
    pub fn create_scene_definition(&mut self) -> Uuid {
        let uuid = self.registry.allocate();
        let root_uuid = self.registry.allocate();
        self.scenes
            .push(SceneDefinition::new(&uuid, "New Scene", &root_uuid));
        uuid
    }

    /// Remove a scene definition and release its UUIDs
    pub fn remove_scene_definition(&mut self, uuid: &Uuid) -> Option<SceneDefinition> {
        let index = self
            .scenes
            .iter()
            .position(|s| s.definition().has_uuid(uuid.as_str()))?;
        let scene = self.scenes.remove(index);
        self.registry.release(uuid);
        if let Some(root) = scene.root() {
            let mut uuids = Vec::new();
            root.collect_uuids(&mut uuids);
            for entity in &uuids {
                self.registry.release(entity);
            }
        }
        Some(scene)
    }

    /// Duplicate an entity definition under the same parent in a scene
    pub fn duplicate_entity(&mut self, scene_uuid: &Uuid, parent_uuid: &Uuid, entity_uuid: &Uuid) -> Option<Uuid> {
        let Self { scenes, registry, .. } = self;
        let scene = scenes
            .iter_mut()
            .find(|s| s.definition().has_uuid(scene_uuid.as_str()))?;
        let parent: &mut EntityDefinition = scene.root_mut()?.find_mut(parent_uuid)?;
        let copy = parent
            .children()
            .iter()
            .find(|c| c.definition().has_uuid(entity_uuid.as_str()))?
            .duplicate(registry);
        let uuid = copy.uuid();
        parent.add_child(copy);
        Some(uuid)
    }

    /// Serialize back to a document
    pub fn to_json(&self) -> Value {
        let mut json = self.definition.json().clone();
        json.insert(
            ASSETS.to_string(),
            Value::Array(self.assets.iter().map(|a| a.to_json()).collect()),
        );
        json.insert(
            SCENES.to_string(),
            Value::Array(self.scenes.iter().map(SceneDefinition::to_json).collect()),
        );
        Value::Object(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project() -> ProjectDefinition {
        ProjectDefinition::from_json(json!({
            "uuid": "proj", "name": "Demo", "author": "A. Dev", "startupScene": "s1",
            "windowWidth": 800, "windowHeight": 600,
            "assets": [
                { "uuid": "t1", "type": "texture", "name": "Bricks", "format": "png" },
                { "uuid": "t2", "type": "texture", "name": "Stone", "format": "png" },
                { "uuid": "m1", "type": "model", "name": "Ship", "format": "obj" },
                { "uuid": "bad", "type": "hologram" }
            ],
            "scenes": [
                { "uuid": "s1", "name": "Main", "root": { "uuid": "r", "name": "Root",
                  "children": [ { "uuid": "e1", "name": "Ship" } ] } }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_project() {
        let project = project();
        assert_eq!(project.name(), "Demo");
        assert_eq!(project.author(), "A. Dev");
        assert_eq!(project.window_size(), Some((800, 600)));
        assert_eq!(project.count_asset_definitions(), 3);
        assert_eq!(project.startup_scene_definition().unwrap().name(), "Main");
        assert!(project.uuid_registry().contains(&Uuid::new("e1")));
    }

    #[test]
    fn test_lookups() {
        let project = project();
        assert_eq!(project.asset_definition(&Uuid::new("m1")).unwrap().name(), "Ship");
        assert_eq!(project.asset_definition_by_name("Stone").unwrap().uuid().as_str(), "t2");
        assert_eq!(project.asset_definitions_of(AssetType::Texture).len(), 2);
        assert!(project.asset_definition(&Uuid::new("bad")).is_none());

        let groups = project.asset_definition_groups();
        assert_eq!(groups[&AssetType::Texture], vec![Uuid::new("t1"), Uuid::new("t2")]);
        assert_eq!(groups[&AssetType::Model].len(), 1);
    }

    #[test]
    fn test_duplicate_uuid_rejected() {
        let result = ProjectDefinition::from_json(json!({
            "uuid": "p",
            "assets": [
                { "uuid": "x", "type": "texture" },
                { "uuid": "x", "type": "model" }
            ]
        }));
        assert!(matches!(result, Err(DefinitionError::DuplicateUuid(_))));
    }

    #[test]
    fn test_create_and_remove() {
        let mut project = project();
        let asset = project.create_asset_definition(AssetType::Shader);
        assert_eq!(asset.format(), "glsl");
        assert!(project.uuid_registry().contains(asset.uuid()));

        let scene_uuid = project.create_scene_definition();
        assert!(project.scene_definition(&scene_uuid).unwrap().root().is_some());

        assert!(project.remove_asset_definition(asset.uuid()).is_some());
        assert!(!project.uuid_registry().contains(asset.uuid()));
        assert!(project.remove_scene_definition(&scene_uuid).is_some());
        assert!(project.scene_definition(&scene_uuid).is_none());
    }

    #[test]
    fn test_edit_asset_definition() {
        let mut project = project();
        let before = Arc::clone(project.asset_definition(&Uuid::new("t1")).unwrap());
        project
            .asset_definition_mut(&Uuid::new("t1"))
            .unwrap()
            .definition_mut()
            .set_name("Renamed");
        assert_eq!(project.asset_definition(&Uuid::new("t1")).unwrap().name(), "Renamed");
        assert_eq!(before.name(), "Bricks");
    }

    #[test]
    fn test_duplicate_entity() {
        let mut project = project();
        let copy = project
            .duplicate_entity(&Uuid::new("s1"), &Uuid::new("r"), &Uuid::new("e1"))
            .unwrap();
        let scene = project.scene_definition(&Uuid::new("s1")).unwrap();
        assert_eq!(scene.find_entity(&copy).unwrap().name(), "Ship.1");
        assert_eq!(scene.root().unwrap().children().len(), 2);
    }

    #[test]
    fn test_round_trip() {
        let project = project();
        let reparsed = ProjectDefinition::from_json(project.to_json()).unwrap();
        assert_eq!(reparsed.count_asset_definitions(), 3);
        assert_eq!(reparsed.scene_definitions(), project.scene_definitions());
    }
}
