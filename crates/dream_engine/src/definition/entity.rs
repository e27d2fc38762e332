//! Entity definitions: the serialized scene graph nodes

use serde_json::Value;

use super::{keys, Definition, DefinitionError, DefinitionType, TransformDefinition, UuidRegistry};
use crate::foundation::math::{Transform, TransformSpace};
use crate::foundation::uuid::Uuid;

const TRANSFORM: &str = "transform";
const CHILDREN: &str = "children";
const ASSETS: &str = "assets";
const HAS_FOCUS: &str = "hasFocus";
const ALWAYS_DRAW: &str = "alwaysDraw";
const HIDDEN: &str = "hidden";
const TEXT: &str = "text";

/// One node of a scene's definition tree
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDefinition {
    definition: Definition,
    children: Vec<EntityDefinition>,
}

impl EntityDefinition {
    /// Parse a node and its children
    pub fn from_json(json: Value) -> Result<Self, DefinitionError> {
        let mut definition = Definition::new(DefinitionType::Entity, json)?;
        let children = match definition.take_raw(CHILDREN) {
            Some(Value::Array(children)) => children
                .into_iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(DefinitionError::Malformed {
                    owner: definition.name_and_uuid(),
                    key: CHILDREN.to_string(),
                    reason: "expected an array".to_string(),
                })
            }
        };

        Ok(Self {
            definition,
            children,
        })
    }

    /// Create an empty node
    pub fn new(uuid: &Uuid, name: &str) -> Self {
        Self {
            definition: Definition::with_identity(DefinitionType::Entity, uuid, name),
            children: Vec::new(),
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

    /// Serialized transform
    pub fn transform_definition(&self) -> TransformDefinition {
        self.definition.get(TRANSFORM)
    }

    /// Initial transform and how it relates to the parent
    pub fn transform(&self) -> (Transform, TransformSpace) {
        let def = self.transform_definition();
        (def.to_transform(), def.space)
    }

    /// Replace the initial transform
    pub fn set_transform(&mut self, transform: &Transform, space: TransformSpace) -> Result<(), DefinitionError> {
        self.definition
            .set(TRANSFORM, TransformDefinition::from_transform(transform, space))
    }

    /// Receives input callbacks
    pub fn has_focus(&self) -> bool {
        self.definition.get(HAS_FOCUS)
    }

    /// Skips frustum culling
    pub fn always_draw(&self) -> bool {
        self.definition.get(ALWAYS_DRAW)
    }

    /// Excluded from draw queues
    pub fn hidden(&self) -> bool {
        self.definition.get(HIDDEN)
    }

    /// Text drawn with an attached font
    pub fn text(&self) -> String {
        self.definition.get(TEXT)
    }

    /// Asset definitions to instantiate for this entity.
    ///
    /// Accepts either a list of UUIDs or an object keyed by asset type.
    pub fn asset_uuids_to_load(&self) -> Vec<Uuid> {
        let values: Vec<&Value> = match self.definition.json().get(ASSETS) {
            Some(Value::Array(list)) => list.iter().collect(),
            Some(Value::Object(by_type)) => by_type.values().collect(),
            _ => Vec::new(),
        };

        values
            .into_iter()
            .filter_map(Value::as_str)
            .map(Uuid::from)
            .filter(Uuid::is_valid)
            .collect()
    }

    /// Reference an asset definition
    pub fn add_asset_uuid(&mut self, uuid: &Uuid) -> Result<(), DefinitionError> {
        let mut assets = self.asset_uuids_to_load();
        if !assets.contains(uuid) {
            assets.push(uuid.clone());
        }
        self.definition.set(ASSETS, assets)
    }

    /// Drop a reference to an asset definition
    pub fn remove_asset_uuid(&mut self, uuid: &Uuid) -> Result<bool, DefinitionError> {
        let mut assets = self.asset_uuids_to_load();
        let before = assets.len();
        assets.retain(|a| a != uuid);
        let removed = assets.len() != before;
        self.definition.set(ASSETS, assets)?;
        Ok(removed)
    }

    /// Direct children
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Direct children for mutation
    pub fn children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.children
    }

    /// Append a child
    pub fn add_child(&mut self, child: Self) {
        self.children.push(child);
    }

    /// Remove a direct child by UUID
    pub fn remove_child(&mut self, uuid: &Uuid) -> Option<Self> {
        let index = self.children.iter().position(|c| c.definition.has_uuid(uuid.as_str()))?;
        Some(self.children.remove(index))
    }

    /// Number of descendants, excluding this node
    pub fn count_all_children(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.count_all_children())
            .sum()
    }

    /// Find this node or a descendant by UUID
    pub fn find(&self, uuid: &Uuid) -> Option<&Self> {
        if self.definition.has_uuid(uuid.as_str()) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(uuid))
    }

    /// Find this node or a descendant by UUID, for mutation
    pub fn find_mut(&mut self, uuid: &Uuid) -> Option<&mut Self> {
        if self.definition.has_uuid(uuid.as_str()) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(uuid))
    }

    /// Collect this node's and every descendant's UUID, pre-order
    pub fn collect_uuids(&self, out: &mut Vec<Uuid>) {
        out.push(self.uuid());
        for child in &self.children {
            child.collect_uuids(out);
        }
    }

    /// Deep copy with fresh UUIDs and a bumped name suffix on the copied root
    pub fn duplicate(&self, registry: &mut UuidRegistry) -> Self {
        let mut copy = self.copy_with_fresh_uuids(registry);
        copy.definition.set_name(&increment_name(&self.name()));
        copy
    }

    fn copy_with_fresh_uuids(&self, registry: &mut UuidRegistry) -> Self {
        let mut json = self.definition.json().clone();
        json.insert(
            keys::UUID.to_string(),
            Value::String(registry.allocate().to_string()),
        );

        Self {
            definition: Definition::new(DefinitionType::Entity, Value::Object(json))
                .unwrap_or_else(|_| self.definition.clone()),
            children: self
                .children
                .iter()
                .map(|c| c.copy_with_fresh_uuids(registry))
                .collect(),
        }
    }

    /// Serialize the subtree back to a document
    pub fn to_json(&self) -> Value {
        let mut json = self.definition.json().clone();
        if !self.children.is_empty() {
            json.insert(
                CHILDREN.to_string(),
                Value::Array(self.children.iter().map(Self::to_json).collect()),
            );
        }
        Value::Object(json)
    }
}

/// `Name` becomes `Name.1`, `Name.3` becomes `Name.4`
fn increment_name(name: &str) -> String {
    if let Some((stem, suffix)) = name.rsplit_once('.') {
        if let Ok(n) = suffix.parse::<u32>() {
            return format!("{stem}.{}", n + 1);
        }
    }
    format!("{name}.1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use serde_json::json;

    fn tree() -> EntityDefinition {
        EntityDefinition::from_json(json!({
            "uuid": "root", "name": "Root",
            "children": [
                { "uuid": "a", "name": "Ship", "assets": ["m1", "p1"],
                  "transform": { "translation": { "x": 1.0, "y": 2.0, "z": 3.0 } },
                  "children": [ { "uuid": "a1", "name": "Engine.3" } ] },
                { "uuid": "b", "name": "Light", "assets": { "light": "l1" }, "hasFocus": true }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_tree() {
        let root = tree();
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.count_all_children(), 3);
        assert!(!root.definition().contains("children"));

        let ship = root.find(&Uuid::new("a")).unwrap();
        assert_eq!(ship.asset_uuids_to_load(), vec![Uuid::new("m1"), Uuid::new("p1")]);
        let (transform, space) = ship.transform();
        assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(space, TransformSpace::Offset);

        let light = root.find(&Uuid::new("b")).unwrap();
        assert_eq!(light.asset_uuids_to_load(), vec![Uuid::new("l1")]);
        assert!(light.has_focus());
        assert!(!light.hidden());
    }

    #[test]
    fn test_round_trip_keeps_children() {
        let root = tree();
        let reparsed = EntityDefinition::from_json(root.to_json()).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn test_duplicate_assigns_fresh_uuids() {
        let root = tree();
        let mut registry = UuidRegistry::new();
        let ship = root.find(&Uuid::new("a")).unwrap();

        let copy = ship.duplicate(&mut registry);
        assert_ne!(copy.uuid(), ship.uuid());
        assert_eq!(copy.name(), "Ship.1");
        assert_ne!(copy.children()[0].uuid(), Uuid::new("a1"));
        assert_eq!(copy.children()[0].name(), "Engine.3");
        assert_eq!(copy.asset_uuids_to_load(), ship.asset_uuids_to_load());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_increment_name() {
        assert_eq!(increment_name("Ship"), "Ship.1");
        assert_eq!(increment_name("Ship.3"), "Ship.4");
        assert_eq!(increment_name("v1.beta"), "v1.beta.1");
    }

    #[test]
    fn test_asset_list_editing() {
        let mut entity = EntityDefinition::new(&Uuid::new("e"), "E");
        entity.add_asset_uuid(&Uuid::new("t1")).unwrap();
        entity.add_asset_uuid(&Uuid::new("t1")).unwrap();
        assert_eq!(entity.asset_uuids_to_load().len(), 1);
        assert!(entity.remove_asset_uuid(&Uuid::new("t1")).unwrap());
        assert!(entity.asset_uuids_to_load().is_empty());
    }

    #[test]
    fn test_child_editing() {
        let mut root = tree();
        let removed = root.remove_child(&Uuid::new("b")).unwrap();
        assert_eq!(removed.name(), "Light");
        assert_eq!(root.count_all_children(), 2);
        root.add_child(removed);
        assert!(root.find(&Uuid::new("b")).is_some());
    }

    #[test]
    fn test_malformed_children() {
        assert!(matches!(
            EntityDefinition::from_json(json!({ "uuid": "x", "children": 4 })),
            Err(DefinitionError::Malformed { .. })
        ));
    }
}
