//! Entity tree
//!
//! Entities live in a slot map owned by the tree. Each node records its
//! parent key and an ordered list of child keys; every structural change
//! goes through [`EntityTree`] so the two always agree.
//!
//! Removal is post-order: a subtree comes out children first, and the
//! caller receives the detached runtimes in that order for teardown.

use std::collections::HashMap;

use slotmap::SlotMap;
use thiserror::Error;

use super::bounds::AABB;
use super::entity::{EntityKey, EntityRuntime};
use crate::foundation::math::{Transform, TransformSpace};
use crate::foundation::uuid::Uuid;

/// A structural change would break the tree
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The tree already has a root
    #[error("tree already has a root")]
    RootExists,

    /// The key names no live entity
    #[error("no entity for key {0:?}")]
    UnknownEntity(EntityKey),

    /// Another entity already uses this UUID
    #[error("entity uuid {0} is already in the tree")]
    DuplicateUuid(Uuid),

    /// The new parent is the entity itself or one of its descendants
    #[error("moving {0} under its own descendant would create a cycle")]
    Cycle(Uuid),

    /// The root has no parent to change
    #[error("the root entity cannot be reparented")]
    RootCannotMove,
}

/// Arena of entities forming a single rooted tree
#[derive(Default)]
pub struct EntityTree {
    nodes: SlotMap<EntityKey, EntityRuntime>,
    root: Option<EntityKey>,
    by_uuid: HashMap<Uuid, EntityKey>,
}

impl EntityTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Root key, if a root has been inserted
    pub const fn root(&self) -> Option<EntityKey> {
        self.root
    }

    /// Live entities
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no entities
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the key names a live entity
    pub fn contains(&self, key: EntityKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Entity by key
    pub fn get(&self, key: EntityKey) -> Option<&EntityRuntime> {
        self.nodes.get(key)
    }

    /// Entity by key, for mutation
    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut EntityRuntime> {
        self.nodes.get_mut(key)
    }

    /// Key of the entity with this UUID
    pub fn key_of(&self, uuid: &Uuid) -> Option<EntityKey> {
        self.by_uuid.get(uuid).copied()
    }

    /// Entity by UUID
    pub fn find(&self, uuid: &Uuid) -> Option<&EntityRuntime> {
        self.key_of(uuid).and_then(|k| self.nodes.get(k))
    }

    /// Entity by UUID, for mutation
    pub fn find_mut(&mut self, uuid: &Uuid) -> Option<&mut EntityRuntime> {
        self.key_of(uuid).and_then(|k| self.nodes.get_mut(k))
    }

    /// First entity in pre-order with this name
    pub fn find_by_name(&self, name: &str) -> Option<EntityKey> {
        self.find_map(|key, entity| (entity.name() == name).then_some(key))
    }

    /// Iterate every live entity in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &EntityRuntime)> {
        self.nodes.iter()
    }

    fn register(&mut self, entity: EntityRuntime) -> Result<EntityKey, TreeError> {
        if self.by_uuid.contains_key(entity.uuid()) {
            return Err(TreeError::DuplicateUuid(entity.uuid().clone()));
        }
        let uuid = entity.uuid().clone();
        let key = self.nodes.insert(entity);
        self.by_uuid.insert(uuid, key);
        Ok(key)
    }

    /// Insert the root entity
    pub fn insert_root(&mut self, mut entity: EntityRuntime) -> Result<EntityKey, TreeError> {
        if self.root.is_some() {
            return Err(TreeError::RootExists);
        }
        entity.parent = None;
        entity.children.clear();
        let key = self.register(entity)?;
        self.root = Some(key);
        Ok(key)
    }

    /// Insert an entity as the last child of `parent`
    pub fn add_child(&mut self, parent: EntityKey, mut entity: EntityRuntime) -> Result<EntityKey, TreeError> {
        if !self.nodes.contains_key(parent) {
            return Err(TreeError::UnknownEntity(parent));
        }
        entity.parent = Some(parent);
        entity.children.clear();
        let key = self.register(entity)?;
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(key);
        }
        Ok(key)
    }

    /// Whether `ancestor` is `key` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: EntityKey, key: EntityKey) -> bool {
        let mut cursor = Some(key);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current).and_then(EntityRuntime::parent);
        }
        false
    }

    /// Move `key` to the end of `new_parent`'s children
    pub fn reparent(&mut self, key: EntityKey, new_parent: EntityKey) -> Result<(), TreeError> {
        let old_parent = self
            .nodes
            .get(key)
            .ok_or(TreeError::UnknownEntity(key))?
            .parent
            .ok_or(TreeError::RootCannotMove)?;
        if !self.nodes.contains_key(new_parent) {
            return Err(TreeError::UnknownEntity(new_parent));
        }
        if self.is_ancestor(key, new_parent) {
            let uuid = self.nodes[key].uuid().clone();
            return Err(TreeError::Cycle(uuid));
        }

        if let Some(node) = self.nodes.get_mut(old_parent) {
            node.children.retain(|&c| c != key);
        }
        if let Some(node) = self.nodes.get_mut(new_parent) {
            node.children.push(key);
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.parent = Some(new_parent);
        }
        Ok(())
    }

    /// Detach and remove `key` with all its descendants, returning them
    /// children first. Removing the root empties the tree.
    pub fn remove_subtree(&mut self, key: EntityKey) -> Vec<EntityRuntime> {
        if !self.nodes.contains_key(key) {
            return Vec::new();
        }
        let order = self.post_order(key);

        if let Some(parent) = self.nodes[key].parent {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children.retain(|&c| c != key);
            }
        }
        if self.root == Some(key) {
            self.root = None;
        }

        order
            .into_iter()
            .filter_map(|k| self.nodes.remove(k))
            .map(|entity| {
                self.by_uuid.remove(entity.uuid());
                entity
            })
            .collect()
    }

    /// Keys below and including `start`, parents before children
    pub fn pre_order(&self, start: EntityKey) -> Vec<EntityKey> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else { continue };
            out.push(key);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Keys below and including `start`, children before parents
    pub fn post_order(&self, start: EntityKey) -> Vec<EntityKey> {
        let mut out = Vec::new();
        let mut stack = vec![(start, false)];
        while let Some((key, expanded)) = stack.pop() {
            if expanded {
                out.push(key);
                continue;
            }
            let Some(node) = self.nodes.get(key) else { continue };
            stack.push((key, true));
            stack.extend(node.children.iter().rev().map(|&c| (c, false)));
        }
        out
    }

    /// Keys of the whole tree in pre-order
    pub fn keys(&self) -> Vec<EntityKey> {
        self.root.map(|r| self.pre_order(r)).unwrap_or_default()
    }

    /// Call `visitor` on every entity in pre-order
    pub fn apply_to_all<F: FnMut(EntityKey, &EntityRuntime)>(&self, mut visitor: F) {
        for key in self.keys() {
            if let Some(entity) = self.nodes.get(key) {
                visitor(key, entity);
            }
        }
    }

    /// Call `visitor` on every entity in pre-order, with mutable access
    pub fn apply_to_all_mut<F: FnMut(EntityKey, &mut EntityRuntime)>(&mut self, mut visitor: F) {
        for key in self.keys() {
            if let Some(entity) = self.nodes.get_mut(key) {
                visitor(key, entity);
            }
        }
    }

    /// First non-`None` result of `visitor` in pre-order
    pub fn find_map<R, F: FnMut(EntityKey, &EntityRuntime) -> Option<R>>(&self, mut visitor: F) -> Option<R> {
        self.keys()
            .into_iter()
            .find_map(|key| self.nodes.get(key).and_then(|e| visitor(key, e)))
    }

    /// Flag `key` and every descendant for deletion. Returns how many
    /// entities were newly flagged.
    pub fn mark_subtree_deleted(&mut self, key: EntityKey) -> usize {
        let mut flagged = 0;
        for k in self.pre_order(key) {
            if let Some(node) = self.nodes.get_mut(k) {
                if !node.is_deleted() {
                    node.mark_deleted();
                    flagged += 1;
                }
            }
        }
        flagged
    }

    /// Descendants of `key`, not counting itself
    pub fn count_descendants(&self, key: EntityKey) -> usize {
        self.pre_order(key).len().saturating_sub(1)
    }

    /// Number of ancestors between `key` and the root
    pub fn depth(&self, key: EntityKey) -> usize {
        let mut depth = 0;
        let mut cursor = self.nodes.get(key).and_then(EntityRuntime::parent);
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.nodes.get(parent).and_then(EntityRuntime::parent);
        }
        depth
    }

    /// World transform: offset transforms compose with the parent's world
    /// transform, absolute ones stand alone
    pub fn world_transform(&self, key: EntityKey) -> Transform {
        let Some(node) = self.nodes.get(key) else {
            return Transform::identity();
        };
        match (node.space(), node.parent()) {
            (TransformSpace::Offset, Some(parent)) => self.world_transform(parent).combine(node.transform()),
            _ => *node.transform(),
        }
    }

    /// Set the local transform so that the world transform becomes `world`
    pub fn set_world_transform(&mut self, key: EntityKey, world: &Transform) {
        let Some(node) = self.nodes.get(key) else { return };
        let local = match (node.space(), node.parent()) {
            (TransformSpace::Offset, Some(parent)) => self.world_transform(parent).inverse().combine(world),
            _ => *world,
        };
        if let Some(node) = self.nodes.get_mut(key) {
            node.set_transform(local);
        }
    }

    /// World space bounds, derived from the attached model or sprite and
    /// the current world transform
    pub fn bounding_box(&self, key: EntityKey) -> Option<AABB> {
        let local = self.nodes.get(key)?.local_bounding_box()?;
        Some(local.transformed(&self.world_transform(key).to_matrix()))
    }

    /// Check that parent links and child lists agree, every entity is
    /// reachable from the root exactly once and the UUID index is current
    pub fn check_invariants(&self) -> bool {
        let Some(root) = self.root else {
            return self.nodes.is_empty() && self.by_uuid.is_empty();
        };
        if self.nodes.get(root).and_then(EntityRuntime::parent).is_some() {
            return false;
        }

        let reachable = self.pre_order(root);
        let mut seen = std::collections::HashSet::new();
        if !reachable.iter().all(|k| seen.insert(*k)) || reachable.len() != self.nodes.len() {
            return false;
        }

        let links_agree = self.nodes.iter().all(|(key, node)| {
            let listed_once = |parent: EntityKey| {
                self.nodes
                    .get(parent)
                    .is_some_and(|p| p.children.iter().filter(|&&c| c == key).count() == 1)
            };
            let children_point_back = node
                .children
                .iter()
                .all(|&c| self.nodes.get(c).and_then(EntityRuntime::parent) == Some(key));
            let parent_ok = match node.parent {
                Some(parent) => listed_once(parent),
                None => key == root,
            };
            parent_ok && children_point_back
        });

        let index_current = self.by_uuid.len() == self.nodes.len()
            && self
                .by_uuid
                .iter()
                .all(|(uuid, &key)| self.nodes.get(key).is_some_and(|n| n.uuid() == uuid));

        links_agree && index_current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    fn entity(uuid: &str) -> EntityRuntime {
        EntityRuntime::new(&Uuid::new(uuid), uuid)
    }

    /// root -> (a -> (a1, a2), b)
    fn sample() -> (EntityTree, [EntityKey; 5]) {
        let mut tree = EntityTree::new();
        let root = tree.insert_root(entity("root")).unwrap();
        let a = tree.add_child(root, entity("a")).unwrap();
        let a1 = tree.add_child(a, entity("a1")).unwrap();
        let a2 = tree.add_child(a, entity("a2")).unwrap();
        let b = tree.add_child(root, entity("b")).unwrap();
        (tree, [root, a, a1, a2, b])
    }

    fn names(tree: &EntityTree, keys: &[EntityKey]) -> Vec<String> {
        keys.iter().map(|&k| tree.get(k).unwrap().name().to_string()).collect()
    }

    #[test]
    fn test_traversal_orders() {
        let (tree, [root, ..]) = sample();
        assert_eq!(names(&tree, &tree.pre_order(root)), ["root", "a", "a1", "a2", "b"]);
        assert_eq!(names(&tree, &tree.post_order(root)), ["a1", "a2", "a", "b", "root"]);
        assert!(tree.check_invariants());
    }

    #[test]
    fn test_duplicate_uuid_and_second_root_rejected() {
        let (mut tree, [root, ..]) = sample();
        assert_eq!(tree.add_child(root, entity("a")), Err(TreeError::DuplicateUuid(Uuid::new("a"))));
        assert_eq!(tree.insert_root(entity("other")), Err(TreeError::RootExists));
        assert_eq!(tree.len(), 5);
        assert!(tree.check_invariants());
    }

    #[test]
    fn test_reparent_keeps_links_consistent() {
        let (mut tree, [root, a, a1, a2, b]) = sample();
        tree.reparent(a1, b).unwrap();
        assert_eq!(tree.get(a1).unwrap().parent(), Some(b));
        assert_eq!(tree.get(b).unwrap().children(), &[a1]);
        assert_eq!(tree.get(a).unwrap().children().len(), 1);
        assert!(tree.check_invariants());

        // a1 now lives under b, so only b and a2 are cycles
        assert_eq!(tree.reparent(b, a1), Err(TreeError::Cycle(Uuid::new("b"))));
        assert_eq!(tree.reparent(a, a2), Err(TreeError::Cycle(Uuid::new("a"))));
        tree.reparent(a, a1).unwrap();
        assert_eq!(tree.get(a).unwrap().parent(), Some(a1));
        assert_eq!(tree.reparent(root, a), Err(TreeError::RootCannotMove));
        assert!(tree.check_invariants());
    }

    #[test]
    fn test_remove_subtree_children_first() {
        let (mut tree, [_, a, ..]) = sample();
        let removed = tree.remove_subtree(a);
        let removed: Vec<&str> = removed.iter().map(EntityRuntime::name).collect();
        assert_eq!(removed, ["a1", "a2", "a"]);
        assert_eq!(tree.len(), 2);
        assert!(tree.find(&Uuid::new("a1")).is_none());
        assert!(tree.check_invariants());
    }

    #[test]
    fn test_mark_subtree_deleted() {
        let (mut tree, [_, a, a1, a2, b]) = sample();
        assert_eq!(tree.mark_subtree_deleted(a), 3);
        assert_eq!(tree.mark_subtree_deleted(a), 0);
        assert!(tree.get(a1).unwrap().is_deleted());
        assert!(tree.get(a2).unwrap().is_deleted());
        assert!(!tree.get(b).unwrap().is_deleted());
    }

    #[test]
    fn test_world_transform_composes_offsets_only() {
        let (mut tree, [root, a, a1, a2, _]) = sample();
        tree.get_mut(root).unwrap().set_transform(Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));
        tree.get_mut(a).unwrap().set_transform(Transform::from_position(Vec3::new(0.0, 5.0, 0.0)));
        tree.get_mut(a1).unwrap().set_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)));
        let absolute = tree.get_mut(a2).unwrap();
        absolute.set_space(TransformSpace::Absolute);
        absolute.set_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)));

        assert_relative_eq!(tree.world_transform(a1).position, Vec3::new(11.0, 5.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(tree.world_transform(a2).position, Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);

        tree.set_world_transform(a1, &Transform::from_position(Vec3::zeros()));
        assert_relative_eq!(tree.get(a1).unwrap().transform().position, Vec3::new(-10.0, -5.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(tree.world_transform(a1).position, Vec3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_find_map_and_depth() {
        let (tree, [_, _, a1, _, b]) = sample();
        assert_eq!(tree.find_by_name("a2").map(|k| tree.depth(k)), Some(2));
        assert_eq!(tree.depth(b), 1);
        assert_eq!(tree.count_descendants(tree.root().unwrap()), 4);
        assert_eq!(tree.key_of(&Uuid::new("a1")), Some(a1));
        assert!(tree.bounding_box(a1).is_none());
    }

    #[test]
    fn test_remove_root_empties_tree() {
        let (mut tree, [root, ..]) = sample();
        assert_eq!(tree.remove_subtree(root).len(), 5);
        assert!(tree.is_empty());
        assert!(tree.root().is_none());
        assert!(tree.check_invariants());
    }
}
