use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use super::fixture::{entity, entity_at, with_assets, ProjectBuilder};
use super::Counter;
use crate::definition::SceneDefinition;
use crate::error::EngineError;
use crate::foundation::math::Vec3;
use crate::foundation::uuid::Uuid;
use crate::scene::{EntityFlags, SceneError, SceneState};
use crate::scripting::NativeScriptEngine;

fn counting_engine(updates: &Arc<AtomicUsize>, destroyed: &Arc<AtomicUsize>) -> NativeScriptEngine {
    let (updates, destroyed) = (Arc::clone(updates), Arc::clone(destroyed));
    NativeScriptEngine::new().with("Counter", move || Counter {
        updates: Arc::clone(&updates),
        destroyed: Arc::clone(&destroyed),
    })
}

#[test]
fn test_scene_walks_its_lifecycle() {
    let mut builder = ProjectBuilder::new();
    let mut root = entity("Root");
    let mut arm = entity("Arm");
    arm.add_child(entity("Hand"));
    root.add_child(arm);
    root.add_child(entity("Leg"));
    let root_uuid = root.uuid();
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new());
    harness.start();

    let scene = harness.project.active_scene_runtime_mut().unwrap();
    assert_eq!(scene.state(), SceneState::Active);
    assert!(scene.start_time().is_some());
    assert_eq!(scene.count_entities(), 4);
    assert_eq!(scene.count_children(&root_uuid), Some(3));
    assert_eq!(scene.root().unwrap().uuid(), &root_uuid);

    // Every non-root entity has a parent that holds it as a child
    let tree = scene.tree();
    for (key, entity) in tree.iter() {
        match entity.parent() {
            Some(parent) => assert!(tree.get(parent).unwrap().children().contains(&key)),
            None => assert_eq!(Some(key), tree.root()),
        }
    }

    assert!(matches!(scene.activate(), Err(SceneError::InvalidTransition { .. })));
    scene.request_destroy().unwrap();
    assert_eq!(scene.state(), SceneState::ToDestroy);
    scene.destroy_runtime().unwrap();
    assert_eq!(scene.state(), SceneState::Destroyed);
    assert_eq!(scene.count_entities(), 0);
    assert!(matches!(scene.request_destroy(), Err(SceneError::InvalidTransition { .. })));
}

#[test]
fn test_removed_subtree_is_gone_after_garbage_collection() {
    let updates = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let mut builder = ProjectBuilder::new();
    let script = builder.script("Counter", "Counter");
    let body = builder.sphere("Arm Body", 0.0, true);

    let mut arm = with_assets(entity("Arm"), &[&script, &body]);
    let hand = with_assets(entity("Hand"), &[&script]);
    let hand_uuid = hand.uuid();
    arm.add_child(hand);
    let arm_uuid = arm.uuid();
    let leg = entity("Leg");
    let leg_uuid = leg.uuid();
    let mut root = entity("Root");
    root.add_child(arm);
    root.add_child(leg);
    builder.scene(root);

    let mut harness = builder.build(counting_engine(&updates, &destroyed));
    harness.start();
    harness.project.update_logic();
    assert_eq!(updates.load(Ordering::SeqCst), 2);
    assert_eq!(harness.body_count(), 1);

    let scene = harness.project.active_scene_runtime_mut().unwrap();
    assert_eq!(scene.remove_entity(&arm_uuid).unwrap(), 2);
    // Flagged entities stay in the tree until the end of the frame
    assert!(scene.entity(&hand_uuid).unwrap().is_deleted());
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    assert_eq!(harness.project.collect_garbage(), 2);
    let scene = harness.project.active_scene_runtime().unwrap();
    assert!(scene.entity(&arm_uuid).is_none());
    assert!(scene.entity(&hand_uuid).is_none());
    assert!(scene.entity(&leg_uuid).is_some());
    assert_eq!(scene.count_entities(), 2);
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    assert_eq!(harness.body_count(), 0);

    harness.project.update_logic();
    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[test]
fn test_removing_root_requests_stop() {
    let mut builder = ProjectBuilder::new();
    let root = entity("Root");
    let root_uuid = root.uuid();
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new());
    harness.start();
    let scene = harness.project.active_scene_runtime_mut().unwrap();
    assert_eq!(scene.remove_entity(&root_uuid).unwrap(), 0);
    assert!(scene.is_stop_requested());
    assert!(matches!(
        scene.remove_entity(&Uuid::random()),
        Err(SceneError::UnknownEntity(_))
    ));

    harness.project.update_all();
    assert!(harness.project.is_done());
    assert!(harness.project.active_scene_runtime().is_none());
}

#[test]
fn test_teardown_releases_every_native_handle() {
    let updates = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let mut builder = ProjectBuilder::new();
    let shader = builder.shader("Lit");
    let texture = builder.texture("Diffuse", [90, 90, 90, 255]);
    let material = builder.material("Painted", Some(&shader), Some(&texture));
    let model = builder.model("Quad", Some(&material));
    let script = builder.script("Counter", "Counter");
    let body = builder.sphere("Body", 1.0, false);

    let mut root = entity("Root");
    root.add_child(with_assets(entity("Statue"), &[&model, &body, &script]));
    root.add_child(with_assets(entity("Poster"), &[&texture]));
    builder.scene(root);

    let mut harness = builder.build(counting_engine(&updates, &destroyed));
    harness.start();
    harness.project.update_all();
    assert!(harness.graphics.live_handles() > 0);
    assert_eq!(harness.body_count(), 1);

    harness.project.reset_active_scene_runtime();
    assert!(harness.project.active_scene_runtime().is_none());
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(harness.body_count(), 0);
    assert_eq!(harness.shape_count(), 0);

    harness.project.clear_caches();
    assert_eq!(harness.graphics.live_textures(), 0);
    assert_eq!(harness.graphics.live_handles(), 0);
}

#[test]
fn test_missing_root_is_fatal() {
    let mut builder = ProjectBuilder::new();
    let scene = SceneDefinition::from_json(json!({
        "uuid": Uuid::random(),
        "name": "Empty",
    }))
    .unwrap();
    let scene_uuid = builder.add_scene(scene);

    let mut harness = builder.build(NativeScriptEngine::new());
    let result = harness.project.construct_active_scene_runtime(&scene_uuid);
    assert!(matches!(result, Err(EngineError::FatalLoad { scene, .. }) if scene == scene_uuid));
    assert!(harness.project.active_scene_runtime().is_none());
}

#[test]
fn test_unknown_scene_is_fatal() {
    let mut builder = ProjectBuilder::new();
    builder.scene(entity("Root"));

    let mut harness = builder.build(NativeScriptEngine::new());
    let result = harness.project.construct_active_scene_runtime(&Uuid::random());
    assert!(matches!(result, Err(EngineError::FatalLoad { .. })));
}

#[test]
fn test_root_asset_failure_is_fatal_and_releases_everything() {
    let mut builder = ProjectBuilder::new();
    let texture = builder.texture("Diffuse", [1, 1, 1, 255]);
    let undefined = Uuid::random();
    let mut root = with_assets(entity("Root"), &[&texture]);
    root.add_asset_uuid(&undefined).unwrap();
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new());
    let result = harness.project.construct_startup_scene();
    assert!(matches!(result, Err(EngineError::FatalLoad { .. })));
    assert!(harness.project.active_scene_runtime().is_none());

    harness.project.clear_caches();
    assert_eq!(harness.graphics.live_handles(), 0);
}

#[test]
fn test_child_asset_failure_is_not_fatal() {
    let mut builder = ProjectBuilder::new();
    let missing_texture = Uuid::random();
    let mut broken = entity("Broken");
    broken.add_asset_uuid(&missing_texture).unwrap();
    let broken_uuid = broken.uuid();
    let mut root = entity("Root");
    root.add_child(broken);
    root.add_child(entity("Fine"));
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new());
    harness.start();

    let scene = harness.project.active_scene_runtime().unwrap();
    assert_eq!(scene.state(), SceneState::Active);
    assert_eq!(scene.count_entities(), 3);
    let broken = scene.entity(&broken_uuid).unwrap();
    assert!(broken.is_loaded());
    assert!(broken.has_error(EntityFlags::ASSET_ERROR));
}

#[test]
fn test_instantiated_entity_loads_its_assets() {
    let updates = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let mut builder = ProjectBuilder::new();
    let script = builder.script("Counter", "Counter");
    let texture = builder.texture("Spawned", [9, 9, 9, 255]);
    let root = entity("Root");
    let root_uuid = root.uuid();
    builder.scene(root);

    let mut harness = builder.build(counting_engine(&updates, &destroyed));
    harness.start();

    let mut spawned = with_assets(entity("Spawned"), &[&texture]);
    spawned.add_child(with_assets(entity("Spawned Child"), &[&script]));
    let uuid = harness.project.instantiate_entity(&root_uuid, &spawned).unwrap();

    let scene = harness.project.active_scene_runtime().unwrap();
    assert_eq!(scene.count_entities(), 3);
    assert!(scene.entity(&uuid).unwrap().assets().texture.is_some());
    harness.project.update_logic();
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lookups_by_name_focus_and_distance() {
    let mut builder = ProjectBuilder::new();
    let mut player = entity_at("Player", Vec3::new(0.0, 0.0, 1.0));
    player.definition_mut().set("hasFocus", true).unwrap();
    let near = entity_at("Near", Vec3::new(0.0, 0.0, 3.0));
    let far = entity_at("Far", Vec3::new(0.0, 0.0, 10.0));
    let (player_uuid, near_uuid, far_uuid) = (player.uuid(), near.uuid(), far.uuid());
    let mut root = entity("Root");
    root.add_child(player);
    root.add_child(near);
    root.add_child(far);
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new());
    harness.start();

    let scene = harness.project.active_scene_runtime_mut().unwrap();
    assert_eq!(scene.entity_by_name("Far").unwrap().uuid(), &far_uuid);
    assert!(scene.entity_by_name("Missing").is_none());
    assert_eq!(scene.focused_entity().unwrap().uuid(), &player_uuid);
    // The root sits on the camera and the player is closer still
    assert_eq!(scene.nearest_to_camera().unwrap().uuid(), &near_uuid);

    scene.remove_entity(&near_uuid).unwrap();
    harness.project.collect_garbage();
    let scene = harness.project.active_scene_runtime().unwrap();
    assert_eq!(scene.nearest_to_camera().unwrap().uuid(), &far_uuid);
    assert!(scene.entity_by_name("Near").is_none());
}
