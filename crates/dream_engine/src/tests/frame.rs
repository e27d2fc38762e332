use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use serde_json::json;

use super::fixture::{entity, entity_at, with_assets, ProjectBuilder};
use super::{Counter, Faulty, Mover, Recorder};
use crate::config::EngineConfig;
use crate::error::RuntimeOperationError;
use crate::events::{args, EventType};
use crate::foundation::math::Vec3;
use crate::physics::formats;
use crate::scene::{EntityFlags, SceneState};
use crate::scripting::NativeScriptEngine;

fn kinematic_mover_scene(config: EngineConfig) -> (super::fixture::Harness, crate::foundation::uuid::Uuid) {
    let mut builder = ProjectBuilder::new().config(config);
    let script = builder.script("Mover", "Mover");
    let body = builder.sphere("Platform Body", 0.0, true);
    let platform = with_assets(entity("Platform"), &[&script, &body]);
    let platform_uuid = platform.uuid();
    let mut root = entity("Root");
    root.add_child(platform);
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new().with("Mover", || Mover));
    harness.start();
    (harness, platform_uuid)
}

fn body_position(harness: &super::fixture::Harness, entity: &crate::foundation::uuid::Uuid) -> Vec3 {
    harness
        .project
        .active_scene_runtime()
        .and_then(|scene| scene.entity(entity))
        .and_then(|e| e.assets().physics.as_ref())
        .and_then(|body| body.body_transform())
        .expect("entity has a body")
        .position
}

#[test]
fn test_physics_sees_script_moves_in_the_same_frame() {
    let (mut harness, platform) = kinematic_mover_scene(EngineConfig {
        parallel_physics: false,
        ..EngineConfig::default()
    });

    let errors = harness.project.update_logic();
    assert!(errors.is_empty());
    assert_relative_eq!(harness.world_position(&platform).x, 1.0);
    assert_relative_eq!(body_position(&harness, &platform).x, 1.0);

    harness.project.update_logic();
    assert_relative_eq!(body_position(&harness, &platform).x, 2.0);
}

#[test]
fn test_physics_worker_thread_steps_the_world() {
    let (mut harness, platform) = kinematic_mover_scene(EngineConfig {
        parallel_physics: true,
        ..EngineConfig::default()
    });
    assert!(harness.project.tasks().has_worker(crate::project::Subsystem::Physics));

    for _ in 0..3 {
        assert!(harness.project.update_logic().is_empty());
    }
    assert_relative_eq!(body_position(&harness, &platform).x, 3.0);
}

#[test]
fn test_dynamic_body_moves_its_entity() {
    let mut builder = ProjectBuilder::new();
    let body = builder.sphere("Ball Body", 1.0, false);
    let ball = with_assets(entity_at("Ball", Vec3::new(0.0, 10.0, 0.0)), &[&body]);
    let ball_uuid = ball.uuid();
    let mut root = entity("Root");
    root.add_child(ball);
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new());
    harness.start();
    for _ in 0..10 {
        harness.project.update_logic();
    }

    let position = harness.world_position(&ball_uuid);
    assert!(position.y < 10.0);
    assert_relative_eq!(position.y, body_position(&harness, &ball_uuid).y);

    let velocity = harness
        .project
        .active_scene_runtime()
        .and_then(|scene| scene.entity(&ball_uuid))
        .and_then(|e| e.assets().physics.as_ref())
        .and_then(|body| body.linear_velocity())
        .expect("falling body has a velocity");
    assert!(velocity.y < 0.0);
}

#[test]
fn test_script_error_is_isolated_to_its_entity() {
    let updates = Arc::new(AtomicUsize::new(0));
    let mut builder = ProjectBuilder::new();
    let faulty = builder.script("Faulty", "Faulty");
    let counter = builder.script("Counter", "Counter");
    let broken = with_assets(entity("Broken"), &[&faulty]);
    let healthy = with_assets(entity("Healthy"), &[&counter]);
    let broken_uuid = broken.uuid();
    let mut root = entity("Root");
    root.add_child(broken);
    root.add_child(healthy);
    builder.scene(root);

    let counted = Arc::clone(&updates);
    let scripts = NativeScriptEngine::new()
        .with("Faulty", || Faulty)
        .with("Counter", move || Counter {
            updates: Arc::clone(&counted),
            ..Counter::default()
        });
    let mut harness = builder.build(scripts);
    harness.start();

    let first = harness.project.update_all();
    assert_eq!(first.len(), 1);
    assert!(matches!(&first[0], RuntimeOperationError::Script { .. }));
    assert!(harness.project.update_all().is_empty());
    assert!(harness.project.update_all().is_empty());

    assert_eq!(updates.load(Ordering::SeqCst), 3);
    let scene = harness.project.active_scene_runtime().unwrap();
    assert_eq!(scene.state(), SceneState::Active);
    assert!(scene.entity(&broken_uuid).unwrap().has_error(EntityFlags::SCRIPT_ERROR));
}

#[test]
fn test_physics_command_without_body_flags_entity_once() {
    struct Pusher;
    impl crate::scripting::ScriptBehaviour for Pusher {
        fn on_update(&mut self, ctx: &mut crate::scripting::ScriptContext<'_>) -> crate::scripting::native::BehaviourResult {
            ctx.apply_central_impulse(Vec3::new(0.0, 1.0, 0.0));
            Ok(())
        }
    }

    let mut builder = ProjectBuilder::new();
    let script = builder.script("Pusher", "Pusher");
    let pusher = with_assets(entity("Pusher"), &[&script]);
    let pusher_uuid = pusher.uuid();
    let mut root = entity("Root");
    root.add_child(pusher);
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new().with("Pusher", || Pusher));
    harness.start();

    let first = harness.project.update_logic();
    assert_eq!(first.len(), 1);
    assert!(matches!(&first[0], RuntimeOperationError::Physics { .. }));
    assert!(harness.project.update_logic().is_empty());
    let scene = harness.project.active_scene_runtime().unwrap();
    assert!(scene.entity(&pusher_uuid).unwrap().has_error(EntityFlags::PHYSICS_ERROR));
}

#[test]
fn test_collision_reaches_both_entities() {
    let ball_events = Arc::new(Mutex::new(Vec::new()));
    let floor_events = Arc::new(Mutex::new(Vec::new()));

    let mut builder = ProjectBuilder::new();
    let ball_script = builder.script("Ball Recorder", "BallRecorder");
    let floor_script = builder.script("Floor Recorder", "FloorRecorder");
    let ball_body = builder.sphere("Ball Body", 1.0, false);
    let floor_body = builder.physics_object(
        "Floor Body",
        formats::STATIC_PLANE,
        json!({ "normal": { "x": 0.0, "y": 1.0, "z": 0.0 }, "constant": 0.0 }),
    );
    let ball = with_assets(entity_at("Ball", Vec3::new(0.0, 0.25, 0.0)), &[&ball_body, &ball_script]);
    let floor = with_assets(entity("Floor"), &[&floor_body, &floor_script]);
    let (ball_uuid, floor_uuid) = (ball.uuid(), floor.uuid());
    let mut root = entity("Root");
    root.add_child(ball);
    root.add_child(floor);
    builder.scene(root);

    let (ball_log, floor_log) = (Arc::clone(&ball_events), Arc::clone(&floor_events));
    let scripts = NativeScriptEngine::new()
        .with("BallRecorder", move || Recorder {
            events: Arc::clone(&ball_log),
        })
        .with("FloorRecorder", move || Recorder {
            events: Arc::clone(&floor_log),
        });
    let mut harness = builder.build(scripts);
    harness.start();

    // Contacts found by one step are delivered in the next event pass
    harness.project.update_logic();
    harness.project.update_logic();

    let ball_events = ball_events.lock().unwrap();
    let floor_events = floor_events.lock().unwrap();
    let hit = ball_events
        .iter()
        .find(|e| e.event_type == EventType::Collision)
        .expect("ball saw a collision");
    assert_eq!(hit.get_uuid(args::OTHER), Some(&floor_uuid));
    let hit = floor_events
        .iter()
        .find(|e| e.event_type == EventType::Collision)
        .expect("floor saw a collision");
    assert_eq!(hit.get_uuid(args::OTHER), Some(&ball_uuid));
}

#[test]
fn test_graphics_queues_meshes_sprites_and_skips_hidden() {
    let mut builder = ProjectBuilder::new();
    let shader = builder.shader("Lit");
    let texture = builder.texture("Icon", [255, 0, 0, 255]);
    let material = builder.material("Floor", Some(&shader), None);
    let model = builder.model("Quad", Some(&material));

    let mut floor = with_assets(entity_at("Floor", Vec3::new(0.0, 0.0, -5.0)), &[&model]);
    floor.definition_mut().set("alwaysDraw", true).unwrap();
    let mut icon = with_assets(entity_at("Icon", Vec3::new(0.0, 0.0, -5.0)), &[&texture]);
    icon.definition_mut().set("alwaysDraw", true).unwrap();
    let mut hidden = with_assets(entity("Hidden"), &[&model]);
    hidden.definition_mut().set("hidden", true).unwrap();
    let mut root = entity("Root");
    root.add_child(floor);
    root.add_child(icon);
    root.add_child(hidden);
    builder.scene(root);

    let mut harness = builder.build(NativeScriptEngine::new());
    harness.start();
    harness.project.update_all();

    let stats = harness.stats.lock().unwrap().clone();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.opaque_draws, 1);
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.sprites, 1);
}

#[test]
fn test_frame_limit_ends_the_run() {
    let mut builder = ProjectBuilder::new().config(EngineConfig {
        max_frames: 3,
        parallel_physics: false,
        ..EngineConfig::default()
    });
    builder.scene(entity("Root"));

    let mut harness = builder.build(NativeScriptEngine::new());
    harness.project.run().unwrap();

    assert!(harness.project.is_done());
    assert!(harness.project.active_scene_runtime().is_none());
    assert_eq!(harness.project.timer().frame_count(), 3);
}

#[test]
fn test_stop_request_from_script_ends_the_run() {
    struct Stopper(u32);
    impl crate::scripting::ScriptBehaviour for Stopper {
        fn on_update(&mut self, ctx: &mut crate::scripting::ScriptContext<'_>) -> crate::scripting::native::BehaviourResult {
            self.0 += 1;
            if self.0 == 2 {
                ctx.stop_scene();
            }
            Ok(())
        }
    }

    let mut builder = ProjectBuilder::new();
    let script = builder.script("Stopper", "Stopper");
    builder.scene(with_assets(entity("Root"), &[&script]));

    let mut harness = builder.build(NativeScriptEngine::new().with("Stopper", || Stopper(0)));
    harness.project.run().unwrap();

    assert!(harness.project.is_done());
    assert_eq!(harness.project.timer().frame_count(), 2);
}
