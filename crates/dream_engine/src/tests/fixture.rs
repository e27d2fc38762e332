//! On-disk projects for end-to-end tests

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;

use crate::backend::headless::{HeadlessAudio, HeadlessGraphics, HeadlessRenderer, RenderStats};
use crate::config::EngineConfig;
use crate::definition::{AssetDefinition, AssetType, EntityDefinition, ProjectDefinition, SceneDefinition};
use crate::foundation::math::{Transform, TransformSpace, Vec3};
use crate::foundation::uuid::Uuid;
use crate::physics::{self, formats, SimplePhysicsWorld};
use crate::project::{Collaborators, ProjectRuntime};
use crate::scripting::{self, NativeScriptEngine};
use crate::storage::ProjectDirectory;

pub const VERTEX_SOURCE: &str = "#version 330 core\nvoid main() { gl_Position = vec4(0.0); }\n";
pub const FRAGMENT_SOURCE: &str = "#version 330 core\nout vec4 colour;\nvoid main() { colour = vec4(1.0); }\n";

pub const QUAD_OBJ: &str = "\
o Quad
v -1 0 -1
v 1 0 -1
v 1 0 1
v -1 0 1
usemtl Floor
f 1 2 3 4
";

/// 2x2 PNG filled with one colour
pub fn png(colour: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba(colour));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

pub fn entity(name: &str) -> EntityDefinition {
    EntityDefinition::new(&Uuid::random(), name)
}

pub fn entity_at(name: &str, position: Vec3) -> EntityDefinition {
    let mut definition = entity(name);
    definition
        .set_transform(&Transform::from_position(position), TransformSpace::Offset)
        .unwrap();
    definition
}

pub fn with_assets(mut definition: EntityDefinition, assets: &[&Uuid]) -> EntityDefinition {
    for uuid in assets {
        definition.add_asset_uuid(uuid).unwrap();
    }
    definition
}

/// Builds a project directory with asset files and a single startup scene
pub struct ProjectBuilder {
    dir: TempDir,
    directory: ProjectDirectory,
    project: ProjectDefinition,
    config: EngineConfig,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let directory = ProjectDirectory::new(dir.path());
        Self {
            dir,
            directory,
            project: ProjectDefinition::new("Test Project"),
            config: EngineConfig {
                parallel_physics: false,
                ..EngineConfig::default()
            },
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn add(&mut self, definition: AssetDefinition, files: &[(&str, &[u8])]) -> Uuid {
        for (name, data) in files {
            self.directory
                .write_asset_data(&definition, name, data)
                .unwrap();
        }
        self.project
            .add_asset_definition(definition)
            .unwrap()
            .uuid()
            .clone()
    }

    fn definition(asset_type: AssetType, name: &str) -> AssetDefinition {
        AssetDefinition::new(asset_type, Uuid::random(), name)
    }

    pub fn texture(&mut self, name: &str, colour: [u8; 4]) -> Uuid {
        let definition = Self::definition(AssetType::Texture, name);
        self.add(definition, &[("png", &png(colour))])
    }

    pub fn shader_with(&mut self, name: &str, fragment: &str) -> Uuid {
        let definition = Self::definition(AssetType::Shader, name);
        self.add(
            definition,
            &[
                ("vertex.glsl", VERTEX_SOURCE.as_bytes()),
                ("fragment.glsl", fragment.as_bytes()),
            ],
        )
    }

    pub fn shader(&mut self, name: &str) -> Uuid {
        self.shader_with(name, FRAGMENT_SOURCE)
    }

    pub fn material(&mut self, name: &str, shader: Option<&Uuid>, diffuse: Option<&Uuid>) -> Uuid {
        let mut definition = Self::definition(AssetType::Material, name);
        if let Some(shader) = shader {
            definition.definition_mut().set("shader", shader).unwrap();
        }
        if let Some(texture) = diffuse {
            definition
                .definition_mut()
                .set("diffuseTexture", texture)
                .unwrap();
        }
        self.add(definition, &[])
    }

    pub fn model(&mut self, name: &str, floor_material: Option<&Uuid>) -> Uuid {
        let mut definition = Self::definition(AssetType::Model, name);
        if let Some(material) = floor_material {
            definition
                .definition_mut()
                .set("materialMap", json!([{ "from": "Floor", "to": material }]))
                .unwrap();
        }
        self.add(definition, &[("obj", QUAD_OBJ.as_bytes())])
    }

    /// Script asset naming a registered native behaviour
    pub fn script(&mut self, name: &str, behaviour: &str) -> Uuid {
        let definition = Self::definition(AssetType::Script, name);
        self.add(definition, &[("native", behaviour.as_bytes())])
    }

    pub fn physics_object(&mut self, name: &str, format: &str, settings: serde_json::Value) -> Uuid {
        let mut definition = Self::definition(AssetType::PhysicsObject, name);
        definition.set_format(format);
        if let serde_json::Value::Object(fields) = settings {
            for (key, value) in fields {
                definition.definition_mut().set(&key, value).unwrap();
            }
        }
        self.add(definition, &[])
    }

    pub fn sphere(&mut self, name: &str, mass: f32, kinematic: bool) -> Uuid {
        self.physics_object(
            name,
            formats::SPHERE,
            json!({ "radius": 0.5, "mass": mass, "kinematic": kinematic }),
        )
    }

    /// Add a scene with this root and make it the startup scene
    pub fn scene(&mut self, root: EntityDefinition) -> Uuid {
        let uuid = Uuid::random();
        let mut scene = SceneDefinition::new(&uuid, "Test Scene", &root.uuid());
        scene.set_root(root);
        self.add_scene(scene)
    }

    pub fn add_scene(&mut self, scene: SceneDefinition) -> Uuid {
        let uuid = scene.uuid();
        self.project.add_scene_definition(scene).unwrap();
        self.project.set_startup_scene(&uuid).unwrap();
        uuid
    }

    pub fn build(self, scripts: NativeScriptEngine) -> Harness {
        self.build_with_graphics(HeadlessGraphics::new(), scripts)
    }

    pub fn build_with_graphics(self, graphics: HeadlessGraphics, scripts: NativeScriptEngine) -> Harness {
        let graphics = Arc::new(graphics);
        let renderer = HeadlessRenderer::new();
        let stats = renderer.stats_handle();
        let collaborators = Collaborators {
            graphics: graphics.clone(),
            audio: Arc::new(HeadlessAudio::new()),
            physics: physics::shared(SimplePhysicsWorld::new()),
            scripts: scripting::shared(scripts),
            renderer: Box::new(renderer),
        };
        let project = ProjectRuntime::new(self.project, self.directory, self.config, collaborators);
        Harness {
            project,
            graphics,
            stats,
            _dir: self.dir,
        }
    }
}

/// A project runtime plus the handles tests inspect
pub struct Harness {
    pub project: ProjectRuntime,
    pub graphics: Arc<HeadlessGraphics>,
    pub stats: Arc<Mutex<RenderStats>>,
    _dir: TempDir,
}

impl Harness {
    pub fn start(&mut self) {
        self.project
            .construct_startup_scene()
            .expect("startup scene loads");
    }

    pub fn body_count(&self) -> usize {
        physics::lock(&self.project.collaborators().physics).body_count()
    }

    pub fn shape_count(&self) -> usize {
        physics::lock(&self.project.collaborators().physics).shape_count()
    }

    pub fn world_position(&self, entity: &Uuid) -> Vec3 {
        self.project
            .active_scene_runtime()
            .and_then(|scene| scene.world_transform(entity))
            .expect("entity in active scene")
            .position
    }
}
