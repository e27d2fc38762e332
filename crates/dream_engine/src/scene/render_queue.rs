//! Per-frame draw queues
//!
//! The scene walks its entity tree once per frame and sorts what it finds
//! into four queues that the renderer consumes:
//!
//! - **opaque**: model meshes, batched by material to minimise program and
//!   texture switches, each batch sorted front to back
//! - **sprites**: textured entities without a model
//! - **fonts**: entities with a font and text
//! - **lights**: entities with a light
//!
//! Queues hold shared runtime handles, so nothing a queue references can be
//! released while the renderer is using it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::assets::{AssetRuntime, FontRuntime, MaterialRuntime, TextureRuntime};
use crate::backend::{MeshId, ProgramId};
use crate::definition::LightType;
use crate::foundation::math::{Mat4, Vec3};
use crate::foundation::uuid::Uuid;

/// One mesh draw
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDraw {
    /// Entity being drawn
    pub entity: Uuid,
    /// Uploaded mesh
    pub mesh: MeshId,
    /// Model to world
    pub world: Mat4,
    /// Distance from the camera, for sorting
    pub distance: f32,
}

/// Mesh draws sharing a material
pub struct MaterialBatch {
    /// Material every draw uses
    pub material: Arc<MaterialRuntime>,
    /// Program of the material's shader, when linked
    pub program: Option<ProgramId>,
    /// Draws, front to back after [`DrawQueues::finish`]
    pub draws: Vec<MeshDraw>,
}

impl MaterialBatch {
    /// Create an empty batch for a material
    pub fn new(material: Arc<MaterialRuntime>) -> Self {
        let program = material.shader().and_then(|s| s.program_id());
        Self {
            material,
            program,
            draws: Vec::new(),
        }
    }

    /// Number of draws in this batch
    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }
}

/// A textured quad
pub struct SpriteDraw {
    /// Entity being drawn
    pub entity: Uuid,
    /// Texture to sample
    pub texture: Arc<TextureRuntime>,
    /// Quad to world
    pub world: Mat4,
}

/// A run of text
pub struct TextDraw {
    /// Entity being drawn
    pub entity: Uuid,
    /// Font to draw with
    pub font: Arc<FontRuntime>,
    /// Text content
    pub text: String,
    /// Text origin to world
    pub world: Mat4,
}

/// A light contributing to the frame
#[derive(Debug, Clone, PartialEq)]
pub struct LightDraw {
    /// Entity carrying the light
    pub entity: Uuid,
    /// Kind of light
    pub light_type: LightType,
    /// World position
    pub position: Vec3,
    /// World direction
    pub direction: Vec3,
    /// Diffuse colour
    pub diffuse: Vec3,
    /// Specular colour
    pub specular: Vec3,
    /// Ambient colour
    pub ambient: Vec3,
}

/// Everything the renderer draws in one frame
#[derive(Default)]
pub struct DrawQueues {
    /// Opaque batches, ordered by material UUID
    pub opaque: Vec<MaterialBatch>,
    /// Sprites in tree order
    pub sprites: Vec<SpriteDraw>,
    /// Text in tree order
    pub fonts: Vec<TextDraw>,
    /// Lights in tree order
    pub lights: Vec<LightDraw>,
    /// Entities rejected by frustum or distance culling
    pub culled: usize,
    pending: BTreeMap<Uuid, MaterialBatch>,
}

impl DrawQueues {
    /// Create empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every queue, keeping allocations
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.sprites.clear();
        self.fonts.clear();
        self.lights.clear();
        self.pending.clear();
        self.culled = 0;
    }

    /// Queue a mesh under its material's batch
    pub fn push_mesh(&mut self, material: &Arc<MaterialRuntime>, draw: MeshDraw) {
        self.pending
            .entry(material.definition().uuid().clone())
            .or_insert_with(|| MaterialBatch::new(Arc::clone(material)))
            .draws
            .push(draw);
    }

    /// Queue a sprite
    pub fn push_sprite(&mut self, draw: SpriteDraw) {
        self.sprites.push(draw);
    }

    /// Queue text
    pub fn push_text(&mut self, draw: TextDraw) {
        self.fonts.push(draw);
    }

    /// Queue a light
    pub fn push_light(&mut self, draw: LightDraw) {
        self.lights.push(draw);
    }

    /// Count an entity that was not queued because it is out of view
    pub fn record_culled(&mut self) {
        self.culled += 1;
    }

    /// Move pending batches into `opaque`, sorting each front to back
    pub fn finish(&mut self) {
        for (_, mut batch) in std::mem::take(&mut self.pending) {
            batch.draws.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            self.opaque.push(batch);
        }
    }

    /// Mesh draws across every opaque batch
    pub fn opaque_draw_count(&self) -> usize {
        self.opaque.iter().map(MaterialBatch::draw_count).sum()
    }

    /// Whether nothing at all was queued
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.sprites.is_empty() && self.fonts.is_empty() && self.lights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SharedAssetRuntime;
    use crate::definition::{AssetDefinition, AssetType};

    fn material(uuid: &str) -> Arc<MaterialRuntime> {
        Arc::new(MaterialRuntime::construct(Arc::new(AssetDefinition::new(
            AssetType::Material,
            Uuid::new(uuid),
            uuid,
        ))))
    }

    fn draw(entity: &str, mesh: u32, distance: f32) -> MeshDraw {
        MeshDraw {
            entity: Uuid::new(entity),
            mesh: MeshId(mesh),
            world: Mat4::identity(),
            distance,
        }
    }

    #[test]
    fn test_meshes_batch_by_material_front_to_back() {
        let stone = material("stone");
        let wood = material("wood");
        let mut queues = DrawQueues::new();

        queues.push_mesh(&wood, draw("a", 1, 30.0));
        queues.push_mesh(&stone, draw("b", 2, 5.0));
        queues.push_mesh(&wood, draw("c", 3, 10.0));
        queues.finish();

        assert_eq!(queues.opaque.len(), 2);
        assert_eq!(queues.opaque_draw_count(), 3);
        assert_eq!(queues.opaque[0].material.uuid(), &Uuid::new("stone"));
        let wood_batch = &queues.opaque[1];
        assert_eq!(wood_batch.draws[0].entity, Uuid::new("c"));
        assert_eq!(wood_batch.draws[1].entity, Uuid::new("a"));
        assert!(wood_batch.program.is_none());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut queues = DrawQueues::new();
        queues.push_mesh(&material("m"), draw("a", 1, 1.0));
        queues.record_culled();
        queues.finish();
        assert!(!queues.is_empty());

        queues.clear();
        assert!(queues.is_empty());
        assert_eq!(queues.culled, 0);
    }
}
