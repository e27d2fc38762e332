//! Physics object runtimes
//!
//! Discrete runtime owning one collision shape and one rigid body. The
//! shape is selected by the definition's format. Locks are always taken in
//! the order instance, then world.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{formats, lock, BodyDesc, BodyId, ShapeDesc, ShapeId, SharedPhysicsWorld};
use crate::assets::discrete::{discrete_asset_runtime, DiscreteAssetRuntime, DiscreteRuntime};
use crate::assets::{ConstructionError, DependencyError, LoadContext};
use crate::definition::{AssetDefinition, AssetType, PhysicsObjectDefinition};
use crate::foundation::math::{Transform, Vec3};
use crate::foundation::uuid::Uuid;

/// Compound shapes deeper than this are treated as cyclic
const MAX_COMPOUND_DEPTH: usize = 8;

struct NativeBody {
    world: SharedPhysicsWorld,
    shape: ShapeId,
    body: BodyId,
    in_world: bool,
}

/// Rigid body attached to an entity
pub struct PhysicsObjectRuntime {
    base: DiscreteAssetRuntime,
    settings: PhysicsObjectDefinition,
    native: Mutex<Option<NativeBody>>,
}

discrete_asset_runtime!(PhysicsObjectRuntime);

/// Build the shape a physics object definition describes
pub fn shape_from_definition(definition: &AssetDefinition, ctx: &LoadContext<'_>) -> Result<ShapeDesc, ConstructionError> {
    build_shape(definition, ctx, 0)
}

fn build_shape(definition: &AssetDefinition, ctx: &LoadContext<'_>, depth: usize) -> Result<ShapeDesc, ConstructionError> {
    let settings: PhysicsObjectDefinition = definition.view()?;
    let format = definition.format();
    let shape = match format.as_str() {
        formats::SPHERE => ShapeDesc::Sphere { radius: settings.radius },
        formats::BOX => ShapeDesc::Box { half_extents: settings.half_extents.into() },
        formats::CYLINDER => ShapeDesc::Cylinder { half_extents: settings.half_extents.into() },
        formats::CAPSULE => ShapeDesc::Capsule {
            radius: settings.radius,
            height: settings.height,
        },
        formats::STATIC_PLANE => ShapeDesc::StaticPlane {
            normal: settings.normal.into(),
            constant: settings.constant,
        },
        formats::COMPOUND => {
            if depth >= MAX_COMPOUND_DEPTH {
                return Err(ConstructionError::UnsupportedFormat {
                    owner: definition.describe(),
                    format: "compound shape nested too deeply".to_string(),
                });
            }
            let mut children = Vec::with_capacity(settings.compound_children.len());
            for child in &settings.compound_children {
                let child_definition = ctx
                    .project
                    .asset_definition(&child.uuid)
                    .filter(|d| d.asset_type() == AssetType::PhysicsObject)
                    .ok_or_else(|| DependencyError::Undefined {
                        owner: definition.describe(),
                        kind: AssetType::PhysicsObject,
                        uuid: child.uuid.clone(),
                    })?;
                let shape = build_shape(child_definition, ctx, depth + 1)?;
                children.push((child.transform.to_transform(), shape));
            }
            ShapeDesc::Compound { children }
        }
        formats::TRIANGLE_MESH => {
            let model = ctx.resolve(&ctx.caches.models, &definition.describe(), settings.collision_model())?;
            ShapeDesc::TriangleMesh { triangles: model.triangles() }
        }
        _ => {
            return Err(ConstructionError::UnsupportedFormat {
                owner: definition.describe(),
                format,
            })
        }
    };
    Ok(shape)
}

impl PhysicsObjectRuntime {
    fn native(&self) -> MutexGuard<'_, Option<NativeBody>> {
        self.native.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entity that owns the body
    pub const fn entity_uuid(&self) -> &Uuid {
        self.base.entity_uuid()
    }

    /// Body handle, once loaded
    pub fn body_id(&self) -> Option<BodyId> {
        self.native().as_ref().map(|n| n.body)
    }

    /// Body settings
    pub const fn settings(&self) -> &PhysicsObjectDefinition {
        &self.settings
    }

    /// Driven by its entity rather than simulated
    pub const fn is_kinematic(&self) -> bool {
        self.settings.kinematic
    }

    /// Simulated and moved by the world
    pub fn is_dynamic(&self) -> bool {
        self.settings.mass > 0.0 && !self.settings.kinematic
    }

    /// Player controlled character
    pub const fn is_character(&self) -> bool {
        self.settings.controllable_character
    }

    /// Whether the body is being simulated
    pub fn is_in_world(&self) -> bool {
        self.native().as_ref().is_some_and(|n| n.in_world)
    }

    /// Start simulating the body
    pub fn add_to_world(&self) -> Result<(), ConstructionError> {
        let mut native = self.native();
        let Some(native) = native.as_mut() else {
            return Ok(());
        };
        if !native.in_world {
            lock(&native.world).add_body(native.body)?;
            native.in_world = true;
        }
        Ok(())
    }

    /// Stop simulating the body
    pub fn remove_from_world(&self) {
        let mut native = self.native();
        if let Some(native) = native.as_mut().filter(|n| n.in_world) {
            lock(&native.world).remove_body(native.body);
            native.in_world = false;
        }
    }

    /// Current world transform of the body
    pub fn body_transform(&self) -> Option<Transform> {
        self.native()
            .as_ref()
            .and_then(|native| lock(&native.world).body_transform(native.body))
    }

    /// Move the body to an entity's world transform
    pub fn set_body_transform(&self, transform: &Transform) {
        if let Some(native) = self.native().as_ref() {
            lock(&native.world).set_body_transform(native.body, transform);
        }
    }

    /// Current linear velocity
    pub fn linear_velocity(&self) -> Option<Vec3> {
        self.native()
            .as_ref()
            .and_then(|native| lock(&native.world).linear_velocity(native.body))
    }

    /// Set linear velocity
    pub fn set_linear_velocity(&self, velocity: Vec3) {
        if let Some(native) = self.native().as_ref() {
            lock(&native.world).set_linear_velocity(native.body, velocity);
        }
    }

    /// Set angular velocity
    pub fn set_angular_velocity(&self, velocity: Vec3) {
        if let Some(native) = self.native().as_ref() {
            lock(&native.world).set_angular_velocity(native.body, velocity);
        }
    }

    /// Apply an impulse through the centre of mass
    pub fn apply_central_impulse(&self, impulse: Vec3) {
        if let Some(native) = self.native().as_ref() {
            lock(&native.world).apply_central_impulse(native.body, impulse);
        }
    }

    /// Apply a force through the centre of mass for the next step
    pub fn apply_central_force(&self, force: Vec3) {
        if let Some(native) = self.native().as_ref() {
            lock(&native.world).apply_central_force(native.body, force);
        }
    }

    /// Free the body and shape. Safe to call more than once.
    pub fn release(&self) {
        if let Some(native) = self.native().take() {
            log::trace!("Releasing body {:?} of {}", native.body, self.base.definition().describe());
            let mut world = lock(&native.world);
            if native.in_world {
                world.remove_body(native.body);
            }
            world.delete_body(native.body);
            world.delete_shape(native.shape);
        }
    }

    fn body_desc(&self, shape: ShapeId, world: &Transform) -> BodyDesc {
        let s = &self.settings;
        BodyDesc {
            shape,
            mass: s.mass,
            transform: *world,
            kinematic: s.kinematic,
            character: s.controllable_character,
            restitution: s.restitution,
            friction: s.friction,
            linear_factor: s.linear_factor.into(),
            angular_factor: s.angular_factor.into(),
            linear_velocity: s.linear_velocity.into(),
            angular_velocity: s.angular_velocity.into(),
            ccd_swept_sphere_radius: s.ccd_swept_sphere_radius,
        }
    }
}

impl DiscreteRuntime for PhysicsObjectRuntime {
    fn construct(definition: Arc<AssetDefinition>, entity: Uuid) -> Self {
        Self {
            base: DiscreteAssetRuntime::new(definition, entity),
            settings: PhysicsObjectDefinition::default(),
            native: Mutex::new(None),
        }
    }

    fn base_mut(&mut self) -> &mut DiscreteAssetRuntime {
        &mut self.base
    }

    fn load(&mut self, ctx: &LoadContext<'_>, world: &Transform) -> Result<(), ConstructionError> {
        let definition = Arc::clone(self.base.definition());
        self.settings = definition.view()?;
        let shape_desc = shape_from_definition(&definition, ctx)?;

        let mut physics = lock(ctx.physics);
        let shape = physics.create_shape(&shape_desc, self.settings.margin)?;
        let body = match physics.create_body(&self.body_desc(shape, world)) {
            Ok(body) => body,
            Err(e) => {
                physics.delete_shape(shape);
                return Err(e.into());
            }
        };
        drop(physics);

        log::debug!("Created body {:?} for {}", body, definition.describe());
        *self.native() = Some(NativeBody {
            world: Arc::clone(ctx.physics),
            shape,
            body,
            in_world: false,
        });
        Ok(())
    }
}

impl Drop for PhysicsObjectRuntime {
    fn drop(&mut self) {
        self.release();
    }
}
