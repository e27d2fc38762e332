//! Physics module
//!
//! The engine drives a physics world through the narrow [`PhysicsWorld`]
//! interface. Collision shapes are chosen by a physics object's format
//! string and described with [`ShapeDesc`]; bodies are created from a
//! [`BodyDesc`]. [`SimplePhysicsWorld`] is a self-contained implementation
//! used headless and in tests.

pub mod object;
pub mod simple;

pub use object::PhysicsObjectRuntime;
pub use simple::SimplePhysicsWorld;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::BackendResult;
use crate::foundation::math::{Transform, Vec3};

/// Collision shape in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u32);

/// Rigid body in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

/// Physics object formats
pub mod formats {
    /// Sphere of `radius`
    pub const SPHERE: &str = "btSphereShape";
    /// Box of `halfExtents`
    pub const BOX: &str = "btBoxShape";
    /// Y aligned cylinder of `halfExtents`
    pub const CYLINDER: &str = "btCylinderShape";
    /// Y aligned capsule of `radius` and `height`
    pub const CAPSULE: &str = "btCapsuleShape";
    /// Infinite plane of `normal` and `constant`
    pub const STATIC_PLANE: &str = "btStaticPlaneShape";
    /// Children taken from other physics object definitions
    pub const COMPOUND: &str = "btCompoundShape";
    /// Triangles taken from a model
    pub const TRIANGLE_MESH: &str = "btBvhTriangleMeshShape";
}

/// Geometry of a collision shape
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeDesc {
    /// Sphere around the origin
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Box around the origin
    Box {
        /// Half size on each axis
        half_extents: Vec3,
    },
    /// Cylinder along Y
    Cylinder {
        /// Half size on each axis
        half_extents: Vec3,
    },
    /// Capsule along Y
    Capsule {
        /// Cap radius
        radius: f32,
        /// Distance between cap centres
        height: f32,
    },
    /// Plane `normal . p = constant`
    StaticPlane {
        /// Plane normal
        normal: Vec3,
        /// Plane offset
        constant: f32,
    },
    /// Several shapes with local offsets
    Compound {
        /// Child offsets and shapes
        children: Vec<(Transform, ShapeDesc)>,
    },
    /// Static triangle soup
    TriangleMesh {
        /// Triangles in local space
        triangles: Vec<[Vec3; 3]>,
    },
}

impl ShapeDesc {
    /// Radius of a sphere around the local origin enclosing the shape.
    /// Planes are unbounded.
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } | Self::Cylinder { half_extents } => half_extents.magnitude(),
            Self::Capsule { radius, height } => radius + height * 0.5,
            Self::StaticPlane { .. } => f32::INFINITY,
            Self::Compound { children } => children
                .iter()
                .map(|(offset, shape)| {
                    offset.position.magnitude() + shape.bounding_radius() * offset.scale.amax()
                })
                .fold(0.0, f32::max),
            Self::TriangleMesh { triangles } => triangles
                .iter()
                .flatten()
                .map(|v| v.magnitude())
                .fold(0.0, f32::max),
        }
    }
}

/// Everything needed to create a rigid body
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    /// Collision shape
    pub shape: ShapeId,
    /// Zero for static bodies
    pub mass: f32,
    /// Initial world transform
    pub transform: Transform,
    /// Driven by its entity rather than simulated
    pub kinematic: bool,
    /// Player controlled character
    pub character: bool,
    /// Bounciness
    pub restitution: f32,
    /// Friction coefficient
    pub friction: f32,
    /// Per-axis linear motion scale
    pub linear_factor: Vec3,
    /// Per-axis angular motion scale
    pub angular_factor: Vec3,
    /// Initial linear velocity
    pub linear_velocity: Vec3,
    /// Initial angular velocity
    pub angular_velocity: Vec3,
    /// Continuous collision detection radius, zero to disable
    pub ccd_swept_sphere_radius: f32,
}

/// Two bodies touching after a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// First body
    pub a: BodyId,
    /// Second body
    pub b: BodyId,
    /// World space contact point
    pub point: Vec3,
    /// Normal pointing from `b` towards `a`
    pub normal: Vec3,
}

/// Physics collaborator
pub trait PhysicsWorld: Send {
    /// Create a collision shape with a margin
    fn create_shape(&mut self, shape: &ShapeDesc, margin: f32) -> BackendResult<ShapeId>;
    /// Free a shape
    fn delete_shape(&mut self, id: ShapeId);
    /// Create a body, not yet simulated
    fn create_body(&mut self, desc: &BodyDesc) -> BackendResult<BodyId>;
    /// Free a body, removing it from the simulation first
    fn delete_body(&mut self, id: BodyId);
    /// Start simulating a body
    fn add_body(&mut self, id: BodyId) -> BackendResult<()>;
    /// Stop simulating a body
    fn remove_body(&mut self, id: BodyId);

    /// Set world gravity
    fn set_gravity(&mut self, gravity: Vec3);
    /// World gravity
    fn gravity(&self) -> Vec3;

    /// Current body transform
    fn body_transform(&self, id: BodyId) -> Option<Transform>;
    /// Move a body
    fn set_body_transform(&mut self, id: BodyId, transform: &Transform);
    /// Current linear velocity
    fn linear_velocity(&self, id: BodyId) -> Option<Vec3>;
    /// Set linear velocity
    fn set_linear_velocity(&mut self, id: BodyId, velocity: Vec3);
    /// Set angular velocity
    fn set_angular_velocity(&mut self, id: BodyId, velocity: Vec3);
    /// Apply an impulse through the centre of mass
    fn apply_central_impulse(&mut self, id: BodyId, impulse: Vec3);
    /// Apply a force through the centre of mass for the next step
    fn apply_central_force(&mut self, id: BodyId, force: Vec3);

    /// Advance the simulation
    fn step(&mut self, delta: f32);
    /// Contacts found by the most recent step
    fn drain_contacts(&mut self) -> Vec<Contact>;

    /// Bodies alive
    fn body_count(&self) -> usize;
    /// Shapes alive
    fn shape_count(&self) -> usize;
    /// Bodies being simulated
    fn bodies_in_world(&self) -> usize;
}

/// Physics world shared between the scene and the worker that steps it
pub type SharedPhysicsWorld = Arc<Mutex<Box<dyn PhysicsWorld>>>;

/// Wrap a world for sharing
pub fn shared(world: impl PhysicsWorld + 'static) -> SharedPhysicsWorld {
    Arc::new(Mutex::new(Box::new(world)))
}

/// Lock a shared world, recovering from a panicked holder
pub fn lock(world: &SharedPhysicsWorld) -> MutexGuard<'_, Box<dyn PhysicsWorld>> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}
