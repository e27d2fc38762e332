//! Minimal rigid body world
//!
//! Semi-implicit Euler integration, bounding sphere contacts between
//! bodies and exact sphere-plane contacts against static planes. Enough to
//! run scenes headless; not a substitute for a full solver.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::UnitQuaternion;

use super::{BodyDesc, BodyId, Contact, PhysicsWorld, ShapeDesc, ShapeId};
use crate::backend::{BackendError, BackendResult};
use crate::foundation::math::{Transform, Vec3};

#[derive(Debug, Clone)]
struct Shape {
    desc: ShapeDesc,
    radius: f32,
}

#[derive(Debug, Clone)]
struct Body {
    desc: BodyDesc,
    transform: Transform,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    force: Vec3,
}

impl Body {
    fn is_dynamic(&self) -> bool {
        self.desc.mass > 0.0 && !self.desc.kinematic
    }
}

/// Self-contained [`PhysicsWorld`]
#[derive(Debug)]
pub struct SimplePhysicsWorld {
    next_id: u32,
    gravity: Vec3,
    shapes: BTreeMap<u32, Shape>,
    bodies: BTreeMap<u32, Body>,
    in_world: BTreeSet<u32>,
    contacts: Vec<Contact>,
}

impl Default for SimplePhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimplePhysicsWorld {
    /// Create an empty world with standard gravity
    pub fn new() -> Self {
        Self {
            next_id: 0,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            shapes: BTreeMap::new(),
            bodies: BTreeMap::new(),
            in_world: BTreeSet::new(),
            contacts: Vec::new(),
        }
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn shape_of(&self, body: &Body) -> Option<&Shape> {
        self.shapes.get(&body.desc.shape.0)
    }

    fn integrate(&mut self, delta: f32) {
        let gravity = self.gravity;
        for id in &self.in_world {
            let Some(body) = self.bodies.get_mut(id) else { continue };
            if !body.is_dynamic() {
                continue;
            }
            let acceleration = gravity + body.force / body.desc.mass;
            body.linear_velocity += acceleration.component_mul(&body.desc.linear_factor) * delta;
            body.transform.position += body.linear_velocity * delta;

            let spin = body.angular_velocity.component_mul(&body.desc.angular_factor) * delta;
            body.transform.rotation = UnitQuaternion::from_scaled_axis(spin) * body.transform.rotation;
            body.force = Vec3::zeros();
        }
    }

    fn plane_contact(&mut self, plane_id: u32, normal: Vec3, constant: f32, other_id: u32) -> Option<Contact> {
        let radius = self.shapes.get(&self.bodies.get(&other_id)?.desc.shape.0)?.radius;
        let body = self.bodies.get_mut(&other_id)?;
        let radius = radius * body.transform.scale.amax();
        let normal = normal.try_normalize(f32::EPSILON)?;
        let distance = normal.dot(&body.transform.position) - constant;
        if distance > radius {
            return None;
        }

        if body.is_dynamic() {
            body.transform.position += normal * (radius - distance);
            let approach = body.linear_velocity.dot(&normal);
            if approach < 0.0 {
                body.linear_velocity -= normal * approach * (1.0 + body.desc.restitution);
            }
        }
        Some(Contact {
            a: BodyId(other_id),
            b: BodyId(plane_id),
            point: body.transform.position - normal * distance.min(radius),
            normal,
        })
    }

    fn plane_of(&self, id: u32) -> Option<(Vec3, f32)> {
        let body = self.bodies.get(&id)?;
        match self.shape_of(body)?.desc {
            ShapeDesc::StaticPlane { normal, constant } => Some((normal, constant)),
            _ => None,
        }
    }

    fn sphere_contact(&self, a: u32, b: u32) -> Option<Contact> {
        let (body_a, body_b) = (self.bodies.get(&a)?, self.bodies.get(&b)?);
        let ra = self.shape_of(body_a)?.radius * body_a.transform.scale.amax();
        let rb = self.shape_of(body_b)?.radius * body_b.transform.scale.amax();
        let offset = body_a.transform.position - body_b.transform.position;
        if offset.magnitude() > ra + rb {
            return None;
        }
        let normal = offset.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::y);
        Some(Contact {
            a: BodyId(a),
            b: BodyId(b),
            point: body_b.transform.position + normal * rb,
            normal,
        })
    }

    fn detect_contacts(&mut self) {
        let ids: Vec<u32> = self.in_world.iter().copied().collect();
        let mut contacts = Vec::new();

        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let dynamic = |id: u32| self.bodies.get(&id).is_some_and(Body::is_dynamic);
                if !dynamic(a) && !dynamic(b) {
                    continue;
                }
                let contact = match (self.plane_of(a), self.plane_of(b)) {
                    (Some((normal, constant)), None) => self.plane_contact(a, normal, constant, b),
                    (None, Some((normal, constant))) => self.plane_contact(b, normal, constant, a),
                    (None, None) => self.sphere_contact(a, b),
                    (Some(_), Some(_)) => None,
                };
                contacts.extend(contact);
            }
        }
        self.contacts = contacts;
    }
}

impl PhysicsWorld for SimplePhysicsWorld {
    fn create_shape(&mut self, shape: &ShapeDesc, margin: f32) -> BackendResult<ShapeId> {
        if let ShapeDesc::TriangleMesh { triangles } = shape {
            if triangles.is_empty() {
                return Err(BackendError::InvalidData("triangle mesh shape has no triangles".to_string()));
            }
        }
        if let ShapeDesc::Compound { children } = shape {
            if children.is_empty() {
                return Err(BackendError::InvalidData("compound shape has no children".to_string()));
            }
        }
        let radius = shape.bounding_radius() + margin.max(0.0);
        let id = self.allocate();
        self.shapes.insert(id, Shape { desc: shape.clone(), radius });
        Ok(ShapeId(id))
    }

    fn delete_shape(&mut self, id: ShapeId) {
        if self.bodies.values().any(|b| b.desc.shape == id) {
            log::warn!("Deleting shape {id:?} still used by a body");
        }
        self.shapes.remove(&id.0);
    }

    fn create_body(&mut self, desc: &BodyDesc) -> BackendResult<BodyId> {
        if !self.shapes.contains_key(&desc.shape.0) {
            return Err(BackendError::InvalidData(format!("unknown shape {:?}", desc.shape)));
        }
        if desc.mass < 0.0 {
            return Err(BackendError::InvalidData(format!("negative mass {}", desc.mass)));
        }
        let id = self.allocate();
        self.bodies.insert(
            id,
            Body {
                desc: desc.clone(),
                transform: desc.transform,
                linear_velocity: desc.linear_velocity,
                angular_velocity: desc.angular_velocity,
                force: Vec3::zeros(),
            },
        );
        Ok(BodyId(id))
    }

    fn delete_body(&mut self, id: BodyId) {
        self.in_world.remove(&id.0);
        self.bodies.remove(&id.0);
    }

    fn add_body(&mut self, id: BodyId) -> BackendResult<()> {
        if !self.bodies.contains_key(&id.0) {
            return Err(BackendError::InvalidData(format!("unknown body {id:?}")));
        }
        self.in_world.insert(id.0);
        Ok(())
    }

    fn remove_body(&mut self, id: BodyId) {
        self.in_world.remove(&id.0);
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    fn gravity(&self) -> Vec3 {
        self.gravity
    }

    fn body_transform(&self, id: BodyId) -> Option<Transform> {
        self.bodies.get(&id.0).map(|b| b.transform)
    }

    fn set_body_transform(&mut self, id: BodyId, transform: &Transform) {
        if let Some(body) = self.bodies.get_mut(&id.0) {
            body.transform = *transform;
        }
    }

    fn linear_velocity(&self, id: BodyId) -> Option<Vec3> {
        self.bodies.get(&id.0).map(|b| b.linear_velocity)
    }

    fn set_linear_velocity(&mut self, id: BodyId, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id.0) {
            body.linear_velocity = velocity;
        }
    }

    fn set_angular_velocity(&mut self, id: BodyId, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id.0) {
            body.angular_velocity = velocity;
        }
    }

    fn apply_central_impulse(&mut self, id: BodyId, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id.0).filter(|b| b.is_dynamic()) {
            body.linear_velocity += impulse.component_mul(&body.desc.linear_factor) / body.desc.mass;
        }
    }

    fn apply_central_force(&mut self, id: BodyId, force: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id.0) {
            body.force += force;
        }
    }

    fn step(&mut self, delta: f32) {
        if delta <= 0.0 {
            return;
        }
        self.integrate(delta);
        self.detect_contacts();
    }

    fn drain_contacts(&mut self) -> Vec<Contact> {
        std::mem::take(&mut self.contacts)
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    fn bodies_in_world(&self) -> usize {
        self.in_world.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn body(shape: ShapeId, mass: f32, position: Vec3) -> BodyDesc {
        BodyDesc {
            shape,
            mass,
            transform: Transform::from_position(position),
            kinematic: false,
            character: false,
            restitution: 0.0,
            friction: 0.5,
            linear_factor: Vec3::new(1.0, 1.0, 1.0),
            angular_factor: Vec3::new(1.0, 1.0, 1.0),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            ccd_swept_sphere_radius: 0.0,
        }
    }

    #[test]
    fn test_dynamic_body_falls() {
        let mut world = SimplePhysicsWorld::new();
        let sphere = world.create_shape(&ShapeDesc::Sphere { radius: 0.5 }, 0.0).unwrap();
        let id = world.create_body(&body(sphere, 1.0, Vec3::new(0.0, 10.0, 0.0))).unwrap();
        world.add_body(id).unwrap();
        world.step(1.0);
        let y = world.body_transform(id).unwrap().position.y;
        assert_relative_eq!(y, 10.0 - 9.81, epsilon = 1e-4);
    }

    #[test]
    fn test_static_body_does_not_move() {
        let mut world = SimplePhysicsWorld::new();
        let sphere = world.create_shape(&ShapeDesc::Sphere { radius: 0.5 }, 0.0).unwrap();
        let id = world.create_body(&body(sphere, 0.0, Vec3::new(0.0, 3.0, 0.0))).unwrap();
        world.add_body(id).unwrap();
        world.apply_central_impulse(id, Vec3::new(5.0, 0.0, 0.0));
        world.step(1.0);
        assert_eq!(world.body_transform(id).unwrap().position, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_sphere_rests_on_plane_with_contact() {
        let mut world = SimplePhysicsWorld::new();
        let plane = world
            .create_shape(&ShapeDesc::StaticPlane { normal: Vec3::y(), constant: 0.0 }, 0.0)
            .unwrap();
        let sphere = world.create_shape(&ShapeDesc::Sphere { radius: 1.0 }, 0.0).unwrap();
        let ground = world.create_body(&body(plane, 0.0, Vec3::zeros())).unwrap();
        let ball = world.create_body(&body(sphere, 1.0, Vec3::new(0.0, 1.05, 0.0))).unwrap();
        world.add_body(ground).unwrap();
        world.add_body(ball).unwrap();

        world.step(0.1);
        let contacts = world.drain_contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].a, ball);
        assert_eq!(contacts[0].b, ground);
        assert!(world.body_transform(ball).unwrap().position.y >= 1.0 - 1e-4);
        assert!(world.drain_contacts().is_empty());
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let mut world = SimplePhysicsWorld::new();
        assert!(world.create_shape(&ShapeDesc::TriangleMesh { triangles: Vec::new() }, 0.0).is_err());
        assert!(world.create_body(&body(ShapeId(99), 1.0, Vec3::zeros())).is_err());
        assert!(world.add_body(BodyId(42)).is_err());
        assert_eq!(world.shape_count(), 0);
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn test_delete_body_leaves_world() {
        let mut world = SimplePhysicsWorld::new();
        let sphere = world.create_shape(&ShapeDesc::Sphere { radius: 1.0 }, 0.0).unwrap();
        let id = world.create_body(&body(sphere, 1.0, Vec3::zeros())).unwrap();
        world.add_body(id).unwrap();
        world.delete_body(id);
        world.delete_shape(sphere);
        assert_eq!(world.bodies_in_world(), 0);
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.shape_count(), 0);
    }
}
