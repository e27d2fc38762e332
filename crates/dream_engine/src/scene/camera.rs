//! Scene camera
//!
//! Holds the camera transform, the perspective parameters and the distance
//! limits a scene uses for culling.
//!
//! # Coordinate System
//!
//! The camera looks down its local -Z axis with +Y up. View matrices map
//! world space to a right-handed view space and projection matrices follow
//! OpenGL clip space conventions, matching [`Frustum::from_matrix`].
//!
//! # Following
//!
//! A camera may follow an entity. While following, the camera keeps the
//! offset it was given at construction and the scene moves it after every
//! logic update.

use nalgebra::Perspective3;

use super::bounds::{Frustum, AABB};
use crate::config::EngineConfig;
use crate::definition::SceneDefinition;
use crate::foundation::math::{utils, Mat4, Quat, Transform, Vec3};
use crate::foundation::uuid::Uuid;

const MIN_ASPECT: f32 = 1.0e-4;
const MIN_DEPTH_RANGE: f32 = 1.0e-3;

/// Perspective camera with draw distance limits
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World transform; scale is ignored
    pub transform: Transform,
    fov: f32,
    aspect: f32,
    min_draw_distance: f32,
    max_draw_distance: f32,
    mesh_cull_distance: f32,
    movement_speed: f32,
    follow: Option<Uuid>,
    follow_offset: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Transform::identity(), 45.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

impl Camera {
    /// Create a perspective camera
    ///
    /// # Arguments
    ///
    /// * `transform` - World placement of the camera
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Width over height
    /// * `near` - Near clip distance
    /// * `far` - Far clip distance; also the default mesh cull distance
    pub fn perspective(transform: Transform, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            transform,
            fov: utils::deg_to_rad(fov_degrees),
            aspect: aspect.max(MIN_ASPECT),
            min_draw_distance: near,
            max_draw_distance: far,
            mesh_cull_distance: far,
            movement_speed: 10.0,
            follow: None,
            follow_offset: Vec3::zeros(),
        };
        camera.set_draw_distances(near, far);
        camera
    }

    /// Build the camera a scene starts with. Scene values win over the
    /// engine defaults.
    pub fn from_scene(scene: &SceneDefinition, config: &EngineConfig) -> Self {
        let settings = scene.camera();
        let transform = settings.transform.to_transform();
        let aspect = config.window_width as f32 / config.window_height.max(1) as f32;

        let mut camera = Self::perspective(
            transform,
            settings.field_of_view,
            aspect,
            scene.min_draw_distance().unwrap_or(config.default_min_draw_distance),
            scene.max_draw_distance().unwrap_or(config.default_max_draw_distance),
        );
        camera.mesh_cull_distance = scene
            .mesh_cull_distance()
            .unwrap_or(config.default_mesh_cull_distance);
        camera.movement_speed = settings.movement_speed;
        if let Some(target) = settings.follow_entity.filter(Uuid::is_valid) {
            camera.follow(&target, transform.position);
        }
        camera
    }

    /// Vertical field of view in radians
    pub const fn fov(&self) -> f32 {
        self.fov
    }

    /// Set the vertical field of view in degrees
    pub fn set_fov_degrees(&mut self, degrees: f32) {
        self.fov = utils::deg_to_rad(utils::clamp(degrees, 1.0, 179.0));
    }

    /// Width over height
    pub const fn aspect_ratio(&self) -> f32 {
        self.aspect
    }

    /// Update the aspect ratio, typically after a window resize
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        let aspect = aspect.max(MIN_ASPECT);
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Recompute the aspect ratio from a viewport size in pixels.
    /// A zero sized viewport (minimised window) is ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.set_aspect_ratio(width as f32 / height as f32);
    }

    /// Near clip distance
    pub const fn min_draw_distance(&self) -> f32 {
        self.min_draw_distance
    }

    /// Far clip distance
    pub const fn max_draw_distance(&self) -> f32 {
        self.max_draw_distance
    }

    /// Set both clip distances. The far plane is pushed out when it would
    /// not lie beyond the near plane.
    pub fn set_draw_distances(&mut self, near: f32, far: f32) {
        let near = near.max(MIN_DEPTH_RANGE);
        self.min_draw_distance = near;
        self.max_draw_distance = far.max(near + MIN_DEPTH_RANGE);
    }

    /// Distance beyond which meshes are not queued
    pub const fn mesh_cull_distance(&self) -> f32 {
        self.mesh_cull_distance
    }

    /// Set the mesh cull distance
    pub fn set_mesh_cull_distance(&mut self, distance: f32) {
        self.mesh_cull_distance = distance.max(0.0);
    }

    /// Free-fly speed in units per second
    pub const fn movement_speed(&self) -> f32 {
        self.movement_speed
    }

    /// Set the free-fly speed
    pub fn set_movement_speed(&mut self, speed: f32) {
        self.movement_speed = speed;
    }

    /// World position
    pub const fn position(&self) -> Vec3 {
        self.transform.position
    }

    /// Unit vector the camera looks along
    pub fn forward(&self) -> Vec3 {
        self.transform.rotation * -Vec3::z()
    }

    /// Unit vector to the camera's right
    pub fn right(&self) -> Vec3 {
        self.transform.rotation * Vec3::x()
    }

    /// Unit vector above the camera
    pub fn up(&self) -> Vec3 {
        self.transform.rotation * Vec3::y()
    }

    /// Turn to face a point. Ignored when the point is the camera position.
    pub fn look_at(&mut self, target: Vec3) {
        let direction = target - self.transform.position;
        if direction.magnitude_squared() <= f32::EPSILON {
            return;
        }
        // face_towards aligns +Z with the direction; the camera looks down -Z
        self.transform.rotation = Quat::face_towards(&-direction, &Vec3::y());
    }

    /// Move by a world space offset
    pub fn translate(&mut self, offset: Vec3) {
        self.transform.position += offset;
        self.follow_offset += offset;
    }

    /// Move along camera relative axes (x right, y up, z forward) at the
    /// movement speed for `delta` seconds
    pub fn fly(&mut self, direction: Vec3, delta: f32) {
        let world = self.right() * direction.x + self.up() * direction.y + self.forward() * direction.z;
        self.translate(world * self.movement_speed * delta);
    }

    /// Entity being followed
    pub const fn follow_target(&self) -> Option<&Uuid> {
        self.follow.as_ref()
    }

    /// Follow an entity, keeping `offset` from its world position
    pub fn follow(&mut self, entity: &Uuid, offset: Vec3) {
        self.follow = Some(entity.clone());
        self.follow_offset = offset;
    }

    /// Stop following
    pub fn unfollow(&mut self) {
        self.follow = None;
    }

    /// Move to the followed entity's new world position
    pub fn track(&mut self, target_position: Vec3) {
        self.transform.position = target_position + self.follow_offset;
    }

    /// World to view space
    pub fn view_matrix(&self) -> Mat4 {
        self.transform.rotation.inverse().to_homogeneous() * Mat4::new_translation(&-self.transform.position)
    }

    /// View to clip space
    pub fn projection_matrix(&self) -> Mat4 {
        Perspective3::new(self.aspect, self.fov, self.min_draw_distance, self.max_draw_distance).to_homogeneous()
    }

    /// Combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Frustum planes for culling
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.view_projection_matrix())
    }

    /// Distance from the camera to a world point
    pub fn distance_to(&self, point: Vec3) -> f32 {
        (point - self.transform.position).magnitude()
    }

    /// Whether a world point is close enough for its mesh to be drawn
    pub fn within_mesh_cull_distance(&self, point: Vec3) -> bool {
        self.distance_to(point) <= self.mesh_cull_distance
    }

    /// Whether a world space box is inside the view frustum and within the
    /// mesh cull distance of the camera
    pub fn is_visible(&self, bounds: &AABB) -> bool {
        self.is_visible_in(&self.frustum(), bounds)
    }

    /// [`is_visible`](Self::is_visible) against a frustum computed once
    /// for the frame
    pub fn is_visible_in(&self, frustum: &Frustum, bounds: &AABB) -> bool {
        let reach = self.mesh_cull_distance + bounds.bounding_radius();
        self.distance_to(bounds.center()) <= reach && frustum.intersects_aabb(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Point3;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn unit_box_at(center: Vec3) -> AABB {
        AABB::from_center_extents(center, Vec3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_view_matrix_moves_world_into_camera_space() {
        let camera = Camera::perspective(
            Transform::from_position(Vec3::new(0.0, 0.0, 10.0)),
            60.0,
            1.0,
            0.1,
            100.0,
        );
        let origin = camera.view_matrix().transform_point(&Point3::origin());
        assert_relative_eq!(origin.coords, Vec3::new(0.0, 0.0, -10.0), epsilon = 1e-5);
        assert_relative_eq!(camera.forward(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_visibility_respects_frustum_and_cull_distance() {
        let mut camera = Camera::perspective(Transform::identity(), 60.0, 1.0, 0.1, 500.0);
        camera.set_mesh_cull_distance(50.0);

        assert!(camera.is_visible(&unit_box_at(Vec3::new(0.0, 0.0, -10.0))));
        assert!(!camera.is_visible(&unit_box_at(Vec3::new(0.0, 0.0, 10.0))));
        assert!(!camera.is_visible(&unit_box_at(Vec3::new(0.0, 0.0, -100.0))));
        assert!(camera.within_mesh_cull_distance(Vec3::new(0.0, 0.0, -49.0)));
    }

    #[test]
    fn test_look_at_turns_towards_target() {
        let mut camera = Camera::default();
        camera.look_at(Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(camera.forward(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
        assert!(camera.is_visible(&unit_box_at(Vec3::new(10.0, 0.0, 0.0))));
    }

    #[test]
    fn test_viewport_updates_aspect() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 400);
        assert_relative_eq!(camera.aspect_ratio(), 2.0);
        camera.set_viewport(0, 400);
        assert_relative_eq!(camera.aspect_ratio(), 2.0);
    }

    #[test]
    fn test_degenerate_draw_distances_are_repaired() {
        let camera = Camera::perspective(Transform::identity(), 45.0, 1.0, 5.0, 5.0);
        assert!(camera.max_draw_distance() > camera.min_draw_distance());
        // Must not panic inside Perspective3
        let _ = camera.projection_matrix();
    }

    #[test]
    fn test_scene_settings_override_defaults() {
        let scene = SceneDefinition::from_json(json!({
            "uuid": "s", "name": "Scene",
            "maxDrawDistance": 300.0,
            "meshCullDistance": 120.0,
            "camera": {
                "fieldOfView": 90.0,
                "movementSpeed": 3.0,
                "followEntity": "player",
                "transform": { "translation": { "x": 0.0, "y": 2.0, "z": 5.0 } }
            }
        }))
        .unwrap();
        let config = EngineConfig::default();
        let mut camera = Camera::from_scene(&scene, &config);

        assert_relative_eq!(camera.max_draw_distance(), 300.0);
        assert_relative_eq!(camera.min_draw_distance(), config.default_min_draw_distance);
        assert_relative_eq!(camera.mesh_cull_distance(), 120.0);
        assert_relative_eq!(camera.fov(), std::f32::consts::FRAC_PI_2, epsilon = 1e-5);
        assert_relative_eq!(camera.movement_speed(), 3.0);
        assert_eq!(camera.follow_target(), Some(&Uuid::new("player")));

        camera.track(Vec3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(camera.position(), Vec3::new(10.0, 2.0, 5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_fly_uses_camera_axes() {
        let mut camera = Camera::default();
        camera.set_movement_speed(2.0);
        camera.fly(Vec3::new(0.0, 0.0, 1.0), 0.5);
        assert_relative_eq!(camera.position(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }
}
