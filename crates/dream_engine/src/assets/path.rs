//! Path runtimes: move an entity along control points at a fixed speed

use std::sync::Arc;

use super::discrete::{discrete_asset_runtime, DiscreteAssetRuntime, DiscreteRuntime};
use super::{ConstructionError, LoadContext};
use crate::definition::{AssetDefinition, PathDefinition};
use crate::foundation::math::{Transform, Vec3};
use crate::foundation::uuid::Uuid;

/// Progress along a polyline of control points
#[derive(Debug, Clone)]
pub struct PathRuntime {
    base: DiscreteAssetRuntime,
    points: Vec<Vec3>,
    velocity: f32,
    wrap: bool,
    segment: usize,
    along: f32,
    finished: bool,
}

discrete_asset_runtime!(PathRuntime);

impl PathRuntime {
    /// Control points in travel order
    pub fn control_points(&self) -> &[Vec3] {
        &self.points
    }

    /// Whether a non-wrapping path has reached its last point
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Return to the first control point
    pub fn reset(&mut self) {
        self.segment = 0;
        self.along = 0.0;
        self.finished = false;
    }

    fn segment_end(&self, segment: usize) -> Option<usize> {
        if segment + 1 < self.points.len() {
            Some(segment + 1)
        } else if self.wrap && self.points.len() > 1 {
            Some(0)
        } else {
            None
        }
    }

    /// Current position on the path
    pub fn position(&self) -> Option<Vec3> {
        let start = *self.points.get(self.segment)?;
        let Some(end) = self.segment_end(self.segment).map(|i| self.points[i]) else {
            return Some(start);
        };
        let length = (end - start).magnitude();
        if length <= f32::EPSILON {
            return Some(start);
        }
        Some(start + (end - start) * (self.along / length))
    }

    /// Advance by `delta` seconds, returning the new position
    pub fn update(&mut self, delta: f32) -> Option<Vec3> {
        if self.points.is_empty() {
            return None;
        }
        let total: f32 = self.points.windows(2).map(|w| (w[1] - w[0]).magnitude()).sum();
        if self.finished || total <= f32::EPSILON {
            return self.position();
        }

        let mut remaining = self.velocity.max(0.0) * delta;
        while remaining > 0.0 {
            let Some(end) = self.segment_end(self.segment) else {
                self.finished = true;
                self.along = 0.0;
                break;
            };
            let length = (self.points[end] - self.points[self.segment]).magnitude();
            if self.along + remaining < length {
                self.along += remaining;
                break;
            }
            remaining -= length - self.along;
            self.along = 0.0;
            self.segment = end;
        }
        if self.segment_end(self.segment).is_none() {
            self.finished = true;
        }
        self.position()
    }
}

impl DiscreteRuntime for PathRuntime {
    fn construct(definition: Arc<AssetDefinition>, entity: Uuid) -> Self {
        Self {
            base: DiscreteAssetRuntime::new(definition, entity),
            points: Vec::new(),
            velocity: 0.0,
            wrap: false,
            segment: 0,
            along: 0.0,
            finished: false,
        }
    }

    fn base_mut(&mut self) -> &mut DiscreteAssetRuntime {
        &mut self.base
    }

    fn load(&mut self, _ctx: &LoadContext<'_>, _world: &Transform) -> Result<(), ConstructionError> {
        let settings: PathDefinition = self.base.definition().view()?;
        self.points = settings.control_points.into_iter().map(Vec3::from).collect();
        self.velocity = settings.velocity;
        self.wrap = settings.wrap;
        self.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AssetType;
    use approx::assert_relative_eq;

    fn path(points: &[Vec3], velocity: f32, wrap: bool) -> PathRuntime {
        let mut path = PathRuntime::construct(
            Arc::new(AssetDefinition::new(AssetType::Path, Uuid::new("p"), "Route")),
            Uuid::new("e"),
        );
        path.points = points.to_vec();
        path.velocity = velocity;
        path.wrap = wrap;
        path
    }

    #[test]
    fn test_moves_at_velocity() {
        let mut p = path(&[Vec3::zeros(), Vec3::new(10.0, 0.0, 0.0)], 2.0, false);
        assert_relative_eq!(p.update(1.0).unwrap(), Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(p.update(1.5).unwrap(), Vec3::new(5.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_stops_at_end_without_wrap() {
        let mut p = path(&[Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)], 1.0, false);
        assert_relative_eq!(p.update(1.5).unwrap(), Vec3::new(1.0, 0.5, 0.0), epsilon = 1e-5);
        assert_relative_eq!(p.update(10.0).unwrap(), Vec3::new(1.0, 1.0, 0.0), epsilon = 1e-5);
        assert!(p.is_finished());
    }

    #[test]
    fn test_wraps_to_start() {
        let mut p = path(&[Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)], 1.0, true);
        // Out along the first segment and half way back along the closing one
        assert_relative_eq!(p.update(1.5).unwrap(), Vec3::new(0.5, 0.0, 0.0), epsilon = 1e-5);
        assert!(!p.is_finished());
    }

    #[test]
    fn test_empty_path() {
        let mut p = path(&[], 1.0, false);
        assert!(p.update(1.0).is_none());
    }
}
