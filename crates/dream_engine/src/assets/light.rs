//! Light runtimes

use std::sync::Arc;

use super::discrete::{discrete_asset_runtime, DiscreteAssetRuntime, DiscreteRuntime};
use super::{ConstructionError, LoadContext};
use crate::definition::{AssetDefinition, LightDefinition, LightType};
use crate::foundation::math::{Transform, Vec3};
use crate::foundation::uuid::Uuid;

/// A light source positioned by its entity
#[derive(Debug, Clone)]
pub struct LightRuntime {
    base: DiscreteAssetRuntime,
    light_type: LightType,
    settings: LightDefinition,
}

discrete_asset_runtime!(LightRuntime);

impl LightRuntime {
    /// Kind of light
    pub const fn light_type(&self) -> LightType {
        self.light_type
    }

    /// Entity that carries the light
    pub const fn entity_uuid(&self) -> &Uuid {
        self.base.entity_uuid()
    }

    /// Colours and attenuation
    pub const fn settings(&self) -> &LightDefinition {
        &self.settings
    }

    /// Direction the light points for a given entity transform
    pub fn direction(&self, world: &Transform) -> Vec3 {
        world.rotation * Vec3::new(0.0, 0.0, -1.0)
    }

    /// Attenuation factor at a distance; directional lights do not attenuate
    pub fn attenuation(&self, distance: f32) -> f32 {
        match self.light_type {
            LightType::Directional => 1.0,
            LightType::Point | LightType::Spot => {
                let s = &self.settings;
                1.0 / (s.constant + s.linear * distance + s.quadratic * distance * distance)
            }
        }
    }
}

impl DiscreteRuntime for LightRuntime {
    fn construct(definition: Arc<AssetDefinition>, entity: Uuid) -> Self {
        Self {
            base: DiscreteAssetRuntime::new(definition, entity),
            light_type: LightType::Point,
            settings: LightDefinition::default(),
        }
    }

    fn base_mut(&mut self) -> &mut DiscreteAssetRuntime {
        &mut self.base
    }

    fn load(&mut self, _ctx: &LoadContext<'_>, _world: &Transform) -> Result<(), ConstructionError> {
        let definition = self.base.definition();
        let format = definition.format();
        self.light_type = LightType::from_format(&format).ok_or_else(|| ConstructionError::UnsupportedFormat {
            owner: definition.describe(),
            format,
        })?;
        self.settings = definition.view()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AssetType;
    use approx::assert_relative_eq;

    #[test]
    fn test_attenuation() {
        let mut light = LightRuntime::construct(
            Arc::new(AssetDefinition::new(AssetType::Light, Uuid::new("l"), "Lamp")),
            Uuid::new("e"),
        );
        assert_relative_eq!(light.attenuation(0.0), 1.0);
        assert!(light.attenuation(10.0) < 0.5);
        light.light_type = LightType::Directional;
        assert_relative_eq!(light.attenuation(10.0), 1.0);
    }

    #[test]
    fn test_direction_follows_rotation() {
        let light = LightRuntime::construct(
            Arc::new(AssetDefinition::new(AssetType::Light, Uuid::new("l"), "Sun")),
            Uuid::new("e"),
        );
        let world = Transform {
            rotation: Transform::rotation_from_euler_degrees(Vec3::new(0.0, 90.0, 0.0)),
            ..Transform::default()
        };
        assert_relative_eq!(light.direction(&world), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
    }
}
