//! Keyframe animation runtimes

use std::sync::Arc;

use super::discrete::{discrete_asset_runtime, DiscreteAssetRuntime, DiscreteRuntime};
use super::{ConstructionError, LoadContext};
use crate::definition::{AnimationDefinition, AssetDefinition};
use crate::foundation::math::Transform;
use crate::foundation::uuid::Uuid;

/// Interpolates an entity transform between keyframes
#[derive(Debug, Clone)]
pub struct AnimationRuntime {
    base: DiscreteAssetRuntime,
    keyframes: Vec<(f32, Transform)>,
    looping: bool,
    elapsed: f32,
    playing: bool,
}

discrete_asset_runtime!(AnimationRuntime);

impl AnimationRuntime {
    /// Length of the animation in seconds
    pub fn duration(&self) -> f32 {
        self.keyframes.last().map_or(0.0, |(t, _)| *t)
    }

    /// Seconds since the animation started
    pub const fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Whether the animation is advancing
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    /// Resume advancing
    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Stop advancing, keeping the current time
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Transform at a point in time
    pub fn sample(&self, time: f32) -> Option<Transform> {
        let (first, last) = (self.keyframes.first()?, self.keyframes.last()?);
        if time <= first.0 {
            return Some(first.1);
        }
        if time >= last.0 {
            return Some(last.1);
        }
        let next = self.keyframes.iter().position(|(t, _)| *t > time)?;
        let (t0, from) = self.keyframes[next - 1];
        let (t1, to) = self.keyframes[next];
        let span = t1 - t0;
        let factor = if span <= f32::EPSILON { 1.0 } else { (time - t0) / span };
        Some(from.interpolate(&to, factor))
    }

    /// Advance by `delta` seconds, returning the new transform
    pub fn update(&mut self, delta: f32) -> Option<Transform> {
        if self.keyframes.is_empty() {
            return None;
        }
        if self.playing {
            self.elapsed += delta;
            let duration = self.duration();
            if self.looping && duration > 0.0 {
                self.elapsed %= duration;
            } else if self.elapsed >= duration {
                self.elapsed = duration;
                self.playing = false;
            }
        }
        self.sample(self.elapsed)
    }

    fn set_keyframes(&mut self, settings: AnimationDefinition) {
        let mut keyframes: Vec<(f32, Transform)> = settings
            .keyframes
            .iter()
            .map(|k| (k.time.max(0.0), k.transform.to_transform()))
            .collect();
        keyframes.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.keyframes = keyframes;
        self.looping = settings.looping;
        self.elapsed = 0.0;
        self.playing = true;
    }
}

impl DiscreteRuntime for AnimationRuntime {
    fn construct(definition: Arc<AssetDefinition>, entity: Uuid) -> Self {
        Self {
            base: DiscreteAssetRuntime::new(definition, entity),
            keyframes: Vec::new(),
            looping: false,
            elapsed: 0.0,
            playing: false,
        }
    }

    fn base_mut(&mut self) -> &mut DiscreteAssetRuntime {
        &mut self.base
    }

    fn load(&mut self, _ctx: &LoadContext<'_>, _world: &Transform) -> Result<(), ConstructionError> {
        let settings: AnimationDefinition = self.base.definition().view()?;
        self.set_keyframes(settings);
        Ok(())
    }
}
