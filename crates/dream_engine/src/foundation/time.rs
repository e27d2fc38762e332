//! Time management utilities

use std::time::Instant;

/// Frame timer driving the project update loop.
///
/// With a fixed step configured, every frame advances by exactly that
/// amount regardless of wall-clock time, which keeps headless runs and
/// tests deterministic.
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
    fixed_step: Option<f32>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new wall-clock timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
            fixed_step: None,
        }
    }

    /// Create a timer that advances by `step` seconds every frame
    pub fn with_fixed_step(step: f32) -> Self {
        Self {
            fixed_step: (step > 0.0).then_some(step),
            ..Self::new()
        }
    }

    /// Update the timer (should be called once per frame) and return the delta
    pub fn update(&mut self) -> f32 {
        let now = Instant::now();
        self.delta_time = match self.fixed_step {
            Some(step) => step,
            None => now.duration_since(self.last_frame).as_secs_f32(),
        };
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
        self.delta_time
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the average FPS since timer creation
    #[allow(clippy::cast_precision_loss)]
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fixed_step_is_deterministic() {
        let mut timer = Timer::with_fixed_step(0.25);
        assert_relative_eq!(timer.update(), 0.25);
        assert_relative_eq!(timer.update(), 0.25);
        assert_relative_eq!(timer.total_time(), 0.5);
        assert_eq!(timer.frame_count(), 2);
        assert_relative_eq!(timer.average_fps(), 4.0);
    }

    #[test]
    fn test_non_positive_step_falls_back_to_wall_clock() {
        let mut timer = Timer::with_fixed_step(0.0);
        let delta = timer.update();
        assert!(delta >= 0.0);
        assert!(delta < 1.0);
    }
}
