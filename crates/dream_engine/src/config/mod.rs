//! Configuration system
//!
//! Engine settings live in a TOML or RON file chosen by extension. Every
//! field has a default so a partial file (or none at all) is valid.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Load the first of `candidates` that exists, or defaults when none do
    fn load_first_existing<P: AsRef<Path>>(candidates: &[P]) -> Result<Self, ConfigError> {
        for candidate in candidates {
            if candidate.as_ref().is_file() {
                log::info!("Loading configuration from {}", candidate.as_ref().display());
                return Self::load_from_file(candidate);
            }
        }
        log::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of its valid range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Engine-wide settings for a project run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Fixed logic timestep in seconds; zero uses wall-clock deltas
    pub fixed_timestep: f32,
    /// Stop after this many frames; zero runs until the scene stops
    pub max_frames: u64,
    /// Run the physics step on its own worker thread
    pub parallel_physics: bool,
    /// Evict cache entries no live entity references after each frame
    pub evict_unused_assets: bool,
    /// Initial window width in pixels
    pub window_width: u32,
    /// Initial window height in pixels
    pub window_height: u32,
    /// Near clip distance used when a scene does not set one
    pub default_min_draw_distance: f32,
    /// Far clip distance used when a scene does not set one
    pub default_max_draw_distance: f32,
    /// Mesh cull distance used when a scene does not set one
    pub default_mesh_cull_distance: f32,
    /// Gravity used when a scene does not set one
    pub default_gravity: [f32; 3],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            fixed_timestep: 1.0 / 60.0,
            max_frames: 0,
            parallel_physics: true,
            evict_unused_assets: false,
            window_width: 1280,
            window_height: 720,
            default_min_draw_distance: 0.1,
            default_max_draw_distance: 1000.0,
            default_mesh_cull_distance: 1000.0,
            default_gravity: [0.0, -9.81, 0.0],
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_timestep >= 0.0 && self.fixed_timestep.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "fixed_timestep",
                reason: format!("{} is not a non-negative number", self.fixed_timestep),
            });
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(ConfigError::Invalid {
                field: "window_width/window_height",
                reason: "window dimensions must be non-zero".to_string(),
            });
        }
        if self.default_min_draw_distance <= 0.0
            || self.default_max_draw_distance <= self.default_min_draw_distance
        {
            return Err(ConfigError::Invalid {
                field: "default_min_draw_distance/default_max_draw_distance",
                reason: "near distance must be positive and below the far distance".to_string(),
            });
        }
        Ok(())
    }

    /// Load `dream.toml` or `dream.ron` from a project directory
    pub fn load_for_project(project_root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = project_root.as_ref();
        let config = Self::load_first_existing(&[root.join("dream.toml"), root.join("dream.ron")])?;
        config.validate()?;
        Ok(config)
    }
}
