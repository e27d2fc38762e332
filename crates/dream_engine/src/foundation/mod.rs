//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and the hierarchical transform
//! - Frame timing
//! - Logging setup
//! - Stable asset and entity identifiers

pub mod logging;
pub mod math;
pub mod time;
pub mod uuid;
