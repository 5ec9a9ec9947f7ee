//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Fixed-capacity collections
//! - Frame timing and clocks
//! - Logging with an in-memory console tee

pub mod collections;
pub mod logging;
pub mod math;
pub mod time;
