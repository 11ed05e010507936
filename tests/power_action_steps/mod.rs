//! Step definitions for power action scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
