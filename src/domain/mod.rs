//! Domain layer - Core generation logic with no I/O
//!
//! This layer contains:
//! - Value Objects: assets, overlay rules, selections, settings, change events
//! - Domain Services: weighted sampling, nested tree access, tag composition
//! - Errors: the generation failure taxonomy

pub mod errors;
pub mod services;
pub mod value_objects;

pub use errors::GenerationError;
