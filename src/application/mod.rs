//! Application layer - Use cases and port definitions
//!
//! This layer contains:
//! - Ports: traits the core needs from the filesystem, the ComfyUI server
//!   and the selection log
//! - Services: catalog maintenance, selection, parameter resolution and the
//!   per-iteration generation pipeline

pub mod ports;
pub mod services;
