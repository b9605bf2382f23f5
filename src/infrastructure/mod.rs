//! Infrastructure layer - External adapters and implementations
//!
//! This layer contains:
//! - Category source: data files and asset scanning on the local filesystem
//! - Watcher: notify-based change notifications
//! - ComfyUI: workflow submission
//! - Persistence: SQLite selection counts
//! - Config: Application configuration and generator settings
//! - State: Shared application state
//! - Generation worker: the unattended host loop

pub mod category_source;
pub mod comfyui;
pub mod config;
pub mod generation_worker;
pub mod persistence;
pub mod state;
pub mod watcher;
