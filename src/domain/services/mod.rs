//! Domain services - Stateless generation primitives

pub mod nested_store;
pub mod tag_composer;
pub mod weighted_sampler;

pub use tag_composer::{TagComposer, TagPayloads};
