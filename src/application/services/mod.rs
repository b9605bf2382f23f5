//! Application services - Use case implementations
//!
//! Each service works on the catalog indices and the generator settings and
//! takes its random source explicitly, so every use case can run against an
//! in-memory category source with a seeded RNG.

pub mod catalog_service;
pub mod change_router;
pub mod generation_service;
pub mod iteration_cadence;
pub mod parameter_resolver;
pub mod selection_service;

// Re-export catalog types
pub use catalog_service::{CatalogChange, CatalogIndex, CatalogRegistry};

// Re-export change routing types
pub use change_router::{ChangeRouter, RoutedChange};

// Re-export generation types
pub use generation_service::{GeneratedWorkflow, GenerationService};

#[allow(unused_imports)]
pub use iteration_cadence::{CadenceLimits, CadencePlan, IterationCadence};

#[allow(unused_imports)]
pub use parameter_resolver::{ParameterResolver, ValueClass};

#[allow(unused_imports)]
pub use selection_service::SelectionEngine;
