//! Value objects - Immutable objects defined by their attributes

mod asset;
mod candidate;
mod change;
mod overlay_rule;
mod selection;
mod settings;

pub use asset::{asset_name, AssetKind, AssetViews};
pub use candidate::Candidate;
pub use change::{ChangeEvent, ChangeKind, DataFile, RecordSet, SetupLayer};
pub use overlay_rule::{OverlayCandidate, OverlayRule, OverlayTable};
pub use selection::{
    BaseModelChoice, CharacterChoice, OverlaySelection, SelectionState, NO_CHARACTER,
};
pub use settings::{DiagnosticFlags, GeneratorSettings, WeightDefaults};
