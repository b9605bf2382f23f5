//! Selection Service - Chooses the assets one iteration runs with
//!
//! Base model, character and auxiliary overlays are chosen by three
//! independent algorithms. Each takes the random source explicitly; the
//! engine itself only remembers whether the configured start model has
//! been used yet.

use std::collections::HashMap;
use std::path::Path;

use rand::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::application::services::catalog_service::CatalogIndex;
use crate::domain::services::nested_store::merge_key;
use crate::domain::services::weighted_sampler::{
    flip, pick_distinct_by_weight, pick_one_by_weight, pick_weighted_choice,
    pick_without_replacement, range_to_count,
};
use crate::domain::value_objects::{
    AssetKind, BaseModelChoice, Candidate, CharacterChoice, GeneratorSettings, OverlayCandidate,
    OverlayRule, OverlaySelection,
};
use crate::domain::GenerationError;

/// Pick one name with the weighted/unweighted two-branch policy.
///
/// With probability `weighted_per` the weight table is used (uniform over
/// all names, with a warning, when the table is empty). Otherwise a name
/// absent from the table is preferred so under-weighted assets still get
/// exposure, falling back to all names.
pub fn pick_two_branch<R: Rng + ?Sized>(
    rng: &mut R,
    names: &[String],
    table: &Map<String, Value>,
    weighted_per: f64,
    label: &str,
) -> Result<Option<String>, GenerationError> {
    if flip(rng, weighted_per) {
        if !table.is_empty() {
            if let Some(name) = pick_one_by_weight(rng, table)? {
                debug!(label, name = %name, "Picked by weight");
                return Ok(Some(name));
            }
        }
        warn!(label, "No weight table, picking uniformly");
        return Ok(names.choose(rng).cloned());
    }

    let unweighted: Vec<&String> = names.iter().filter(|n| !table.contains_key(*n)).collect();
    debug!(label, unweighted = unweighted.len(), "Picking outside the weight table");
    if let Some(name) = unweighted.choose(rng) {
        return Ok(Some((*name).clone()));
    }
    warn!(label, "Every asset is weighted, picking uniformly");
    Ok(names.choose(rng).cloned())
}

/// Probability carried by a `per` value; booleans count as 0 or 1
fn probability(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Bool(true)) => 1.0,
        Some(v) => v.as_f64().unwrap_or(0.0),
        None => 0.0,
    }
}

#[derive(Debug)]
pub struct SelectionEngine {
    bootstrap_pending: bool,
}

impl Default for SelectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self {
            bootstrap_pending: true,
        }
    }

    /// Choose the category and its base model
    #[instrument(skip_all)]
    pub fn select_base_model<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        catalogs: &HashMap<String, CatalogIndex>,
        settings: &GeneratorSettings,
    ) -> Result<BaseModelChoice, GenerationError> {
        if std::mem::take(&mut self.bootstrap_pending) {
            if let Some(choice) = Self::bootstrap_choice(catalogs, settings) {
                debug!(category = %choice.category, name = %choice.name, "Using start base model");
                return Ok(choice);
            }
        }

        let category = pick_one_by_weight(rng, &settings.checkpoint_types)?
            .ok_or(GenerationError::NoCategories)?;
        let index = catalogs
            .get(&category)
            .ok_or_else(|| GenerationError::UnknownCategory(category.clone()))?;

        let views = index.assets(AssetKind::BaseModel);
        if views.is_empty() {
            return Err(GenerationError::NoAssets {
                category,
                kind: AssetKind::BaseModel,
            });
        }

        let name = pick_two_branch(
            rng,
            views.names(),
            index.base_model_weights(),
            settings.checkpoint_weight_per,
            AssetKind::BaseModel.as_str(),
        )?
        .ok_or_else(|| GenerationError::NoAssets {
            category: category.clone(),
            kind: AssetKind::BaseModel,
        })?;

        let path = views
            .path_of(&name)
            .ok_or_else(|| GenerationError::MissingAssetPath {
                kind: AssetKind::BaseModel,
                name: name.clone(),
            })?
            .to_string();

        Ok(BaseModelChoice {
            category,
            name,
            path,
        })
    }

    /// `<category>/<file>` from the settings, if it names a known base model
    fn bootstrap_choice(
        catalogs: &HashMap<String, CatalogIndex>,
        settings: &GeneratorSettings,
    ) -> Option<BaseModelChoice> {
        let start = settings.safetensors_start.as_deref()?;
        let parts: Vec<&str> = Path::new(start)
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        let [category, file] = parts.as_slice() else {
            warn!(start, "Start base model must be <category>/<file>");
            return None;
        };
        if !settings.checkpoint_types.contains_key(*category) {
            return None;
        }

        let name = Path::new(file).file_stem()?.to_str()?.to_string();
        let path = catalogs
            .get(*category)?
            .assets(AssetKind::BaseModel)
            .path_of(&name)?
            .to_string();

        Some(BaseModelChoice {
            category: category.to_string(),
            name,
            path,
        })
    }

    /// Choose a character, or the "none" sentinel
    #[instrument(skip_all, fields(category = %index.category()))]
    pub fn select_character<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        index: &CatalogIndex,
        settings: &GeneratorSettings,
    ) -> Result<CharacterChoice, GenerationError> {
        let views = index.assets(AssetKind::Character);
        let placeholder = || CharacterChoice::None {
            placeholder_path: views.first_path().map(String::from),
        };

        if flip(rng, settings.no_char_per) {
            debug!("No character this cycle");
            return Ok(placeholder());
        }
        if views.is_empty() {
            debug!("No character assets, using the sentinel");
            return Ok(placeholder());
        }

        let picked = pick_two_branch(
            rng,
            views.names(),
            index.character_weights(),
            settings.char_weight_per,
            AssetKind::Character.as_str(),
        )?;

        Ok(match picked {
            Some(name) => CharacterChoice::Named {
                path: views.path_of(&name).map(String::from),
                name,
            },
            None => placeholder(),
        })
    }

    /// Run every overlay rule and union the results
    #[instrument(skip_all, fields(category = %index.category()))]
    pub fn select_overlays<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        index: &CatalogIndex,
        settings: &GeneratorSettings,
    ) -> Result<OverlaySelection, GenerationError> {
        if flip(rng, settings.no_lora_per) {
            debug!("No overlays this cycle");
            return Ok(OverlaySelection::skipped());
        }

        let mut selection = OverlaySelection::empty();
        for (rule_name, rule) in index.overlay_table().rules() {
            let accepted = Self::run_rule(rng, rule_name, rule)?;

            let names: Vec<String> = accepted.iter().map(|(name, _)| name.clone()).collect();
            let kept = if rule.total {
                let total_max = range_to_count(rng, &rule.total_max)?;
                pick_without_replacement(rng, &names, total_max)
            } else {
                names
            };

            for name in &kept {
                if let Some((_, candidate)) = accepted.iter().find(|(n, _)| n == name) {
                    let attributes = candidate.attributes_value();
                    merge_key(&mut selection.rule_tags, &attributes, "positive");
                    merge_key(&mut selection.rule_tags, &attributes, "negative");
                }
            }

            debug!(rule = %rule_name, kept = ?kept, "Overlay rule applied");
            selection.names.extend(kept);
        }

        if settings.diagnostics.overlay_selection {
            debug!(names = ?selection.names, tags = %selection.rule_tags, "Overlay selection");
        }
        Ok(selection)
    }

    /// Accepted candidates of one rule, keyed by the overlay they resolved to.
    ///
    /// A second pick of the same overlay replaces the first in place, so it
    /// counts once toward `totalMax`.
    fn run_rule<'r, R: Rng + ?Sized>(
        rng: &mut R,
        rule_name: &str,
        rule: &'r OverlayRule,
    ) -> Result<Vec<(String, &'r OverlayCandidate)>, GenerationError> {
        let mut accepted: Vec<(String, &OverlayCandidate)> = Vec::new();

        let mut accept = |rng: &mut R, candidate: &'r OverlayCandidate| -> Result<(), GenerationError> {
            match pick_weighted_choice(rng, Candidate::from(&candidate.loras))? {
                Value::String(name) => {
                    match accepted.iter_mut().find(|(n, _)| *n == name) {
                        Some(slot) => slot.1 = candidate,
                        None => accepted.push((name, candidate)),
                    }
                }
                other => warn!(rule = rule_name, loras = %other, "Candidate did not resolve to an overlay name"),
            }
            Ok(())
        };

        if rule.per {
            let per_max = range_to_count(rng, &rule.per_max)?;
            let mut per_count = 0;
            for (_, candidate) in &rule.candidates {
                if rule.per_firsts && per_count >= per_max {
                    break;
                }
                if flip(rng, probability(candidate.per.as_ref())) {
                    accept(rng, candidate)?;
                    per_count += 1;
                }
            }
        }

        if rule.weight {
            let weight_max = range_to_count(rng, &rule.weight_max)?;
            let weights: Map<String, Value> = rule
                .candidates
                .iter()
                .filter_map(|(key, c)| c.weight.clone().filter(|w| !w.is_null()).map(|w| (key.clone(), w)))
                .collect();
            for key in pick_distinct_by_weight(rng, &weights, weight_max)? {
                if let Some(candidate) = rule.candidate(&key) {
                    accept(rng, candidate)?;
                }
            }
        }

        Ok(accepted)
    }
}
