//! Overlay rules - grouped selection policies for auxiliary LoRAs
//!
//! The auxiliary weight file (`WeightLora.yml`) is a mapping of rule name to
//! rule. Each rule holds a `dic` of candidates and up to three activation
//! strategies:
//!
//! ```yaml
//! outfits:
//!   per: true          # roll every candidate against its own `per`
//!   perMax: [1, 2]
//!   perFirsts: true    # stop rolling once perMax candidates were accepted
//!   weight: true       # draw weightMax distinct candidates by `weight`
//!   weightMax: 1
//!   total: true        # cap the accepted set to totalMax
//!   totalMax: [1, 2]
//!   dic:
//!     maid:
//!       weight: 10
//!       loras: {maid_v1: 1, maid_v2: 2}
//!       positive: {outfit: "maid outfit"}
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::services::nested_store::is_truthy;

/// One candidate inside a rule's `dic`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per: Option<Value>,
    /// Overlay name(s) this candidate stands for: a name, a list or a weighted mapping
    #[serde(default)]
    pub loras: Value,
    /// Everything else on the candidate, notably `positive`/`negative` tags
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl OverlayCandidate {
    /// Whether the candidate can ever be activated by one of the strategies
    pub fn is_selectable(&self) -> bool {
        self.weight.as_ref().is_some_and(is_truthy) || self.per.as_ref().is_some_and(is_truthy)
    }

    /// Restrict `loras` to the given overlay names.
    ///
    /// Returns false when nothing usable remains.
    fn retain_known(&mut self, known: &HashSet<&str>) -> bool {
        let retained = match &self.loras {
            Value::Object(weights) => {
                let kept: Map<String, Value> = weights
                    .iter()
                    .filter(|(name, _)| known.contains(name.as_str()))
                    .map(|(name, weight)| (name.clone(), weight.clone()))
                    .collect();
                (!kept.is_empty()).then_some(Value::Object(kept))
            }
            Value::Array(names) => {
                let kept: Vec<Value> = names
                    .iter()
                    .filter(|name| name.as_str().is_some_and(|n| known.contains(n)))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then_some(Value::Array(kept))
            }
            Value::String(name) if known.contains(name.as_str()) => Some(self.loras.clone()),
            _ => None,
        };

        match retained {
            Some(loras) => {
                self.loras = loras;
                true
            }
            None => false,
        }
    }

    /// The candidate's extra attributes as a tree, for tag merging
    pub fn attributes_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }
}

/// A grouped selection policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayRule {
    pub per: bool,
    #[serde(rename = "perMax")]
    pub per_max: Value,
    #[serde(rename = "perFirsts")]
    pub per_firsts: bool,
    pub weight: bool,
    #[serde(rename = "weightMax")]
    pub weight_max: Value,
    pub total: bool,
    #[serde(rename = "totalMax")]
    pub total_max: Value,
    #[serde(skip)]
    pub candidates: Vec<(String, OverlayCandidate)>,
}

impl OverlayRule {
    /// Parse one rule. Candidates that are not mappings are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        let mut rule: OverlayRule = serde_json::from_value(value.clone()).ok()?;

        if let Some(Value::Object(dic)) = fields.get("dic") {
            for (key, raw) in dic {
                match serde_json::from_value::<OverlayCandidate>(raw.clone()) {
                    Ok(candidate) => rule.candidates.push((key.clone(), candidate)),
                    Err(_) => tracing::warn!(candidate = %key, "Skipping malformed overlay candidate"),
                }
            }
        }

        Some(rule)
    }

    pub fn candidate(&self, key: &str) -> Option<&OverlayCandidate> {
        self.candidates.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }
}

/// The parsed auxiliary weight structure of one category, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayTable {
    rules: Vec<(String, OverlayRule)>,
}

impl OverlayTable {
    /// Parse the raw weight file. Rules that are not mappings are dropped.
    pub fn from_value(value: &Value) -> Self {
        let rules = value
            .as_object()
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|(name, raw)| match OverlayRule::from_value(raw) {
                        Some(rule) => Some((name.clone(), rule)),
                        None => {
                            tracing::warn!(rule = %name, "Skipping malformed overlay rule");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { rules }
    }

    /// Drop every candidate that can never fire or that references only
    /// overlays missing from `known_names`, then every rule left empty.
    ///
    /// Running it twice gives the same table as running it once.
    pub fn prune(&mut self, known_names: &[String]) {
        let known: HashSet<&str> = known_names.iter().map(String::as_str).collect();

        for (_, rule) in self.rules.iter_mut() {
            rule.candidates
                .retain_mut(|(_, candidate)| candidate.is_selectable() && candidate.retain_known(&known));
        }
        self.rules.retain(|(_, rule)| !rule.candidates.is_empty());
    }

    pub fn rules(&self) -> &[(String, OverlayRule)] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_table() -> OverlayTable {
        OverlayTable::from_value(&json!({
            "outfits": {
                "weight": true,
                "weightMax": [1, 2],
                "dic": {
                    "maid": {"weight": 10, "loras": {"maid_v1": 1, "maid_gone": 2}},
                    "nurse": {"per": 0.5, "loras": ["nurse_gone"]},
                    "idle": {"loras": "maid_v1"},
                    "plain": {"weight": 1, "loras": "plain_v1", "positive": {"o": "plain"}}
                }
            },
            "gone": {
                "per": true,
                "dic": {"x": {"per": 1.0, "loras": "missing"}}
            },
            "broken": 3
        }))
    }

    #[test]
    fn test_parse_reads_flags_and_candidates() {
        let table = sample_table();
        assert_eq!(table.len(), 2);

        let (name, rule) = &table.rules()[0];
        assert_eq!(name, "outfits");
        assert!(rule.weight);
        assert!(!rule.per);
        assert_eq!(rule.weight_max, json!([1, 2]));
        assert_eq!(rule.candidates.len(), 4);

        let plain = rule.candidate("plain").expect("plain candidate");
        assert_eq!(plain.attributes.get("positive"), Some(&json!({"o": "plain"})));
    }

    #[test]
    fn test_prune_drops_missing_and_unselectable() {
        let mut table = sample_table();
        table.prune(&names(&["maid_v1", "plain_v1"]));

        assert_eq!(table.len(), 1);
        let rule = &table.rules()[0].1;
        let keys: Vec<&str> = rule.candidates.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["maid", "plain"]);
        assert_eq!(rule.candidate("maid").map(|c| &c.loras), Some(&json!({"maid_v1": 1})));
    }

    #[test]
    fn test_prune_is_idempotent() {
        let known = names(&["maid_v1", "plain_v1"]);
        let mut once = sample_table();
        once.prune(&known);
        let mut twice = once.clone();
        twice.prune(&known);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_prune_against_empty_index_removes_everything() {
        let mut table = sample_table();
        table.prune(&[]);
        assert!(table.is_empty());
    }
}
