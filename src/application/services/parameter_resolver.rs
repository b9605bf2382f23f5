//! Parameter Resolver - Turns workflow node inputs into concrete values
//!
//! Template inputs are resolved against the category's `setupWorkflow`
//! layer:
//!
//! ```yaml
//! workflow:        # replaces the template value
//!   KSampler: {steps: [20, 30], sampler_name: {euler: 3, dpmpp_2m: 1}}
//! workflow_scale:  # multiplies numeric results
//!   KSampler: {cfg: [0.9, 1.1]}
//! workflow_min:    # floors numeric results
//!   LoraLoader: {strength_model: 0.5}
//! workflow_max:    # caps numeric results
//!   LoraLoader: {strength_model: 1.0}
//! ```
//!
//! The class of an input (range or choice) is decided by the template's
//! own value, never by the override.

use rand::prelude::*;
use serde_json::Value;
use tracing::debug;

use crate::domain::services::nested_store::{get, is_truthy, set_if_exists};
use crate::domain::services::weighted_sampler::{new_seed, pick_range, pick_weighted_choice};
use crate::domain::value_objects::Candidate;
use crate::domain::GenerationError;

/// How an input's configured value is turned into a concrete one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    /// Numbers and numeric arrays, through `pick_range`
    Range,
    /// Strings, booleans, string lists and weighted mappings, through `pick_weighted_choice`
    Choice,
}

impl ValueClass {
    /// Classify a template value. Node links (`["4", 0]`) and nulls are not
    /// tunable and yield `None`.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Number(_) => Some(Self::Range),
            Value::String(_) | Value::Bool(_) | Value::Object(_) => Some(Self::Choice),
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_number) => {
                Some(Self::Range)
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => {
                Some(Self::Choice)
            }
            _ => None,
        }
    }

    fn resolve<R: Rng + ?Sized>(&self, rng: &mut R, value: &Value) -> Result<Value, GenerationError> {
        match self {
            Self::Range => pick_range(rng, value),
            Self::Choice => pick_weighted_choice(rng, Candidate::from(value)),
        }
    }
}

fn inputs_path<'p>(node: &'p str, param: &'p str) -> [&'p str; 3] {
    [node, "inputs", param]
}

/// Tunable inputs of a node, split by class, in template order
pub fn tunable_inputs(workflow: &Value, node: &str) -> Vec<(String, ValueClass)> {
    get(workflow, &[node, "inputs"])
        .and_then(Value::as_object)
        .map(|inputs| {
            inputs
                .iter()
                .filter_map(|(param, value)| ValueClass::of(value).map(|class| (param.clone(), class)))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterResolver<'a> {
    setup_workflow: &'a Value,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(setup_workflow: &'a Value) -> Self {
        Self { setup_workflow }
    }

    /// Give every non-excluded node a fresh seed and resolve its inputs
    /// against the setup layer
    pub fn apply_defaults<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        workflow: &mut Value,
        exclude_nodes: &[String],
    ) -> Result<(), GenerationError> {
        let nodes: Vec<String> = workflow
            .as_object()
            .map(|nodes| {
                nodes
                    .keys()
                    .filter(|node| !exclude_nodes.contains(*node))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for node in &nodes {
            reseed(rng, workflow, node);
            self.resolve_node(rng, workflow, node, None)?;
        }
        Ok(())
    }

    /// Resolve every tunable input of `node`.
    ///
    /// `overrides` is an optional mapping of input name to value consulted
    /// after the setup layer.
    pub fn resolve_node<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        workflow: &mut Value,
        node: &str,
        overrides: Option<&Value>,
    ) -> Result<(), GenerationError> {
        let inputs = tunable_inputs(workflow, node);
        if inputs.is_empty() {
            debug!(node, "No tunable inputs");
        }
        for (param, class) in inputs {
            self.resolve_param(rng, workflow, node, &param, class, overrides)?;
        }
        Ok(())
    }

    /// Resolve one input: setup override, then caller override, then the
    /// random pick, then scale/min/max for numbers. Written back only when
    /// the input exists in the workflow.
    pub fn resolve_param<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        workflow: &mut Value,
        node: &str,
        param: &str,
        class: ValueClass,
        overrides: Option<&Value>,
    ) -> Result<bool, GenerationError> {
        let Some(template) = get(workflow, &inputs_path(node, param)) else {
            debug!(node, param, "Input missing, keeping template");
            return Ok(false);
        };

        let mut value = get(self.setup_workflow, &["workflow", node, param])
            .unwrap_or(template)
            .clone();
        if let Some(found) = overrides.and_then(|o| get(o, &[param])) {
            value = found.clone();
        }

        let mut resolved = class.resolve(rng, &value)?;
        if resolved.is_number() {
            resolved = self.post_process(rng, node, param, resolved)?;
        }
        Ok(set_if_exists(workflow, resolved, &inputs_path(node, param)))
    }

    /// Apply `workflow_scale`, `workflow_min` and `workflow_max` in that order
    fn post_process<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        node: &str,
        param: &str,
        value: Value,
    ) -> Result<Value, GenerationError> {
        let mut value = value;

        if let Some(scale) = self.bound(rng, "workflow_scale", node, param)? {
            value = multiply(&value, &scale);
        }
        if let Some(floor) = self.bound(rng, "workflow_min", node, param)? {
            if value.as_f64() < floor.as_f64() {
                value = floor;
            }
        }
        if let Some(cap) = self.bound(rng, "workflow_max", node, param)? {
            if value.as_f64() > cap.as_f64() {
                value = cap;
            }
        }
        Ok(value)
    }

    /// A range-resolved numeric post-processor; absent or zero means none
    fn bound<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        section: &str,
        node: &str,
        param: &str,
    ) -> Result<Option<Value>, GenerationError> {
        match get(self.setup_workflow, &[section, node, param]) {
            Some(raw) if is_truthy(raw) => {
                let resolved = pick_range(rng, raw)?;
                Ok(resolved.is_number().then_some(resolved))
            }
            _ => Ok(None),
        }
    }

    /// Resolve inputs from a caller lookup only (asset records with their
    /// defaults). Inputs the lookup has nothing for, or that resolve to a
    /// falsy value, are left untouched.
    pub fn apply_lookup<R, F>(
        &self,
        rng: &mut R,
        workflow: &mut Value,
        node: &str,
        params: &[&str],
        class: ValueClass,
        lookup: F,
    ) -> Result<(), GenerationError>
    where
        R: Rng + ?Sized,
        F: Fn(&str) -> Option<Value>,
    {
        for &param in params {
            let Some(raw) = lookup(param) else {
                continue;
            };
            let resolved = class.resolve(rng, &raw)?;
            if !is_truthy(&resolved) {
                continue;
            }
            set_if_exists(workflow, resolved, &inputs_path(node, param));
        }
        Ok(())
    }

    /// Resolve every tunable input of `node` that `record.<node>.<input>`
    /// names. Nothing else is touched.
    pub fn apply_record_sections<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        workflow: &mut Value,
        record: &Value,
    ) -> Result<(), GenerationError> {
        let Some(sections) = record.as_object() else {
            return Ok(());
        };

        for node in sections.keys() {
            if get(workflow, &[node.as_str()]).is_none() {
                continue;
            }
            for (param, class) in tunable_inputs(workflow, node) {
                if let Some(raw) = get(record, &[node.as_str(), param.as_str()]) {
                    let resolved = class.resolve(rng, raw)?;
                    if is_truthy(&resolved) {
                        set_if_exists(workflow, resolved, &inputs_path(node, &param));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Write a fresh seed into `node.inputs.seed` when the node has one
pub fn reseed<R: Rng + ?Sized>(rng: &mut R, workflow: &mut Value, node: &str) -> bool {
    set_if_exists(workflow, Value::from(new_seed(rng)), &inputs_path(node, "seed"))
}

fn multiply(value: &Value, scale: &Value) -> Value {
    match (value.as_i64(), scale.as_i64()) {
        (Some(v), Some(s)) => Value::from(v.saturating_mul(s)),
        _ => match (value.as_f64(), scale.as_f64()) {
            (Some(v), Some(s)) => Value::from(v * s),
            _ => value.clone(),
        },
    }
}
