//! Candidate values - the three shapes a configurable value can take

use serde_json::{Map, Value};

/// A configured value that may still need a random pick.
///
/// Configuration files write candidates as plain YAML: a scalar is used as
/// is, a list means "pick one uniformly", a mapping means "pick one key by
/// its weight". Callers never inspect the shape themselves; they convert
/// with [`Candidate::from`] and hand the result to
/// `weighted_sampler::pick_weighted_choice`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Candidate<'a> {
    Scalar(&'a Value),
    Choices(&'a [Value]),
    WeightedChoices(&'a Map<String, Value>),
}

impl<'a> From<&'a Value> for Candidate<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => Candidate::Choices(items),
            Value::Object(weights) => Candidate::WeightedChoices(weights),
            other => Candidate::Scalar(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_shapes() {
        let scalar = json!("euler");
        let list = json!(["euler", "dpmpp_2m"]);
        let weighted = json!({"euler": 3, "dpmpp_2m": 1});

        assert!(matches!(Candidate::from(&scalar), Candidate::Scalar(_)));
        assert!(matches!(Candidate::from(&list), Candidate::Choices(items) if items.len() == 2));
        assert!(matches!(Candidate::from(&weighted), Candidate::WeightedChoices(w) if w.len() == 2));
        assert!(matches!(Candidate::from(&Value::Null), Candidate::Scalar(Value::Null)));
    }
}
