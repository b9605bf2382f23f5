//! Weighted random primitives
//!
//! Stateless helpers used by every selection and resolution step. All of
//! them take the random source explicitly so callers can seed it in tests.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde_json::{Map, Value};

use crate::domain::errors::GenerationError;
use crate::domain::value_objects::Candidate;

/// Read a weight table into `(key, weight)` pairs, rejecting anything that
/// is not a finite, non-negative number.
fn numeric_weights(weights: &Map<String, Value>) -> Result<Vec<(&str, f64)>, GenerationError> {
    weights
        .iter()
        .map(|(key, raw)| match raw.as_f64() {
            Some(w) if w.is_finite() && w >= 0.0 => Ok((key.as_str(), w)),
            _ => Err(GenerationError::invalid_weight(key, raw)),
        })
        .collect()
}

fn weighted_index(weights: &[(&str, f64)]) -> Result<WeightedIndex<f64>, GenerationError> {
    WeightedIndex::new(weights.iter().map(|(_, w)| *w)).map_err(|e| GenerationError::InvalidWeight {
        key: "*".to_string(),
        value: e.to_string(),
    })
}

/// Sample `count` keys with replacement, proportional to their weight.
///
/// An empty table yields an empty list.
pub fn pick_by_weight<R: Rng + ?Sized>(
    rng: &mut R,
    weights: &Map<String, Value>,
    count: usize,
) -> Result<Vec<String>, GenerationError> {
    let parsed = numeric_weights(weights)?;
    if parsed.is_empty() || count == 0 {
        return Ok(Vec::new());
    }

    let index = weighted_index(&parsed)?;
    Ok((0..count)
        .map(|_| parsed[index.sample(rng)].0.to_string())
        .collect())
}

/// Single key form of [`pick_by_weight`]
pub fn pick_one_by_weight<R: Rng + ?Sized>(
    rng: &mut R,
    weights: &Map<String, Value>,
) -> Result<Option<String>, GenerationError> {
    Ok(pick_by_weight(rng, weights, 1)?.into_iter().next())
}

/// Weighted sampling without replacement.
///
/// Returns `min(count, n)` distinct keys where `n` counts the keys with a
/// positive weight.
pub fn pick_distinct_by_weight<R: Rng + ?Sized>(
    rng: &mut R,
    weights: &Map<String, Value>,
    count: usize,
) -> Result<Vec<String>, GenerationError> {
    let mut pool: Vec<(&str, f64)> = numeric_weights(weights)?
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .collect();

    let mut picked = Vec::with_capacity(count.min(pool.len()));
    while picked.len() < count && !pool.is_empty() {
        let index = weighted_index(&pool)?;
        let (key, _) = pool.swap_remove(index.sample(rng));
        picked.push(key.to_string());
    }
    Ok(picked)
}

/// Resolve a range value.
///
/// Anything that is not an array is returned unchanged. For arrays of
/// numbers the bounds are their minimum and maximum: when every element is
/// integral the result is an integer in the inclusive range, otherwise a
/// real number in the closed interval.
pub fn pick_range<R: Rng + ?Sized>(rng: &mut R, value: &Value) -> Result<Value, GenerationError> {
    let Value::Array(items) = value else {
        return Ok(value.clone());
    };
    if items.is_empty() || !items.iter().all(Value::is_number) {
        return Err(GenerationError::invalid_range(value));
    }

    if items.iter().all(|v| v.is_i64()) {
        let bounds: Vec<i64> = items.iter().filter_map(Value::as_i64).collect();
        let (lo, hi) = min_max(&bounds);
        return Ok(Value::from(rng.gen_range(lo..=hi)));
    }

    let bounds: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
    let (lo, hi) = min_max(&bounds);
    if !(lo.is_finite() && hi.is_finite()) {
        return Err(GenerationError::invalid_range(value));
    }
    let picked = if lo == hi { lo } else { rng.gen_range(lo..=hi) };
    Ok(Value::from(picked))
}

fn min_max<T: PartialOrd + Copy>(values: &[T]) -> (T, T) {
    let mut lo = values[0];
    let mut hi = values[0];
    for &v in &values[1..] {
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }
    (lo, hi)
}

/// Resolve a range to a non-negative count (reals are rounded up)
pub fn range_to_count<R: Rng + ?Sized>(rng: &mut R, value: &Value) -> Result<usize, GenerationError> {
    let resolved = pick_range(rng, value)?;
    Ok(resolved
        .as_f64()
        .map(|n| n.max(0.0).ceil() as usize)
        .unwrap_or(0))
}

/// Resolve a candidate to one concrete value.
///
/// Empty lists and empty mappings resolve to `null`.
pub fn pick_weighted_choice<R: Rng + ?Sized>(
    rng: &mut R,
    candidate: Candidate<'_>,
) -> Result<Value, GenerationError> {
    match candidate {
        Candidate::Scalar(value) => Ok(value.clone()),
        Candidate::Choices(items) => Ok(items.choose(rng).cloned().unwrap_or(Value::Null)),
        Candidate::WeightedChoices(weights) => Ok(pick_one_by_weight(rng, weights)?
            .map(Value::String)
            .unwrap_or(Value::Null)),
    }
}

/// Uniform subset of exactly `count` distinct items, or all of them
pub fn pick_without_replacement<R: Rng + ?Sized, T: Clone>(
    rng: &mut R,
    items: &[T],
    count: usize,
) -> Vec<T> {
    if count >= items.len() {
        return items.to_vec();
    }
    items.choose_multiple(rng, count).cloned().collect()
}

/// Fresh generation seed
pub fn new_seed<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.gen()
}

/// Weighted coin: true with probability `p`
pub fn flip<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    p > rng.gen::<f64>()
}
