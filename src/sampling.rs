//! Input sampling with duplicate avoidance (spec.md §6, `--samples`):
//! draws fresh values per type until `num_samples` distinct ones (per the
//! provider's equality predicate) are collected, giving up after 100
//! consecutive duplicates and padding the remainder by repetition. Ported
//! from `grape/cli/prune.py`'s `sample_inputs`.

use std::collections::BTreeMap;

use crate::dsl::{Dsl, EqualityPredicate, StructuralEquality, Value};

const MAX_CONSECUTIVE_DUPLICATES: usize = 100;

/// Draws `num_samples` values of every type in `needed_types` from
/// `dsl.sample_dict`, retrying on duplicates (per `dsl.equal_for`) before
/// padding out the rest by repeating what was drawn.
#[must_use]
pub fn sample_inputs(
    dsl: &Dsl,
    needed_types: &[String],
    num_samples: usize,
) -> BTreeMap<String, Vec<Value>> {
    static FALLBACK: StructuralEquality = StructuralEquality;
    let mut inputs = BTreeMap::new();
    for ty in needed_types {
        let Some(sampler) = dsl.sample_dict.get(ty) else {
            continue;
        };
        let equality: &dyn EqualityPredicate = dsl.equal_for(ty, &FALLBACK);
        let mut values: Vec<Value> = Vec::with_capacity(num_samples);
        let mut consecutive_duplicates = 0usize;
        while values.len() < num_samples && consecutive_duplicates < MAX_CONSECUTIVE_DUPLICATES {
            let candidate = sampler.sample();
            if values.iter().all(|v| !equality.equal(v, &candidate)) {
                values.push(candidate);
                consecutive_duplicates = 0;
            } else {
                consecutive_duplicates += 1;
            }
        }
        if !values.is_empty() {
            let mut i = 0;
            while values.len() < num_samples {
                values.push(values[i % values.len()].clone());
                i += 1;
            }
        }
        inputs.insert(ty.clone(), values);
    }
    inputs
}
