//! Recursive deep-merge of specification trees
//!
//! Precedence: `overlay` wins. The pipeline always calls
//! `deep_merge(template, model_spec)`, so explicit model choices win and the
//! template fills every key the model omitted.

use crate::types::SpecTree;
use serde_json::Value;

/// Merge `overlay` into a copy of `base`. Neither input is modified.
///
/// When both sides hold an object under the same key the two are merged
/// recursively; any other pairing (scalar, array, null, mixed) takes the
/// overlay value whole. Arrays are never concatenated.
pub fn deep_merge(base: &SpecTree, overlay: &SpecTree) -> SpecTree {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let next = match (merged.get(key), value) {
            (Some(Value::Object(b)), Value::Object(o)) => Value::Object(deep_merge(b, o)),
            _ => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}
