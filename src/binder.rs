//! Attach a dataset to a validated spec's data slot at emission time

use crate::error::PipelineError;
use crate::types::{Dataset, SpecTree};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Produce a copy of `spec` whose `data.values` holds the dataset rows.
///
/// Any previous binding is replaced, so binding twice equals binding once.
pub fn bind(spec: &SpecTree, dataset: &Dataset) -> Result<SpecTree, PipelineError> {
    if dataset.is_empty() {
        return Err(PipelineError::BindingFailed("dataset is empty".to_string()));
    }

    if !has_data_dependent_outputs(spec) {
        check_columns(spec, dataset)?;
    }

    let mut bound = spec.clone();
    bound.insert("data".to_string(), json!({ "values": dataset.records() }));
    Ok(bound)
}

fn check_columns(spec: &SpecTree, dataset: &Dataset) -> Result<(), PipelineError> {
    let derived = derived_fields(spec);
    for field in encoded_fields(spec) {
        if !derived.contains(&field) && !dataset.has_column(&field) {
            return Err(PipelineError::BindingFailed(format!(
                "encoded field `{}` is not a column of every record",
                field
            )));
        }
    }
    Ok(())
}

/// Rows currently bound to `spec`, if any
pub fn bound_records(spec: &SpecTree) -> Option<&Vec<Value>> {
    spec.get("data")?.get("values")?.as_array()
}

/// Every string `field` referenced by an encoding channel, including
/// tooltip arrays
fn encoded_fields(spec: &SpecTree) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    let Some(encoding) = spec.get("encoding").and_then(Value::as_object) else {
        return fields;
    };
    for def in encoding.values() {
        let defs: Vec<&Value> = match def {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for def in defs {
            if let Some(field) = def.get("field").and_then(Value::as_str) {
                fields.insert(field.to_string());
            }
        }
    }
    fields
}

/// Output names a transform gets when it omits `as`
const DEFAULT_OUTPUTS: &[(&str, &[&str])] = &[
    ("fold", &["key", "value"]),
    ("density", &["value", "density"]),
    ("quantile", &["prob", "value"]),
];

/// Transforms whose output columns come from data values
const DATA_DEPENDENT: &[&str] = &["pivot", "lookup"];

fn transform_steps(spec: &SpecTree) -> &[Value] {
    spec.get("transform")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Columns produced by `pivot` or `lookup` are unknown until the data is read
fn has_data_dependent_outputs(spec: &SpecTree) -> bool {
    transform_steps(spec)
        .iter()
        .any(|step| DATA_DEPENDENT.iter().any(|op| step.get(*op).is_some()))
}

/// Fields produced by `transform` steps, which need not be columns: explicit
/// `as` outputs plus the default names of steps that omit `as`
fn derived_fields(spec: &SpecTree) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    for step in transform_steps(spec) {
        collect_as(step, &mut fields);
        if step.get("as").is_some() {
            continue;
        }
        for (op, outputs) in DEFAULT_OUTPUTS {
            if step.get(*op).is_some() {
                fields.extend(outputs.iter().map(|name| name.to_string()));
            }
        }
    }
    fields
}

fn collect_as(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(obj) => {
            for (key, inner) in obj {
                if key == "as" {
                    match inner {
                        Value::String(s) => {
                            out.insert(s.clone());
                        }
                        Value::Array(names) => {
                            out.extend(names.iter().filter_map(Value::as_str).map(str::to_string));
                        }
                        _ => {}
                    }
                } else {
                    collect_as(inner, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_as(item, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(v: Value) -> SpecTree {
        v.as_object().cloned().unwrap()
    }

    fn dataset(v: Value) -> Dataset {
        serde_json::from_value(v).unwrap()
    }

    fn bar_spec() -> SpecTree {
        spec(json!({
            "mark": "bar",
            "encoding": {"x": {"field": "Category"}, "y": {"field": "Value"}}
        }))
    }

    #[test]
    fn test_bind_sets_values() {
        let ds = dataset(json!([{"Category": "A", "Value": 10}, {"Category": "B", "Value": 20}]));
        let bound = bind(&bar_spec(), &ds).unwrap();
        let rows = bound_records(&bound).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], json!({"Category": "B", "Value": 20}));
    }

    #[test]
    fn test_rebinding_replaces_previous_rows() {
        let first = dataset(json!([{"Category": "A", "Value": 1}, {"Category": "B", "Value": 2}]));
        let second = dataset(json!([{"Category": "Z", "Value": 9}]));
        let once = bind(&bar_spec(), &second).unwrap();
        let twice = bind(&bind(&bar_spec(), &first).unwrap(), &second).unwrap();
        assert_eq!(once, twice);
        assert_eq!(bound_records(&twice).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_dataset_fails() {
        assert!(matches!(
            bind(&bar_spec(), &Dataset::default()),
            Err(PipelineError::BindingFailed(_))
        ));
    }

    #[test]
    fn test_unknown_field_fails() {
        let ds = dataset(json!([{"Category": "A", "Amount": 10}]));
        match bind(&bar_spec(), &ds) {
            Err(PipelineError::BindingFailed(reason)) => assert!(reason.contains("Value")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_transform_outputs_and_tooltips() {
        let s = spec(json!({
            "mark": "bar",
            "transform": [{"calculate": "datum.Value * 2", "as": "Doubled"}],
            "encoding": {
                "x": {"field": "Category"},
                "y": {"field": "Doubled"},
                "tooltip": [{"field": "Category"}, {"field": "Missing"}]
            }
        }));
        let ds = dataset(json!([{"Category": "A", "Value": 10}]));
        match bind(&s, &ds) {
            Err(PipelineError::BindingFailed(reason)) => assert!(reason.contains("Missing")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_fold_default_outputs_are_derived() {
        let s = spec(json!({
            "mark": "line",
            "transform": [{"fold": ["Value", "Target"]}],
            "encoding": {"x": {"field": "key"}, "y": {"field": "value"}}
        }));
        let ds = dataset(json!([{"Category": "A", "Value": 10, "Target": 12}]));
        assert!(bind(&s, &ds).is_ok());
    }

    #[test]
    fn test_fold_with_as_uses_only_named_outputs() {
        let s = spec(json!({
            "mark": "line",
            "transform": [{"fold": ["Value"], "as": ["Series", "Amount"]}],
            "encoding": {"x": {"field": "key"}, "y": {"field": "Amount"}}
        }));
        let ds = dataset(json!([{"Category": "A", "Value": 10}]));
        match bind(&s, &ds) {
            Err(PipelineError::BindingFailed(reason)) => assert!(reason.contains("`key`")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_pivot_skips_column_check() {
        let s = spec(json!({
            "mark": "bar",
            "transform": [{"pivot": "Category", "value": "Value", "groupby": ["Region"]}],
            "encoding": {"x": {"field": "Region"}, "y": {"field": "A"}}
        }));
        let ds = dataset(json!([{"Region": "North", "Category": "A", "Value": 10}]));
        let bound = bind(&s, &ds).unwrap();
        assert_eq!(bound_records(&bound).unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_skips_column_check() {
        let s = spec(json!({
            "mark": "bar",
            "transform": [{
                "lookup": "Category",
                "from": {"data": {"url": "names.json"}, "key": "id", "fields": ["Label"]}
            }],
            "encoding": {"x": {"field": "Label"}, "y": {"field": "Value"}}
        }));
        let ds = dataset(json!([{"Category": "A", "Value": 10}]));
        assert!(bind(&s, &ds).is_ok());
    }

    #[test]
    fn test_bind_leaves_input_untouched() {
        let s = bar_spec();
        let ds = dataset(json!([{"Category": "A", "Value": 10}]));
        let _ = bind(&s, &ds).unwrap();
        assert!(s.get("data").is_none());
        assert_eq!(ds.len(), 1);
    }
}
