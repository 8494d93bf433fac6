//! Minimum-shape checks on a merged spec before it is bound and emitted

use crate::error::PipelineError;
use crate::types::{ChartKind, SpecTree};
use serde_json::Value;

/// Keys that count as a data binding on an encoding channel
pub const BINDING_KEYS: [&str; 4] = ["field", "aggregate", "value", "datum"];

/// Full validation: structure, required bindings, and an empty data slot.
pub fn validate(spec: &SpecTree) -> Result<ChartKind, PipelineError> {
    let kind = validate_structure(spec)?;
    let encoding = encoding_of(spec)?;

    for channel in kind.required_channels() {
        if !encoding.get(*channel).map_or(false, is_bound) {
            return Err(PipelineError::ValidationFailed(format!(
                "{} chart requires a data binding on the `{}` encoding",
                kind, channel
            )));
        }
    }

    if !data_slot_is_empty(spec) {
        return Err(PipelineError::ValidationFailed(
            "data slot must be empty before binding".to_string(),
        ));
    }

    Ok(kind)
}

/// Mark is recognised, `encoding` is an object, and every channel the kind
/// requires is present as an object. Bindings are not checked here.
pub fn validate_structure(spec: &SpecTree) -> Result<ChartKind, PipelineError> {
    let kind = ChartKind::from_spec(spec)?;
    let encoding = encoding_of(spec)?;

    for channel in kind.required_channels() {
        match encoding.get(*channel) {
            Some(Value::Object(_)) => {}
            Some(Value::Null) | None => {
                return Err(PipelineError::ValidationFailed(format!(
                    "{} chart is missing the `{}` encoding",
                    kind, channel
                )))
            }
            Some(_) => {
                return Err(PipelineError::ValidationFailed(format!(
                    "`{}` encoding must be an object",
                    channel
                )))
            }
        }
    }
    Ok(kind)
}

/// A channel definition with at least one non-null binding key
pub fn is_bound(def: &Value) -> bool {
    def.as_object().map_or(false, |obj| {
        BINDING_KEYS
            .iter()
            .any(|key| obj.get(*key).map_or(false, |v| !v.is_null()))
    })
}

fn encoding_of(spec: &SpecTree) -> Result<&serde_json::Map<String, Value>, PipelineError> {
    match spec.get("encoding") {
        Some(Value::Object(obj)) => Ok(obj),
        Some(Value::Null) | None => Err(PipelineError::ValidationFailed(
            "spec has no `encoding`".to_string(),
        )),
        Some(_) => Err(PipelineError::ValidationFailed(
            "`encoding` must be an object".to_string(),
        )),
    }
}

/// Absent, null, `{}` or `{"values": []}`
pub fn data_slot_is_empty(spec: &SpecTree) -> bool {
    match spec.get("data") {
        None | Some(Value::Null) => true,
        Some(Value::Object(obj)) => obj.iter().all(|(key, value)| match value {
            Value::Null => true,
            Value::Array(rows) => key == "values" && rows.is_empty(),
            _ => false,
        }),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(v: Value) -> SpecTree {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_bar() {
        let s = spec(json!({
            "mark": "bar",
            "encoding": {"x": {"field": "Category"}, "y": {"field": "Value"}}
        }));
        assert_eq!(validate(&s).unwrap(), ChartKind::Bar);
    }

    #[test]
    fn test_arc_without_theta_or_color_names_the_channel() {
        let s = spec(json!({"mark": "arc", "encoding": {"color": {"field": "Category"}}}));
        match validate(&s) {
            Err(PipelineError::ValidationFailed(reason)) => assert!(reason.contains("theta")),
            other => panic!("unexpected: {:?}", other),
        }

        let s = spec(json!({"mark": "arc", "encoding": {
            "theta": {"field": "Value"},
            "color": {"type": "nominal"}
        }}));
        match validate(&s) {
            Err(PipelineError::ValidationFailed(reason)) => assert!(reason.contains("color")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_null_field_is_not_a_binding() {
        let s = spec(json!({
            "mark": "line",
            "encoding": {"x": {"field": null}, "y": {"field": "Value"}}
        }));
        assert!(matches!(validate(&s), Err(PipelineError::ValidationFailed(_))));
    }

    #[test]
    fn test_aggregate_counts_as_binding() {
        let s = spec(json!({
            "mark": "bar",
            "encoding": {"x": {"field": "Category"}, "y": {"aggregate": "count"}}
        }));
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn test_missing_encoding_and_bad_mark() {
        assert!(matches!(
            validate(&spec(json!({"mark": "bar"}))),
            Err(PipelineError::ValidationFailed(_))
        ));
        assert!(matches!(
            validate(&spec(json!({"encoding": {}}))),
            Err(PipelineError::UnrecognizedChartType(_))
        ));
        assert!(matches!(
            validate(&spec(json!({"mark": "bar", "encoding": {"x": "Category", "y": {}}}))),
            Err(PipelineError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_literal_rows_rejected_before_binding() {
        let s = spec(json!({
            "mark": "bar",
            "encoding": {"x": {"field": "Category"}, "y": {"field": "Value"}},
            "data": {"values": [{"Category": "A", "Value": 1}]}
        }));
        assert!(matches!(validate(&s), Err(PipelineError::ValidationFailed(_))));

        assert!(data_slot_is_empty(&spec(json!({"data": {}}))));
        assert!(data_slot_is_empty(&spec(json!({"data": {"values": []}}))));
        assert!(!data_slot_is_empty(&spec(json!({"data": {"url": "rows.csv"}}))));
    }
}
