//! Static registry of base Vega-Lite templates, one per chart kind
//!
//! Templates carry presentation only (fonts, grids, label rotation, number
//! formatting, legend placement). Encoding channels never name a `field`:
//! the data binding comes from the model's spec.

use crate::error::PipelineError;
use crate::types::{ChartKind, SpecTree};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

/// Abbreviates large values with Indian units (lakh / crore)
const INDIAN_UNITS_LABEL_EXPR: &str = "datum.value >= 10000000 ? (datum.value / 10000000) + ' Cr' : datum.value >= 100000 ? (datum.value / 100000) + ' L' : datum.value";

static BUILTIN: Lazy<TemplateRegistry> = Lazy::new(TemplateRegistry::builtin);

/// Immutable base spec for one chart kind
#[derive(Debug, Clone)]
pub struct Template {
    kind: ChartKind,
    spec: SpecTree,
    /// (channel, source): `channel` copies `source`'s field when left unbound
    linked_channels: &'static [(&'static str, &'static str)],
}

impl Template {
    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn spec(&self) -> &SpecTree {
        &self.spec
    }

    /// Fresh deep copy of the base spec
    pub fn to_spec(&self) -> SpecTree {
        self.spec.clone()
    }

    pub fn linked_channels(&self) -> &'static [(&'static str, &'static str)] {
        self.linked_channels
    }
}

#[derive(Debug)]
pub struct TemplateRegistry {
    line: Template,
    bar: Template,
    arc: Template,
}

impl TemplateRegistry {
    /// Process-wide registry, built on first use
    pub fn global() -> &'static TemplateRegistry {
        &BUILTIN
    }

    /// Template for `kind`; the caller owns the returned copy
    pub fn lookup(&self, kind: ChartKind) -> Template {
        match kind {
            ChartKind::Line => self.line.clone(),
            ChartKind::Bar => self.bar.clone(),
            ChartKind::Arc => self.arc.clone(),
        }
    }

    /// Look up by raw chart-type key (`line`, `bar`, `arc`, `pie`)
    pub fn lookup_key(&self, key: &str) -> Result<Template, PipelineError> {
        ChartKind::from_key(key).map(|kind| self.lookup(kind))
    }

    fn builtin() -> Self {
        Self {
            line: Template {
                kind: ChartKind::Line,
                spec: as_tree(line_template()),
                linked_channels: &[],
            },
            bar: Template {
                kind: ChartKind::Bar,
                spec: as_tree(bar_template()),
                linked_channels: &[("color", "x")],
            },
            arc: Template {
                kind: ChartKind::Arc,
                spec: as_tree(arc_template()),
                linked_channels: &[],
            },
        }
    }
}

fn as_tree(value: Value) -> SpecTree {
    match value {
        Value::Object(map) => map,
        _ => SpecTree::new(),
    }
}

fn bottom_legend() -> Value {
    json!({
        "orient": "bottom",
        "title": null,
        "labelFont": "Arial",
        "labelFontSize": 12
    })
}

fn line_template() -> Value {
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "description": "Base Line Chart Configuration",
        "mark": {
            "type": "line",
            "point": true,
            "tooltip": true
        },
        "encoding": {
            "x": {
                "type": "ordinal",
                "axis": { "title": null, "labelAngle": -45, "grid": true }
            },
            "y": {
                "type": "quantitative",
                "axis": { "title": null, "grid": true, "format": ",.0f" }
            },
            "color": {
                "type": "nominal",
                "legend": bottom_legend()
            }
        },
        "config": {
            "customFormatTypes": true,
            "locale": {
                "decimal": ".",
                "thousands": ",",
                "grouping": [3, 2],
                "currency": ["₹", ""]
            },
            "axis": {
                "title": null,
                "grid": true,
                "labelFont": "Arial",
                "labelFontSize": 12,
                "gridColor": "#ccc",
                "gridOpacity": 0.5
            },
            "axisX": { "labelAngle": -45 },
            "legend": bottom_legend(),
            "view": { "stroke": "transparent" }
        }
    })
}

fn bar_template() -> Value {
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "description": "Base Bar Chart Configuration",
        "mark": {
            "type": "bar",
            "tooltip": true
        },
        "encoding": {
            "x": {
                "type": "ordinal",
                "axis": { "title": null, "labelAngle": -45, "grid": true }
            },
            "y": {
                "type": "quantitative",
                "axis": {
                    "title": null,
                    "grid": true,
                    "format": "~s",
                    "formatType": "number",
                    "labels": true,
                    "labelExpr": INDIAN_UNITS_LABEL_EXPR
                }
            },
            "color": {
                "type": "nominal",
                "legend": bottom_legend()
            }
        },
        "config": {
            "axis": { "labelFontSize": 12, "titleFontSize": 14 },
            "legend": bottom_legend(),
            "view": { "stroke": "transparent" }
        }
    })
}

fn arc_template() -> Value {
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "description": "Base Pie Chart Configuration",
        "mark": {
            "type": "arc",
            "tooltip": true
        },
        "encoding": {
            "theta": {
                "type": "quantitative",
                "stack": true
            },
            "color": {
                "type": "nominal",
                "legend": bottom_legend()
            }
        },
        "config": {
            "legend": bottom_legend(),
            "view": { "stroke": "transparent" }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::mark_type;
    use crate::validator::validate_structure;

    #[test]
    fn test_every_template_is_structurally_complete() {
        let registry = TemplateRegistry::global();
        for kind in ChartKind::ALL {
            let template = registry.lookup(kind);
            assert_eq!(template.kind(), kind);
            assert_eq!(mark_type(template.spec()), Some(kind.as_str()));
            validate_structure(template.spec())
                .unwrap_or_else(|e| panic!("{} template: {}", kind, e));
        }
    }

    #[test]
    fn test_templates_never_bind_fields() {
        let registry = TemplateRegistry::global();
        for kind in ChartKind::ALL {
            let spec = registry.lookup(kind).to_spec();
            let encoding = spec["encoding"].as_object().unwrap();
            for (channel, def) in encoding {
                assert!(def.get("field").is_none(), "{} {} binds a field", kind, channel);
            }
            assert!(spec.get("data").is_none());
        }
    }

    #[test]
    fn test_lookup_returns_independent_copies() {
        let registry = TemplateRegistry::global();
        let mut first = registry.lookup(ChartKind::Bar).to_spec();
        first.insert("title".into(), json!("mutated"));
        first["encoding"]["x"]["axis"]["labelAngle"] = json!(0);

        let second = registry.lookup(ChartKind::Bar).to_spec();
        assert!(second.get("title").is_none());
        assert_eq!(second["encoding"]["x"]["axis"]["labelAngle"], json!(-45));
    }

    #[test]
    fn test_lookup_key_aliases_and_unknown() {
        let registry = TemplateRegistry::global();
        assert_eq!(registry.lookup_key("pie").unwrap().kind(), ChartKind::Arc);
        assert_eq!(registry.lookup_key("LINE").unwrap().kind(), ChartKind::Line);
        assert!(matches!(
            registry.lookup_key("scatter3d"),
            Err(PipelineError::UnrecognizedChartType(_))
        ));
    }

    #[test]
    fn test_bar_color_follows_category_axis() {
        let bar = TemplateRegistry::global().lookup(ChartKind::Bar);
        assert_eq!(bar.linked_channels(), &[("color", "x")]);
    }
}
