//! Rendering engine as capability: `Render(chart, values) -> map<fileName,
//! string>`. Modeling it as a trait keeps the owner-injecting wrapper
//! (`ownerref`) independently testable against a fake engine.

use crate::error::{Error, Result};
use crate::release::chart::Chart;

use std::collections::BTreeMap;

use serde_json::Value;
use tera::{Context, Tera};

pub trait TemplateEngine: Send + Sync {
    /// Render every template file in `chart` against `values`, keyed by the
    /// file's path relative to the chart's `templates/` directory.
    fn render(&self, chart: &Chart, values: &Value) -> Result<BTreeMap<String, String>>;
}

/// Renders chart templates with `tera`, the same templating engine the rest
/// of this corpus reaches for when wiring Helm-style value substitution.
#[derive(Default)]
pub struct TeraChartEngine;

impl TeraChartEngine {
    pub fn new() -> Self {
        TeraChartEngine
    }
}

impl TemplateEngine for TeraChartEngine {
    fn render(&self, chart: &Chart, values: &Value) -> Result<BTreeMap<String, String>> {
        let merged = merge_values(&chart.default_values, values);
        let context = Context::from_serialize(&merged).map_err(|e| Error::RenderError {
            file: chart.name.clone(),
            reason: format!("invalid values document: {e}"),
        })?;

        let mut out = BTreeMap::new();
        for (name, body) in &chart.templates {
            if chart
                .disabled_subcharts
                .iter()
                .any(|s| name.starts_with(&format!("{s}/")))
            {
                continue;
            }
            let mut tera = Tera::default();
            tera.add_raw_template(name, body)
                .map_err(|e| Error::RenderError {
                    file: name.clone(),
                    reason: e.to_string(),
                })?;
            let rendered = tera.render(name, &context).map_err(|e| Error::RenderError {
                file: name.clone(),
                reason: e.to_string(),
            })?;
            out.insert(name.clone(), rendered);
        }
        Ok(out)
    }
}

/// Shallow top-level merge of CR `spec` values over the chart's defaults —
/// user-supplied keys win.
fn merge_values(defaults: &Value, overrides: &Value) -> Value {
    let mut merged = defaults.clone();
    if let (Some(base), Some(over)) = (merged.as_object_mut(), overrides.as_object()) {
        for (k, v) in over {
            base.insert(k.clone(), v.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap as Map;

    fn chart_with(templates: Map<String, String>) -> Chart {
        Chart {
            root: "/dev/null".into(),
            name: "test".into(),
            templates,
            default_values: json!({"replicaCount": 1}),
            requirements: Default::default(),
            disabled_subcharts: Vec::new(),
        }
    }

    #[test]
    fn renders_values_into_templates() {
        let mut templates = Map::new();
        templates.insert(
            "deployment.yaml".to_string(),
            "replicas: {{ replicaCount }}\n".to_string(),
        );
        let chart = chart_with(templates);
        let engine = TeraChartEngine::new();
        let out = engine.render(&chart, &json!({"replicaCount": 3})).unwrap();
        assert_eq!(out["deployment.yaml"], "replicas: 3\n");
    }

    #[test]
    fn skips_templates_under_disabled_subcharts() {
        let mut templates = Map::new();
        templates.insert("sub/deployment.yaml".to_string(), "x: 1\n".to_string());
        let mut chart = chart_with(templates);
        chart.disabled_subcharts = vec!["sub".to_string()];
        let engine = TeraChartEngine::new();
        let out = engine.render(&chart, &json!({})).unwrap();
        assert!(out.is_empty());
    }
}
