//! Owner-Propagating Renderer: wraps a [`TemplateEngine`] so every rendered
//! `.yaml` document carries an owner reference back to the custom resource.

use crate::error::{Error, Result};
use crate::release::chart::Chart;
use crate::release::engine::TemplateEngine;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::Value;
use serde_yaml::Value as YamlValue;

/// Owns the controller reference injected into every rendered document; one
/// instance per CR, never shared, as the concurrency model requires.
pub struct OwnerRefRenderer<E: TemplateEngine> {
    engine: E,
    owner_ref: OwnerReference,
}

impl<E: TemplateEngine> OwnerRefRenderer<E> {
    pub fn new(engine: E, owner_ref: OwnerReference) -> Self {
        OwnerRefRenderer { engine, owner_ref }
    }

    /// Render the chart, then for every `.yaml` output: parse, drop
    /// effectively-empty documents, inject the owner reference, and
    /// re-serialize. Non-YAML files pass through unchanged. Multi-document
    /// files (`---`-separated) are split and each document processed
    /// independently — see DESIGN.md for why this resolves the spec's open
    /// question on multi-document YAML in favor of always splitting.
    pub fn render(&self, chart: &Chart, values: &Value) -> Result<BTreeMap<String, String>> {
        let rendered = self.engine.render(chart, values)?;
        let mut out = BTreeMap::new();

        for (file, contents) in rendered {
            if !file.ends_with(".yaml") && !file.ends_with(".yml") {
                out.insert(file, contents);
                continue;
            }

            let mut processed_docs = Vec::new();
            for (idx, doc_text) in split_documents(&contents).into_iter().enumerate() {
                if doc_text.trim().is_empty() {
                    continue;
                }
                let mut doc: YamlValue =
                    serde_yaml::from_str(&doc_text).map_err(|e| Error::RenderError {
                        file: format!("{file}#{idx}"),
                        reason: e.to_string(),
                    })?;

                if is_effectively_empty(&doc) {
                    continue;
                }

                inject_owner_ref(&mut doc, &self.owner_ref);
                let serialized = serde_yaml::to_string(&doc)?;
                processed_docs.push(serialized);
            }

            if processed_docs.is_empty() {
                continue;
            }
            out.insert(file, processed_docs.join("---\n"));
        }

        Ok(out)
    }
}

fn split_documents(contents: &str) -> Vec<String> {
    contents
        .split("\n---")
        .map(|s| s.trim_start_matches('-').to_string())
        .collect()
}

fn is_effectively_empty(doc: &YamlValue) -> bool {
    match doc {
        YamlValue::Null => true,
        YamlValue::Mapping(m) => m.is_empty(),
        YamlValue::Sequence(s) => s.is_empty(),
        _ => false,
    }
}

fn inject_owner_ref(doc: &mut YamlValue, owner_ref: &OwnerReference) {
    let owner_refs_yaml = serde_yaml::to_value(std::slice::from_ref(owner_ref))
        .expect("OwnerReference always serializes");

    if !doc.is_mapping() {
        *doc = YamlValue::Mapping(Default::default());
    }
    let mapping = doc.as_mapping_mut().unwrap();
    let metadata_key = YamlValue::String("metadata".to_string());
    let metadata = mapping
        .entry(metadata_key)
        .or_insert_with(|| YamlValue::Mapping(Default::default()));
    if !metadata.is_mapping() {
        *metadata = YamlValue::Mapping(Default::default());
    }
    metadata
        .as_mapping_mut()
        .unwrap()
        .insert(YamlValue::String("ownerReferences".to_string()), owner_refs_yaml);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::chart::Chart;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap as Map;

    struct FakeEngine(Map<String, String>);
    impl TemplateEngine for FakeEngine {
        fn render(&self, _chart: &Chart, _values: &Value) -> Result<BTreeMap<String, String>> {
            Ok(self.0.clone())
        }
    }

    fn owner_ref() -> OwnerReference {
        OwnerReference {
            api_version: "apache.org/v1alpha1".into(),
            kind: "Tomcat".into(),
            name: "t1".into(),
            uid: "1b4e28ba-2fa1-11d2-883f-0016d3cca427".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn empty_chart() -> Chart {
        Chart {
            root: "/dev/null".into(),
            name: "t".into(),
            templates: Default::default(),
            default_values: json!({}),
            requirements: Default::default(),
            disabled_subcharts: Vec::new(),
        }
    }

    #[test]
    fn injects_owner_ref_replacing_existing() {
        let mut files = Map::new();
        files.insert(
            "svc.yaml".to_string(),
            "kind: Service\nmetadata:\n  name: svc\n  ownerReferences:\n  - kind: Old\n".to_string(),
        );
        let renderer = OwnerRefRenderer::new(FakeEngine(files), owner_ref());
        let out = renderer.render(&empty_chart(), &json!({})).unwrap();
        let doc: YamlValue = serde_yaml::from_str(&out["svc.yaml"]).unwrap();
        let refs = doc["metadata"]["ownerReferences"].as_sequence().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0]["name"].as_str().unwrap(), "t1");
    }

    #[test]
    fn drops_effectively_empty_documents() {
        let mut files = Map::new();
        files.insert("empty.yaml".to_string(), "".to_string());
        let renderer = OwnerRefRenderer::new(FakeEngine(files), owner_ref());
        let out = renderer.render(&empty_chart(), &json!({})).unwrap();
        assert!(!out.contains_key("empty.yaml"));
    }

    #[test]
    fn passes_through_non_yaml_files_unchanged() {
        let mut files = Map::new();
        files.insert("NOTES.txt".to_string(), "hello\n".to_string());
        let renderer = OwnerRefRenderer::new(FakeEngine(files), owner_ref());
        let out = renderer.render(&empty_chart(), &json!({})).unwrap();
        assert_eq!(out["NOTES.txt"], "hello\n");
    }

    #[test]
    fn splits_multi_document_yaml_and_injects_each() {
        let mut files = Map::new();
        files.insert(
            "multi.yaml".to_string(),
            "kind: Service\nmetadata:\n  name: svc\n---\nkind: Deployment\nmetadata:\n  name: dep\n"
                .to_string(),
        );
        let renderer = OwnerRefRenderer::new(FakeEngine(files), owner_ref());
        let out = renderer.render(&empty_chart(), &json!({})).unwrap();
        let docs: Vec<YamlValue> = serde_yaml::Deserializer::from_str(&out["multi.yaml"])
            .map(|d| YamlValue::deserialize(d).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        for doc in &docs {
            assert!(doc["metadata"]["ownerReferences"].is_sequence());
        }
    }

    #[test]
    fn fails_with_filename_on_parse_error() {
        let mut files = Map::new();
        files.insert("bad.yaml".to_string(), "kind: [unterminated\n".to_string());
        let renderer = OwnerRefRenderer::new(FakeEngine(files), owner_ref());
        let err = renderer.render(&empty_chart(), &json!({})).unwrap_err();
        match err {
            Error::RenderError { file, .. } => assert!(file.starts_with("bad.yaml")),
            other => panic!("expected RenderError, got {other:?}"),
        }
    }
}
