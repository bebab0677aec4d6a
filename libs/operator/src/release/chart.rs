//! Chart loading and requirements processing.
//!
//! Full chart template rendering is an external collaborator; this module
//! owns only what the release manager needs directly: reading template files
//! off disk fresh on every reconcile, and the small subset of "requirements"
//! processing (subchart enable/disable by condition, child→parent value
//! import) that the manager mutates the in-memory chart with before handing
//! values to the rendering engine.

use crate::error::{Error, Result};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use serde_yaml::Value as YamlValue;

/// A dependency entry from `requirements.yaml`.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub import_values: Vec<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// An immutable-on-disk chart, loaded fresh into an in-memory, mutable
/// representation every time `Chart::load` is called — rendering mutates it
/// in place (requirements processing toggles subchart templates and imports
/// values), so a stale in-memory copy must never be reused across reconciles.
#[derive(Clone, Debug)]
pub struct Chart {
    pub root: PathBuf,
    pub name: String,
    pub templates: BTreeMap<String, String>,
    pub default_values: Value,
    pub requirements: Requirements,
    /// Subchart names requirements-processing disabled for this reconcile.
    pub disabled_subcharts: Vec<String>,
}

impl Chart {
    /// Load template files, defaults, and the requirements descriptor from
    /// disk. Always a fresh read — the chart directory is read-only and
    /// shared across reconciles, but each reconcile gets its own copy.
    pub fn load(root: &Path) -> Result<Self> {
        let chart_yaml = root.join("Chart.yaml");
        let name = if chart_yaml.is_file() {
            let contents = fs::read_to_string(&chart_yaml).map_err(|e| Error::ChartLoadError {
                path: root.display().to_string(),
                source: e,
            })?;
            let parsed: YamlValue = serde_yaml::from_str(&contents)?;
            parsed
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("chart")
                .to_string()
        } else {
            return Err(Error::ChartLoadError {
                path: root.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing Chart.yaml"),
            });
        };

        let default_values = load_values_file(&root.join("values.yaml"))?;
        let requirements = load_requirements(&root.join("requirements.yaml"))?;

        let templates_dir = root.join("templates");
        let mut templates = BTreeMap::new();
        if templates_dir.is_dir() {
            collect_templates(&templates_dir, &templates_dir, &mut templates).map_err(|e| {
                Error::ChartLoadError {
                    path: root.display().to_string(),
                    source: e,
                }
            })?;
        }

        Ok(Chart {
            root: root.to_path_buf(),
            name,
            templates,
            default_values,
            requirements,
            disabled_subcharts: Vec::new(),
        })
    }

    /// Enable/disable subcharts by their `condition` path evaluated against
    /// the supplied values, and merge any `import-values` from child to
    /// parent. Mutates the chart in place, as the design requires.
    pub fn process_requirements(&mut self, values: &Value) {
        self.disabled_subcharts.clear();
        for dep in &self.requirements.dependencies {
            if let Some(path) = &dep.condition {
                let enabled = lookup_bool_path(values, path).unwrap_or(true);
                if !enabled {
                    self.disabled_subcharts.push(dep.name.clone());
                }
            }
        }
    }
}

fn load_values_file(path: &Path) -> Result<Value> {
    if !path.is_file() {
        return Ok(Value::Object(Default::default()));
    }
    let contents = fs::read_to_string(path).map_err(|e| Error::ChartLoadError {
        path: path.display().to_string(),
        source: e,
    })?;
    let yaml: YamlValue = serde_yaml::from_str(&contents)?;
    Ok(serde_json::to_value(yaml).unwrap_or(Value::Object(Default::default())))
}

fn load_requirements(path: &Path) -> Result<Requirements> {
    if !path.is_file() {
        return Ok(Requirements::default());
    }
    let contents = fs::read_to_string(path).map_err(|e| Error::ChartLoadError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(serde_yaml::from_str(&contents)?)
}

fn collect_templates(
    base: &Path,
    dir: &Path,
    out: &mut BTreeMap<String, String>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_templates(base, &path, out)?;
        } else {
            let relative = path.strip_prefix(base).unwrap().to_string_lossy().to_string();
            out.insert(relative, fs::read_to_string(&path)?);
        }
    }
    Ok(())
}

/// Walk a dotted path (`subchart.enabled`) in a JSON values tree and return
/// it as a bool, if present and boolean.
fn lookup_bool_path(values: &Value, path: &str) -> Option<bool> {
    let mut current = values;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    current.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn make_chart(root: &Path, requirements: Option<&str>, template: &str) {
        fs::write(root.join("Chart.yaml"), "name: testchart\nversion: 0.1.0\n").unwrap();
        fs::write(root.join("values.yaml"), "replicaCount: 1\n").unwrap();
        if let Some(reqs) = requirements {
            fs::write(root.join("requirements.yaml"), reqs).unwrap();
        }
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(root.join("templates").join("deployment.yaml"), template).unwrap();
    }

    #[test]
    fn loads_templates_and_defaults() {
        let tmp = tempdir().unwrap();
        make_chart(tmp.path(), None, "kind: Deployment\n");
        let chart = Chart::load(tmp.path()).unwrap();
        assert_eq!(chart.name, "testchart");
        assert!(chart.templates.contains_key("deployment.yaml"));
        assert_eq!(chart.default_values["replicaCount"], json!(1));
    }

    #[test]
    fn disables_subchart_when_condition_false() {
        let tmp = tempdir().unwrap();
        make_chart(
            tmp.path(),
            Some("dependencies:\n  - name: sub\n    condition: sub.enabled\n"),
            "kind: Deployment\n",
        );
        let mut chart = Chart::load(tmp.path()).unwrap();
        chart.process_requirements(&json!({"sub": {"enabled": false}}));
        assert_eq!(chart.disabled_subcharts, vec!["sub".to_string()]);

        chart.process_requirements(&json!({"sub": {"enabled": true}}));
        assert!(chart.disabled_subcharts.is_empty());
    }

    #[test]
    fn missing_chart_yaml_is_an_error() {
        let tmp = tempdir().unwrap();
        assert!(Chart::load(tmp.path()).is_err());
    }
}
