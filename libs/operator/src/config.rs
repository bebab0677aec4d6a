//! Watch Config Loader: turns `HELM_CHART_WATCHES` / the default path /
//! the `API_VERSION`+`KIND`+`HELM_CHART` fallback into a validated map of
//! watched kinds to chart paths.

use crate::error::{Error, Result};

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_WATCHES_PATH: &str = "/opt/helm/watches.yaml";

/// One entry of the watches file, deserialized directly from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchFileEntry {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    pub chart: PathBuf,
}

/// `(group, version, kind)` — the key watches are deduplicated and looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// A single watch: the kind to observe and the chart that renders it.
#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub gvk: Gvk,
    pub chart_path: PathBuf,
}

/// Namespace scope for all registered watches, from `WATCH_NAMESPACE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    All,
    Named(String),
}

impl Namespace {
    pub fn from_env() -> Self {
        match env::var("WATCH_NAMESPACE") {
            Ok(ns) if !ns.is_empty() => Namespace::Named(ns),
            _ => Namespace::All,
        }
    }
}

/// Fully resolved configuration: the watch list plus the namespace scope.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub watches: Vec<WatchEntry>,
    pub namespace: Namespace,
}

impl WatchConfig {
    /// Look up the chart path registered for a given GVK, if any.
    pub fn chart_path(&self, gvk: &Gvk) -> Option<&Path> {
        self.watches
            .iter()
            .find(|w| &w.gvk == gvk)
            .map(|w| w.chart_path.as_path())
    }

    /// Load from the environment, following the documented resolution order:
    /// 1. `HELM_CHART_WATCHES` if explicitly set (even to the empty string).
    /// 2. The default path, if it exists.
    /// 3. The single-entry fallback from `API_VERSION`/`KIND`/`HELM_CHART`.
    pub fn load_from_env() -> Result<Self> {
        let namespace = Namespace::from_env();
        let watches = match env::var("HELM_CHART_WATCHES") {
            Ok(path) if !path.is_empty() => {
                debug!(source = "env", path = %path, "loading watches file");
                load_watches_file(Path::new(&path))?
            }
            Ok(_empty) => {
                warn!("HELM_CHART_WATCHES explicitly empty; falling back to single-entry mode");
                single_entry_from_env()?
            }
            Err(_) if Path::new(DEFAULT_WATCHES_PATH).exists() => {
                debug!(source = "default-path", path = DEFAULT_WATCHES_PATH, "loading watches file");
                load_watches_file(Path::new(DEFAULT_WATCHES_PATH))?
            }
            Err(_) => {
                debug!(source = "fallback", "no watches file found, using env fallback");
                single_entry_from_env()?
            }
        };
        Ok(WatchConfig { watches, namespace })
    }

    /// Validate and key a list of raw file entries.
    fn from_entries(entries: Vec<WatchFileEntry>) -> Result<Vec<WatchEntry>> {
        let mut seen: HashMap<(String, String, String), ()> = HashMap::new();
        let mut watches = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.version.is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "watch entry for kind {:?} is missing version",
                    entry.kind
                )));
            }
            if entry.kind.is_empty() {
                return Err(Error::ConfigInvalid(
                    "watch entry is missing kind".to_string(),
                ));
            }
            validate_chart_path(&entry.chart)?;

            let key = (entry.group.clone(), entry.version.clone(), entry.kind.clone());
            if seen.insert(key, ()).is_some() {
                return Err(Error::ConfigInvalid(format!(
                    "duplicate watch for ({}, {}, {})",
                    entry.group, entry.version, entry.kind
                )));
            }

            watches.push(WatchEntry {
                gvk: Gvk {
                    group: entry.group,
                    version: entry.version,
                    kind: entry.kind,
                },
                chart_path: entry.chart,
            });
        }
        Ok(watches)
    }
}

fn validate_chart_path(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::ConfigInvalid(format!(
            "chart path {} is not a directory",
            path.display()
        )));
    }
    let has_descriptor = ["Chart.yaml", "Chart.yml"]
        .iter()
        .any(|f| path.join(f).is_file());
    if !has_descriptor {
        return Err(Error::ConfigInvalid(format!(
            "chart path {} has no Chart.yaml descriptor",
            path.display()
        )));
    }
    Ok(())
}

fn load_watches_file(path: &Path) -> Result<Vec<WatchEntry>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigInvalid(format!("failed to read watches file {}: {e}", path.display()))
    })?;
    let entries: Vec<WatchFileEntry> = serde_yaml::from_str(&contents)
        .map_err(|e| Error::ConfigInvalid(format!("failed to parse watches file: {e}")))?;
    WatchConfig::from_entries(entries)
}

fn single_entry_from_env() -> Result<Vec<WatchEntry>> {
    let api_version = env::var("API_VERSION")
        .map_err(|_| Error::ConfigInvalid("API_VERSION not set for fallback watch".into()))?;
    let kind = env::var("KIND")
        .map_err(|_| Error::ConfigInvalid("KIND not set for fallback watch".into()))?;
    let chart = env::var("HELM_CHART")
        .map_err(|_| Error::ConfigInvalid("HELM_CHART not set for fallback watch".into()))?;

    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version),
    };

    WatchConfig::from_entries(vec![WatchFileEntry {
        group,
        version,
        kind,
        chart: PathBuf::from(chart),
    }])
}
