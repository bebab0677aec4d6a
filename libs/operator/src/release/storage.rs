//! Release Storage: an ordered history of rendered manifests per release
//! name, modeled as a capability trait so an in-memory implementation is
//! usable in tests while a real deployment swaps in a persistent backend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ReleaseStatusCode {
    Unknown,
    Deployed,
    Failed,
    Superseded,
    Uninstalled,
    PendingInstall,
    PendingUpgrade,
}

impl fmt::Display for ReleaseStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseStatusCode::Unknown => "UNKNOWN",
            ReleaseStatusCode::Deployed => "DEPLOYED",
            ReleaseStatusCode::Failed => "FAILED",
            ReleaseStatusCode::Superseded => "SUPERSEDED",
            ReleaseStatusCode::Uninstalled => "UNINSTALLED",
            ReleaseStatusCode::PendingInstall => "PENDING_INSTALL",
            ReleaseStatusCode::PendingUpgrade => "PENDING_UPGRADE",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub status: ReleaseStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleaseStatus {
    pub code: ReleaseStatusCode,
    pub notes: String,
}

/// A versioned, persisted release record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub version: u64,
    pub namespace: String,
    pub manifest: String,
    pub info: ReleaseInfo,
}

impl Release {
    pub fn new(name: impl Into<String>, version: u64, namespace: impl Into<String>, manifest: impl Into<String>, code: ReleaseStatusCode, notes: impl Into<String>) -> Self {
        Release {
            name: name.into(),
            version,
            namespace: namespace.into(),
            manifest: manifest.into(),
            info: ReleaseInfo {
                status: ReleaseStatus {
                    code,
                    notes: notes.into(),
                },
            },
        }
    }

    pub fn is_deployed(&self) -> bool {
        self.info.status.code == ReleaseStatusCode::Deployed
    }
}

/// `Deployed` needs to distinguish "name unknown entirely" from "no deployed
/// version among (non-empty) history" — the state machine relies on that
/// distinction.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("release {0} not found")]
    NotFound(String),
    #[error("release {name} has no deployed version")]
    NoDeployed { name: String },
    #[error("release {name} version {version} not found")]
    VersionNotFound { name: String, version: u64 },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Release backend capability: ordered history per release name.
pub trait ReleaseStorage: Send + Sync {
    fn history(&self, name: &str) -> StorageResult<Vec<Release>>;
    fn deployed(&self, name: &str) -> StorageResult<Release>;
    fn last(&self, name: &str) -> StorageResult<Release>;
    fn get(&self, name: &str, version: u64) -> StorageResult<Release>;
    fn create(&self, release: Release) -> StorageResult<()>;
    fn delete(&self, name: &str, version: u64) -> StorageResult<Release>;
    /// Replace an existing record of the same name+version in place, e.g. to
    /// mark a release superseded without a delete/recreate window in which
    /// neither the old nor the new record is visible to concurrent readers.
    fn update(&self, release: Release) -> StorageResult<()>;
}

/// In-memory `ReleaseStorage`, sufficient for tests and for smoke-running
/// the operator without a persistent backend.
#[derive(Default)]
pub struct InMemoryReleaseStorage {
    releases: RwLock<BTreeMap<String, Vec<Release>>>,
}

impl InMemoryReleaseStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReleaseStorage for InMemoryReleaseStorage {
    fn history(&self, name: &str) -> StorageResult<Vec<Release>> {
        Ok(self
            .releases
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    fn deployed(&self, name: &str) -> StorageResult<Release> {
        let releases = self.releases.read().unwrap();
        let history = releases
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        history
            .iter()
            .rev()
            .find(|r| r.is_deployed())
            .cloned()
            .ok_or_else(|| StorageError::NoDeployed {
                name: name.to_string(),
            })
    }

    fn last(&self, name: &str) -> StorageResult<Release> {
        let releases = self.releases.read().unwrap();
        releases
            .get(name)
            .and_then(|h| h.last())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn get(&self, name: &str, version: u64) -> StorageResult<Release> {
        let releases = self.releases.read().unwrap();
        releases
            .get(name)
            .and_then(|h| h.iter().find(|r| r.version == version))
            .cloned()
            .ok_or_else(|| StorageError::VersionNotFound {
                name: name.to_string(),
                version,
            })
    }

    fn create(&self, release: Release) -> StorageResult<()> {
        let mut releases = self.releases.write().unwrap();
        releases.entry(release.name.clone()).or_default().push(release);
        Ok(())
    }

    fn delete(&self, name: &str, version: u64) -> StorageResult<Release> {
        let mut releases = self.releases.write().unwrap();
        let history = releases
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let idx = history
            .iter()
            .position(|r| r.version == version)
            .ok_or_else(|| StorageError::VersionNotFound {
                name: name.to_string(),
                version,
            })?;
        Ok(history.remove(idx))
    }

    fn update(&self, release: Release) -> StorageResult<()> {
        let mut releases = self.releases.write().unwrap();
        let history = releases
            .get_mut(&release.name)
            .ok_or_else(|| StorageError::NotFound(release.name.clone()))?;
        let idx = history
            .iter()
            .position(|r| r.version == release.version)
            .ok_or_else(|| StorageError::VersionNotFound {
                name: release.name.clone(),
                version: release.version,
            })?;
        history[idx] = release;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployed(name: &str, version: u64) -> Release {
        Release::new(name, version, "default", "manifest", ReleaseStatusCode::Deployed, "")
    }

    #[test]
    fn deployed_errors_distinguish_unknown_name_from_no_deployed_version() {
        let storage = InMemoryReleaseStorage::new();
        assert!(matches!(
            storage.deployed("missing"),
            Err(StorageError::NotFound(_))
        ));

        storage
            .create(Release::new(
                "known",
                1,
                "default",
                "m",
                ReleaseStatusCode::Failed,
                "",
            ))
            .unwrap();
        assert!(matches!(
            storage.deployed("known"),
            Err(StorageError::NoDeployed { .. })
        ));
    }

    #[test]
    fn history_grows_monotonically_and_deployed_is_unique() {
        let storage = InMemoryReleaseStorage::new();
        storage.create(deployed("r", 1)).unwrap();
        storage
            .create(Release::new("r", 1, "default", "m", ReleaseStatusCode::Superseded, ""))
            .unwrap();
        // can't create v1 twice as deployed in this simplified model without
        // superseding it first; exercise the realistic path instead:
        let history = storage.history("r").unwrap();
        assert_eq!(history.len(), 2);
        storage.delete("r", 1).unwrap();
        storage.create(deployed("r", 2)).unwrap();
        let history = storage.history("r").unwrap();
        assert_eq!(history.iter().filter(|r| r.is_deployed()).count(), 1);
    }
}
