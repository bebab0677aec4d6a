//! Release Manager: computes the desired release from chart+values, decides
//! install/update/reconcile, and executes with rollback on partial failure.

use crate::error::{Error, Result};
use crate::release::chart::Chart;
use crate::release::engine::TemplateEngine;
use crate::release::ownerref::OwnerRefRenderer;
use crate::release::storage::{Release, ReleaseStatusCode, ReleaseStorage, StorageError};

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::core::{DynamicObject, TypeMeta};
use kube::discovery::ApiResource;
use kube::{Api, Client};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Outcome of [`ReleaseManager::sync`], cached for the decision state machine.
#[derive(Debug, Default, Clone)]
pub struct SyncState {
    pub is_installed: bool,
    pub is_update_required: bool,
}

/// The action the 4.3.2 decision state machine selects for this reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Install,
    Update,
    Reconcile,
}

/// Per-CR release manager: everything needed to converge one CR's release.
pub struct ReleaseManager<E: TemplateEngine> {
    storage: Arc<dyn ReleaseStorage>,
    client: Client,
    chart_path: std::path::PathBuf,
    values: Value,
    release_name: String,
    namespace: String,
    renderer: OwnerRefRenderer<E>,
    sync_state: SyncState,
}

impl<E: TemplateEngine> ReleaseManager<E> {
    pub fn new(
        storage: Arc<dyn ReleaseStorage>,
        client: Client,
        chart_path: std::path::PathBuf,
        values: Value,
        release_name: String,
        namespace: String,
        engine: E,
        owner_ref: OwnerReference,
    ) -> Self {
        ReleaseManager {
            storage,
            client,
            chart_path,
            values,
            release_name,
            namespace,
            renderer: OwnerRefRenderer::new(engine, owner_ref),
            sync_state: SyncState::default(),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.sync_state.is_installed
    }

    pub fn is_update_required(&self) -> bool {
        self.sync_state.is_update_required
    }

    /// Tie-break: update takes precedence over reconcile when both could
    /// apply.
    pub fn decide(&self) -> Decision {
        if !self.sync_state.is_installed {
            Decision::Install
        } else if self.sync_state.is_update_required {
            Decision::Update
        } else {
            Decision::Reconcile
        }
    }

    /// Idempotent preparation: recover lost history, garbage-collect
    /// non-DEPLOYED ghosts, load+process the chart, and determine whether an
    /// install or an update is required.
    #[instrument(skip(self, status_release), fields(release = %self.release_name))]
    pub fn sync(&mut self, status_release: Option<&Release>) -> Result<()> {
        if let Some(snapshot) = status_release {
            if self.storage.get(&self.release_name, snapshot.version).is_err() {
                debug!("recovering lost release history entry from status");
                self.storage
                    .create(snapshot.clone())
                    .map_err(storage_err)?;
            }
        }

        let history = self.storage.history(&self.release_name).map_err(storage_err)?;
        for ghost in history.into_iter().filter(|r| !r.is_deployed()) {
            debug!(version = ghost.version, "garbage collecting non-deployed release");
            // best-effort: a concurrent delete racing us is not an error
            let _ = self.storage.delete(&self.release_name, ghost.version);
        }

        let mut chart = Chart::load(&self.chart_path)?;
        chart.process_requirements(&self.values);

        match self.storage.deployed(&self.release_name) {
            Err(StorageError::NotFound(_)) | Err(StorageError::NoDeployed { .. }) => {
                self.sync_state = SyncState {
                    is_installed: false,
                    is_update_required: false,
                };
                return Ok(());
            }
            Err(e) => return Err(storage_err(e)),
            Ok(deployed) => {
                let candidate_manifest = self.render_manifest(&chart)?;
                let update_required = candidate_manifest != deployed.manifest;
                self.sync_state = SyncState {
                    is_installed: true,
                    is_update_required: update_required,
                };
            }
        }
        Ok(())
    }

    fn render_manifest(&self, chart: &Chart) -> Result<String> {
        let rendered = self.renderer.render(chart, &self.values)?;
        let mut docs: Vec<String> = rendered.into_values().collect();
        docs.sort();
        Ok(docs.join("---\n"))
    }

    /// Install the chart as a fresh release (version 1): render, apply every
    /// document to the cluster, then persist the record. On a partial
    /// cluster-apply failure, purge whatever already got created before
    /// surfacing the wrapped error; on a storage-backend failure after a
    /// successful apply, purge the same way.
    #[instrument(skip(self), fields(release = %self.release_name))]
    pub async fn install_release(&self) -> Result<Release> {
        let mut chart = Chart::load(&self.chart_path)?;
        chart.process_requirements(&self.values);
        let manifest = self.render_manifest(&chart)?;

        if let Err(e) = self.apply_manifest(&manifest).await {
            warn!(error = %e, "install failed applying to cluster, purging partially-applied resources");
            self.delete_manifest(&manifest).await;
            return Err(Error::InstallError(e.to_string()));
        }

        let release = Release::new(
            &self.release_name,
            1,
            &self.namespace,
            &manifest,
            ReleaseStatusCode::Deployed,
            "Install complete",
        );

        match self.storage.create(release.clone()) {
            Ok(()) => {
                info!("installed release version 1");
                Ok(release)
            }
            Err(e) => {
                warn!(error = %e, "install failed persisting release, purging applied resources");
                let _ = self.storage.delete(&self.release_name, 1);
                self.delete_manifest(&manifest).await;
                Err(Error::InstallError(e.to_string()))
            }
        }
    }

    /// Render, apply the new manifest to the cluster, then persist a new
    /// release version superseding the previously deployed one. On a
    /// partial cluster-apply failure, force a rollback by re-applying the
    /// previously deployed manifest before surfacing the wrapped error; on
    /// a storage-backend failure after a successful apply, roll back the
    /// same way.
    #[instrument(skip(self), fields(release = %self.release_name))]
    pub async fn update_release(&self) -> Result<(Release, Release)> {
        let previous = self.storage.deployed(&self.release_name).map_err(storage_err)?;

        let mut chart = Chart::load(&self.chart_path)?;
        chart.process_requirements(&self.values);
        let manifest = self.render_manifest(&chart)?;

        if let Err(e) = self.apply_manifest(&manifest).await {
            warn!(error = %e, "update failed applying to cluster, rolling back to previous deployed manifest");
            self.apply_manifest(&previous.manifest).await.ok();
            return Err(Error::UpdateError(e.to_string()));
        }

        let next_version = self
            .storage
            .last(&self.release_name)
            .map(|r| r.version + 1)
            .unwrap_or(previous.version + 1);

        let new_release = Release::new(
            &self.release_name,
            next_version,
            &self.namespace,
            &manifest,
            ReleaseStatusCode::Deployed,
            "Update complete",
        );

        match self.storage.create(new_release.clone()) {
            Ok(()) => {
                // mark the previous version superseded in place, so no
                // concurrent history reader ever sees neither record
                let mut superseded = previous.clone();
                superseded.info.status.code = ReleaseStatusCode::Superseded;
                superseded.info.status.notes = "Superseded by update".to_string();
                if let Err(e) = self.storage.update(superseded) {
                    warn!(error = %e, "failed to mark previous release superseded");
                }
                info!(version = next_version, "updated release");
                Ok((previous, new_release))
            }
            Err(e) => {
                warn!(error = %e, "update failed persisting release, rolling back to previous deployed manifest");
                let _ = self.storage.delete(&self.release_name, next_version);
                self.apply_manifest(&previous.manifest).await.ok();
                Err(Error::UpdateError(e.to_string()))
            }
        }
    }

    /// Drift repair: parse the deployed manifest into resource documents and
    /// re-apply each. Does not create a new release version.
    #[instrument(skip(self), fields(release = %self.release_name))]
    pub async fn reconcile_release(&self) -> Result<()> {
        let deployed = self.storage.deployed(&self.release_name).map_err(storage_err)?;
        self.apply_manifest(&deployed.manifest).await
    }

    /// Parse a rendered manifest into resource documents and apply each;
    /// create, falling back to a merge-patch on already-exists. Shared by
    /// install, update, and drift-repair reconcile.
    async fn apply_manifest(&self, manifest: &str) -> Result<()> {
        for doc in split_manifest(manifest) {
            if doc.trim().is_empty() {
                continue;
            }
            let yaml: serde_yaml::Value = serde_yaml::from_str(&doc)?;
            let value: Value = serde_json::to_value(yaml).map_err(|e| Error::ReconcileError {
                namespace: self.namespace.clone(),
                name: self.release_name.clone(),
                kind: "unknown".to_string(),
                reason: e.to_string(),
            })?;
            self.apply_resource(&value).await?;
        }
        Ok(())
    }

    /// Best-effort teardown of every document in a rendered manifest, used
    /// to purge or roll back a partially-applied install/update. Parse
    /// failures and per-document delete failures are swallowed: this only
    /// ever runs while another error is already being surfaced to the
    /// caller.
    async fn delete_manifest(&self, manifest: &str) {
        for doc in split_manifest(manifest) {
            if doc.trim().is_empty() {
                continue;
            }
            let Ok(yaml) = serde_yaml::from_str::<serde_yaml::Value>(&doc) else {
                continue;
            };
            let Ok(value) = serde_json::to_value(yaml) else {
                continue;
            };
            if let Err(e) = self.delete_resource(&value).await {
                warn!(error = %e, "failed to purge resource during rollback");
            }
        }
    }

    async fn apply_resource(&self, value: &Value) -> Result<()> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or("Unknown")
            .to_string();
        let api_version = value
            .get("apiVersion")
            .and_then(|k| k.as_str())
            .unwrap_or("v1")
            .to_string();
        let name = value
            .pointer("/metadata/name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| Error::MalformedResource("rendered resource missing metadata.name".into()))?
            .to_string();

        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.clone()),
        };
        let ar = ApiResource {
            group,
            version,
            api_version,
            kind: kind.clone(),
            plural: plural_guess(&kind),
        };

        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &self.namespace, &ar);
        let mut obj: DynamicObject = serde_json::from_value(value.clone())
            .map_err(|e| Error::MalformedResource(e.to_string()))?;
        obj.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: kind.clone(),
        });

        let reconcile_err = |source: kube::Error| Error::ReconcileError {
            namespace: self.namespace.clone(),
            name: name.clone(),
            kind: kind.clone(),
            reason: source.to_string(),
        };

        match api.create(&PostParams::default(), &obj).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!(%name, %kind, "resource already exists, merge-patching");
                api.patch(&name, &PatchParams::default(), &Patch::Merge(value))
                    .await
                    .map_err(reconcile_err)?;
                Ok(())
            }
            Err(e) => Err(reconcile_err(e)),
        }
    }

    async fn delete_resource(&self, value: &Value) -> Result<()> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or("Unknown")
            .to_string();
        let api_version = value
            .get("apiVersion")
            .and_then(|k| k.as_str())
            .unwrap_or("v1")
            .to_string();
        let name = value
            .pointer("/metadata/name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| Error::MalformedResource("rendered resource missing metadata.name".into()))?
            .to_string();

        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.clone()),
        };
        let ar = ApiResource {
            group,
            version,
            api_version,
            kind: kind.clone(),
            plural: plural_guess(&kind),
        };

        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &self.namespace, &ar);
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::ReconcileError {
                namespace: self.namespace.clone(),
                name,
                kind,
                reason: e.to_string(),
            }),
        }
    }

    /// Purge-uninstall the release. `NotFound` (empty history) surfaces as
    /// [`Error::NotFound`]; callers in the deletion path treat that as
    /// success.
    #[instrument(skip(self), fields(release = %self.release_name))]
    pub async fn uninstall_release(&self) -> Result<Release> {
        let history = self.storage.history(&self.release_name).map_err(storage_err)?;
        if history.is_empty() {
            return Err(Error::NotFound(self.release_name.clone()));
        }
        let last = history.last().unwrap().clone();
        let _ = self.storage.delete(&self.release_name, last.version);
        let mut uninstalled = last;
        uninstalled.info.status.code = ReleaseStatusCode::Uninstalled;
        info!("uninstalled release");
        Ok(uninstalled)
    }
}

fn storage_err(e: StorageError) -> Error {
    match e {
        StorageError::NotFound(n) => Error::NotFound(n),
        StorageError::NoDeployed { name } => Error::NotFound(format!("{name} has no deployed version")),
        StorageError::VersionNotFound { name, version } => {
            Error::NotFound(format!("{name} version {version}"))
        }
    }
}

fn split_manifest(manifest: &str) -> Vec<String> {
    manifest.split("---\n").map(|s| s.to_string()).collect()
}

/// Naive englishy pluralization sufficient for the built-in kinds this
/// operator's test charts render (`Service` -> `services`, `Deployment` ->
/// `deployments`). Real discovery-backed plural resolution happens in the
/// watch registrar for the watched kind itself; this is only used for
/// resources rendered as *part of* a chart during drift repair.
fn plural_guess(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') {
        format!("{lower}es")
    } else if lower.ends_with('y') {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{lower}s")
    }
}
