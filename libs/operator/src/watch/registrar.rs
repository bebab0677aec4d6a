//! Watch Registrar: turns a [`WatchConfig`] into one running `Controller`
//! per watched kind, all sharing a client, a [`ReleaseStorage`] backend, and
//! [`State`].
//!
//! Each watched kind's `ApiResource` is resolved through `kube::discovery`
//! rather than hand-built, since arbitrary CRDs can't be assumed to pluralize
//! in any particular way. The discovery cache is rebuilt every 60 seconds so
//! a CRD installed or changed after the operator started is picked up
//! without a restart.

use crate::config::{Gvk, Namespace, WatchConfig};
use crate::controller::{error_policy, reconcile, State};
use crate::error::{Error, Result};
use crate::release::factory::ManagerFactory;
use crate::release::storage::ReleaseStorage;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::discovery::{ApiResource, Discovery};
use kube::runtime::{controller::Controller, watcher::Config as WatcherConfig};
use kube::{Api, Client};
use tokio::sync::RwLock;
use tracing::{error, info, trace, warn};

const DISCOVERY_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub struct WatchRegistrar {
    client: Client,
    config: WatchConfig,
    storage: Arc<dyn ReleaseStorage>,
    state: State,
}

impl WatchRegistrar {
    pub fn new(
        client: Client,
        config: WatchConfig,
        storage: Arc<dyn ReleaseStorage>,
        state: State,
    ) -> Self {
        WatchRegistrar {
            client,
            config,
            storage,
            state,
        }
    }

    /// Resolve every watched GVK, spawn a controller per kind, and run the
    /// background discovery-cache refresh task. Returns once every
    /// controller task has exited (normally only on shutdown signal).
    pub async fn run(self) -> Result<()> {
        let discovery = Arc::new(RwLock::new(
            Discovery::new(self.client.clone()).run().await?,
        ));
        spawn_discovery_refresh(self.client.clone(), discovery.clone());

        let mut tasks = Vec::new();
        for entry in self.config.watches.clone() {
            let ar = resolve_api_resource(&discovery, &entry.gvk).await?;
            let factory = ManagerFactory::new(
                self.storage.clone(),
                self.client.clone(),
                entry.chart_path.clone(),
            );
            let ctx = self
                .state
                .to_context(self.client.clone(), factory, Arc::new(ar.clone()));
            let api = dynamic_api(&self.client, &ar, &self.config.namespace);

            info!(kind = %ar.kind, group = %ar.group, version = %ar.version, "watching kind");
            tasks.push(tokio::spawn(run_controller(api, ctx)));
        }

        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "controller task panicked");
            }
        }
        Ok(())
    }
}

async fn run_controller(api: Api<kube::core::DynamicObject>, ctx: Arc<crate::controller::Context>) {
    Controller::new(api, WatcherConfig::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|res| async move { std::result::Result::ok(res) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

fn dynamic_api(
    client: &Client,
    ar: &ApiResource,
    namespace: &Namespace,
) -> Api<kube::core::DynamicObject> {
    match namespace {
        Namespace::All => Api::all_with(client.clone(), ar),
        Namespace::Named(ns) => Api::namespaced_with(client.clone(), ns, ar),
    }
}

async fn resolve_api_resource(
    discovery: &Arc<RwLock<Discovery>>,
    gvk: &Gvk,
) -> Result<ApiResource> {
    let discovery = discovery.read().await;
    for group in discovery.groups() {
        if group.name() != gvk.group {
            continue;
        }
        for (ar, _caps) in group.recommended_resources() {
            if ar.version == gvk.version && ar.kind == gvk.kind {
                return Ok(ar);
            }
        }
    }
    Err(Error::ConfigInvalid(format!(
        "no discovered resource for {}/{} {}; is the CRD installed?",
        gvk.group, gvk.version, gvk.kind
    )))
}

fn spawn_discovery_refresh(client: Client, discovery: Arc<RwLock<Discovery>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(DISCOVERY_REFRESH_INTERVAL);
        interval.tick().await; // first tick fires immediately, skip it
        loop {
            interval.tick().await;
            trace!("refreshing discovery cache");
            match Discovery::new(client.clone()).run().await {
                Ok(fresh) => *discovery.write().await = fresh,
                Err(e) => warn!(error = %e, "discovery refresh failed, keeping stale cache"),
            }
        }
    });
}
