//! Shared state between every per-GVK controller and the metrics/health web
//! server: one [`Context`] per reconcile, one [`State`] for the process.

use crate::metrics::Metrics;
use crate::release::factory::ManagerFactory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::discovery::ApiResource;
use kube::runtime::events::Reporter;
use kube::Client;
use serde::Serialize;
use tokio::sync::RwLock;

/// Per-reconcile context: cloned into every `reconcile`/`error_policy` call
/// by the controller runtime. One instance per watched GVK: `api_resource`
/// and `factory` are bound to that kind, `diagnostics`/`metrics` are shared
/// with the web server and every other watched kind's controller.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub metrics: Arc<Metrics>,
    pub factory: ManagerFactory,
    pub api_resource: Arc<ApiResource>,
}

/// Diagnostics exposed by the web server; one instance shared across all
/// watched kinds, updated by whichever reconcile ran most recently.
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "chart-operator".into(),
        }
    }
}

/// State shared between every watched-kind controller and the web server.
#[derive(Clone, Default)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Arc<Metrics>,
}

impl State {
    /// Build state around a `Metrics` already registered into the process's
    /// single Prometheus registry (see `Metrics::new`).
    pub fn new(metrics: Metrics) -> Self {
        State {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            metrics: Arc::new(metrics),
        }
    }

    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        let registry = &*self.metrics.registry;
        prometheus_client::encoding::text::encode(&mut buffer, registry).unwrap();
        buffer
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn metrics_handle(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Build a reconcile `Context` for one watched kind, bound to the
    /// `ManagerFactory` that knows its chart path and the discovery-resolved
    /// `ApiResource` for the kind itself.
    pub fn to_context(
        &self,
        client: Client,
        factory: ManagerFactory,
        api_resource: Arc<ApiResource>,
    ) -> Arc<Context> {
        Arc::new(Context {
            client,
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            factory,
            api_resource,
        })
    }
}
