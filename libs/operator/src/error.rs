/// Semantic error kinds for the release manager and reconcile loop.
///
/// Variants map onto the error kinds in the operator's design: most surface
/// straight to the reconcile boundary and let the controller runtime retry
/// with backoff, a handful are treated as success in terminal paths by the
/// caller (see [`Error::is_not_found`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Watches file or environment fallback failed validation.
    #[error("invalid watch configuration: {0}")]
    ConfigInvalid(String),

    /// Chart path missing or unparseable on disk.
    #[error("failed to load chart at {path}: {source}")]
    ChartLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Template engine or owner-reference injection failed for a rendered file.
    #[error("failed to render {file}: {reason}")]
    RenderError { file: String, reason: String },

    /// Backend rejected an install after local rollback was attempted.
    #[error("install failed: {0}")]
    InstallError(String),

    /// Backend rejected an update after local rollback was attempted.
    #[error("update failed: {0}")]
    UpdateError(String),

    /// Drift-repair create/patch failed against the cluster, or the deployed
    /// manifest could not be parsed into applicable resource documents.
    #[error("reconcile of {namespace}/{name} ({kind}) failed: {reason}")]
    ReconcileError {
        namespace: String,
        name: String,
        kind: String,
        reason: String,
    },

    /// Release or custom resource not found; callers in terminal paths treat
    /// this as success.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other cluster I/O error; the controller runtime retries with
    /// exponential backoff.
    #[error("transient cluster error: {0}")]
    TransientClusterError(#[from] kube::Error),

    /// `serde_yaml` failed to parse or serialize a manifest document.
    #[error("yaml error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Finalizer or status patch was attempted against a CR missing
    /// required metadata (name, namespace, uid).
    #[error("malformed custom resource: {0}")]
    MalformedResource(String),

    /// The current tracing span has no valid OpenTelemetry trace id to
    /// attach as a metric exemplar.
    #[error("no valid trace id in current span")]
    InvalidTraceId,

    /// `kube::runtime::finalizer` bookkeeping (add/remove finalizer, or the
    /// wrapped apply/cleanup closure) failed.
    #[error("finalizer error: {0}")]
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True for errors that terminal reconcile paths (deletion, uninstall)
    /// treat as already-satisfied rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::TransientClusterError(kube::Error::Api(e)) if e.code == 404)
    }

    /// Stable short label used as a Prometheus error label; avoids leaking
    /// unbounded error text into metric cardinality.
    pub fn metric_label(&self) -> String {
        match self {
            Error::ConfigInvalid(_) => "config_invalid",
            Error::ChartLoadError { .. } => "chart_load_error",
            Error::RenderError { .. } => "render_error",
            Error::InstallError(_) => "install_error",
            Error::UpdateError(_) => "update_error",
            Error::ReconcileError { .. } => "reconcile_error",
            Error::NotFound(_) => "not_found",
            Error::TransientClusterError(_) => "transient_cluster_error",
            Error::YamlError(_) => "yaml_error",
            Error::MalformedResource(_) => "malformed_resource",
            Error::InvalidTraceId => "invalid_trace_id",
            Error::FinalizerError(_) => "finalizer_error",
        }
        .to_string()
    }
}
