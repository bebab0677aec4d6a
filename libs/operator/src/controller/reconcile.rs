//! Reconciler: the per-GVK reconcile function handed to `kube::runtime::Controller`.
//!
//! Finalizer bookkeeping is delegated to `kube::runtime::finalizer`, which
//! turns every event into either `Event::Apply` (object present, not being
//! deleted) or `Event::Cleanup` (deletion timestamp set) and persists the
//! finalizer string itself; this reconciler only has to know what to do on
//! each side.

use crate::controller::context::Context;
use crate::cr;
use crate::error::{Error, Result};
use crate::metrics::{ReleaseAction, ReleaseOutcome};
use crate::release::manager::Decision;
use crate::release::storage::Release;
use crate::status::{Phase, Reason, ReleaseSnapshot, Status};
use crate::telemetry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::core::DynamicObject;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event};
use kube::{Api, ResourceExt};
use serde_json::json;
use tracing::{debug, field, info, instrument, warn, Span};

/// Interval between reconciles once a release is installed and up to date.
const REQUEUE_AFTER: Duration = Duration::from_secs(30);
/// Backoff applied when a reconcile returns an error.
pub const ERROR_REQUEUE_AFTER: Duration = Duration::from_secs(5 * 60);

/// One `Controller` per watched GVK is built around this entry point; the
/// kind it watches is carried on `ctx.api_resource`.
#[instrument(skip(cr, ctx), fields(trace_id, kind = %ctx.api_resource.kind))]
pub async fn reconcile(cr: Arc<DynamicObject>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = cr.name_any();
    info!(%name, "reconciling");

    let namespace = cr
        .namespace()
        .ok_or_else(|| Error::MalformedResource(format!("{name} has no namespace")))?;
    let api: Api<DynamicObject> =
        Api::namespaced_with(ctx.client.clone(), &namespace, &ctx.api_resource);

    finalizer(&api, cr::FINALIZER, cr, |event| async {
        match event {
            Event::Apply(cr) => apply(&cr, &ctx).await,
            Event::Cleanup(cr) => cleanup(&cr, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

async fn apply(cr: &DynamicObject, ctx: &Arc<Context>) -> Result<Action> {
    let name = cr.name_any();
    let namespace = cr
        .namespace()
        .ok_or_else(|| Error::MalformedResource(format!("{name} has no namespace")))?;

    let mut manager = ctx.factory.new_manager(cr)?;
    let status_release = cr::status_release(cr)
        .and_then(|v| serde_json::from_value::<ReleaseSnapshot>(v).ok())
        .map(Release::from);
    manager.sync(status_release.as_ref())?;

    let decision = manager.decide();
    debug!(%name, %namespace, ?decision, "release decision");

    let status_api = status_api_for(ctx, cr)?;

    match decision {
        Decision::Install => match manager.install_release().await {
            Ok(release) => {
                ctx.metrics
                    .release
                    .record(ReleaseAction::Install, ReleaseOutcome::Success);
                patch_status(
                    &status_api,
                    &name,
                    Phase::Applied,
                    Reason::CustomResourceAdded,
                    "install complete",
                    Some(&release),
                )
                .await?;
                Ok(Action::requeue(REQUEUE_AFTER))
            }
            Err(e) => {
                ctx.metrics
                    .release
                    .record(ReleaseAction::Install, ReleaseOutcome::Failure);
                let _ = patch_status(
                    &status_api,
                    &name,
                    Phase::Failed,
                    Reason::ApplyFailed,
                    e.to_string(),
                    None,
                )
                .await;
                Err(e)
            }
        },
        Decision::Update => match manager.update_release().await {
            Ok((_, new_release)) => {
                ctx.metrics
                    .release
                    .record(ReleaseAction::Update, ReleaseOutcome::Success);
                patch_status(
                    &status_api,
                    &name,
                    Phase::Applied,
                    Reason::CustomResourceUpdated,
                    "update complete",
                    Some(&new_release),
                )
                .await?;
                Ok(Action::requeue(REQUEUE_AFTER))
            }
            Err(e) => {
                ctx.metrics
                    .release
                    .record(ReleaseAction::Update, ReleaseOutcome::Failure);
                let _ = patch_status(
                    &status_api,
                    &name,
                    Phase::Failed,
                    Reason::ApplyFailed,
                    e.to_string(),
                    None,
                )
                .await;
                Err(e)
            }
        },
        Decision::Reconcile => match manager.reconcile_release().await {
            // Drift repair that finds nothing to change leaves status
            // untouched: the most recent install/update already describes
            // this outcome, and a pure reconcile is not a phase transition.
            Ok(()) => {
                ctx.metrics
                    .release
                    .record(ReleaseAction::Reconcile, ReleaseOutcome::Success);
                Ok(Action::requeue(REQUEUE_AFTER))
            }
            Err(e) => {
                ctx.metrics
                    .release
                    .record(ReleaseAction::Reconcile, ReleaseOutcome::Failure);
                let _ = patch_status(
                    &status_api,
                    &name,
                    Phase::Failed,
                    Reason::ApplyFailed,
                    e.to_string(),
                    None,
                )
                .await;
                Err(e)
            }
        },
    }
}

async fn cleanup(cr: &DynamicObject, ctx: &Arc<Context>) -> Result<Action> {
    let name = cr.name_any();
    let manager = ctx.factory.new_manager(cr)?;

    match manager.uninstall_release().await {
        Ok(_) => {
            ctx.metrics
                .release
                .record(ReleaseAction::Uninstall, ReleaseOutcome::Success);
            info!(%name, "uninstalled release");
        }
        Err(e) if e.is_not_found() => {
            debug!(%name, "release already absent");
        }
        Err(e) => {
            ctx.metrics
                .release
                .record(ReleaseAction::Uninstall, ReleaseOutcome::Failure);
            return Err(e);
        }
    }
    Ok(Action::await_change())
}

fn status_api_for(ctx: &Arc<Context>, cr: &DynamicObject) -> Result<Api<DynamicObject>> {
    let namespace = cr
        .namespace()
        .ok_or_else(|| Error::MalformedResource(format!("{} has no namespace", cr.name_any())))?;
    Ok(Api::namespaced_with(
        ctx.client.clone(),
        &namespace,
        &ctx.api_resource,
    ))
}

async fn patch_status(
    api: &Api<DynamicObject>,
    name: &str,
    phase: Phase,
    reason: Reason,
    message: impl Into<String>,
    release: Option<&Release>,
) -> Result<()> {
    let current = api.get_status(name).await?;
    let mut status: Status = current
        .data
        .get("status")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .unwrap_or_default();
    status.transition(phase, reason, message, release);

    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::apply("chart-operator"), &Patch::Merge(patch))
        .await?;
    Ok(())
}

pub fn error_policy(cr: Arc<DynamicObject>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(error = %error, "reconcile failed");
    ctx.metrics.reconcile.set_failure(&cr, error);
    Action::requeue(ERROR_REQUEUE_AFTER)
}
