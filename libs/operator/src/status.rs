//! Operator-owned `status` subtree patched back onto the CR after each
//! reconcile that installs or updates a release.

use crate::release::storage::{Release, ReleaseStatusCode};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    #[default]
    #[serde(rename = "")]
    Unset,
    Applying,
    Applied,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Reason {
    #[default]
    Unknown,
    CustomResourceAdded,
    CustomResourceUpdated,
    ApplySuccessful,
    ApplyFailed,
}

/// A full `Release` record round-tripped through the CR's `status` subtree,
/// so a lost `ReleaseStorage` backend can recover its last known deployed
/// state from the CR itself (sync step 1).
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseSnapshot {
    pub name: String,
    pub version: u64,
    pub namespace: String,
    pub manifest: String,
    pub status_code: ReleaseStatusCode,
    pub notes: String,
}

impl From<&Release> for ReleaseSnapshot {
    fn from(release: &Release) -> Self {
        ReleaseSnapshot {
            name: release.name.clone(),
            version: release.version,
            namespace: release.namespace.clone(),
            manifest: release.manifest.clone(),
            status_code: release.info.status.code,
            notes: release.info.status.notes.clone(),
        }
    }
}

impl From<ReleaseSnapshot> for Release {
    fn from(snapshot: ReleaseSnapshot) -> Self {
        Release::new(
            snapshot.name,
            snapshot.version,
            snapshot.namespace,
            snapshot.manifest,
            snapshot.status_code,
            snapshot.notes,
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Status {
    pub release: Option<ReleaseSnapshot>,
    pub phase: Phase,
    pub reason: Reason,
    pub message: String,
    pub last_update_time: Option<DateTime<Utc>>,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Default for Status {
    fn default() -> Self {
        Status {
            release: None,
            phase: Phase::default(),
            reason: Reason::default(),
            message: String::new(),
            last_update_time: None,
            last_transition_time: None,
        }
    }
}

impl Status {
    /// Apply a new phase/reason/message, bumping `lastUpdateTime` always and
    /// `lastTransitionTime` only when the phase actually changed — per the
    /// invariant that status reflects the most recent completed reconcile.
    pub fn transition(&mut self, phase: Phase, reason: Reason, message: impl Into<String>, release: Option<&Release>) {
        let now = Utc::now();
        let phase_changed = self.phase != phase;
        self.phase = phase;
        self.reason = reason;
        self.message = message.into();
        self.release = release.map(ReleaseSnapshot::from).or_else(|| self.release.clone());
        self.last_update_time = Some(now);
        if phase_changed {
            self.last_transition_time = Some(now);
        }
    }
}
