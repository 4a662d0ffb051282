//! Shared types for the GaleJob CRD
//!
//! Phases, events, actions, lifecycle policies, volumes, and status types.
//! Events and actions are closed enumerations: some values exist only for
//! internal controller use and are rejected at admission when a user
//! declares them in a policy (see [`crate::webhook::validate`]).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a GaleJob
///
/// Transitions happen only through the state machine handler registered for
/// the current phase; no direct external phase writes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum JobPhase {
    /// Job is waiting for enough task pods to be schedulable
    #[default]
    Pending,
    /// Minimum available pods are up; the job is executing
    Running,
    /// Pods are being torn down before the job re-runs from scratch
    Restarting,
    /// Pods are draining after an abort request
    Aborting,
    /// Job was aborted; it can be resumed
    Aborted,
    /// Pods are draining before the job is marked complete
    Completing,
    /// Job completed successfully
    Completed,
    /// Pods are draining after a terminate request
    Terminating,
    /// Job was terminated and will not run again
    Terminated,
    /// Job failed and exhausted its retries
    Failed,
}

impl JobPhase {
    /// Terminal phases never leave the state machine again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated | Self::Failed)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Restarting => "Restarting",
            Self::Aborting => "Aborting",
            Self::Aborted => "Aborted",
            Self::Completing => "Completing",
            Self::Completed => "Completed",
            Self::Terminating => "Terminating",
            Self::Terminated => "Terminated",
            Self::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// Event / Action
// =============================================================================

/// An occurrence observed from a pod or task.
///
/// Matched against a [`LifecyclePolicy`], an event yields an [`Action`].
/// `OutOfSync` and `CommandIssued` are internal-only: the admission webhook
/// rejects policies that declare them.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Event {
    /// Wildcard matching every event; must be the sole event policy if used
    #[serde(rename = "*")]
    AnyEvent,
    /// A task pod entered the Failed phase
    PodFailed,
    /// A task pod was evicted from its node
    PodEvicted,
    /// The job entered an unknown state
    JobUnknown,
    /// All pods of one task finished successfully
    TaskCompleted,
    /// A task's pods failed beyond its restart policy
    TaskFailed,
    /// The job object was updated
    JobUpdated,
    /// Observed state drifted from the spec (internal only)
    OutOfSync,
    /// An operator command was issued (internal only)
    CommandIssued,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AnyEvent => "*",
            Self::PodFailed => "PodFailed",
            Self::PodEvicted => "PodEvicted",
            Self::JobUnknown => "JobUnknown",
            Self::TaskCompleted => "TaskCompleted",
            Self::TaskFailed => "TaskFailed",
            Self::JobUpdated => "JobUpdated",
            Self::OutOfSync => "OutOfSync",
            Self::CommandIssued => "CommandIssued",
        };
        write!(f, "{name}")
    }
}

/// An instruction dispatched to the job state machine.
///
/// Either user-declared through a [`LifecyclePolicy`] or derived internally.
/// The queue-management values and `SyncJob`/`Enqueue` are internal-only and
/// rejected at admission.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Action {
    /// Drain pods and park the job in Aborted
    AbortJob,
    /// Tear down all pods (terminal ones included) and re-run from scratch
    RestartJob,
    /// Restart the pods of a single task
    RestartTask,
    /// Drain pods and finish the job as Terminated
    TerminateJob,
    /// Drain pods and finish the job as Completed
    CompleteJob,
    /// Resume an aborted job
    ResumeJob,
    /// Reconcile pods toward the spec (internal only)
    #[default]
    SyncJob,
    /// Enqueue the job for scheduling (internal only)
    Enqueue,
    /// Reconcile a queue object (internal only)
    SyncQueue,
    /// Open a queue for new jobs (internal only)
    OpenQueue,
    /// Close a queue to new jobs (internal only)
    CloseQueue,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AbortJob => "AbortJob",
            Self::RestartJob => "RestartJob",
            Self::RestartTask => "RestartTask",
            Self::TerminateJob => "TerminateJob",
            Self::CompleteJob => "CompleteJob",
            Self::ResumeJob => "ResumeJob",
            Self::SyncJob => "SyncJob",
            Self::Enqueue => "Enqueue",
            Self::SyncQueue => "SyncQueue",
            Self::OpenQueue => "OpenQueue",
            Self::CloseQueue => "CloseQueue",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// LifecyclePolicy
// =============================================================================

/// A declarative rule mapping an event (or container exit code) to an action.
///
/// Exactly one of {event-style fields, `exit_code`} may be set: never both,
/// never neither. `event` and `events` are both event-style; a policy may use
/// either or both, and they are merged and deduplicated when matched.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePolicy {
    /// Single event this policy applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,

    /// Additional events this policy applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,

    /// Container exit code this policy applies to (mutually exclusive with events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Action taken when the policy matches
    #[serde(default = "default_action")]
    pub action: Action,
}

fn default_action() -> Action {
    Action::SyncJob
}

impl LifecyclePolicy {
    /// Merge `event` and `events` into one deduplicated list, preserving
    /// declaration order.
    pub fn event_list(&self) -> Vec<Event> {
        let mut seen = std::collections::HashSet::new();
        self.events
            .iter()
            .chain(self.event.iter())
            .copied()
            .filter(|e| seen.insert(*e))
            .collect()
    }
}

// =============================================================================
// Volumes
// =============================================================================

/// A volume declaration on a task.
///
/// Exactly one of `volume_claim_name` (an existing PVC) or `volume_claim`
/// (an inline claim spec, created with the job) must be given.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Path inside the task's containers where the volume is mounted
    pub mount_path: String,

    /// Name of an existing PersistentVolumeClaim to mount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_name: Option<String>,

    /// Inline PersistentVolumeClaim spec — passed through as pre-serialized JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim: Option<serde_json::Value>,
}

// =============================================================================
// Dependencies
// =============================================================================

/// Tasks that must be started before this one.
///
/// The dependency graph over all tasks must be acyclic; the admission
/// webhook rejects jobs whose dependencies contain a cycle.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependsOn {
    /// Names of the tasks this task depends on
    #[serde(default)]
    pub name: Vec<String>,
}

// =============================================================================
// Status
// =============================================================================

/// Running state of a job: the current phase plus operator-facing context
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    /// Current phase of the job lifecycle
    #[serde(default)]
    pub phase: JobPhase,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message about the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Status snapshot of a GaleJob.
///
/// Pod counts are rebuilt from the live pod list on every kill/sync pass;
/// the state machine's mutation predicates read and update this snapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Current state of the job
    #[serde(default)]
    pub state: JobState,

    /// Pods that are created but not yet running
    #[serde(default)]
    pub pending: u32,

    /// Pods currently running
    #[serde(default)]
    pub running: u32,

    /// Pods that finished successfully
    #[serde(default)]
    pub succeeded: u32,

    /// Pods that finished in failure
    #[serde(default)]
    pub failed: u32,

    /// Pods with a deletion in flight
    #[serde(default)]
    pub terminating: u32,

    /// Number of times the job has been restarted
    #[serde(default)]
    pub retry_count: u32,
}

impl JobStatus {
    /// True once no pod is alive or still being deleted.
    ///
    /// The draining phases (Aborting, Completing, Terminating) gate their
    /// exit on this.
    pub fn pods_drained(&self) -> bool {
        self.terminating == 0 && self.pending == 0 && self.running == 0
    }
}
