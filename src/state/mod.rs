//! Job state machine
//!
//! One handler per job phase, all exposing the same entry point: consume an
//! incoming [`Action`] and drive the job's pods through the [`PodLifecycle`]
//! collaborator. Handlers never touch pods directly: each one picks a
//! primitive (kill with a retention policy, or sync) and supplies a status
//! mutation predicate encoding the phase's exit condition. The predicate
//! runs against the fresh pod-count snapshot the primitive gathers; the
//! phase changes only when the predicate commits.
//!
//! Reconciliation is level-triggered: a handler may run repeatedly in the
//! same phase until its predicate commits, so handlers stay idempotent and
//! side-effect-free beyond the commit itself.

mod aborted;
mod aborting;
mod completing;
mod finished;
mod pending;
mod restarting;
mod running;
mod terminating;

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Action, GaleJob, JobPhase, JobStatus};
use crate::error::Error;

use aborted::AbortedState;
use aborting::AbortingState;
use completing::CompletingState;
use finished::FinishedState;
use pending::PendingState;
use restarting::RestartingState;
use running::RunningState;
use terminating::TerminatingState;

/// Status mutation contract.
///
/// Given the job's freshly gathered status snapshot, decide whether the
/// phase's exit condition is met: mutate the snapshot (new phase, retry
/// count) and return `true` to commit, or leave it untouched and return
/// `false` to keep the job in its current phase for the next pass.
pub type UpdateStatusFn = Box<dyn Fn(&mut JobStatus) -> bool + Send + Sync>;

/// How aggressively a kill operation deletes pods
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodRetainPhase {
    /// Delete every pod, terminal ones included (restart semantics)
    None,
    /// Keep pods that already reached a terminal phase (abort/complete/terminate semantics)
    Soft,
}

impl PodRetainPhase {
    /// Whether a pod in the given phase survives the kill
    pub fn retains(self, pod_phase: &str) -> bool {
        match self {
            Self::None => false,
            Self::Soft => matches!(pod_phase, "Succeeded" | "Failed"),
        }
    }
}

/// The Pod Lifecycle Manager seam.
///
/// Both primitives are blocking I/O against the cluster: they enumerate the
/// job's pods, optionally delete them, rebuild the status snapshot, apply
/// the mutation predicate, and persist the refreshed snapshot; the phase
/// advances only when the predicate commits. Errors propagate uncommitted;
/// the reconciliation caller retries later.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodLifecycle: Send + Sync {
    /// Delete the job's pods, keeping those the retention policy protects,
    /// then apply the mutation predicate to the refreshed snapshot.
    async fn kill_job(
        &self,
        job: &GaleJob,
        retain: PodRetainPhase,
        update: Option<UpdateStatusFn>,
    ) -> Result<(), Error>;

    /// Reconcile the job's pods toward the spec (create missing, remove
    /// strays), then apply the mutation predicate to the refreshed snapshot.
    async fn sync_job(&self, job: &GaleJob, update: Option<UpdateStatusFn>) -> Result<(), Error>;
}

/// A phase handler: the single entry point of the state machine
#[async_trait]
pub trait State: Send + Sync {
    /// Execute one action against the job in this phase
    async fn execute(&self, action: Action) -> Result<(), Error>;
}

/// Look up the handler for the job's current phase.
///
/// A job with no status yet is Pending by default.
pub fn new_state(job: Arc<GaleJob>, pods: Arc<dyn PodLifecycle>) -> Box<dyn State> {
    let phase = job
        .status
        .as_ref()
        .map(|s| s.state.phase.clone())
        .unwrap_or_default();

    match phase {
        JobPhase::Pending => Box::new(PendingState { job, pods }),
        JobPhase::Running => Box::new(RunningState { job, pods }),
        JobPhase::Restarting => Box::new(RestartingState { job, pods }),
        JobPhase::Aborting => Box::new(AbortingState { job, pods }),
        JobPhase::Aborted => Box::new(AbortedState { job, pods }),
        JobPhase::Completing => Box::new(CompletingState { job, pods }),
        JobPhase::Terminating => Box::new(TerminatingState { job, pods }),
        JobPhase::Completed | JobPhase::Terminated | JobPhase::Failed => {
            Box::new(FinishedState { job, pods })
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for the per-phase handler tests.

    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::crd::{GaleJobSpec, JobState, TaskSpec};

    /// Build a job in the given phase with fabricated pod counts.
    pub fn job_in_phase(phase: JobPhase, status: JobStatus) -> Arc<GaleJob> {
        let mut job = GaleJob::new(
            "wordcount",
            GaleJobSpec {
                tasks: vec![TaskSpec {
                    name: "worker".to_string(),
                    replicas: 3,
                    ..Default::default()
                }],
                min_available: 3,
                max_retry: 3,
                ..Default::default()
            },
        );
        job.status = Some(JobStatus {
            state: JobState {
                phase,
                ..Default::default()
            },
            ..status
        });
        Arc::new(job)
    }

    /// A mock whose kill primitive asserts the retention policy and applies
    /// the handler's predicate to a shared status cell.
    pub fn expect_kill(
        mock: &mut MockPodLifecycle,
        expected_retain: PodRetainPhase,
        status: Arc<Mutex<JobStatus>>,
        committed: Arc<Mutex<bool>>,
    ) {
        mock.expect_kill_job()
            .withf(move |_, retain, _| *retain == expected_retain)
            .times(1)
            .returning(move |_, _, update| {
                if let Some(predicate) = update {
                    let mut snapshot = status.lock().unwrap();
                    *committed.lock().unwrap() = predicate(&mut snapshot);
                }
                Ok(())
            });
    }

    /// A mock whose sync primitive applies the handler's predicate to a
    /// shared status cell.
    pub fn expect_sync(
        mock: &mut MockPodLifecycle,
        status: Arc<Mutex<JobStatus>>,
        committed: Arc<Mutex<bool>>,
    ) {
        mock.expect_sync_job().times(1).returning(move |_, update| {
            if let Some(predicate) = update {
                let mut snapshot = status.lock().unwrap();
                *committed.lock().unwrap() = predicate(&mut snapshot);
            }
            Ok(())
        });
    }
}
