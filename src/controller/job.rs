//! GaleJob controller implementation
//!
//! Each reconciliation pass handles exactly one job: derive the pending
//! request from the observed status, resolve it to an action through the
//! job's lifecycle policies, and dispatch to the handler for the current
//! phase. Jobs are reconciled one pass at a time (kube-rs never runs two
//! reconciliations for the same object concurrently), so phase transitions
//! stay single-writer; unrelated jobs reconcile fully in parallel.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action as ReconcileAction;
use kube::{Client, ResourceExt};
use tracing::{debug, error, instrument};

use crate::crd::{Event, GaleJob, JobPhase};
use crate::error::Error;
use crate::state::{new_state, PodLifecycle};

use super::request::{apply_policies, Request};

/// Requeue cadence while a job still has work in flight
const REQUEUE_ACTIVE: Duration = Duration::from_secs(15);

/// Requeue delay after a failed reconciliation
const REQUEUE_ON_ERROR: Duration = Duration::from_secs(30);

/// Shared context for the GaleJob controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Pod lifecycle manager driving kill/sync primitives
    pub pods: Arc<dyn PodLifecycle>,
}

/// Reconcile a single GaleJob
#[instrument(skip(job, ctx), fields(job = %job.name_any()))]
pub async fn reconcile(job: Arc<GaleJob>, ctx: Arc<Context>) -> Result<ReconcileAction, Error> {
    if job.metadata.deletion_timestamp.is_some() {
        // Owned pods are garbage collected with the job.
        debug!("job is being deleted");
        return Ok(ReconcileAction::await_change());
    }

    let phase = job
        .status
        .as_ref()
        .map(|s| s.state.phase.clone())
        .unwrap_or_default();

    let request = derive_request(&job);
    let action = apply_policies(&job.spec, &request);
    debug!(%phase, %action, "dispatching to state machine");

    new_state(job.clone(), ctx.pods.clone()).execute(action).await?;

    if phase.is_terminal() {
        Ok(ReconcileAction::await_change())
    } else {
        Ok(ReconcileAction::requeue(REQUEUE_ACTIVE))
    }
}

/// Derive the pending request from the job's observed state.
///
/// Pod-level failures observed by the previous pass surface as a PodFailed
/// event so the job's policies decide what happens; everything else is
/// drift repair.
fn derive_request(job: &GaleJob) -> Request {
    match &job.status {
        Some(status) if status.state.phase == JobPhase::Running && status.failed > 0 => Request {
            event: Some(Event::PodFailed),
            ..Default::default()
        },
        _ => Request {
            event: Some(Event::OutOfSync),
            ..Default::default()
        },
    }
}

/// Error policy for GaleJob reconciliation: log and retry with a delay.
///
/// Runtime failures are scoped to one job's one pass: the job stays in its
/// committed phase and is re-processed later.
pub fn error_policy(job: Arc<GaleJob>, error: &Error, _ctx: Arc<Context>) -> ReconcileAction {
    error!(
        ?error,
        job = %job.name_any(),
        "job reconciliation failed"
    );
    ReconcileAction::requeue(REQUEUE_ON_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GaleJobSpec, JobState, JobStatus};

    fn job_with_status(status: Option<JobStatus>) -> GaleJob {
        let mut job = GaleJob::new("wordcount", GaleJobSpec::default());
        job.status = status;
        job
    }

    #[test]
    fn fresh_job_requests_drift_repair() {
        let request = derive_request(&job_with_status(None));
        assert_eq!(request.event, Some(Event::OutOfSync));
    }

    #[test]
    fn failed_pods_surface_as_pod_failed_while_running() {
        let status = JobStatus {
            state: JobState {
                phase: JobPhase::Running,
                ..Default::default()
            },
            failed: 1,
            ..Default::default()
        };
        let request = derive_request(&job_with_status(Some(status)));
        assert_eq!(request.event, Some(Event::PodFailed));
    }

    /// Draining phases re-observe failed pods without re-raising events;
    /// otherwise an abort triggered by PodFailed would loop forever.
    #[test]
    fn failed_pods_outside_running_do_not_raise_events() {
        let status = JobStatus {
            state: JobState {
                phase: JobPhase::Aborting,
                ..Default::default()
            },
            failed: 2,
            ..Default::default()
        };
        let request = derive_request(&job_with_status(Some(status)));
        assert_eq!(request.event, Some(Event::OutOfSync));
    }
}
