//! Restarting phase handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob, JobPhase};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// A job tearing down every pod before re-running from scratch.
///
/// Whatever the action, the kill runs with no retention. The predicate
/// first checks the retry budget (a job that restarted too often fails)
/// and otherwise waits for the teardown to drain before dropping back to
/// Pending for a fresh start.
pub(super) struct RestartingState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for RestartingState {
    async fn execute(&self, _action: Action) -> Result<(), Error> {
        let max_retry = self.job.spec.max_retry;
        self.pods
            .kill_job(
                &self.job,
                PodRetainPhase::None,
                Some(Box::new(move |status| {
                    if status.retry_count >= max_retry {
                        status.state.phase = JobPhase::Failed;
                        status.state.reason = Some("RetriesExhausted".to_string());
                        return true;
                    }
                    if !status.pods_drained() {
                        return false;
                    }
                    status.state.phase = JobPhase::Pending;
                    true
                })),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::crd::JobStatus;
    use crate::state::test_support::*;
    use crate::state::{new_state, MockPodLifecycle};

    // Fixture job: max_retry = 3.

    #[tokio::test]
    async fn drained_restart_returns_to_pending() {
        let job = job_in_phase(JobPhase::Restarting, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            retry_count: 1,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_kill(&mut mock, PodRetainPhase::None, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::SyncJob)
            .await
            .unwrap();

        assert!(*committed.lock().unwrap());
        assert_eq!(status.lock().unwrap().state.phase, JobPhase::Pending);
    }

    #[tokio::test]
    async fn waits_while_pods_still_terminating() {
        let job = job_in_phase(JobPhase::Restarting, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            retry_count: 1,
            terminating: 2,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_kill(&mut mock, PodRetainPhase::None, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::SyncJob)
            .await
            .unwrap();

        assert!(!*committed.lock().unwrap());
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_job() {
        let job = job_in_phase(JobPhase::Restarting, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            retry_count: 3,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_kill(&mut mock, PodRetainPhase::None, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::SyncJob)
            .await
            .unwrap();

        assert!(*committed.lock().unwrap());
        let snapshot = status.lock().unwrap();
        assert_eq!(snapshot.state.phase, JobPhase::Failed);
        assert_eq!(snapshot.state.reason.as_deref(), Some("RetriesExhausted"));
    }
}
