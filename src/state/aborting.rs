//! Aborting phase handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob, JobPhase};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// A job draining its pods after an abort request.
///
/// Terminal pods are kept; the job parks in Aborted once nothing is alive
/// or still being deleted.
pub(super) struct AbortingState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for AbortingState {
    async fn execute(&self, _action: Action) -> Result<(), Error> {
        self.pods
            .kill_job(
                &self.job,
                PodRetainPhase::Soft,
                Some(Box::new(|status| {
                    if !status.pods_drained() {
                        return false;
                    }
                    status.state.phase = JobPhase::Aborted;
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

    #[tokio::test]
    async fn parks_in_aborted_once_drained() {
        let job = job_in_phase(JobPhase::Aborting, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            failed: 2,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_kill(&mut mock, PodRetainPhase::Soft, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::AbortJob)
            .await
            .unwrap();

        assert!(*committed.lock().unwrap());
        assert_eq!(status.lock().unwrap().state.phase, JobPhase::Aborted);
    }

    #[tokio::test]
    async fn holds_aborting_while_pods_drain() {
        let job = job_in_phase(JobPhase::Aborting, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            terminating: 1,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_kill(&mut mock, PodRetainPhase::Soft, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::AbortJob)
            .await
            .unwrap();

        assert!(!*committed.lock().unwrap());
    }
}
