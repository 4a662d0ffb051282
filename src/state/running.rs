//! Running phase handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob, JobPhase};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// A job whose gang minimum is up and executing.
///
/// The sync arm watches for the whole job finishing: once every pod has
/// reached a terminal phase the job completes if enough of them succeeded,
/// and fails otherwise.
pub(super) struct RunningState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for RunningState {
    async fn execute(&self, action: Action) -> Result<(), Error> {
        match action {
            Action::RestartJob => {
                self.pods
                    .kill_job(
                        &self.job,
                        PodRetainPhase::None,
                        Some(Box::new(|status| {
                            status.retry_count += 1;
                            status.state.phase = JobPhase::Restarting;
                            true
                        })),
                    )
                    .await
            }
            Action::AbortJob => {
                self.pods
                    .kill_job(
                        &self.job,
                        PodRetainPhase::Soft,
                        Some(Box::new(|status| {
                            status.state.phase = JobPhase::Aborting;
                            true
                        })),
                    )
                    .await
            }
            Action::TerminateJob => {
                self.pods
                    .kill_job(
                        &self.job,
                        PodRetainPhase::Soft,
                        Some(Box::new(|status| {
                            status.state.phase = JobPhase::Terminating;
                            true
                        })),
                    )
                    .await
            }
            Action::CompleteJob => {
                self.pods
                    .kill_job(
                        &self.job,
                        PodRetainPhase::Soft,
                        Some(Box::new(|status| {
                            status.state.phase = JobPhase::Completing;
                            true
                        })),
                    )
                    .await
            }
            _ => {
                let total = self.job.spec.total_replicas();
                let min_available = self.job.spec.min_available;
                self.pods
                    .sync_job(
                        &self.job,
                        Some(Box::new(move |status| {
                            if total == 0 {
                                return false;
                            }
                            if status.succeeded + status.failed == total {
                                status.state.phase = if status.succeeded >= min_available {
                                    JobPhase::Completed
                                } else {
                                    JobPhase::Failed
                                };
                                return true;
                            }
                            false
                        })),
                    )
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::crd::JobStatus;
    use crate::state::test_support::*;
    use crate::state::{new_state, MockPodLifecycle};

    // Fixture job: one task, 3 replicas, min_available 3.

    #[tokio::test]
    async fn sync_completes_when_all_pods_finished_successfully() {
        let job = job_in_phase(JobPhase::Running, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            succeeded: 3,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_sync(&mut mock, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::SyncJob)
            .await
            .unwrap();

        assert!(*committed.lock().unwrap());
        assert_eq!(status.lock().unwrap().state.phase, JobPhase::Completed);
    }

    #[tokio::test]
    async fn sync_fails_job_when_too_few_pods_succeeded() {
        let job = job_in_phase(JobPhase::Running, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            succeeded: 1,
            failed: 2,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_sync(&mut mock, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::SyncJob)
            .await
            .unwrap();

        assert!(*committed.lock().unwrap());
        assert_eq!(status.lock().unwrap().state.phase, JobPhase::Failed);
    }

    #[tokio::test]
    async fn sync_stays_running_while_pods_are_still_working() {
        let job = job_in_phase(JobPhase::Running, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus {
            state: crate::crd::JobState {
                phase: JobPhase::Running,
                ..Default::default()
            },
            running: 2,
            succeeded: 1,
            ..Default::default()
        }));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_sync(&mut mock, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::SyncJob)
            .await
            .unwrap();

        assert!(!*committed.lock().unwrap());
        assert_eq!(status.lock().unwrap().state.phase, JobPhase::Running);
    }

    #[tokio::test]
    async fn restart_from_running_tears_down_all_pods() {
        let job = job_in_phase(JobPhase::Running, JobStatus::default());
        let status = Arc::new(Mutex::new(JobStatus::default()));
        let committed = Arc::new(Mutex::new(false));
        let mut mock = MockPodLifecycle::new();
        expect_kill(&mut mock, PodRetainPhase::None, status.clone(), committed.clone());

        new_state(job, Arc::new(mock))
            .execute(Action::RestartJob)
            .await
            .unwrap();

        assert!(*committed.lock().unwrap());
        let snapshot = status.lock().unwrap();
        assert_eq!(snapshot.state.phase, JobPhase::Restarting);
        assert_eq!(snapshot.retry_count, 1);
    }
}
