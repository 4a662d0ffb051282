//! Pending phase handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob, JobPhase};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// A job waiting for enough task pods to be schedulable.
///
/// Operator actions drain the job into one of the draining phases; anything
/// else syncs pods and promotes to Running once the gang minimum is ready.
pub(super) struct PendingState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for PendingState {
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
            _ => {
                let min_available = self.job.spec.min_available;
                self.pods
                    .sync_job(
                        &self.job,
                        Some(Box::new(move |status| {
                            if status.running + status.succeeded + status.failed >= min_available {
                                status.state.phase = JobPhase::Running;
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
