//! Completing phase handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob, JobPhase};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// A job draining its pods before completion.
///
/// The phase re-evaluates on every reconciliation pass until no pod is
/// alive or still being deleted, then commits Completed.
pub(super) struct CompletingState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for CompletingState {
    async fn execute(&self, _action: Action) -> Result<(), Error> {
        self.pods
            .kill_job(
                &self.job,
                PodRetainPhase::Soft,
                Some(Box::new(|status| {
                    if !status.pods_drained() {
                        return false;
                    }
                    status.state.phase = JobPhase::Completed;
                    true
                })),
            )
            .await
    }
}
