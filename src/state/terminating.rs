//! Terminating phase handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob, JobPhase};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// A job draining its pods after a terminate request.
pub(super) struct TerminatingState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for TerminatingState {
    async fn execute(&self, _action: Action) -> Result<(), Error> {
        self.pods
            .kill_job(
                &self.job,
                PodRetainPhase::Soft,
                Some(Box::new(|status| {
                    if !status.pods_drained() {
                        return false;
                    }
                    status.state.phase = JobPhase::Terminated;
                    true
                })),
            )
            .await
    }
}
