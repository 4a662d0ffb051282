//! Aborted phase handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob, JobPhase};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// An aborted job at rest.
///
/// Resume sends it back through Restarting (spending a retry); any other
/// action only sheds pods that appeared out of band.
pub(super) struct AbortedState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for AbortedState {
    async fn execute(&self, action: Action) -> Result<(), Error> {
        match action {
            Action::ResumeJob => {
                self.pods
                    .kill_job(
                        &self.job,
                        PodRetainPhase::Soft,
                        Some(Box::new(|status| {
                            status.retry_count += 1;
                            status.state.phase = JobPhase::Restarting;
                            true
                        })),
                    )
                    .await
            }
            _ => self.pods.kill_job(&self.job, PodRetainPhase::Soft, None).await,
        }
    }
}
