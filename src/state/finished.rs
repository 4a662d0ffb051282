//! Terminal phase handler (Completed, Terminated, Failed)

use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Action, GaleJob};
use crate::error::Error;

use super::{PodLifecycle, PodRetainPhase, State};

/// A job in a terminal phase.
///
/// Terminal jobs never transition again; the only remaining work is to shed
/// pods that appeared out of band, keeping terminal ones for inspection.
pub(super) struct FinishedState {
    pub job: Arc<GaleJob>,
    pub pods: Arc<dyn PodLifecycle>,
}

#[async_trait]
impl State for FinishedState {
    async fn execute(&self, _action: Action) -> Result<(), Error> {
        self.pods.kill_job(&self.job, PodRetainPhase::Soft, None).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crd::{JobPhase, JobStatus};
    use crate::state::test_support::*;
    use crate::state::{new_state, MockPodLifecycle};

    #[tokio::test]
    async fn terminal_phases_only_shed_pods() {
        for phase in [JobPhase::Completed, JobPhase::Terminated, JobPhase::Failed] {
            let job = job_in_phase(phase, JobStatus::default());
            let mut mock = MockPodLifecycle::new();
            mock.expect_kill_job()
                .withf(|_, retain, update| {
                    *retain == PodRetainPhase::Soft && update.is_none()
                })
                .times(1)
                .returning(|_, _, _| Ok(()));

            new_state(job, Arc::new(mock))
                .execute(Action::SyncJob)
                .await
                .unwrap();
        }
    }
}
