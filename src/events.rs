//! Kubernetes Event recording for job lifecycle transitions.
//!
//! Wraps `kube::runtime::events::Recorder` behind a trait so the pod
//! lifecycle manager can announce phase transitions without owning a
//! concrete recorder. Publishing is fire-and-forget: a failed Event must
//! never fail the reconciliation that produced it, so errors are logged
//! and swallowed.

use async_trait::async_trait;
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::crd::GaleJob;
use crate::CONTROLLER_NAME;

/// Trait for publishing Kubernetes Events on a job.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the given job.
    ///
    /// # Arguments
    ///
    /// * `job` - The job the event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason (e.g. "PhaseTransition")
    /// * `note` - Optional human-readable message
    async fn publish(&self, job: &GaleJob, type_: EventType, reason: &str, note: Option<String>);
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
///
/// Events appear under `kubectl describe galejob` with
/// `gale-job-controller` as the reporting component.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as the gale job controller
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, job: &GaleJob, type_: EventType, reason: &str, note: Option<String>) {
        let event = KubeEvent {
            type_,
            reason: reason.to_string(),
            note,
            action: "Reconcile".to_string(),
            secondary: None,
        };
        let reference = job.object_ref(&());
        if let Err(e) = self.recorder.publish(&event, &reference).await {
            warn!(
                error = %e,
                job = ?job.metadata.name,
                reason = %reason,
                "failed to publish job event"
            );
        }
    }
}
