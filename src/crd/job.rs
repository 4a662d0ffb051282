//! GaleJob Custom Resource Definition
//!
//! A GaleJob is a multi-task batch job: an ordered list of tasks, job-level
//! lifecycle policies, a gang-scheduling minimum, and a retry budget. Spec
//! and task definitions are immutable after submission; the admission
//! webhook rejects spec changes on update.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{DependsOn, JobStatus, LifecyclePolicy, VolumeSpec};

/// A single task within a GaleJob.
///
/// Each task runs `replicas` pods stamped from its pod template. Task-level
/// policies shadow job-level policies for events raised by this task's pods.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Task name, unique within the job (DNS-1123 label)
    pub name: String,

    /// Number of pods this task runs
    #[serde(default = "default_one")]
    pub replicas: u32,

    /// Tasks that must be started before this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,

    /// Lifecycle policies scoped to this task's pod events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<LifecyclePolicy>,

    /// Volumes mounted into this task's pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,

    /// Pod template — passed through as pre-serialized JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<serde_json::Value>,
}

fn default_one() -> u32 {
    1
}

fn default_max_retry() -> u32 {
    3
}

/// Specification for a GaleJob
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gale.dev",
    version = "v1alpha1",
    kind = "GaleJob",
    plural = "galejobs",
    shortname = "gjob",
    namespaced,
    status = "JobStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.state.phase"}"#,
    printcolumn = r#"{"name":"Retries","type":"integer","jsonPath":".status.retryCount"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GaleJobSpec {
    /// Job tasks, in declaration order
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,

    /// Lifecycle policies applying to every task's pod events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<LifecyclePolicy>,

    /// Minimum concurrently-ready pods for the job to count as running
    #[serde(default)]
    pub min_available: u32,

    /// Restarts allowed before the job is marked Failed
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Queue the job is submitted to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

impl Default for GaleJobSpec {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            policies: Vec::new(),
            min_available: 0,
            max_retry: default_max_retry(),
            queue: None,
        }
    }
}

impl GaleJobSpec {
    /// Total pods across all tasks
    pub fn total_replicas(&self) -> u32 {
        self.tasks.iter().map(|t| t.replicas).sum()
    }

    /// Look up a task by name
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
