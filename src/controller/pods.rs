//! Production pod lifecycle manager
//!
//! Implements the state machine's [`PodLifecycle`] seam against the real
//! cluster. Both primitives share one shape: enumerate the job's pods,
//! act on them (delete for kill, converge for sync), rebuild the status
//! snapshot from what was observed, run the handler's mutation predicate,
//! and persist the status. A predicate that declines to commit leaves the
//! phase untouched; the refreshed pod counts are persisted either way.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info};

use crate::crd::{GaleJob, JobStatus, TaskSpec};
use crate::error::Error;
use crate::events::EventPublisher;
use crate::state::{PodLifecycle, PodRetainPhase, UpdateStatusFn};
use crate::webhook::validate::topo_sort;
use crate::{CONTROLLER_NAME, JOB_NAME_LABEL, TASK_NAME_LABEL};

/// Pod lifecycle manager backed by the Kubernetes API
pub struct PodManager {
    client: Client,
    events: Arc<dyn EventPublisher>,
}

impl PodManager {
    /// Create a manager using the given client and event sink
    pub fn new(client: Client, events: Arc<dyn EventPublisher>) -> Self {
        Self { client, events }
    }

    fn pod_api(&self, job: &GaleJob) -> Result<(String, Api<Pod>), Error> {
        let namespace = job
            .namespace()
            .ok_or_else(|| Error::internal("job has no namespace"))?;
        Ok((
            namespace.clone(),
            Api::namespaced(self.client.clone(), &namespace),
        ))
    }

    async fn list_pods(&self, api: &Api<Pod>, job_name: &str) -> Result<Vec<Pod>, Error> {
        let params = ListParams::default().labels(&format!("{JOB_NAME_LABEL}={job_name}"));
        Ok(api.list(&params).await?.items)
    }

    /// Persist the refreshed snapshot, applying the handler's predicate first.
    async fn commit_status(
        &self,
        job: &GaleJob,
        namespace: &str,
        counts: PodCounts,
        update: Option<UpdateStatusFn>,
    ) -> Result<(), Error> {
        let mut status = job.status.clone().unwrap_or_default();
        counts.write_to(&mut status);

        let previous = status.state.phase.clone();
        let committed = match update {
            Some(predicate) => predicate(&mut status),
            None => false,
        };

        let api: Api<GaleJob> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(
            &job.name_any(),
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(&serde_json::json!({ "status": status })),
        )
        .await?;

        if committed && status.state.phase != previous {
            info!(
                job = %job.name_any(),
                from = %previous,
                to = %status.state.phase,
                "job phase transition"
            );
            self.events
                .publish(
                    job,
                    EventType::Normal,
                    "PhaseTransition",
                    Some(format!("{previous} -> {}", status.state.phase)),
                )
                .await;
        }

        Ok(())
    }
}

#[async_trait]
impl PodLifecycle for PodManager {
    async fn kill_job(
        &self,
        job: &GaleJob,
        retain: PodRetainPhase,
        update: Option<UpdateStatusFn>,
    ) -> Result<(), Error> {
        let (namespace, api) = self.pod_api(job)?;
        let name = job.name_any();
        let pods = self.list_pods(&api, &name).await?;

        let mut counts = PodCounts::default();
        for pod in &pods {
            if pod.metadata.deletion_timestamp.is_some() {
                counts.terminating += 1;
                continue;
            }
            let phase = pod_phase(pod);
            if retain.retains(phase) {
                counts.record(phase);
                continue;
            }
            match api.delete(&pod.name_any(), &DeleteParams::default()).await {
                Ok(_) => counts.terminating += 1,
                // Someone else already deleted it; nothing left to count.
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(job = %name, ?retain, terminating = counts.terminating, "killed job pods");
        self.commit_status(job, &namespace, counts, update).await
    }

    async fn sync_job(&self, job: &GaleJob, update: Option<UpdateStatusFn>) -> Result<(), Error> {
        let (namespace, api) = self.pod_api(job)?;
        let name = job.name_any();
        let pods = self.list_pods(&api, &name).await?;

        let mut desired: HashSet<String> = HashSet::new();
        for task in &job.spec.tasks {
            for index in 0..task.replicas {
                desired.insert(pod_name(&name, &task.name, index));
            }
        }

        let mut counts = PodCounts::default();
        let mut existing: HashSet<String> = HashSet::new();
        let mut started_by_task: HashMap<String, u32> = HashMap::new();

        for pod in &pods {
            let pod_name = pod.name_any();
            if pod.metadata.deletion_timestamp.is_some() {
                counts.terminating += 1;
                existing.insert(pod_name);
                continue;
            }
            if !desired.contains(&pod_name) {
                // Stray from a previous spec revision or manual edit.
                match api.delete(&pod_name, &DeleteParams::default()).await {
                    Ok(_) => counts.terminating += 1,
                    Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                    Err(e) => return Err(e.into()),
                }
                continue;
            }
            let phase = pod_phase(pod);
            counts.record(phase);
            if matches!(phase, "Running" | "Succeeded") {
                if let Some(task) = pod.labels().get(TASK_NAME_LABEL) {
                    *started_by_task.entry(task.clone()).or_default() += 1;
                }
            }
            existing.insert(pod_name);
        }

        // Create missing pods in dependency order; a task waits until every
        // dependency has all of its pods started. The spec was DAG-checked
        // at admission, so a missing order here means declaration order.
        let order = topo_sort(&job.spec.tasks)
            .unwrap_or_else(|| job.spec.tasks.iter().map(|t| t.name.clone()).collect());

        for task_name in &order {
            let Some(task) = job.spec.task(task_name) else {
                continue;
            };
            if !dependencies_started(&job.spec.tasks, task, &started_by_task) {
                debug!(job = %name, task = %task.name, "waiting on task dependencies");
                continue;
            }
            for index in 0..task.replicas {
                let desired_name = pod_name(&name, &task.name, index);
                if existing.contains(&desired_name) {
                    continue;
                }
                let pod = build_pod(job, task, index)?;
                match api.create(&PostParams::default(), &pod).await {
                    Ok(_) => counts.pending += 1,
                    // Raced another pass; the pod will be counted next time.
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.commit_status(job, &namespace, counts, update).await
    }
}

/// Deterministic pod name: `{job}-{task}-{index}`
fn pod_name(job: &str, task: &str, index: u32) -> String {
    format!("{job}-{task}-{index}")
}

fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

/// True once every dependency of `task` has all of its pods started
/// (running or already finished successfully).
fn dependencies_started(
    tasks: &[TaskSpec],
    task: &TaskSpec,
    started_by_task: &HashMap<String, u32>,
) -> bool {
    let Some(deps) = &task.depends_on else {
        return true;
    };
    deps.name.iter().all(|dep| {
        let Some(dep_task) = tasks.iter().find(|t| &t.name == dep) else {
            // Admission guarantees dependencies exist; trust the stored spec.
            return true;
        };
        started_by_task.get(dep).copied().unwrap_or(0) >= dep_task.replicas
    })
}

/// Stamp one pod from the task's template, owned by the job.
fn build_pod(job: &GaleJob, task: &TaskSpec, index: u32) -> Result<Pod, Error> {
    let name = pod_name(&job.name_any(), &task.name, index);
    let template = task
        .template
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    let spec = template
        .get("spec")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({ "containers": [] }));

    let mut pod: Pod = serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "labels": {
                JOB_NAME_LABEL: job.name_any(),
                TASK_NAME_LABEL: task.name,
            },
        },
        "spec": spec,
    }))
    .map_err(|e| Error::serialization(format!("task {} pod template: {e}", task.name)))?;

    let owner = job
        .controller_owner_ref(&())
        .ok_or_else(|| Error::internal("job has no uid; cannot own pods"))?;
    pod.metadata.owner_references = Some(vec![owner]);

    Ok(pod)
}

/// Pod counts observed during one kill/sync pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PodCounts {
    pending: u32,
    running: u32,
    succeeded: u32,
    failed: u32,
    terminating: u32,
}

impl PodCounts {
    fn record(&mut self, phase: &str) {
        match phase {
            "Running" => self.running += 1,
            "Succeeded" => self.succeeded += 1,
            "Failed" => self.failed += 1,
            // Pending, or a phase the kubelet has not reported yet
            _ => self.pending += 1,
        }
    }

    fn write_to(self, status: &mut JobStatus) {
        status.pending = self.pending;
        status.running = self.running;
        status.succeeded = self.succeeded;
        status.failed = self.failed;
        status.terminating = self.terminating;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DependsOn, GaleJobSpec};

    fn task(name: &str, replicas: u32, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            name: name.to_string(),
            replicas,
            depends_on: (!deps.is_empty()).then(|| DependsOn {
                name: deps.iter().map(|d| d.to_string()).collect(),
            }),
            ..Default::default()
        }
    }

    fn job_with_uid() -> GaleJob {
        let mut job = GaleJob::new(
            "wordcount",
            GaleJobSpec {
                tasks: vec![task("worker", 2, &[])],
                ..Default::default()
            },
        );
        job.metadata.uid = Some("uid-1234".to_string());
        job
    }

    #[test]
    fn pod_names_are_deterministic() {
        assert_eq!(pod_name("wordcount", "worker", 0), "wordcount-worker-0");
        assert_eq!(pod_name("wordcount", "worker", 1), "wordcount-worker-1");
    }

    #[test]
    fn pod_counts_bucket_by_phase() {
        let mut counts = PodCounts::default();
        for phase in ["Running", "Running", "Succeeded", "Failed", "Pending", "Unknown"] {
            counts.record(phase);
        }
        assert_eq!(counts.running, 2);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 2);
    }

    #[test]
    fn counts_overwrite_status_snapshot() {
        let counts = PodCounts {
            pending: 1,
            running: 2,
            succeeded: 3,
            failed: 4,
            terminating: 5,
        };
        let mut status = JobStatus {
            retry_count: 7,
            ..Default::default()
        };
        counts.write_to(&mut status);
        assert_eq!(status.running, 2);
        assert_eq!(status.terminating, 5);
        // Counts never touch the retry budget.
        assert_eq!(status.retry_count, 7);
    }

    #[test]
    fn built_pod_carries_labels_and_owner() {
        let job = job_with_uid();
        let pod = build_pod(&job, &job.spec.tasks[0], 1).unwrap();

        assert_eq!(pod.metadata.name.as_deref(), Some("wordcount-worker-1"));
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(JOB_NAME_LABEL).map(String::as_str), Some("wordcount"));
        assert_eq!(labels.get(TASK_NAME_LABEL).map(String::as_str), Some("worker"));

        let owners = pod.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners[0].kind, "GaleJob");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn built_pod_uses_template_spec() {
        let mut job = job_with_uid();
        job.spec.tasks[0].template = Some(serde_json::json!({
            "spec": {
                "containers": [{"name": "main", "image": "busybox"}],
                "restartPolicy": "Never"
            }
        }));
        let pod = build_pod(&job, &job.spec.tasks[0], 0).unwrap();
        let spec = pod.spec.unwrap();
        assert_eq!(spec.containers[0].image.as_deref(), Some("busybox"));
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
    }

    #[test]
    fn build_pod_requires_job_uid() {
        let job = GaleJob::new("orphan", GaleJobSpec::default());
        let task = task("worker", 1, &[]);
        assert!(build_pod(&job, &task, 0).is_err());
    }

    #[test]
    fn dependencies_gate_on_all_replicas_started() {
        let tasks = vec![task("master", 2, &[]), task("worker", 3, &["master"])];
        let worker = &tasks[1];

        let mut started = HashMap::new();
        assert!(!dependencies_started(&tasks, worker, &started));

        started.insert("master".to_string(), 1);
        assert!(!dependencies_started(&tasks, worker, &started));

        started.insert("master".to_string(), 2);
        assert!(dependencies_started(&tasks, worker, &started));
    }

    #[test]
    fn tasks_without_dependencies_start_immediately() {
        let tasks = vec![task("solo", 1, &[])];
        assert!(dependencies_started(&tasks, &tasks[0], &HashMap::new()));
    }
}
