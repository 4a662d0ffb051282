//! Pure validation for GaleJob specs
//!
//! Everything here runs at admission, before a job is persisted: lifecycle
//! policy checks, volume checks, and the task dependency DAG check. All
//! functions are pure and safe to call concurrently across admission
//! requests.

use std::collections::{HashMap, HashSet};

use crate::crd::{Action, Event, GaleJob, LifecyclePolicy, TaskSpec, VolumeSpec};
use crate::error::Error;

// Allow-list tables: which events and actions users may declare in a
// lifecycle policy. Everything else is reserved for internal dispatch.

fn event_allowed(event: Event) -> bool {
    match event {
        Event::AnyEvent
        | Event::PodFailed
        | Event::PodEvicted
        | Event::JobUnknown
        | Event::TaskCompleted
        | Event::TaskFailed
        | Event::JobUpdated => true,
        Event::OutOfSync | Event::CommandIssued => false,
    }
}

fn action_allowed(action: Action) -> bool {
    match action {
        Action::AbortJob
        | Action::RestartJob
        | Action::RestartTask
        | Action::TerminateJob
        | Action::CompleteJob
        | Action::ResumeJob => true,
        Action::SyncJob
        | Action::Enqueue
        | Action::SyncQueue
        | Action::OpenQueue
        | Action::CloseQueue => false,
    }
}

/// Collect policy violations in declaration order.
///
/// The scan stops at the first violation; the wildcard-exclusivity check
/// still runs afterward over whatever events the scan recorded. Callers
/// wanting the spec-level contract use [`validate_policies`].
fn policy_errors(policies: &[LifecyclePolicy]) -> Vec<String> {
    let mut errs = Vec::new();
    let mut seen_events: HashSet<Event> = HashSet::new();
    let mut seen_exit_codes: HashSet<i32> = HashSet::new();

    'scan: for policy in policies {
        let has_event = policy.event.is_some() || !policy.events.is_empty();

        if has_event && policy.exit_code.is_some() {
            errs.push("must not specify event and exitCode simultaneously".to_string());
            break;
        }

        match policy.exit_code {
            None if !has_event => {
                errs.push("either event or exitCode must be specified".to_string());
                break;
            }
            None => {
                for event in policy.event_list() {
                    if !event_allowed(event) {
                        errs.push(format!("invalid policy event {event}"));
                        break 'scan;
                    }
                    if !action_allowed(policy.action) {
                        errs.push(format!("invalid policy action {}", policy.action));
                        break 'scan;
                    }
                    if !seen_events.insert(event) {
                        errs.push(format!("duplicate event {event} across policies"));
                        break 'scan;
                    }
                }
            }
            Some(0) => {
                errs.push("0 is not a valid error code".to_string());
                break;
            }
            Some(code) => {
                if !seen_exit_codes.insert(code) {
                    errs.push(format!("duplicate exitCode {code}"));
                    break;
                }
            }
        }
    }

    // Runs even when the scan stopped early.
    if seen_events.contains(&Event::AnyEvent) && seen_events.len() > 1 {
        errs.push("if any-event (\"*\") is used, no other event policy may be declared".to_string());
    }

    errs
}

/// Validate a list of lifecycle policies.
///
/// Rejects policies that set both an event and an exit code (or neither),
/// events and actions outside the user-declarable allow-lists, events or
/// exit codes reused across policies, exit code 0, and a wildcard event
/// declared alongside any other event.
pub fn validate_policies(policies: &[LifecyclePolicy]) -> Result<(), Error> {
    let errs = policy_errors(policies);
    if errs.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(errs.join("; ")))
    }
}

fn volume_error(volumes: &[VolumeSpec]) -> Option<String> {
    let mut mount_paths: HashSet<&str> = HashSet::new();
    for volume in volumes {
        if volume.mount_path.is_empty() {
            return Some("mountPath is required".to_string());
        }
        if !mount_paths.insert(volume.mount_path.as_str()) {
            return Some(format!("duplicated mountPath: {}", volume.mount_path));
        }
        match (&volume.volume_claim, &volume.volume_claim_name) {
            (None, None) => {
                return Some("either volumeClaim or volumeClaimName must be specified".to_string())
            }
            (Some(_), Some(_)) => {
                return Some(
                    "conflict: to mount an existing PVC specify only volumeClaimName; \
                     to create a new PVC specify only volumeClaim"
                        .to_string(),
                )
            }
            (None, Some(name)) if !is_dns1123_subdomain(name) => {
                return Some(format!(
                    "invalid volumeClaimName {name}: must be a lowercase DNS-1123 subdomain"
                ))
            }
            _ => {}
        }
    }
    None
}

/// Validate a task's volume declarations, failing fast on the first problem.
pub fn validate_io(volumes: &[VolumeSpec]) -> Result<(), Error> {
    match volume_error(volumes) {
        Some(msg) => Err(Error::validation(msg)),
        None => Ok(()),
    }
}

/// Compute a topological order over the task dependency graph.
///
/// Returns `Some(order)` (every task name exactly once, each task after all
/// of its dependencies) or `None` if the graph has a cycle (including a
/// dependency on an undeclared task, which can never be satisfied). When
/// several tasks are simultaneously unblocked their relative order is
/// unspecified.
pub fn topo_sort(tasks: &[TaskSpec]) -> Option<Vec<String>> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> =
        tasks.iter().map(|t| (t.name.as_str(), 0)).collect();

    for task in tasks {
        let Some(deps) = &task.depends_on else { continue };
        for dep in &deps.name {
            graph.entry(dep.as_str()).or_default().push(task.name.as_str());
            if let Some(degree) = in_degree.get_mut(task.name.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut stack: Vec<&str> = in_degree
        .iter()
        .filter_map(|(name, degree)| (*degree == 0).then_some(*name))
        .collect();

    let mut sorted = Vec::with_capacity(tasks.len());
    while let Some(name) = stack.pop() {
        sorted.push(name.to_string());
        for next in graph.remove(name).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    stack.push(next);
                }
            }
        }
    }

    // Anything left unvisited sits on a cycle.
    (sorted.len() == in_degree.len()).then_some(sorted)
}

/// Validate a candidate GaleJob at admission.
///
/// Unlike the per-list scans above, this aggregates every failure across the
/// whole spec into one error so users see all problems at once.
pub fn validate_job_create(job: &GaleJob) -> Result<(), Error> {
    let spec = &job.spec;
    let mut msgs: Vec<String> = Vec::new();

    if spec.tasks.is_empty() {
        msgs.push("no task specified in job spec".to_string());
    }

    let mut task_names: HashSet<&str> = HashSet::new();
    for (i, task) in spec.tasks.iter().enumerate() {
        if !is_dns1123_label(&task.name) {
            msgs.push(format!(
                "spec.tasks[{i}].name: {:?} is not a valid DNS-1123 label",
                task.name
            ));
        }
        if !task_names.insert(task.name.as_str()) {
            msgs.push(format!("spec.tasks[{i}]: duplicated task name {}", task.name));
        }
        msgs.extend(
            policy_errors(&task.policies)
                .into_iter()
                .map(|m| format!("spec.tasks[{i}].policies: {m}")),
        );
        if let Some(m) = volume_error(&task.volumes) {
            msgs.push(format!("spec.tasks[{i}].volumes: {m}"));
        }
    }

    if spec.min_available > spec.total_replicas() {
        msgs.push("spec.minAvailable must not be greater than total replicas".to_string());
    }

    msgs.extend(
        policy_errors(&spec.policies)
            .into_iter()
            .map(|m| format!("spec.policies: {m}")),
    );

    if !spec.tasks.is_empty() && topo_sort(&spec.tasks).is_none() {
        msgs.push(
            "spec.tasks: dependencies between tasks do not form a directed acyclic graph"
                .to_string(),
        );
    }

    if msgs.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(msgs.join("; ")))
    }
}

/// DNS-1123 label: lowercase alphanumerics and '-', 63 chars max, must
/// start and end alphanumeric. Task names become pod name segments, so
/// they must satisfy this.
fn is_dns1123_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// DNS-1123 subdomain: dot-separated DNS-1123 labels, 253 chars max.
/// PersistentVolumeClaim names must satisfy this.
fn is_dns1123_subdomain(name: &str) -> bool {
    !name.is_empty() && name.len() <= 253 && name.split('.').all(is_dns1123_label)
}
