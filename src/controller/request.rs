//! Event-to-action resolution
//!
//! A [`Request`] is one unit of work for the state machine: an observed
//! event (or an explicit action), optionally scoped to a task and carrying
//! a container exit code. [`apply_policies`] resolves the request against
//! the job's lifecycle policies to decide which action the state machine
//! executes.

use crate::crd::{Action, Event, GaleJobSpec, LifecyclePolicy};

/// One pending unit of work for a job's state machine
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    /// Task whose pods raised the event, when known
    pub task_name: Option<String>,

    /// Observed event
    pub event: Option<Event>,

    /// Explicit action, bypassing policy matching
    pub action: Option<Action>,

    /// Exit code of the failed container, when the event carries one
    pub exit_code: Option<i32>,
}

/// Resolve a request to the action the state machine should execute.
///
/// An explicit action wins outright. OutOfSync always resolves to SyncJob;
/// drift repair is not policy-configurable. Otherwise policies are matched
/// in declaration order, task-level before job-level, and the first match
/// decides. No match falls back to SyncJob.
pub fn apply_policies(spec: &GaleJobSpec, req: &Request) -> Action {
    if let Some(action) = req.action {
        return action;
    }

    if req.event == Some(Event::OutOfSync) {
        return Action::SyncJob;
    }

    if let Some(task_name) = &req.task_name {
        if let Some(task) = spec.task(task_name) {
            if let Some(action) = match_policies(&task.policies, req) {
                return action;
            }
        }
    }

    match_policies(&spec.policies, req).unwrap_or(Action::SyncJob)
}

fn match_policies(policies: &[LifecyclePolicy], req: &Request) -> Option<Action> {
    for policy in policies {
        let events = policy.event_list();
        if let Some(event) = req.event {
            if !events.is_empty()
                && (events.contains(&event) || events.contains(&Event::AnyEvent))
            {
                return Some(policy.action);
            }
        }
        // Exit code 0 never appears in a stored policy; admission rejects it.
        if policy.exit_code.is_some() && policy.exit_code == req.exit_code {
            return Some(policy.action);
        }
    }
    None
}
