//! Custom Resource Definitions for Gale

mod job;
mod types;

pub use job::{GaleJob, GaleJobSpec, TaskSpec};
pub use types::{
    Action, DependsOn, Event, JobPhase, JobState, JobStatus, LifecyclePolicy, VolumeSpec,
};
