//! Validating Admission Webhook for Gale
//!
//! Rejects malformed GaleJobs before they are persisted: lifecycle policy
//! violations, volume conflicts, and cyclic task dependencies never reach
//! the controller. Validation is pure: the handlers need no Kubernetes
//! client, so the router carries no state.

pub mod job;
pub mod validate;

use axum::{routing::post, Router};

/// Create the webhook router with all validation endpoints
///
/// Currently supports:
/// - POST /validate/jobs - Validate GaleJob create/update operations
pub fn webhook_router() -> Router {
    Router::new().route("/validate/jobs", post(job::validate_handler))
}
