//! GaleJob validating admission handler
//!
//! Handles AdmissionReview requests for GaleJob resources. Creates run the
//! full spec validation; updates additionally enforce spec immutability,
//! since a job's tasks and policies cannot change after submission.

use axum::Json;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, error, info};

use crate::crd::GaleJob;
use crate::webhook::validate::validate_job_create;

/// Handle validating admission review for GaleJobs
pub async fn validate_handler(
    Json(body): Json<AdmissionReview<GaleJob>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<GaleJob> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(validate_job(&req).into_review())
}

/// Process a single GaleJob admission request
fn validate_job(req: &AdmissionRequest<GaleJob>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);

    let Some(job) = &req.object else {
        // Deletes carry no object; nothing to validate.
        debug!(uid = %req.uid, "no job object in request, allowing");
        return response;
    };

    match req.operation {
        Operation::Create => {
            if let Err(e) = validate_job_create(job) {
                info!(
                    uid = %req.uid,
                    job = ?job.metadata.name,
                    error = %e,
                    "denying job creation"
                );
                return response.deny(e.to_string());
            }
            response
        }
        Operation::Update => {
            // Spec is immutable after submission; only status may change.
            if let Some(old) = &req.old_object {
                if old.spec != job.spec {
                    info!(
                        uid = %req.uid,
                        job = ?job.metadata.name,
                        "denying job spec update"
                    );
                    return response
                        .deny("job spec is immutable once submitted; create a new job instead");
                }
            }
            response
        }
        _ => response,
    }
}
