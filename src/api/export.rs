//! Export Routes
//!
//! Streams export packages as ZIP downloads.
//!
//! Routes:
//! - POST /api/export/trained-model - Model artifact plus inference tooling
//! - POST /api/export/preprocessed-data - Dataset files plus processing notes
//! - POST /api/export/complete-project - Everything, plus setup script
//! - POST /api/export - Legacy endpoint taking `bundleType` in the body

use std::sync::OnceLock;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::Response,
    routing::post,
    Router,
};
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::models::{BundleType, ExportRequest};
use crate::{AppState, Error, Result};

const MAX_ID_LEN: usize = 128;

fn id_pattern() -> &'static Regex {
    static ID_PATTERN: OnceLock<Regex> = OnceLock::new();
    ID_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static id pattern"))
}

/// Build export routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(export_legacy))
        .route("/trained-model", post(export_trained_model))
        .route("/preprocessed-data", post(export_preprocessed_data))
        .route("/complete-project", post(export_complete_project))
}

// ============================================================================
// Request Types
// ============================================================================

/// Export request body.
///
/// Every field is optional at the type level so that all problems can be
/// reported together instead of failing on the first missing field.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBody {
    pub project_id: Option<String>,
    pub training_job_id: Option<String>,
    pub bundle_type: Option<String>,
}

impl ExportBody {
    /// Validate into an [`ExportRequest`].
    ///
    /// `bundle` is fixed by the route; `None` means the body must name it.
    pub fn validate(self, bundle: Option<BundleType>) -> Result<ExportRequest> {
        let mut problems = Vec::new();

        match self.project_id.as_deref() {
            None | Some("") => problems.push("projectId is required".to_string()),
            Some(id) => {
                if let Some(problem) = check_id("projectId", id) {
                    problems.push(problem);
                }
            }
        }

        let training_job_id = self.training_job_id.filter(|id| !id.is_empty());
        if let Some(problem) = training_job_id
            .as_deref()
            .and_then(|id| check_id("trainingJobId", id))
        {
            problems.push(problem);
        }

        let bundle_type = match bundle {
            Some(bundle) => Some(bundle),
            None => match self.bundle_type.as_deref() {
                None | Some("") => {
                    problems.push("bundleType is required".to_string());
                    None
                }
                Some(raw) => {
                    let parsed = BundleType::from_str(raw);
                    if parsed.is_none() {
                        let allowed: Vec<&str> =
                            BundleType::all().iter().map(|b| b.as_str()).collect();
                        problems.push(format!(
                            "bundleType must be one of: {}",
                            allowed.join(", ")
                        ));
                    }
                    parsed
                }
            },
        };

        match (self.project_id, bundle_type) {
            (Some(project_id), Some(bundle_type)) if problems.is_empty() => {
                let mut request = ExportRequest::new(project_id, bundle_type);
                if let Some(job) = training_job_id {
                    request = request.with_training_job(job);
                }
                Ok(request)
            }
            _ => Err(Error::Validation(problems)),
        }
    }
}

fn check_id(field: &str, value: &str) -> Option<String> {
    if value.len() > MAX_ID_LEN {
        return Some(format!("{} must be at most {} characters", field, MAX_ID_LEN));
    }
    if !id_pattern().is_match(value) {
        return Some(format!(
            "{} may only contain letters, digits, '-' and '_'",
            field
        ));
    }
    None
}

/// Parse a raw body; malformed JSON is a client error like any other.
fn parse_body(body: &Bytes) -> Result<ExportBody> {
    if body.is_empty() {
        return Ok(ExportBody::default());
    }
    Ok(serde_json::from_slice(body)?)
}

// ============================================================================
// Handlers
// ============================================================================

/// Export a trained model package.
///
/// POST /api/export/trained-model
#[axum::debug_handler]
async fn export_trained_model(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request = parse_body(&body)?.validate(Some(BundleType::TrainedModel))?;
    start_download(&state, request).await
}

/// Export a preprocessed data package.
///
/// POST /api/export/preprocessed-data
#[axum::debug_handler]
async fn export_preprocessed_data(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response> {
    let request = parse_body(&body)?.validate(Some(BundleType::PreprocessedData))?;
    start_download(&state, request).await
}

/// Export the complete project package.
///
/// POST /api/export/complete-project
#[axum::debug_handler]
async fn export_complete_project(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request = parse_body(&body)?.validate(Some(BundleType::CompleteProject))?;
    start_download(&state, request).await
}

/// Legacy single endpoint.
///
/// POST /api/export
#[axum::debug_handler]
async fn export_legacy(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request = parse_body(&body)?.validate(None)?;
    start_download(&state, request).await
}

/// Resolve the package and hand the archive stream to the response.
///
/// Anything failing in here is still reported as JSON; once the response
/// is returned the export task owns all error reporting.
async fn start_download(state: &AppState, request: ExportRequest) -> Result<Response> {
    let export = state.exports.start(request).await?;

    info!(
        export_id = %export.export_id,
        file_name = %export.file_name,
        "Export download started"
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", export.file_name),
        )
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(export.stream))
        .map_err(|e| Error::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(project: Option<&str>, job: Option<&str>, bundle: Option<&str>) -> ExportBody {
        ExportBody {
            project_id: project.map(String::from),
            training_job_id: job.map(String::from),
            bundle_type: bundle.map(String::from),
        }
    }

    fn problems(result: Result<ExportRequest>) -> Vec<String> {
        match result {
            Err(Error::Validation(problems)) => problems,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_request() {
        let request = body(Some("proj_1"), Some("job-2"), None)
            .validate(Some(BundleType::TrainedModel))
            .unwrap();
        assert_eq!(request.project_id, "proj_1");
        assert_eq!(request.training_job_id.as_deref(), Some("job-2"));
        assert_eq!(request.bundle_type, BundleType::TrainedModel);
    }

    #[test]
    fn test_empty_training_job_is_ignored() {
        let request = body(Some("p"), Some(""), None)
            .validate(Some(BundleType::TrainedModel))
            .unwrap();
        assert_eq!(request.training_job_id, None);
    }

    #[test]
    fn test_collects_all_problems() {
        let found = problems(body(None, Some("../etc"), Some("everything")).validate(None));
        assert_eq!(found.len(), 3, "{:?}", found);
        assert!(found[0].contains("projectId"));
        assert!(found[1].contains("trainingJobId"));
        assert!(found[2].contains("bundleType"));
    }

    #[test]
    fn test_rejects_traversal_and_long_ids() {
        let found = problems(body(Some("../other"), None, None).validate(Some(BundleType::TrainedModel)));
        assert_eq!(found.len(), 1);

        let long = "a".repeat(MAX_ID_LEN + 1);
        let found = problems(body(Some(&long), None, None).validate(Some(BundleType::TrainedModel)));
        assert!(found[0].contains("at most"));
    }

    #[test]
    fn test_legacy_requires_bundle_type() {
        let found = problems(body(Some("p"), None, None).validate(None));
        assert_eq!(found, vec!["bundleType is required".to_string()]);

        let request = body(Some("p"), None, Some("complete_project"))
            .validate(None)
            .unwrap();
        assert_eq!(request.bundle_type, BundleType::CompleteProject);
    }

    #[test]
    fn test_parse_body() {
        assert!(parse_body(&Bytes::new()).unwrap().project_id.is_none());
        assert!(matches!(
            parse_body(&Bytes::from_static(b"{not json")),
            Err(Error::InvalidInput(_))
        ));
        let parsed = parse_body(&Bytes::from_static(br#"{"projectId":"p","trainingJobId":"j"}"#)).unwrap();
        assert_eq!(parsed.training_job_id.as_deref(), Some("j"));
    }
}
