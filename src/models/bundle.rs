//! Bundle types and export requests.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kind of package a caller can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleType {
    /// Trained model artifact plus inference tooling
    TrainedModel,
    /// Processed dataset files plus processing notes
    PreprocessedData,
    /// Both of the above plus project-level setup
    CompleteProject,
}

impl BundleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::TrainedModel => "trained_model",
            BundleType::PreprocessedData => "preprocessed_data",
            BundleType::CompleteProject => "complete_project",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "trained_model" => Some(BundleType::TrainedModel),
            "preprocessed_data" => Some(BundleType::PreprocessedData),
            "complete_project" => Some(BundleType::CompleteProject),
            _ => None,
        }
    }

    /// Human readable title used in generated documents.
    pub fn title(&self) -> &'static str {
        match self {
            BundleType::TrainedModel => "Trained Model",
            BundleType::PreprocessedData => "Preprocessed Data",
            BundleType::CompleteProject => "Complete Project",
        }
    }

    pub fn all() -> &'static [BundleType] {
        &[
            BundleType::TrainedModel,
            BundleType::PreprocessedData,
            BundleType::CompleteProject,
        ]
    }
}

impl std::fmt::Display for BundleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single export, alive for the duration of one HTTP interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub project_id: String,
    pub training_job_id: Option<String>,
    pub bundle_type: BundleType,
}

impl ExportRequest {
    pub fn new(project_id: impl Into<String>, bundle_type: BundleType) -> Self {
        Self {
            project_id: project_id.into(),
            training_job_id: None,
            bundle_type,
        }
    }

    pub fn with_training_job(mut self, training_job_id: impl Into<String>) -> Self {
        self.training_job_id = Some(training_job_id.into());
        self
    }

    /// Download name: `{bundle}_{project}_{timestamp}.zip`.
    ///
    /// The timestamp is the RFC 3339 instant with millisecond precision,
    /// with `:` and `.` replaced by `-` so it is safe in file names.
    pub fn archive_file_name(&self, at: DateTime<Utc>) -> String {
        let stamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{}_{}_{}.zip", self.bundle_type, self.project_id, stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bundle_type_round_trip_names() {
        for bundle in BundleType::all() {
            assert_eq!(BundleType::from_str(bundle.as_str()), Some(*bundle));
        }
        assert_eq!(BundleType::from_str("everything"), None);
    }

    #[test]
    fn test_bundle_type_serde_snake_case() {
        let json = serde_json::to_string(&BundleType::PreprocessedData).unwrap();
        assert_eq!(json, "\"preprocessed_data\"");
        let parsed: BundleType = serde_json::from_str("\"complete_project\"").unwrap();
        assert_eq!(parsed, BundleType::CompleteProject);
    }

    #[test]
    fn test_archive_file_name() {
        let at = Utc
            .with_ymd_and_hms(2026, 10, 16, 9, 30, 5)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(123))
            .unwrap();
        let request = ExportRequest::new("proj-42", BundleType::TrainedModel);

        assert_eq!(
            request.archive_file_name(at),
            "trained_model_proj-42_2026-10-16T09-30-05-123Z.zip"
        );
    }
}
