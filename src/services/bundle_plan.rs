//! Bundle policy: which slots each export type contains, in order.
//!
//! `complete_project` is not defined on its own. It is composed from the
//! trained-model and preprocessed-data plans, minus their READMEs, followed
//! by the project-level setup script and the complete-project README. The
//! archive therefore carries exactly one `README.md`.

use crate::models::{BundleType, ExportRequest};
use crate::services::synthetic::SyntheticDoc;

/// Serialization formats a trained model may have been saved in, by priority.
pub const MODEL_EXTENSIONS: &[&str] = &["pkl", "joblib", "h5", "keras", "pt", "pth", "onnx"];

/// Dataset formats exported from `datasets/`.
pub const DATA_EXTENSIONS: &[&str] = &["csv", "tsv", "json", "parquet", "xlsx"];

pub const MODEL_ARCHIVE_NAME: &str = "model/trained_model.bin";
pub const INFERENCE_ARCHIVE_NAME: &str = "inference.py";
pub const REQUIREMENTS_ARCHIVE_NAME: &str = "requirements.txt";
pub const PROCESSING_NOTES_ARCHIVE_NAME: &str = "processing_notes.md";
pub const SETUP_ARCHIVE_NAME: &str = "setup.sh";
pub const README_ARCHIVE_NAME: &str = "README.md";
pub const DATA_ARCHIVE_DIR: &str = "data";

/// How a slot gets its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStrategy {
    /// First existing candidate wins, else the fallback document.
    Single {
        candidates: Vec<String>,
        fallback: SyntheticDoc,
    },
    /// Every file in `dir` with an allowed extension, placed under `archive_dir`.
    Directory {
        dir: String,
        extensions: &'static [&'static str],
        archive_dir: &'static str,
    },
    /// Always generated.
    Generated(SyntheticDoc),
}

/// One named position in a bundle plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Archive name for single-entry slots, folder label for directory slots.
    pub archive_name: &'static str,
    pub strategy: SlotStrategy,
    /// Bundle type the generated documents of this slot are rendered for.
    pub bundle: BundleType,
}

impl Slot {
    pub fn is_readme(&self) -> bool {
        self.archive_name == README_ARCHIVE_NAME
    }
}

/// Ordered slot list for one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePlan {
    pub bundle: BundleType,
    pub slots: Vec<Slot>,
}

impl BundlePlan {
    /// Build the plan for a request.
    pub fn for_request(request: &ExportRequest) -> Self {
        let job = request.training_job_id.as_deref();

        let slots = match request.bundle_type {
            BundleType::TrainedModel => trained_model_slots(job),
            BundleType::PreprocessedData => preprocessed_data_slots(),
            BundleType::CompleteProject => complete_project_slots(job),
        };

        Self {
            bundle: request.bundle_type,
            slots,
        }
    }

    pub fn archive_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.archive_name).collect()
    }
}

fn trained_model_slots(training_job_id: Option<&str>) -> Vec<Slot> {
    let bundle = BundleType::TrainedModel;
    vec![
        Slot {
            archive_name: MODEL_ARCHIVE_NAME,
            strategy: SlotStrategy::Single {
                candidates: model_candidates(training_job_id),
                fallback: SyntheticDoc::ModelPlaceholder,
            },
            bundle,
        },
        Slot {
            archive_name: INFERENCE_ARCHIVE_NAME,
            strategy: SlotStrategy::Single {
                candidates: vec![
                    "downloads/inference.py".to_string(),
                    "downloads/predict.py".to_string(),
                ],
                fallback: SyntheticDoc::InferenceScript,
            },
            bundle,
        },
        Slot {
            archive_name: REQUIREMENTS_ARCHIVE_NAME,
            strategy: SlotStrategy::Single {
                candidates: vec!["downloads/requirements.txt".to_string()],
                fallback: SyntheticDoc::Requirements,
            },
            bundle,
        },
        readme_slot(bundle),
    ]
}

fn preprocessed_data_slots() -> Vec<Slot> {
    let bundle = BundleType::PreprocessedData;
    vec![
        Slot {
            archive_name: DATA_ARCHIVE_DIR,
            strategy: SlotStrategy::Directory {
                dir: "datasets".to_string(),
                extensions: DATA_EXTENSIONS,
                archive_dir: DATA_ARCHIVE_DIR,
            },
            bundle,
        },
        Slot {
            archive_name: PROCESSING_NOTES_ARCHIVE_NAME,
            strategy: SlotStrategy::Single {
                candidates: vec![
                    "downloads/processing_notes.md".to_string(),
                    "downloads/preprocessing_report.md".to_string(),
                ],
                fallback: SyntheticDoc::ProcessingNotes,
            },
            bundle,
        },
        readme_slot(bundle),
    ]
}

fn complete_project_slots(training_job_id: Option<&str>) -> Vec<Slot> {
    let bundle = BundleType::CompleteProject;

    // Fallback documents describe the package they ship in
    let mut slots: Vec<Slot> = trained_model_slots(training_job_id)
        .into_iter()
        .chain(preprocessed_data_slots())
        .filter(|slot| !slot.is_readme())
        .map(|slot| Slot { bundle, ..slot })
        .collect();

    slots.push(Slot {
        archive_name: SETUP_ARCHIVE_NAME,
        strategy: SlotStrategy::Generated(SyntheticDoc::SetupScript),
        bundle,
    });
    slots.push(readme_slot(bundle));
    slots
}

fn readme_slot(bundle: BundleType) -> Slot {
    Slot {
        archive_name: README_ARCHIVE_NAME,
        strategy: SlotStrategy::Generated(SyntheticDoc::Readme),
        bundle,
    }
}

/// Model file candidates, most specific first.
///
/// A training job's own directory wins over the project-level best model,
/// which wins over a generic `model.*`.
fn model_candidates(training_job_id: Option<&str>) -> Vec<String> {
    let mut candidates = Vec::new();

    if let Some(job) = training_job_id {
        candidates.extend(
            MODEL_EXTENSIONS
                .iter()
                .map(|ext| format!("models/{}/best_model.{}", job, ext)),
        );
    }
    candidates.extend(
        MODEL_EXTENSIONS
            .iter()
            .map(|ext| format!("models/best_model.{}", ext)),
    );
    candidates.extend(
        MODEL_EXTENSIONS
            .iter()
            .map(|ext| format!("models/model.{}", ext)),
    );

    candidates
}
