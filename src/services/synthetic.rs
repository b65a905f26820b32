//! Placeholder documents for export packages.
//!
//! When a project has no real artifact for a slot, the package carries a
//! generated stand-in instead. Every generator is a pure function of the
//! document kind and the bundle type: no I/O, no request data, so the same
//! inputs always produce byte-identical output.

use crate::models::BundleType;

/// Kinds of generated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticDoc {
    /// Stands in for a missing trained model artifact
    ModelPlaceholder,
    /// Runnable single-file inference/demo script
    InferenceScript,
    /// pip dependency manifest
    Requirements,
    /// Bundle guide
    Readme,
    /// Narrative of the data processing pipeline
    ProcessingNotes,
    /// Environment setup script
    SetupScript,
}

impl SyntheticDoc {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyntheticDoc::ModelPlaceholder => "model_placeholder",
            SyntheticDoc::InferenceScript => "inference_script",
            SyntheticDoc::Requirements => "requirements",
            SyntheticDoc::Readme => "readme",
            SyntheticDoc::ProcessingNotes => "processing_notes",
            SyntheticDoc::SetupScript => "setup_script",
        }
    }

    /// Render this document for `bundle`.
    pub fn render(&self, bundle: BundleType) -> String {
        match self {
            SyntheticDoc::ModelPlaceholder => model_placeholder(bundle),
            SyntheticDoc::InferenceScript => inference_script(bundle),
            SyntheticDoc::Requirements => requirements(bundle),
            SyntheticDoc::Readme => readme(bundle),
            SyntheticDoc::ProcessingNotes => processing_notes(bundle),
            SyntheticDoc::SetupScript => setup_script(bundle),
        }
    }
}

impl std::fmt::Display for SyntheticDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Generators
// ============================================================================

fn model_placeholder(bundle: BundleType) -> String {
    format!(
        r#"NO TRAINED MODEL FOUND
======================

This {title} package was exported before a trained model artifact was
available for the project, so this file is a placeholder.

To include a real model:
  1. Run a training job for the project and wait for it to complete.
  2. Make sure the job saved its best model (best_model.pkl, .joblib, .h5,
     .keras, .pt, .pth or .onnx).
  3. Export the package again.

inference.py detects this placeholder and exits with a clear message
instead of failing while unpickling.
"#,
        title = bundle.title()
    )
}

const INFERENCE_SCRIPT_BODY: &str = r#"import argparse
import json
import os
import sys

MODEL_PATH = os.path.join(os.path.dirname(os.path.abspath(__file__)), "model", "trained_model.bin")
PLACEHOLDER_MARKER = b"NO TRAINED MODEL FOUND"


def load_model(path=MODEL_PATH):
    """Load the exported model, whatever format it was saved in."""
    if not os.path.exists(path):
        sys.exit(f"Model file not found: {path}")

    with open(path, "rb") as handle:
        head = handle.read(64)
    if head.startswith(PLACEHOLDER_MARKER):
        sys.exit("This package contains a placeholder instead of a trained model. "
                 "Train the model and export again.")

    # HDF5 (Keras) files start with a fixed signature
    if head.startswith(b"\x89HDF"):
        from tensorflow import keras
        return keras.models.load_model(path)

    # ONNX protobufs usually carry the producer name early on
    if b"onnx" in head.lower() or b"pytorch" in head.lower():
        import onnxruntime
        return onnxruntime.InferenceSession(path)

    # Zip container: TorchScript / torch.save archives
    if head.startswith(b"PK"):
        import torch
        return torch.load(path, map_location="cpu", weights_only=False)

    try:
        import joblib
        return joblib.load(path)
    except Exception:
        import pickle
        with open(path, "rb") as handle:
            return pickle.load(handle)


def read_rows(path):
    """Read input rows from a CSV or JSON file."""
    import pandas as pd

    if path.endswith(".json"):
        return pd.read_json(path)
    return pd.read_csv(path)


def predict(model, frame):
    if hasattr(model, "predict"):
        return model.predict(frame)
    if hasattr(model, "run"):
        inputs = {model.get_inputs()[0].name: frame.to_numpy().astype("float32")}
        return model.run(None, inputs)[0]
    raise TypeError(f"Unsupported model type: {type(model).__name__}")


def main():
    parser = argparse.ArgumentParser(description="Run predictions with the exported model.")
    parser.add_argument("input", help="CSV or JSON file with one row per sample")
    parser.add_argument("--output", help="Write predictions as JSON to this file")
    args = parser.parse_args()

    model = load_model()
    frame = read_rows(args.input)
    predictions = predict(model, frame)
    result = [p.item() if hasattr(p, "item") else p for p in list(predictions)]

    if args.output:
        with open(args.output, "w") as handle:
            json.dump({"predictions": result}, handle, indent=2)
        print(f"Wrote {len(result)} predictions to {args.output}")
    else:
        print(json.dumps({"predictions": result}, indent=2))


if __name__ == "__main__":
    main()
"#;

fn inference_script(bundle: BundleType) -> String {
    format!(
        "#!/usr/bin/env python3\n\"\"\"Inference script for the exported {title} package.\n\nUsage:\n    python inference.py input.csv [--output predictions.json]\n\"\"\"\n\n{body}",
        title = bundle.title(),
        body = INFERENCE_SCRIPT_BODY
    )
}

fn requirements(bundle: BundleType) -> String {
    let mut lines = vec![
        "# Dependencies for the exported package",
        "numpy>=1.24",
        "pandas>=2.0",
        "scikit-learn>=1.3",
        "joblib>=1.3",
    ];

    match bundle {
        BundleType::PreprocessedData => {
            lines.push("pyarrow>=14.0");
            lines.push("openpyxl>=3.1");
        }
        BundleType::TrainedModel | BundleType::CompleteProject => {
            lines.push("# Optional, depending on the model format:");
            lines.push("# tensorflow>=2.15");
            lines.push("# torch>=2.1");
            lines.push("# onnxruntime>=1.17");
        }
    }

    if bundle == BundleType::CompleteProject {
        lines.push("pyarrow>=14.0");
        lines.push("openpyxl>=3.1");
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn readme(bundle: BundleType) -> String {
    let contents = match bundle {
        BundleType::TrainedModel => {
            "| Path | Description |\n\
             |------|-------------|\n\
             | `model/trained_model.bin` | The trained model (format detected by `inference.py`) |\n\
             | `inference.py` | Command line inference script |\n\
             | `requirements.txt` | Python dependencies |\n"
        }
        BundleType::PreprocessedData => {
            "| Path | Description |\n\
             |------|-------------|\n\
             | `data/` | Processed dataset files (CSV, TSV, JSON, Parquet, Excel) |\n\
             | `processing_notes.md` | How the data was prepared |\n"
        }
        BundleType::CompleteProject => {
            "| Path | Description |\n\
             |------|-------------|\n\
             | `model/trained_model.bin` | The trained model (format detected by `inference.py`) |\n\
             | `inference.py` | Command line inference script |\n\
             | `requirements.txt` | Python dependencies |\n\
             | `data/` | Processed dataset files |\n\
             | `processing_notes.md` | How the data was prepared |\n\
             | `setup.sh` | Creates a virtual environment and installs dependencies |\n"
        }
    };

    let quick_start = match bundle {
        BundleType::TrainedModel => {
            "```bash\n\
             python -m venv .venv && source .venv/bin/activate\n\
             pip install -r requirements.txt\n\
             python inference.py your_input.csv --output predictions.json\n\
             ```\n"
        }
        BundleType::PreprocessedData => {
            "```python\n\
             import pandas as pd\n\
             \n\
             frame = pd.read_csv(\"data/<file>.csv\")\n\
             print(frame.describe())\n\
             ```\n"
        }
        BundleType::CompleteProject => {
            "```bash\n\
             ./setup.sh\n\
             source .venv/bin/activate\n\
             python inference.py data/<file>.csv --output predictions.json\n\
             ```\n"
        }
    };

    let notes = match bundle {
        BundleType::TrainedModel => {
            "If `model/trained_model.bin` starts with `NO TRAINED MODEL FOUND`, the project \
             had no trained model when it was exported. Train it and export again.\n"
        }
        BundleType::PreprocessedData => {
            "An empty or missing `data/` folder means no processed dataset was available at \
             export time. Files keep their original names.\n"
        }
        BundleType::CompleteProject => {
            "This package combines the trained model and preprocessed data exports. Generated \
             placeholders are used wherever the project had no real artifact yet.\n"
        }
    };

    format!(
        "# {title} Export\n\n\
         Package exported from the ML project workspace.\n\n\
         ## Contents\n\n{contents}\n\
         ## Quick start\n\n{quick_start}\n\
         ## Notes\n\n{notes}",
        title = bundle.title(),
        contents = contents,
        quick_start = quick_start,
        notes = notes
    )
}

fn processing_notes(bundle: BundleType) -> String {
    let scope = match bundle {
        BundleType::CompleteProject => "the data used to train the model in this package",
        _ => "the datasets in this package",
    };

    format!(
        "# Data Processing Notes\n\n\
         This document describes the standard pipeline applied to {scope}. No project specific \
         processing report was available at export time, so it lists the default steps.\n\n\
         ## Pipeline\n\n\
         1. **Ingestion** - raw files are loaded and column types inferred.\n\
         2. **Cleaning** - exact duplicate rows are dropped, column names are normalized.\n\
         3. **Missing values** - numeric columns are imputed with the median, categorical \
         columns with the most frequent value.\n\
         4. **Encoding** - categorical columns are one-hot encoded when they have few distinct \
         values and label encoded otherwise.\n\
         5. **Scaling** - numeric features are standardized to zero mean and unit variance.\n\
         6. **Splitting** - rows are split into training and test sets (80/20).\n\n\
         ## Reproducing\n\n\
         Apply the same steps, in the same order, to new data before passing it to a model \
         trained on these files.\n",
        scope = scope
    )
}

fn setup_script(bundle: BundleType) -> String {
    format!(
        r#"#!/usr/bin/env bash
# Environment setup for the exported {title} package.
set -euo pipefail

cd "$(dirname "$0")"

PYTHON="${{PYTHON:-python3}}"

if ! command -v "$PYTHON" >/dev/null 2>&1; then
    echo "error: $PYTHON not found, install Python 3.9 or newer" >&2
    exit 1
fi

echo "Creating virtual environment in .venv"
"$PYTHON" -m venv .venv

# shellcheck disable=SC1091
source .venv/bin/activate

python -m pip install --upgrade pip
python -m pip install -r requirements.txt

echo
echo "Setup complete. Activate the environment with:"
echo "    source .venv/bin/activate"
echo "Then run:"
echo "    python inference.py data/<file>.csv"
"#,
        title = bundle.title()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_DOCS: [SyntheticDoc; 6] = [
        SyntheticDoc::ModelPlaceholder,
        SyntheticDoc::InferenceScript,
        SyntheticDoc::Requirements,
        SyntheticDoc::Readme,
        SyntheticDoc::ProcessingNotes,
        SyntheticDoc::SetupScript,
    ];

    #[test]
    fn test_generators_are_deterministic() {
        for doc in ALL_DOCS {
            for bundle in BundleType::all() {
                let first = doc.render(*bundle);
                let second = doc.render(*bundle);
                assert_eq!(first, second, "{} for {}", doc, bundle);
                assert!(!first.is_empty());
            }
        }
    }

    #[test]
    fn test_readme_differs_per_bundle() {
        let model = readme(BundleType::TrainedModel);
        let data = readme(BundleType::PreprocessedData);
        let project = readme(BundleType::CompleteProject);

        assert!(model.starts_with("# Trained Model Export"));
        assert!(data.starts_with("# Preprocessed Data Export"));
        assert!(project.starts_with("# Complete Project Export"));
        assert!(project.contains("setup.sh"));
        assert!(!model.contains("setup.sh"));
    }

    #[test]
    fn test_model_placeholder_marker_matches_inference_script() {
        let placeholder = model_placeholder(BundleType::TrainedModel);
        assert!(placeholder.starts_with("NO TRAINED MODEL FOUND"));
        assert!(inference_script(BundleType::TrainedModel)
            .contains("PLACEHOLDER_MARKER = b\"NO TRAINED MODEL FOUND\""));
    }

    #[test]
    fn test_setup_script_shape() {
        let script = setup_script(BundleType::CompleteProject);
        assert!(script.starts_with("#!/usr/bin/env bash\n"));
        assert!(script.contains("PYTHON=\"${PYTHON:-python3}\""));
        assert!(script.contains("pip install -r requirements.txt"));
    }

    #[test]
    fn test_requirements_per_bundle() {
        let data = requirements(BundleType::PreprocessedData);
        assert!(data.contains("pyarrow"));
        assert!(!data.contains("torch"));

        let model = requirements(BundleType::TrainedModel);
        assert!(model.contains("scikit-learn"));
        assert!(!model.contains("pyarrow"));
        assert!(model.ends_with('\n'));
    }
}
