//! Classifier artifact loader and logistic-regression inference for `clam-core`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use clam_core::{FeatureVector, RiskClassifier, RiskError, FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed artifact filename, resolved next to the running executable.
pub const MODEL_FILE_NAME: &str = "heart_model.json";

/// Serialized form of the trained classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
    /// Hold-out accuracy reported by the training run, in `[0, 1]`.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Per-feature standardization applied before the linear score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Validated, immutable logistic-regression model.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticModel {
    coefficients: [f64; FEATURE_COUNT],
    intercept: f64,
    scaler: Option<Scaler>,
    accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Scaler {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl LogisticModel {
    /// Validate an artifact against the feature-order contract.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, RiskError> {
        check_feature_order(&artifact.feature_names)?;

        let coefficients = to_fixed("coefficients", &artifact.coefficients)?;
        if !artifact.intercept.is_finite() {
            return Err(unavailable("intercept is not finite"));
        }

        let scaler = match artifact.scaler {
            Some(raw) => {
                let mean = to_fixed("scaler.mean", &raw.mean)?;
                let scale = to_fixed("scaler.scale", &raw.scale)?;
                if let Some(idx) = scale.iter().position(|value| *value == 0.0) {
                    return Err(unavailable(&format!(
                        "scaler.scale is zero for feature `{}`",
                        FEATURE_NAMES[idx]
                    )));
                }
                Some(Scaler { mean, scale })
            }
            None => None,
        };

        let accuracy = match artifact.accuracy {
            Some(value) if !(0.0..=1.0).contains(&value) => {
                return Err(unavailable(&format!("accuracy {value} outside [0, 1]")))
            }
            other => other,
        };

        Ok(Self {
            coefficients,
            intercept: artifact.intercept,
            scaler,
            accuracy,
        })
    }

    /// Reported accuracy of the artifact, if present.
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    fn score(&self, features: &FeatureVector) -> f64 {
        let values = features.as_slice();
        let mut score = self.intercept;
        for idx in 0..FEATURE_COUNT {
            let value = match &self.scaler {
                Some(scaler) => (values[idx] - scaler.mean[idx]) / scaler.scale[idx],
                None => values[idx],
            };
            score += self.coefficients[idx] * value;
        }
        score
    }
}

impl RiskClassifier for LogisticModel {
    fn predict_proba(&self, features: &FeatureVector) -> Result<[f64; 2], RiskError> {
        let positive = sigmoid(self.score(features));
        Ok([1.0 - positive, positive])
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn check_feature_order(names: &[String]) -> Result<(), RiskError> {
    if names.len() != FEATURE_COUNT {
        return Err(unavailable(&format!(
            "expected {FEATURE_COUNT} feature names, found {}",
            names.len()
        )));
    }

    for (idx, (actual, expected)) in names.iter().zip(FEATURE_NAMES).enumerate() {
        if actual != expected {
            return Err(unavailable(&format!(
                "feature #{idx} is `{actual}`, expected `{expected}`"
            )));
        }
    }
    Ok(())
}

fn to_fixed(field: &str, values: &[f64]) -> Result<[f64; FEATURE_COUNT], RiskError> {
    let fixed: [f64; FEATURE_COUNT] = values.try_into().map_err(|_| {
        unavailable(&format!(
            "{field} has {} values, expected {FEATURE_COUNT}",
            values.len()
        ))
    })?;

    if let Some(idx) = fixed.iter().position(|value| !value.is_finite()) {
        return Err(unavailable(&format!(
            "{field} is not finite for feature `{}`",
            FEATURE_NAMES[idx]
        )));
    }
    Ok(fixed)
}

fn unavailable(reason: &str) -> RiskError {
    RiskError::ModelUnavailable(reason.to_string())
}

/// Parse a model artifact from a JSON string.
pub fn load_model_str(artifact_json: &str) -> Result<LogisticModel, RiskError> {
    let artifact: ModelArtifact = serde_json::from_str(artifact_json)
        .map_err(|err| unavailable(&format!("malformed artifact: {err}")))?;
    LogisticModel::from_artifact(artifact)
}

/// Parse a model artifact from a `serde_json::Value`.
pub fn load_model_value(artifact: &Value) -> Result<LogisticModel, RiskError> {
    let artifact = ModelArtifact::deserialize(artifact)
        .map_err(|err| unavailable(&format!("malformed artifact: {err}")))?;
    LogisticModel::from_artifact(artifact)
}

/// Read and validate the artifact at `path`.
pub fn load_model(path: &Path) -> Result<LogisticModel, RiskError> {
    let data = fs::read_to_string(path)
        .map_err(|err| unavailable(&format!("cannot read {}: {err}", path.display())))?;
    let model = load_model_str(&data)?;
    log::info!("loaded classifier artifact from {}", path.display());
    Ok(model)
}

/// `heart_model.json` in the directory of the running executable.
pub fn default_model_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(MODEL_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(MODEL_FILE_NAME))
}

/// Once-initialized handle to the classifier artifact.
///
/// The file is read on first access only; the outcome (model or error) is
/// cached for the lifetime of the handle and shared read-only afterwards.
#[derive(Debug)]
pub struct SharedModel {
    path: PathBuf,
    cell: OnceLock<Result<Arc<LogisticModel>, RiskError>>,
}

impl SharedModel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceLock::new(),
        }
    }

    /// Handle for the artifact next to the executable.
    pub fn beside_executable() -> Self {
        Self::new(default_model_path())
    }

    /// Handle around an already validated model.
    pub fn preloaded(model: LogisticModel) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(Arc::new(model)));
        Self {
            path: PathBuf::new(),
            cell,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<Arc<LogisticModel>, RiskError> {
        self.cell
            .get_or_init(|| {
                load_model(&self.path).map(Arc::new).map_err(|err| {
                    log::warn!("classifier disabled: {err}");
                    err
                })
            })
            .clone()
    }

    /// The model as the trait object expected by `clam_core::RiskAdapter`.
    pub fn classifier(&self) -> Result<Arc<dyn RiskClassifier>, RiskError> {
        let model: Arc<dyn RiskClassifier> = self.get()?;
        Ok(model)
    }

    pub fn is_available(&self) -> bool {
        self.get().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            coefficients: vec![0.0; FEATURE_COUNT],
            intercept: 0.0,
            scaler: None,
            accuracy: Some(0.88),
        }
    }

    #[test]
    fn zero_model_is_undecided() {
        let model = LogisticModel::from_artifact(artifact()).expect("model");
        let features = FeatureVector::from([1.0; FEATURE_COUNT]);
        let [negative, positive] = model.predict_proba(&features).expect("proba");
        assert_eq!(positive, 0.5);
        assert_eq!(negative, 0.5);
        assert_eq!(model.accuracy(), Some(0.88));
    }

    #[test]
    fn sigmoid_is_stable_for_large_scores() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn swapped_feature_order_is_rejected() {
        let mut raw = artifact();
        raw.feature_names.swap(0, 1);
        let err = LogisticModel::from_artifact(raw).unwrap_err();
        assert!(matches!(err, RiskError::ModelUnavailable(msg) if msg.contains("feature #0")));
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        let mut raw = artifact();
        raw.coefficients.pop();
        assert!(LogisticModel::from_artifact(raw).is_err());

        let mut raw = artifact();
        raw.feature_names.push("extra".to_string());
        assert!(LogisticModel::from_artifact(raw).is_err());
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut raw = artifact();
        let mut scale = vec![1.0; FEATURE_COUNT];
        scale[4] = 0.0;
        raw.scaler = Some(StandardScaler {
            mean: vec![0.0; FEATURE_COUNT],
            scale,
        });
        let err = LogisticModel::from_artifact(raw).unwrap_err();
        assert!(matches!(err, RiskError::ModelUnavailable(msg) if msg.contains("chol")));
    }

    #[test]
    fn malformed_json_is_model_unavailable() {
        assert!(matches!(
            load_model_str("{ not json"),
            Err(RiskError::ModelUnavailable(_))
        ));
        assert!(matches!(
            load_model_value(&serde_json::json!({ "intercept": 1.0 })),
            Err(RiskError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn default_path_uses_fixed_file_name() {
        assert!(default_model_path().ends_with(MODEL_FILE_NAME));
    }

    #[test]
    fn preloaded_handle_is_available() {
        let model = LogisticModel::from_artifact(artifact()).expect("model");
        let shared = SharedModel::preloaded(model);
        assert!(shared.is_available());
        assert!(shared.classifier().is_ok());
    }
}
