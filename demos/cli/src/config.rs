//! Cấu hình CLI đọc từ file JSON.

use std::fs;
use std::path::{Path, PathBuf};

use clam_core::{FeatureDefaults, RiskError};
use clam_narrative::NarrativeConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClamConfig {
    /// Ghi đè vị trí artifact mô hình (mặc định cạnh file thực thi).
    pub model_path: Option<PathBuf>,
    pub feature_defaults: FeatureDefaults,
    pub narrative: NarrativeConfig,
}

impl ClamConfig {
    pub fn parse(data: &str) -> Result<Self, RiskError> {
        serde_json::from_str(data).map_err(|err| RiskError::Config(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, RiskError> {
        let data = fs::read_to_string(path)
            .map_err(|err| RiskError::Config(format!("{}: {err}", path.display())))?;
        Self::parse(&data)
    }
}
