//! Bridge WASM <-> JavaScript trung lập framework cho form đánh giá nguy cơ.

use std::sync::Arc;

use clam_core::{DiagnosticResult, FeatureDefaults, ObservationDraft, RiskAdapter, RiskError};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Đánh giá một lần gửi form: `observation` là bản nháp, `model` là JSON artifact.
#[wasm_bindgen]
pub fn assess_observation(
    observation: JsValue,
    model: JsValue,
    defaults: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let draft = from_value::<ObservationDraft>(observation)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được dữ liệu bệnh nhân: {err}")))?;

    let model_value = from_value::<serde_json::Value>(model)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được artifact mô hình: {err}")))?;

    let defaults = match defaults {
        // Trường thiếu lấy giá trị mặc định.
        Some(js_cfg) => from_value::<FeatureDefaults>(js_cfg)
            .map_err(|err| JsValue::from_str(&format!("Không đọc được config: {err}")))?,
        None => FeatureDefaults::default(),
    };

    let result = assess_draft(draft, &model_value, &defaults)
        .map_err(|err| JsValue::from_str(&format_risk_error(err)))?;

    to_value(&result).map_err(|err| JsValue::from_str(&format!("Không serialize kết quả: {err}")))
}

fn assess_draft(
    draft: ObservationDraft,
    model: &serde_json::Value,
    defaults: &FeatureDefaults,
) -> Result<DiagnosticResult, RiskError> {
    let classifier = clam_model::load_model_value(model)?;
    let adapter = RiskAdapter::new(Arc::new(classifier));
    adapter.assess(&draft.complete(defaults))
}

fn format_risk_error(err: RiskError) -> String {
    format!("Risk error: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clam_core::{RiskLabel, FEATURE_COUNT, FEATURE_NAMES};
    use serde_json::json;

    fn neutral_model(intercept: f64) -> serde_json::Value {
        json!({
            "feature_names": FEATURE_NAMES,
            "coefficients": vec![0.0; FEATURE_COUNT],
            "intercept": intercept,
        })
    }

    fn draft() -> ObservationDraft {
        serde_json::from_value(json!({
            "age": 44, "sex": 1, "chest_pain": 1, "resting_bp": 130,
            "cholesterol": 233, "fasting_blood_sugar_high": 1,
            "max_heart_rate": 160, "exercise_angina": 0, "thalassemia": 2
        }))
        .expect("draft")
    }

    #[test]
    fn positive_intercept_is_elevated() {
        let result = assess_draft(draft(), &neutral_model(2.0), &FeatureDefaults::default())
            .expect("assess");
        assert_eq!(result.label, RiskLabel::Positive);
    }

    #[test]
    fn missing_model_fields_surface_as_error() {
        let err = assess_draft(draft(), &json!({}), &FeatureDefaults::default()).unwrap_err();
        assert!(format_risk_error(err).starts_with("Risk error: "));
    }

    #[test]
    fn partial_defaults_keep_remaining_fields() {
        let defaults: FeatureDefaults =
            serde_json::from_value(json!({ "st_depression": 3.0 })).expect("cfg");
        assert_eq!(defaults.st_depression, 3.0);
        assert_eq!(defaults.st_slope, FeatureDefaults::default().st_slope);
        assert_eq!(defaults.major_vessels, FeatureDefaults::default().major_vessels);

        let result = assess_draft(draft(), &neutral_model(0.0), &defaults).expect("assess");
        assert_eq!(result.probability, 0.5);
    }

    #[test]
    fn form_codes_are_required_for_sex() {
        let raw = json!({
            "age": 44, "sex": "male", "chest_pain": 1, "resting_bp": 130,
            "cholesterol": 233, "fasting_blood_sugar_high": 1,
            "max_heart_rate": 160, "exercise_angina": 0, "thalassemia": 2
        });
        assert!(serde_json::from_value::<ObservationDraft>(raw).is_err());
    }
}
