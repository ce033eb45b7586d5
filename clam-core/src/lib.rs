//! Logic lõi: mã hóa quan sát lâm sàng thành vector đặc trưng và quyết định nguy cơ tim mạch.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Số đặc trưng mà bộ phân loại đã được huấn luyện.
pub const FEATURE_COUNT: usize = 13;

/// Thứ tự đặc trưng cố định, là hợp đồng với mô hình đã huấn luyện.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// Ngưỡng quyết định: xác suất >= 0.5 là nguy cơ cao.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Lỗi chung của pipeline đánh giá nguy cơ.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    #[error("Mô hình phân loại không khả dụng: {0}")]
    ModelUnavailable(String),
    #[error("Trường `{field}` nằm ngoài miền hợp lệ {expected}: {value}")]
    InvalidObservation {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("Bộ phân loại trả về kết quả không hợp lệ: {0}")]
    Classifier(String),
    #[error("Dịch vụ tạo diễn giải lỗi: {0}")]
    ExternalService(String),
    #[error("Không đọc được cấu hình: {0}")]
    Config(String),
}

impl RiskError {
    fn invalid(field: &'static str, value: impl fmt::Display, expected: &'static str) -> Self {
        RiskError::InvalidObservation {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Giới tính, mã hóa nam = 1, nữ = 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub fn code(self) -> u8 {
        match self {
            Sex::Female => 0,
            Sex::Male => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sex::Female => "Female",
            Sex::Male => "Male",
        }
    }
}

impl TryFrom<u8> for Sex {
    type Error = RiskError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Sex::Female),
            1 => Ok(Sex::Male),
            other => Err(RiskError::invalid("sex", other, "{0, 1}")),
        }
    }
}

impl From<Sex> for u8 {
    fn from(value: Sex) -> u8 {
        value.code()
    }
}

/// Chuyển mã 0/1 của form thành cờ boolean.
pub fn binary_flag(field: &'static str, value: u8) -> Result<bool, RiskError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RiskError::invalid(field, other, "{0, 1}")),
    }
}

// Cờ boolean trên wire là mã 0/1.
macro_rules! binary_code_field {
    ($module:ident, $field:literal) => {
        mod $module {
            use serde::{de, Deserialize, Deserializer, Serializer};

            pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(u8::from(*value))
            }

            pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
                let code = u8::deserialize(deserializer)?;
                super::binary_flag($field, code).map_err(de::Error::custom)
            }
        }
    };
}

binary_code_field!(fasting_blood_sugar_code, "fasting_blood_sugar_high");
binary_code_field!(exercise_angina_code, "exercise_angina");

// Các trường phân loại được serialize dưới dạng mã số như form nhập liệu gửi lên.
macro_rules! categorical_code {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal, $expected:literal {
            $($variant:ident = $code:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(try_from = "u8", into = "u8")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Danh sách `mã nhãn` cho phần trợ giúp của form/CLI.
            pub fn help_text() -> String {
                Self::ALL
                    .iter()
                    .map(|value| format!("{} {}", value.code(), value.label()))
                    .collect::<Vec<_>>()
                    .join(", ")
            }

            pub fn code(self) -> u8 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = RiskError;

            fn try_from(code: u8) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok($name::$variant),)+
                    other => Err(RiskError::invalid($field, other, $expected)),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value.code()
            }
        }
    };
}

categorical_code! {
    /// Loại đau ngực.
    ChestPainType, "chest_pain", "{0, 1, 2, 3}" {
        TypicalAngina = 0 => "Typical Angina",
        AtypicalAngina = 1 => "Atypical Angina",
        NonAnginal = 2 => "Non-anginal",
        Asymptomatic = 3 => "Asymptomatic",
    }
}

categorical_code! {
    /// Kết quả điện tâm đồ lúc nghỉ.
    RestingEcg, "resting_ecg", "{0, 1, 2}" {
        Normal = 0 => "Normal",
        StTAbnormality = 1 => "ST-T Wave Abnormality",
        LeftVentricularHypertrophy = 2 => "Left Ventricular Hypertrophy",
    }
}

categorical_code! {
    /// Độ dốc đoạn ST khi gắng sức.
    StSlope, "st_slope", "{0, 1, 2}" {
        Upsloping = 0 => "Upsloping",
        Flat = 1 => "Flat",
        Downsloping = 2 => "Downsloping",
    }
}

categorical_code! {
    /// Kết quả xét nghiệm thalassemia.
    Thalassemia, "thalassemia", "{1, 2, 3}" {
        Normal = 1 => "Normal",
        FixedDefect = 2 => "Fixed Defect",
        ReversibleDefect = 3 => "Reversible Defect",
    }
}

/// Một lần nhập chỉ số bệnh nhân từ form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicalObservation {
    pub age: u32,
    pub sex: Sex,
    pub chest_pain: ChestPainType,
    /// Huyết áp lúc nghỉ (mmHg).
    pub resting_bp: u32,
    /// Cholesterol (mg/dL).
    pub cholesterol: u32,
    /// Đường huyết lúc đói > 120 mg/dL.
    #[serde(with = "fasting_blood_sugar_code")]
    pub fasting_blood_sugar_high: bool,
    pub resting_ecg: RestingEcg,
    pub max_heart_rate: u32,
    #[serde(with = "exercise_angina_code")]
    pub exercise_angina: bool,
    /// ST depression (oldpeak).
    pub st_depression: f64,
    pub st_slope: StSlope,
    pub major_vessels: u32,
    pub thalassemia: Thalassemia,
}

impl ClinicalObservation {
    /// Kiểm tra từng trường số theo miền giá trị đã khai báo.
    pub fn validate(&self) -> Result<(), RiskError> {
        check_range("age", self.age, 1, 100, "[1, 100]")?;
        check_range("resting_bp", self.resting_bp, 80, 200, "[80, 200]")?;
        check_range("cholesterol", self.cholesterol, 100, 600, "[100, 600]")?;
        check_range("max_heart_rate", self.max_heart_rate, 60, 220, "[60, 220]")?;
        check_range("major_vessels", self.major_vessels, 0, 3, "[0, 3]")?;

        if !self.st_depression.is_finite() || !(0.0..=6.2).contains(&self.st_depression) {
            return Err(RiskError::invalid(
                "st_depression",
                self.st_depression,
                "[0.0, 6.2]",
            ));
        }

        Ok(())
    }
}

fn check_range(
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
    expected: &'static str,
) -> Result<(), RiskError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RiskError::invalid(field, value, expected))
    }
}

/// Giá trị mặc định cho các đặc trưng mà form rút gọn không thu thập.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureDefaults {
    pub resting_ecg: RestingEcg,
    pub st_depression: f64,
    pub st_slope: StSlope,
    pub major_vessels: u32,
}

impl Default for FeatureDefaults {
    fn default() -> Self {
        Self {
            resting_ecg: RestingEcg::Normal,
            st_depression: 1.0,
            st_slope: StSlope::Upsloping,
            major_vessels: 0,
        }
    }
}

/// Bản nháp quan sát: các trường "ẩn" có thể bỏ trống.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationDraft {
    pub age: u32,
    pub sex: Sex,
    pub chest_pain: ChestPainType,
    pub resting_bp: u32,
    pub cholesterol: u32,
    #[serde(with = "fasting_blood_sugar_code")]
    pub fasting_blood_sugar_high: bool,
    #[serde(default)]
    pub resting_ecg: Option<RestingEcg>,
    pub max_heart_rate: u32,
    #[serde(with = "exercise_angina_code")]
    pub exercise_angina: bool,
    #[serde(default)]
    pub st_depression: Option<f64>,
    #[serde(default)]
    pub st_slope: Option<StSlope>,
    #[serde(default)]
    pub major_vessels: Option<u32>,
    pub thalassemia: Thalassemia,
}

impl ObservationDraft {
    /// Điền các trường còn thiếu từ cấu hình mặc định.
    pub fn complete(self, defaults: &FeatureDefaults) -> ClinicalObservation {
        ClinicalObservation {
            age: self.age,
            sex: self.sex,
            chest_pain: self.chest_pain,
            resting_bp: self.resting_bp,
            cholesterol: self.cholesterol,
            fasting_blood_sugar_high: self.fasting_blood_sugar_high,
            resting_ecg: self.resting_ecg.unwrap_or(defaults.resting_ecg),
            max_heart_rate: self.max_heart_rate,
            exercise_angina: self.exercise_angina,
            st_depression: self.st_depression.unwrap_or(defaults.st_depression),
            st_slope: self.st_slope.unwrap_or(defaults.st_slope),
            major_vessels: self.major_vessels.unwrap_or(defaults.major_vessels),
            thalassemia: self.thalassemia,
        }
    }
}

impl From<ClinicalObservation> for ObservationDraft {
    fn from(obs: ClinicalObservation) -> Self {
        Self {
            age: obs.age,
            sex: obs.sex,
            chest_pain: obs.chest_pain,
            resting_bp: obs.resting_bp,
            cholesterol: obs.cholesterol,
            fasting_blood_sugar_high: obs.fasting_blood_sugar_high,
            resting_ecg: Some(obs.resting_ecg),
            max_heart_rate: obs.max_heart_rate,
            exercise_angina: obs.exercise_angina,
            st_depression: Some(obs.st_depression),
            st_slope: Some(obs.st_slope),
            major_vessels: Some(obs.major_vessels),
            thalassemia: obs.thalassemia,
        }
    }
}

/// Vector đặc trưng 13 phần tử theo đúng thứ tự `FEATURE_NAMES`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Lấy giá trị theo tên đặc trưng.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|idx| self.0[idx])
    }
}

impl From<[f64; FEATURE_COUNT]> for FeatureVector {
    fn from(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }
}

/// Mã hóa quan sát thành vector đặc trưng sau khi kiểm tra miền giá trị.
pub fn encode(observation: &ClinicalObservation) -> Result<FeatureVector, RiskError> {
    observation.validate()?;

    let flag = |value: bool| if value { 1.0 } else { 0.0 };

    Ok(FeatureVector([
        f64::from(observation.age),
        f64::from(observation.sex.code()),
        f64::from(observation.chest_pain.code()),
        f64::from(observation.resting_bp),
        f64::from(observation.cholesterol),
        flag(observation.fasting_blood_sugar_high),
        f64::from(observation.resting_ecg.code()),
        f64::from(observation.max_heart_rate),
        flag(observation.exercise_angina),
        observation.st_depression,
        f64::from(observation.st_slope.code()),
        f64::from(observation.major_vessels),
        f64::from(observation.thalassemia.code()),
    ]))
}

/// Nhãn nhị phân sau khi áp ngưỡng.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Positive,
    Negative,
}

impl RiskLabel {
    pub fn is_elevated(self) -> bool {
        self == RiskLabel::Positive
    }

    /// Nhãn ngắn cho giao diện.
    pub fn label(self) -> &'static str {
        match self {
            RiskLabel::Positive => "Elevated Risk",
            RiskLabel::Negative => "No Significant Risk",
        }
    }

    /// Câu trạng thái đầy đủ dùng trong báo cáo và prompt.
    pub fn status(self) -> &'static str {
        match self {
            RiskLabel::Positive => "Elevated Risk Detected",
            RiskLabel::Negative => "No Significant Risk Detected",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Áp ngưỡng cố định lên xác suất lớp dương.
pub fn decide(probability: f64) -> RiskLabel {
    if probability >= DECISION_THRESHOLD {
        RiskLabel::Positive
    } else {
        RiskLabel::Negative
    }
}

/// Kết quả chẩn đoán cho một lần gửi form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticResult {
    pub probability: f64,
    pub label: RiskLabel,
    pub status: String,
}

impl DiagnosticResult {
    pub fn from_probability(probability: f64) -> Self {
        let label = decide(probability);
        Self {
            probability,
            label,
            status: label.status().to_string(),
        }
    }

    /// Xác suất dạng phần trăm, một chữ số thập phân.
    pub fn risk_percent(&self) -> String {
        format!("{:.1}", self.probability * 100.0)
    }
}

/// Bộ phân loại nhị phân bên ngoài (mô hình đã huấn luyện sẵn).
pub trait RiskClassifier: Send + Sync {
    /// Trả về `[P(âm tính), P(dương tính)]`.
    fn predict_proba(&self, features: &FeatureVector) -> Result<[f64; 2], RiskError>;

    /// Lớp có xác suất lớn hơn; hòa thì chọn lớp âm.
    fn predict(&self, features: &FeatureVector) -> Result<u8, RiskError> {
        let [negative, positive] = self.predict_proba(features)?;
        Ok(u8::from(positive > negative))
    }
}

/// Adapter nối mã hóa, bộ phân loại và ngưỡng quyết định.
#[derive(Clone)]
pub struct RiskAdapter {
    classifier: Arc<dyn RiskClassifier>,
}

impl fmt::Debug for RiskAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskAdapter").finish_non_exhaustive()
    }
}

impl RiskAdapter {
    pub fn new(classifier: Arc<dyn RiskClassifier>) -> Self {
        Self { classifier }
    }

    pub fn encode(&self, observation: &ClinicalObservation) -> Result<FeatureVector, RiskError> {
        encode(observation)
    }

    /// Gọi bộ phân loại, không retry, không timeout.
    pub fn classify(&self, features: &FeatureVector) -> Result<f64, RiskError> {
        let [_, positive] = self.classifier.predict_proba(features)?;
        if !positive.is_finite() || !(0.0..=1.0).contains(&positive) {
            return Err(RiskError::Classifier(format!(
                "xác suất lớp dương {positive} nằm ngoài [0, 1]"
            )));
        }
        Ok(positive)
    }

    pub fn decide(&self, probability: f64) -> RiskLabel {
        decide(probability)
    }

    /// encode → classify → decide cho một quan sát.
    pub fn assess(&self, observation: &ClinicalObservation) -> Result<DiagnosticResult, RiskError> {
        let features = self.encode(observation)?;
        let probability = self.classify(&features)?;
        let result = DiagnosticResult::from_probability(probability);
        log::debug!(
            "assessment: p={probability:.4} label={:?}",
            result.label
        );
        Ok(result)
    }
}
