//! Narrative generation: prompt construction, chat-completion client and markdown cleanup.

use std::env;
use std::fmt;
use std::time::Duration;

use clam_core::{ClinicalObservation, RiskError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// Environment variable consulted when the config carries no key.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

const MARKDOWN_MARKERS: [&str; 3] = ["**", "*", "#"];

/// Settings for the hosted text-completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarrativeConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 1,
        }
    }
}

impl NarrativeConfig {
    /// Explicit key first, then `GROQ_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, RiskError> {
        self.api_key
            .clone()
            .or_else(|| env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                RiskError::ExternalService(format!("no API key configured (set {API_KEY_ENV})"))
            })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Build the clinical-summary prompt for one assessment.
pub fn build_prompt(
    patient_name: &str,
    observation: &ClinicalObservation,
    status: &str,
    risk_percent: &str,
) -> String {
    format!(
        "You are the C.L.A.M. AI Medical Assistant. Write a formal clinical summary for {patient_name}. \
         Stats: Age {}, BP {}, Cholesterol {}. \
         ML Prediction: {status} ({risk_percent}% Confidence). \
         STRICT INSTRUCTION: Do NOT use any markdown formatting like asterisks (** or *) or hashtags. \
         Write in plain, professional sentences. Use clear section headers like 'CLINICAL FINDINGS' and 'RECOMMENDATIONS'.",
        observation.age, observation.resting_bp, observation.cholesterol,
    )
}

/// Remove `**`, `*` and `#` left in by the model despite the instruction.
pub fn strip_markdown(text: &str) -> String {
    MARKDOWN_MARKERS
        .iter()
        .fold(text.to_string(), |acc, marker| acc.replace(marker, ""))
}

/// A stateless text-completion backend.
pub trait NarrativeService {
    fn generate(&self, prompt: &str) -> Result<String, RiskError>;
}

/// Generate and clean a narrative.
pub fn narrate(service: &dyn NarrativeService, prompt: &str) -> Result<String, RiskError> {
    let raw = service.generate(prompt)?;
    Ok(strip_markdown(&raw))
}

/// Failure of a single request attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Transport error, 429 or 5xx; another attempt may succeed.
    Transient(RiskError),
    /// Rejected request or unreadable reply; retrying repeats the failure.
    Fatal(RiskError),
}

impl AttemptError {
    pub fn into_error(self) -> RiskError {
        match self {
            AttemptError::Transient(err) | AttemptError::Fatal(err) => err,
        }
    }
}

/// Statuses worth retrying: rate limiting and server-side failures.
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run `op`, retrying transient failures up to `max_retries` more times.
pub fn with_retry<T>(
    max_retries: u32,
    mut op: impl FnMut() -> Result<T, AttemptError>,
) -> Result<T, RiskError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(AttemptError::Transient(err)) if attempt < max_retries => {
                attempt += 1;
                log::warn!("narrative request failed (attempt {attempt}): {err}; retrying");
            }
            Err(err) => return Err(err.into_error()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Extract `choices[0].message.content` from a chat-completion response body.
pub fn parse_completion(body: &str) -> Result<String, RiskError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|err| RiskError::ExternalService(format!("malformed completion: {err}")))?;
    completion_content(response)
}

fn completion_content(response: ChatResponse) -> Result<String, RiskError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| RiskError::ExternalService("completion has no content".to_string()))
}

/// OpenAI-compatible chat-completion client (Groq by default).
pub struct ChatCompletionClient {
    http: reqwest::blocking::Client,
    config: NarrativeConfig,
    api_key: String,
}

impl fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionClient {
    pub fn new(config: NarrativeConfig) -> Result<Self, RiskError> {
        let api_key = config.resolve_api_key()?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| RiskError::ExternalService(format!("cannot build HTTP client: {err}")))?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    fn request_once(&self, prompt: &str) -> Result<String, AttemptError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|err| {
                AttemptError::Transient(RiskError::ExternalService(format!("request failed: {err}")))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            let err = RiskError::ExternalService(format!(
                "service returned {status}: {}",
                detail.trim()
            ));
            return Err(if is_retryable_status(status) {
                AttemptError::Transient(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let payload: ChatResponse = response.json().map_err(|err| {
            AttemptError::Fatal(RiskError::ExternalService(format!("malformed completion: {err}")))
        })?;
        completion_content(payload).map_err(AttemptError::Fatal)
    }
}

impl NarrativeService for ChatCompletionClient {
    fn generate(&self, prompt: &str) -> Result<String, RiskError> {
        log::debug!("requesting narrative from {}", self.config.completions_url());
        with_retry(self.config.max_retries, || self.request_once(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clam_core::{ChestPainType, RestingEcg, Sex, StSlope, Thalassemia};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn observation() -> ClinicalObservation {
        ClinicalObservation {
            age: 58,
            sex: Sex::Male,
            chest_pain: ChestPainType::Asymptomatic,
            resting_bp: 145,
            cholesterol: 312,
            fasting_blood_sugar_high: false,
            resting_ecg: RestingEcg::Normal,
            max_heart_rate: 132,
            exercise_angina: true,
            st_depression: 2.1,
            st_slope: StSlope::Flat,
            major_vessels: 1,
            thalassemia: Thalassemia::ReversibleDefect,
        }
    }

    struct CannedService(&'static str);

    impl NarrativeService for CannedService {
        fn generate(&self, _: &str) -> Result<String, RiskError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn prompt_carries_vitals_and_outcome() {
        let prompt = build_prompt("Jane Roe", &observation(), "Elevated Risk Detected", "73.0");
        assert!(prompt.contains("clinical summary for Jane Roe."));
        assert!(prompt.contains("Stats: Age 58, BP 145, Cholesterol 312."));
        assert!(prompt.contains("ML Prediction: Elevated Risk Detected (73.0% Confidence)."));
        assert!(prompt.contains("'CLINICAL FINDINGS' and 'RECOMMENDATIONS'"));
    }

    #[test]
    fn strips_markdown_markers() {
        assert_eq!(
            strip_markdown("## CLINICAL FINDINGS\n**Age** is *58*."),
            " CLINICAL FINDINGS\nAge is 58."
        );
        assert_eq!(strip_markdown("plain text"), "plain text");
    }

    #[test]
    fn narrate_cleans_service_output() {
        let text = narrate(&CannedService("# RECOMMENDATIONS\n*Rest*"), "prompt").expect("narrate");
        assert_eq!(text, " RECOMMENDATIONS\nRest");
    }

    #[test]
    fn parses_first_choice_content() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"CLINICAL FINDINGS\nStable."}}]}"#;
        assert_eq!(parse_completion(body).expect("content"), "CLINICAL FINDINGS\nStable.");
    }

    #[test]
    fn empty_completion_is_service_failure() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(RiskError::ExternalService(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":"  "}}]}"#),
            Err(RiskError::ExternalService(_))
        ));
        assert!(parse_completion("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn retries_once_then_succeeds() {
        let calls = Cell::new(0);
        let result = with_retry(1, || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(AttemptError::Transient(RiskError::ExternalService(
                    "timeout".to_string(),
                )))
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn gives_up_after_single_retry() {
        let calls = Cell::new(0);
        let result: Result<(), RiskError> = with_retry(1, || {
            calls.set(calls.get() + 1);
            Err(AttemptError::Transient(RiskError::ExternalService(
                "down".to_string(),
            )))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn rejected_request_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), RiskError> = with_retry(1, || {
            calls.set(calls.get() + 1);
            Err(AttemptError::Fatal(RiskError::ExternalService(
                "service returned 401 Unauthorized".to_string(),
            )))
        });
        assert_eq!(
            result,
            Err(RiskError::ExternalService(
                "service returned 401 Unauthorized".to_string()
            ))
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn only_server_side_statuses_are_retryable() {
        use reqwest::StatusCode;

        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        let config = NarrativeConfig {
            api_key: Some("test-key".to_string()),
            ..NarrativeConfig::default()
        };
        assert_eq!(config.resolve_api_key(), Ok("test-key".to_string()));
    }

    #[test]
    fn completions_url_ignores_trailing_slash() {
        let config = NarrativeConfig {
            base_url: "https://api.groq.com/openai/v1/".to_string(),
            ..NarrativeConfig::default()
        };
        assert_eq!(
            config.completions_url(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn unreachable_service_is_reported() {
        let config = NarrativeConfig {
            base_url: "http://127.0.0.1:1/v1/".to_string(),
            api_key: Some("test-key".to_string()),
            timeout_secs: 2,
            max_retries: 0,
            ..NarrativeConfig::default()
        };
        let client = ChatCompletionClient::new(config).expect("client");
        assert!(matches!(
            client.generate("prompt"),
            Err(RiskError::ExternalService(_))
        ));
    }
}
