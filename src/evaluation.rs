use crate::imaging;
use crate::model::Evaluation;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Work sample as a data URL (normally the normalized JPEG).
    pub image: String,
    pub class_name: String,
    pub reference_text: String,
}

/// Callers only ever see one failure class; the variants exist for logs.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("evaluation request failed: {0}")]
    Transport(String),
    #[error("evaluation service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("evaluation response could not be parsed: {0}")]
    Malformed(String),
    #[error("work image could not be prepared: {0}")]
    Image(String),
}

impl EvaluationError {
    pub fn code(&self) -> &'static str {
        "evaluation_failed"
    }
}

pub trait Evaluator {
    fn kind(&self) -> &'static str;
    fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation, EvaluationError>;
}

pub struct GeminiEvaluator {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiEvaluator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

impl Evaluator for GeminiEvaluator {
    fn kind(&self) -> &'static str {
        "gemini"
    }

    fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation, EvaluationError> {
        let body = build_request_body(request)?;
        debug!(model = %self.model, class = %request.class_name, "sending evaluation request");

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| EvaluationError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| EvaluationError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(EvaluationError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| EvaluationError::Malformed(e.to_string()))?;
        parse_generate_response(&value)
    }
}

/// Serves a fixed evaluation from a JSON file; used offline and in tests.
pub struct FixtureEvaluator {
    path: PathBuf,
}

impl FixtureEvaluator {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Evaluator for FixtureEvaluator {
    fn kind(&self) -> &'static str {
        "fixture"
    }

    fn evaluate(&self, _request: &EvaluationRequest) -> Result<Evaluation, EvaluationError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "fixture evaluation unreadable");
            EvaluationError::Transport(e.to_string())
        })?;
        serde_json::from_str(&text).map_err(|e| EvaluationError::Malformed(e.to_string()))
    }
}

fn instruction_text(class_name: &str, reference_text: &str) -> String {
    let reference = if reference_text.trim().is_empty() {
        "No reference text was provided.".to_string()
    } else {
        format!("Reference text for this assignment:\n\"\"\"\n{}\n\"\"\"", reference_text.trim())
    };
    format!(
        "You are an experienced primary school teacher grading a handwritten story \
written by a student in class {class_name}.\n\
{reference}\n\n\
Read the handwriting in the image and return a JSON object that follows the schema:\n\
- transcribedText: the text exactly as written by the student.\n\
- handwritingScore, originalityScore, creativityScore, overallScore: integers from 0 to 100.\n\
- punctuationErrors: each punctuation or spelling mistake, described briefly.\n\
- conceptKnowledge: how well the student uses the concepts expected at this level.\n\
- plagiarismNote: how closely the text follows the reference text, if any.\n\
- weaknesses: the main areas the student should work on.\n\
- suggestions: concrete {{topic, action}} pairs the teacher can assign.\n\
Write every note in the language the student wrote in."
    )
}

fn response_schema() -> serde_json::Value {
    let string_list = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    json!({
        "type": "OBJECT",
        "properties": {
            "handwritingScore": { "type": "NUMBER" },
            "originalityScore": { "type": "NUMBER" },
            "creativityScore": { "type": "NUMBER" },
            "overallScore": { "type": "NUMBER" },
            "punctuationErrors": string_list.clone(),
            "conceptKnowledge": { "type": "STRING" },
            "transcribedText": { "type": "STRING" },
            "plagiarismNote": { "type": "STRING" },
            "weaknesses": string_list,
            "suggestions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "topic": { "type": "STRING" },
                        "action": { "type": "STRING" }
                    },
                    "required": ["topic", "action"]
                }
            }
        },
        "required": [
            "handwritingScore",
            "originalityScore",
            "creativityScore",
            "overallScore",
            "punctuationErrors",
            "conceptKnowledge",
            "transcribedText",
            "plagiarismNote",
            "weaknesses",
            "suggestions"
        ]
    })
}

pub fn build_request_body(request: &EvaluationRequest) -> Result<serde_json::Value, EvaluationError> {
    let (mime, _) = imaging::decode_data_url(&request.image)
        .map_err(|e| EvaluationError::Image(e.to_string()))?;
    let payload = match request.image.split_once(',') {
        Some((_, p)) if request.image.starts_with("data:") => p.trim().to_string(),
        _ => request.image.trim().to_string(),
    };
    Ok(json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": mime.unwrap_or_else(|| "image/jpeg".to_string()),
                        "data": payload,
                    }
                },
                { "text": instruction_text(&request.class_name, &request.reference_text) }
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
        }
    }))
}

/// Pulls the first candidate's text part and parses it as an Evaluation.
pub fn parse_generate_response(value: &serde_json::Value) -> Result<Evaluation, EvaluationError> {
    let text = value
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .and_then(|parts| {
            parts
                .iter()
                .find_map(|p| p.get("text").and_then(|t| t.as_str()))
        })
        .ok_or_else(|| EvaluationError::Malformed("response has no candidate text".into()))?;

    let trimmed = strip_code_fence(text);
    serde_json::from_str(trimmed).map_err(|e| EvaluationError::Malformed(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
