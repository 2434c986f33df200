//! Prediction collaborator backed by an LLM messages API. The model is asked
//! for a JSON object matching the prediction schema; anything else is a
//! `PredictionError`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::PredictionError;
use crate::models::Prediction;
use crate::predict::{
    validate_prediction, PredictionRequest, Predictor, MAX_RECOMMENDATIONS, MIN_RECOMMENDATIONS,
};

pub struct LlmPredictor {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    text: String,
}

impl LlmPredictor {
    pub fn new(config: LlmConfig) -> Result<Self, PredictionError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| PredictionError::NotConfigured("LLM_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    async fn call_api(&self, prompt: String) -> Result<String, PredictionError> {
        debug!(model = %self.config.model, "calling prediction model");

        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system_prompt(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PredictionError::Upstream { status, body });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| PredictionError::Parse(format!("malformed response body: {e}")))?;

        body.content
            .into_iter()
            .map(|c| c.text)
            .find(|text| !text.trim().is_empty())
            .ok_or_else(|| PredictionError::Parse("empty response from model".to_string()))
    }
}

#[async_trait]
impl Predictor for LlmPredictor {
    async fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError> {
        let text = self.call_api(request.prompt()).await?;
        parse_prediction(&text)
    }
}

fn map_transport_error(err: reqwest::Error) -> PredictionError {
    if err.is_timeout() {
        PredictionError::Timeout
    } else {
        PredictionError::Http(err)
    }
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "predicted_gpa": { "type": "number", "minimum": 0, "maximum": 4 },
            "risk_level": { "type": "string", "enum": ["Low", "Medium", "High"] },
            "confidence_score": { "type": "number", "minimum": 0, "maximum": 100 },
            "recommendations": {
                "type": "array",
                "items": { "type": "string" },
                "minItems": MIN_RECOMMENDATIONS,
                "maxItems": MAX_RECOMMENDATIONS
            }
        },
        "required": ["predicted_gpa", "risk_level", "confidence_score", "recommendations"]
    })
}

fn system_prompt() -> String {
    format!(
        "You are an academic advising assistant. Reply with a single JSON object and nothing else. \
         The object must satisfy this JSON schema:\n{}",
        response_schema()
    )
}

/// Pulls the JSON object out of a model reply (tolerating prose or code
/// fences around it) and checks it against the schema.
pub fn parse_prediction(text: &str) -> Result<Prediction, PredictionError> {
    let start = text
        .find('{')
        .ok_or_else(|| PredictionError::Parse("no JSON object in reply".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| PredictionError::Parse("unterminated JSON object in reply".to_string()))?;

    let prediction: Prediction = serde_json::from_str(&text[start..=end])
        .map_err(|e| PredictionError::Parse(e.to_string()))?;
    validate_prediction(&prediction)?;
    Ok(prediction)
}
