use crate::error::RiddleError;
use crate::prompt::OutputShape;
use crate::riddler::{Riddle, Riddler, parse_riddle, parse_verdict};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A `Riddler` backed by Gemini's `generateContent` endpoint.
///
/// Structured output is requested through `responseSchema`, which uses
/// Gemini's OpenAPI-style type names rather than JSON Schema.
pub struct GeminiRiddler {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, RiddleError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(RiddleError::MalformedResponse(
                "No candidate text from Gemini".to_string(),
            ));
        }
        Ok(text)
    }
}

fn response_schema(shape: OutputShape) -> Value {
    match shape {
        OutputShape::Riddle => json!({
            "type": "OBJECT",
            "properties": {
                "riddle": { "type": "STRING" },
                "answer": { "type": "STRING" }
            },
            "required": ["riddle", "answer"]
        }),
        OutputShape::Verdict => json!({
            "type": "OBJECT",
            "properties": {
                "isCorrect": { "type": "BOOLEAN" }
            },
            "required": ["isCorrect"]
        }),
    }
}

impl GeminiRiddler {
    pub fn new(client: Client, api_key: SecretString, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request_body(prompt: &str, shape: OutputShape, temperature: f32) -> Value {
        json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(shape),
                "temperature": temperature
            }
        })
    }

    async fn generate(
        &self,
        prompt: &str,
        shape: OutputShape,
        temperature: f32,
    ) -> Result<String, RiddleError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&Self::request_body(prompt, shape, temperature))
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateContentResponse>()
            .await?;
        resp.into_text()
    }
}

#[async_trait]
impl Riddler for GeminiRiddler {
    async fn generate_riddle(&self, prompt: &str) -> Result<Riddle, RiddleError> {
        let text = self.generate(prompt, OutputShape::Riddle, 0.9).await?;
        tracing::debug!("Gemini riddle: {:?}", text);
        parse_riddle(&text)
    }

    async fn verify_guess(&self, prompt: &str) -> Result<bool, RiddleError> {
        let text = self.generate(prompt, OutputShape::Verdict, 0.0).await?;
        tracing::debug!("Gemini verdict: {:?}", text);
        parse_verdict(&text)
    }
}
