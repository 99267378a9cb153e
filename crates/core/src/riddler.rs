use crate::error::RiddleError;
use crate::prompt::OutputShape;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A riddle as produced by the text service. Both fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Riddle {
    pub text: String,
    pub answer: String,
}

impl Riddle {
    pub fn new(text: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            answer: answer.into(),
        }
    }
}

// The `Riddler` trait is the seam between the session and whichever
// generative text provider is configured. The session only ever hands it a
// finished prompt and gets back a parsed, typed result.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Riddler: Send + Sync {
    /// Asks for one riddle. Fails with `MalformedResponse` when the reply
    /// lacks the `riddle` or `answer` field.
    async fn generate_riddle(&self, prompt: &str) -> Result<Riddle, RiddleError>;

    /// Asks the judge whether a guess is correct.
    async fn verify_guess(&self, prompt: &str) -> Result<bool, RiddleError>;
}

/// Parses a `{"riddle": ..., "answer": ...}` reply.
pub fn parse_riddle(raw: &str) -> Result<Riddle, RiddleError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))?;
    let field = |name: &str| -> Result<String, RiddleError> {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                RiddleError::MalformedResponse(format!("missing '{name}' field in: {raw}"))
            })
    };
    Ok(Riddle {
        text: field("riddle")?,
        answer: field("answer")?,
    })
}

/// Parses a `{"isCorrect": ...}` reply.
///
/// Accepts a JSON boolean, the strings "true"/"false" and the numbers 1/0
/// (integer or float).
pub fn parse_verdict(raw: &str) -> Result<bool, RiddleError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))?;
    let verdict = match value.get("isCorrect") {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    };
    verdict.ok_or_else(|| {
        RiddleError::MalformedResponse(format!("missing or invalid 'isCorrect' field in: {raw}"))
    })
}

// Models occasionally wrap JSON in a markdown fence even when asked not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
        _ => inner,
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: Option<String>,
}

impl LlmResponse {
    fn into_content(self) -> Result<String, RiddleError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RiddleError::MalformedResponse("No response from LLM".to_string()))
    }
}

/// `Riddler` backed by the OpenAI chat completions endpoint.
pub struct RiddlerClient {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl RiddlerClient {
    /// The `reqwest::Client` is shared with the other HTTP collaborators and
    /// carries the configured timeout.
    pub fn new(client: Client, api_key: SecretString, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, prompt: &str, shape: OutputShape, temperature: f32) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": shape.name(),
                    "strict": true,
                    "schema": shape.json_schema()
                }
            },
            "temperature": temperature
        })
    }

    async fn complete(
        &self,
        prompt: &str,
        shape: OutputShape,
        temperature: f32,
    ) -> Result<String, RiddleError> {
        let body = self.request_body(prompt, shape, temperature);
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<LlmResponse>()
            .await?;
        resp.into_content()
    }
}

#[async_trait]
impl Riddler for RiddlerClient {
    async fn generate_riddle(&self, prompt: &str) -> Result<Riddle, RiddleError> {
        // Some variety between riddles is wanted here.
        let content = self.complete(prompt, OutputShape::Riddle, 0.9).await?;
        tracing::debug!("Riddle completion: {:?}", content);
        parse_riddle(&content)
    }

    async fn verify_guess(&self, prompt: &str) -> Result<bool, RiddleError> {
        let content = self.complete(prompt, OutputShape::Verdict, 0.0).await?;
        tracing::debug!("Verdict completion: {:?}", content);
        parse_verdict(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Language};
    use crate::history::RiddleHistory;
    use crate::prompt::PromptTemplates;
    use std::env;

    #[test]
    fn test_parse_riddle_keeps_text_verbatim() {
        let raw = r#"{"riddle": "Was hat vier Beine und kann nicht laufen?", "answer": "Ein Tisch"}"#;
        let riddle = parse_riddle(raw).unwrap();
        assert_eq!(
            riddle,
            Riddle::new("Was hat vier Beine und kann nicht laufen?", "Ein Tisch")
        );
    }

    #[test]
    fn test_parse_riddle_missing_answer_is_malformed() {
        let err = parse_riddle(r#"{"riddle": "Wer bin ich?"}"#).unwrap_err();
        assert!(matches!(err, RiddleError::MalformedResponse(_)));

        let err = parse_riddle(r#"{"riddle": "Wer bin ich?", "answer": 4}"#).unwrap_err();
        assert!(matches!(err, RiddleError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_riddle_rejects_non_json() {
        let err = parse_riddle("Here is a riddle for you!").unwrap_err();
        assert!(matches!(err, RiddleError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_riddle_strips_markdown_fence() {
        let raw = "```json\n{\"riddle\": \"Wer bin ich?\", \"answer\": \"Ein Schatten\"}\n```";
        assert_eq!(parse_riddle(raw).unwrap().answer, "Ein Schatten");

        let raw = "```JSON\n{\"riddle\": \"Wer bin ich?\", \"answer\": \"Ein Schatten\"}\n```";
        assert_eq!(parse_riddle(raw).unwrap().answer, "Ein Schatten");
        assert!(parse_verdict("```Json\n{\"isCorrect\": true}\n```").unwrap());
    }

    #[test]
    fn test_parse_verdict_coerces_booleanish_values() {
        assert!(parse_verdict(r#"{"isCorrect": true}"#).unwrap());
        assert!(!parse_verdict(r#"{"isCorrect": false}"#).unwrap());
        assert!(parse_verdict(r#"{"isCorrect": " TRUE "}"#).unwrap());
        assert!(!parse_verdict(r#"{"isCorrect": 0}"#).unwrap());
        assert!(parse_verdict(r#"{"isCorrect": 1}"#).unwrap());
        assert!(parse_verdict(r#"{"isCorrect": 1.0}"#).unwrap());
        assert!(!parse_verdict(r#"{"isCorrect": 0.0}"#).unwrap());
    }

    #[test]
    fn test_parse_verdict_rejects_missing_or_odd_values() {
        for raw in [
            r#"{}"#,
            r#"{"correct": true}"#,
            r#"{"isCorrect": "maybe"}"#,
            r#"{"isCorrect": 2}"#,
            r#"{"isCorrect": 0.5}"#,
            r#"{"isCorrect": null}"#,
        ] {
            let err = parse_verdict(raw).unwrap_err();
            assert!(
                matches!(err, RiddleError::MalformedResponse(_)),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn test_empty_choices_are_malformed() {
        let resp: LlmResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            resp.into_content(),
            Err(RiddleError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_body_asks_for_strict_schema() {
        let client = RiddlerClient::new(
            Client::new(),
            SecretString::from("sk-test".to_string()),
            "gpt-4o-mini".to_string(),
        );
        let body = client.request_body("prompt", OutputShape::Riddle, 0.9);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["content"], "prompt");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["required"],
            serde_json::json!(["riddle", "answer"])
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = RiddlerClient::new(
            Client::new(),
            SecretString::from("sk-test".to_string()),
            "gpt-4o-mini".to_string(),
        )
        .with_base_url("http://127.0.0.1:9");

        let err = client.generate_riddle("prompt").await.unwrap_err();
        assert!(matches!(err, RiddleError::Transport(_)), "got {err:?}");
    }

    // This is an integration test that makes a live call to the OpenAI API.
    // It is ignored by default. Run it with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_generate_and_verify() {
        dotenvy::dotenv_override().ok();
        let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        let client = RiddlerClient::new(
            Client::new(),
            SecretString::from(api_key),
            "gpt-4o-mini".to_string(),
        );
        let templates = PromptTemplates::default();

        let prompt = templates.riddle_prompt(Category::Funny, Language::German, &RiddleHistory::new());
        let riddle = client.generate_riddle(&prompt).await.expect("riddle");
        println!("Riddle: {riddle:?}");

        let prompt = templates.verify_prompt(Language::German, &riddle.text, &riddle.answer, &riddle.answer);
        assert!(client.verify_guess(&prompt).await.expect("verdict"));
    }
}
