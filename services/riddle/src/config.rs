//! Application Configuration Module
//!
//! Loads the riddle service settings from environment variables (and a
//! `.env` file when present) into one struct handed to start-up code.

use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

// --- Application Constants ---

/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// How many seconds of audio the playback ring buffer holds.
pub const OUTPUT_BUFFER_SECS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextProvider {
    OpenAI,
    Gemini,
}

impl TextProvider {
    pub fn default_chat_model(&self) -> &'static str {
        match self {
            TextProvider::OpenAI => "gpt-4o-mini",
            TextProvider::Gemini => "gemini-2.0-flash",
        }
    }
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: TextProvider,
    pub openai_api_key: Option<SecretString>,
    pub gemini_api_key: Option<SecretString>,
    pub chat_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub speech_enabled: bool,
    pub auto_speak_feedback: bool,
    pub prompts_dir: PathBuf,
    pub http_timeout: Duration,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value)),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `RIDDLE_PROVIDER`: "openai" or "gemini". Defaults to "openai".
    // *   `OPENAI_API_KEY`: Required for the openai provider and for speech.
    // *   `GEMINI_API_KEY`: Required for the gemini provider.
    // *   `CHAT_MODEL`: (Optional) Text model. Defaults per provider.
    // *   `TTS_MODEL` / `TTS_VOICE`: (Optional) Speech model and voice.
    // *   `RIDDLE_SPEECH`: (Optional) Enable read-aloud. Defaults to true.
    // *   `RIDDLE_AUTO_SPEAK_FEEDBACK`: (Optional) Read feedback after each guess. Defaults to false.
    // *   `RIDDLE_PROMPTS_DIR`: (Optional) Directory with `riddle.md` / `verify.md` overrides.
    // *   `RIDDLE_HTTP_TIMEOUT_SECS`: (Optional) Request timeout. Defaults to 30.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider = match lookup("RIDDLE_PROVIDER") {
            None => TextProvider::OpenAI,
            Some(value) => match value.trim().to_lowercase().as_str() {
                "openai" => TextProvider::OpenAI,
                "gemini" => TextProvider::Gemini,
                _ => return Err(invalid("RIDDLE_PROVIDER", &value)),
            },
        };

        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let chat_model =
            lookup("CHAT_MODEL").unwrap_or_else(|| provider.default_chat_model().to_string());
        let tts_model = lookup("TTS_MODEL").unwrap_or_else(|| "gpt-4o-mini-tts".to_string());
        let tts_voice = lookup("TTS_VOICE").unwrap_or_else(|| "alloy".to_string());

        let speech_enabled = match lookup("RIDDLE_SPEECH") {
            Some(value) => parse_bool("RIDDLE_SPEECH", &value)?,
            None => true,
        };
        let auto_speak_feedback = match lookup("RIDDLE_AUTO_SPEAK_FEEDBACK") {
            Some(value) => parse_bool("RIDDLE_AUTO_SPEAK_FEEDBACK", &value)?,
            None => false,
        };

        let prompts_dir =
            PathBuf::from(lookup("RIDDLE_PROMPTS_DIR").unwrap_or_else(|| "prompts".to_string()));

        let http_timeout = match lookup("RIDDLE_HTTP_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(invalid("RIDDLE_HTTP_TIMEOUT_SECS", &value)),
            },
            None => Duration::from_secs(30),
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| invalid("RUST_LOG", &log_level_str))?;

        // Validate that the required API key is present for the selected provider.
        match provider {
            TextProvider::OpenAI if openai_api_key.is_none() => {
                return Err(ConfigError::MissingVar(
                    "OPENAI_API_KEY must be set for openai provider".to_string(),
                ));
            }
            TextProvider::Gemini if gemini_api_key.is_none() => {
                return Err(ConfigError::MissingVar(
                    "GEMINI_API_KEY must be set for gemini provider".to_string(),
                ));
            }
            _ => {}
        }

        Ok(Self {
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            tts_model,
            tts_voice,
            speech_enabled,
            auto_speak_feedback,
            prompts_dir,
            http_timeout,
            log_level,
        })
    }
}
