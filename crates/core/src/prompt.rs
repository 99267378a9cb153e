//! Prompt construction for the two generative calls.
//!
//! Templates use `{name}` placeholders. Substitution is a single pass over
//! the template, so text coming from the model or the player (history
//! entries, guesses) is never re-scanned for placeholders.

use crate::catalog::{Category, Language};
use crate::history::RiddleHistory;
use serde_json::{Value, json};
use std::collections::HashMap;
use thiserror::Error;

pub const RIDDLE_TEMPLATE_KEY: &str = "riddle";
pub const VERIFY_TEMPLATE_KEY: &str = "verify";

const RIDDLE_PLACEHOLDERS: [&str; 3] = ["category", "language", "exclusions"];
const VERIFY_PLACEHOLDERS: [&str; 3] = ["riddle", "answer", "guess"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("'{template}' template is missing the {{{placeholder}}} placeholder")]
    MissingPlaceholder {
        template: &'static str,
        placeholder: &'static str,
    },
}

const DEFAULT_RIDDLE_TEMPLATE: &str = r#"You write riddles for a guessing game.
Write exactly one short {category} in {language}.
The riddle must have one unambiguous answer that a player can name in a few words.
{exclusions}
Respond STRICTLY as a JSON object with two string fields:
{"riddle": "<the riddle text>", "answer": "<the canonical answer>"}
Do NOT add any explanation, just the JSON."#;

const DEFAULT_VERIFY_TEMPLATE: &str = r#"You are the judge in a riddle game played in {language}.

Riddle: "{riddle}"
Expected answer: "{answer}"
Player's guess: "{guess}"

Decide whether the guess names the same thing as the expected answer.
Judge the meaning, not the exact wording: synonyms, missing articles, different capitalization, small typos and other grammatical forms are correct when they clearly refer to the same thing.

Respond STRICTLY as JSON:
{"isCorrect": true|false}

Do NOT add any explanation, just the JSON."#;

/// The two prompt templates used by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub riddle: String,
    pub verify: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            riddle: DEFAULT_RIDDLE_TEMPLATE.to_string(),
            verify: DEFAULT_VERIFY_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Builds templates from a key -> text map, keeping the built-in
    /// default for every key that is missing.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut templates = Self::default();
        if let Some(riddle) = overrides.get(RIDDLE_TEMPLATE_KEY) {
            templates.riddle = riddle.clone();
        }
        if let Some(verify) = overrides.get(VERIFY_TEMPLATE_KEY) {
            templates.verify = verify.clone();
        }
        templates
    }

    /// Checks that each template still carries the placeholders the session
    /// depends on: category, language and exclusions for riddles, and the
    /// riddle, answer and guess for verification.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let checks = [
            (RIDDLE_TEMPLATE_KEY, &self.riddle, &RIDDLE_PLACEHOLDERS),
            (VERIFY_TEMPLATE_KEY, &self.verify, &VERIFY_PLACEHOLDERS),
        ];
        for (template, text, placeholders) in checks {
            for placeholder in placeholders.iter().copied() {
                if !text.contains(&format!("{{{placeholder}}}")) {
                    return Err(TemplateError::MissingPlaceholder {
                        template,
                        placeholder,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn riddle_prompt(
        &self,
        category: Category,
        language: Language,
        history: &RiddleHistory,
    ) -> String {
        let exclusions = exclusion_clause(history);
        render(
            &self.riddle,
            &[
                ("category", category.instruction()),
                ("language", language.prompt_name()),
                ("exclusions", &exclusions),
            ],
        )
    }

    pub fn verify_prompt(&self, language: Language, riddle: &str, answer: &str, guess: &str) -> String {
        render(
            &self.verify,
            &[
                ("language", language.prompt_name()),
                ("riddle", riddle),
                ("answer", answer),
                ("guess", guess),
            ],
        )
    }
}

fn exclusion_clause(history: &RiddleHistory) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut clause = String::from(
        "Do NOT repeat any of the following riddles. Your riddle's text must not match any of them:\n",
    );
    for text in history.iter() {
        clause.push_str("- ");
        clause.push_str(text);
        clause.push('\n');
    }
    clause
}

/// Replaces `{name}` for every known name. Unknown braces are copied as-is.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// The structured shapes the text service is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Riddle,
    Verdict,
}

impl OutputShape {
    pub fn name(&self) -> &'static str {
        match self {
            OutputShape::Riddle => "riddle",
            OutputShape::Verdict => "verdict",
        }
    }

    /// JSON Schema for providers that accept strict JSON Schema output.
    pub fn json_schema(&self) -> Value {
        match self {
            OutputShape::Riddle => json!({
                "type": "object",
                "properties": {
                    "riddle": { "type": "string" },
                    "answer": { "type": "string" }
                },
                "required": ["riddle", "answer"],
                "additionalProperties": false
            }),
            OutputShape::Verdict => json!({
                "type": "object",
                "properties": {
                    "isCorrect": { "type": "boolean" }
                },
                "required": ["isCorrect"],
                "additionalProperties": false
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_riddle_prompt_without_history_has_no_exclusions() {
        let prompt = PromptTemplates::default().riddle_prompt(
            Category::Mathematical,
            Language::German,
            &RiddleHistory::new(),
        );

        assert!(prompt.contains(Category::Mathematical.instruction()));
        assert!(prompt.contains("in German"));
        assert!(!prompt.contains("Do NOT repeat"));
        assert!(prompt.contains(r#""riddle""#));
        assert!(prompt.contains(r#""answer""#));
    }

    #[test]
    fn test_riddle_prompt_lists_every_history_entry() {
        let mut history = RiddleHistory::new();
        history.record("Was hat vier Beine und kann nicht laufen?");
        history.record("Was wird nasser, je mehr es trocknet?");

        let prompt =
            PromptTemplates::default().riddle_prompt(Category::Funny, Language::German, &history);

        assert!(prompt.contains("Do NOT repeat"));
        assert!(prompt.contains("- Was hat vier Beine und kann nicht laufen?\n"));
        assert!(prompt.contains("- Was wird nasser, je mehr es trocknet?\n"));
    }

    #[test]
    fn test_verify_prompt_carries_literal_guess() {
        let prompt = PromptTemplates::default().verify_prompt(
            Language::German,
            "Was hat vier Beine und kann nicht laufen?",
            "Ein Tisch",
            "tisch {answer}",
        );

        assert!(prompt.contains(r#"Riddle: "Was hat vier Beine und kann nicht laufen?""#));
        assert!(prompt.contains(r#"Expected answer: "Ein Tisch""#));
        // The guess is inserted verbatim and not expanded again.
        assert!(prompt.contains(r#"Player's guess: "tisch {answer}""#));
        assert!(prompt.contains("isCorrect"));
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        let out = render(r#"{"a": {x}} {y"#, &[("x", "1")]);
        assert_eq!(out, r#"{"a": 1} {y"#);
    }

    #[test]
    fn test_overrides_replace_only_given_templates() {
        let mut overrides = HashMap::new();
        overrides.insert("riddle".to_string(), "Give me a {category}.".to_string());

        let templates = PromptTemplates::with_overrides(&overrides);

        assert_eq!(templates.riddle, "Give me a {category}.");
        assert_eq!(templates.verify, PromptTemplates::default().verify);
        assert_eq!(
            templates.riddle_prompt(Category::Themed, Language::English, &RiddleHistory::new()),
            format!("Give me a {}.", Category::Themed.instruction())
        );
    }

    #[test]
    fn test_validate_requires_session_placeholders() {
        assert_eq!(PromptTemplates::default().validate(), Ok(()));

        let no_exclusions = PromptTemplates {
            riddle: "Write one {category} riddle in {language} as JSON.".to_string(),
            ..PromptTemplates::default()
        };
        let err = no_exclusions.validate().unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingPlaceholder {
                template: "riddle",
                placeholder: "exclusions"
            }
        );
        assert!(err.to_string().contains("{exclusions}"));

        let no_guess = PromptTemplates {
            verify: "Is it {answer}? Riddle: {riddle}".to_string(),
            ..PromptTemplates::default()
        };
        assert_eq!(
            no_guess.validate(),
            Err(TemplateError::MissingPlaceholder {
                template: "verify",
                placeholder: "guess"
            })
        );
    }

    #[test]
    fn test_verdict_schema_requires_boolean() {
        let schema = OutputShape::Verdict.json_schema();
        assert_eq!(schema["properties"]["isCorrect"]["type"], "boolean");
        assert_eq!(schema["required"][0], "isCorrect");
    }
}
