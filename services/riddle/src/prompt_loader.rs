use anyhow::{Context, Result};
use riddle_core::prompt::{PromptTemplates, RIDDLE_TEMPLATE_KEY, VERIFY_TEMPLATE_KEY};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads every `.md` file in `dir_path`, keyed by file stem.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

            prompts.insert(prompt_key, content);
        }
    }

    Ok(prompts)
}

/// Built-in templates, overridden by `riddle.md` / `verify.md` from `dir_path`.
/// A missing directory means no overrides. An override that drops a
/// placeholder the session fills in is an error.
pub fn load_templates(dir_path: &Path) -> Result<PromptTemplates> {
    if !dir_path.exists() {
        tracing::info!(
            "No prompts directory at {}, using built-in templates.",
            dir_path.display()
        );
        return Ok(PromptTemplates::default());
    }
    let prompts = load_prompts(dir_path)?;
    for key in prompts.keys() {
        if key != RIDDLE_TEMPLATE_KEY && key != VERIFY_TEMPLATE_KEY {
            tracing::warn!("Ignoring unknown prompt file: {}.md", key);
        }
    }
    let templates = PromptTemplates::with_overrides(&prompts);
    templates
        .validate()
        .with_context(|| format!("Invalid prompt override in {}", dir_path.display()))?;
    tracing::info!("Loaded {} prompt overrides.", prompts.len());
    Ok(templates)
}
