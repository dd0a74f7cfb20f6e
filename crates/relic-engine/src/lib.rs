mod config;
mod gemini;
mod render;
mod session;
mod upload;

use std::env;

pub use config::{
    read_secret, resolve_credential, secrets_store_paths, ConfigError, ConfigOverrides,
    Credential, RelicConfig, API_BASE_VAR, API_KEY_VAR, CANDIDATE_MODELS_VAR, DEFAULT_API_BASE,
};
pub use gemini::GeminiClient;
pub use render::{Renderer, TerminalRenderer, ERROR_HEADING, RESULT_HEADING};
pub use session::{ActionOutcome, ActionPhase, AppContext, GenerateInput, Session};
pub use upload::ImageUpload;

pub(crate) fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Flattens an error chain into one line, skipping repeated causes.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
