//! Config loading from an optional YAML file plus environment overrides.

use crate::error::ConfigError;
use crate::model::ChatConfig;
use log::debug;
use std::fs;
use std::path::Path;

const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
const GOOGLE_KEY_VAR: &str = "GOOGLE_API_KEY";
const OLLAMA_URL_VAR: &str = "OLLAMA_SERVER_URL";

/// Load config from an optional file path, then apply process-environment
/// credential overrides.
pub fn load_config(path: Option<&Path>) -> Result<ChatConfig, ConfigError> {
    let env = |name: &str| std::env::var(name).ok();
    load_config_with_env(path, env)
}

/// Load config with an injectable environment lookup. Environment values
/// override file values for credentials and the Ollama url.
pub fn load_config_with_env(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ChatConfig, ConfigError> {
    let mut config = match path {
        Some(path) if path.exists() => {
            debug!("loading config file (path={})", path.display());
            let contents = fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        }
        Some(path) => {
            debug!("config file missing, using defaults (path={})", path.display());
            ChatConfig::default()
        }
        None => ChatConfig::default(),
    };

    if let Some(key) = non_empty(env(ANTHROPIC_KEY_VAR)) {
        config.providers.anthropic.api_key = Some(key);
    }
    if let Some(key) = non_empty(env(OPENAI_KEY_VAR)) {
        config.providers.openai.api_key = Some(key);
    }
    if let Some(key) = non_empty(env(GOOGLE_KEY_VAR)) {
        config.providers.google.api_key = Some(key);
    }
    if let Some(url) = non_empty(env(OLLAMA_URL_VAR)) {
        config.providers.ollama.server_url = url;
    }

    if config.limits.max_turn_steps == 0 {
        return Err(ConfigError::Invalid(
            "limits.max_turn_steps must be at least 1".to_string(),
        ));
    }

    Ok(config)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
