//! Configuration schema for dbchat.

use serde::{Deserialize, Serialize};

/// Root config for the dbchat orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ChatConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::new()
    }
}

/// Builder for assembling a `ChatConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ChatConfig::default(),
        }
    }

    /// Replace the provider credential configuration.
    pub fn providers(mut self, providers: ProvidersConfig) -> Self {
        self.config.providers = providers;
        self
    }

    /// Replace the turn limit configuration.
    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.config.limits = limits;
        self
    }

    /// Replace the persistence configuration.
    pub fn persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.config.persistence = persistence;
        self
    }

    /// Finalize and return the built `ChatConfig`.
    pub fn build(self) -> ChatConfig {
        self.config
    }
}

/// Credentials and endpoints for the supported providers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub anthropic: KeyedProviderConfig,
    #[serde(default)]
    pub openai: KeyedProviderConfig,
    #[serde(default)]
    pub google: KeyedProviderConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// API-key backed remote provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeyedProviderConfig {
    /// API key; absent means the provider is unavailable.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Optional base-url override for proxies.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Self-hosted Ollama settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server url, e.g. `http://127.0.0.1:11434`.
    #[serde(default = "default_ollama_url")]
    pub server_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            server_url: default_ollama_url(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

/// Bounds applied to every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum autonomous tool-call/response rounds per user turn.
    #[serde(default = "default_max_turn_steps")]
    pub max_turn_steps: usize,
    /// Sampling temperature for completions.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on generated conversation titles, in characters.
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_turn_steps: default_max_turn_steps(),
            temperature: default_temperature(),
            title_max_chars: default_title_max_chars(),
        }
    }
}

fn default_max_turn_steps() -> usize {
    10
}

fn default_temperature() -> f32 {
    0.7
}

fn default_title_max_chars() -> usize {
    30
}

/// Tab-state persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Whether conversation state is persisted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Storage root; relative paths resolve against the working directory.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{ChatConfig, LimitsConfig, ProvidersConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_turn_bounds() {
        let config = ChatConfig::default();
        assert_eq!(config.limits.max_turn_steps, 10);
        assert_eq!(config.limits.title_max_chars, 30);
        assert_eq!(config.providers.ollama.server_url, "http://127.0.0.1:11434");
        assert_eq!(config.persistence.enabled, true);
    }

    #[test]
    fn builder_replaces_sections() {
        let config = ChatConfig::builder()
            .limits(LimitsConfig {
                max_turn_steps: 3,
                ..LimitsConfig::default()
            })
            .providers(ProvidersConfig::default())
            .build();
        assert_eq!(config.limits.max_turn_steps, 3);
    }
}
