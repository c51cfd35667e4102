//! Static catalog of supported providers and their model lineups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported chat backends. Closed set; dispatch is exhaustive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Google,
    OpenAi,
    Ollama,
}

impl ProviderKind {
    /// Return the provider id as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Whether this provider is the local/self-hosted backend.
    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "google" => Ok(ProviderKind::Google),
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Immutable catalog entry for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    /// Provider id.
    pub kind: ProviderKind,
    /// Human-friendly display name.
    pub display_name: &'static str,
    /// Ordered model lineup.
    pub models: &'static [ModelDescriptor],
}

/// One model offered by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Model id used on the wire.
    pub id: &'static str,
    /// Human-friendly display name.
    pub display_name: &'static str,
}

const fn model(id: &'static str, display_name: &'static str) -> ModelDescriptor {
    ModelDescriptor { id, display_name }
}

/// https://docs.anthropic.com/en/docs/about-claude/models/overview
const ANTHROPIC_MODELS: &[ModelDescriptor] = &[
    model("claude-opus-4-0", "Claude Opus 4"),
    model("claude-sonnet-4-0", "Claude Sonnet 4"),
    model("claude-3-7-sonnet-latest", "Claude Sonnet 3.7"),
    model("claude-3-5-haiku-latest", "Claude Haiku 3.5"),
    model("claude-3-5-sonnet-latest", "Claude Sonnet 3.5 Latest"),
    model("claude-3-haiku", "Claude Haiku 3"),
];

/// https://ai.google.dev/gemini-api/docs/models
const GOOGLE_MODELS: &[ModelDescriptor] = &[
    model("gemini-2.5-pro", "Gemini 2.5 Pro"),
    model("gemini-2.5-flash", "Gemini 2.5 Flash"),
    model(
        "gemini-2.5-flash-lite-preview-06-17",
        "Gemini 2.5 Flash-Lite Preview",
    ),
    model("gemini-2.0-flash", "Gemini 2.0 Flash"),
    model("gemini-2.0-flash-lite", "Gemini 2.0 Flash-Lite"),
    model("gemini-1.5-flash", "Gemini 1.5 Flash"),
    model("gemini-1.5-flash-8b", "Gemini 1.5 Flash-8B"),
    model("gemini-1.5-pro", "Gemini 1.5 Pro"),
];

const OPENAI_MODELS: &[ModelDescriptor] = &[
    model("gpt-4.1", "gpt-4.1"),
    model("gpt-4.1-mini", "gpt-4.1-mini"),
    model("gpt-4.1-nano", "gpt-4.1-nano"),
    model("gpt-4o", "gpt-4o"),
    model("gpt-4o-mini", "gpt-4o-mini"),
    model("o3", "o3"),
    model("o3-mini", "o3-mini"),
    model("o4-mini", "o4-mini"),
];

const OLLAMA_MODELS: &[ModelDescriptor] = &[
    model("llama3.1", "Llama 3.1"),
    model("llama3.1:8b", "Llama 3.1 8B"),
    model("llama3.1:70b", "Llama 3.1 70B"),
    model("llama3.2", "Llama 3.2"),
    model("mistral", "Mistral"),
    model("mistral:7b", "Mistral 7B"),
    model("codellama", "Code Llama"),
    model("codellama:7b", "Code Llama 7B"),
    model("codellama:13b", "Code Llama 13B"),
    model("codellama:34b", "Code Llama 34B"),
    model("phi3", "Phi-3"),
    model("phi3:mini", "Phi-3 Mini"),
    model("phi3:medium", "Phi-3 Medium"),
    model("qwen2", "Qwen2"),
    model("qwen2:7b", "Qwen2 7B"),
    model("qwen2:72b", "Qwen2 72B"),
];

const CATALOG: &[ProviderConfig] = &[
    ProviderConfig {
        kind: ProviderKind::Anthropic,
        display_name: "Anthropic",
        models: ANTHROPIC_MODELS,
    },
    ProviderConfig {
        kind: ProviderKind::Google,
        display_name: "Google",
        models: GOOGLE_MODELS,
    },
    ProviderConfig {
        kind: ProviderKind::OpenAi,
        display_name: "OpenAI",
        models: OPENAI_MODELS,
    },
    ProviderConfig {
        kind: ProviderKind::Ollama,
        display_name: "Ollama (Local)",
        models: OLLAMA_MODELS,
    },
];

/// Return the full provider catalog.
pub fn catalog() -> &'static [ProviderConfig] {
    CATALOG
}

/// Return the catalog entry for one provider.
pub fn provider_config(kind: ProviderKind) -> &'static ProviderConfig {
    // CATALOG covers every ProviderKind variant.
    CATALOG
        .iter()
        .find(|entry| entry.kind == kind)
        .unwrap_or(&CATALOG[0])
}
