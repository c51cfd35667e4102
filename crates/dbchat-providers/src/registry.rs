//! Provider registry: resolves provider/model ids against the static
//! catalog and builds transports from configuration. Construction does
//! no network I/O.

use std::str::FromStr;
use std::sync::Arc;

use dbchat_config::{ProviderKind, ProvidersConfig, catalog, provider_config};
use log::warn;

use crate::anthropic::AnthropicTransport;
use crate::error::ProviderError;
use crate::google::GoogleTransport;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiTransport;
use crate::provision::LocalModelApi;
use crate::transport::ChatTransport;

/// A selectable model, either from the static catalog or discovered on
/// a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    /// Provider offering the model.
    pub provider: ProviderKind,
    /// Model id used on the wire.
    pub id: String,
    /// Human-friendly display name.
    pub display_name: String,
}

/// Builds transports and answers provider/model lookups.
pub struct ProviderRegistry {
    http: reqwest::Client,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Parse a provider id.
    pub fn resolve_kind(id: &str) -> Result<ProviderKind, ProviderError> {
        ProviderKind::from_str(id).map_err(|_| ProviderError::UnknownProvider(id.to_string()))
    }

    /// Resolve a model id for one provider. Ollama accepts ids outside
    /// the catalog since its lineup is whatever the server has pulled.
    pub fn resolve_model(kind: ProviderKind, model: &str) -> Result<ModelChoice, ProviderError> {
        let entry = provider_config(kind);
        if let Some(descriptor) = entry.models.iter().find(|candidate| candidate.id == model) {
            return Ok(ModelChoice {
                provider: kind,
                id: descriptor.id.to_string(),
                display_name: descriptor.display_name.to_string(),
            });
        }
        if kind.is_local() {
            return Ok(ModelChoice {
                provider: kind,
                id: model.to_string(),
                display_name: model.to_string(),
            });
        }
        Err(ProviderError::UnknownModel {
            provider: kind,
            model: model.to_string(),
        })
    }

    /// Build a transport for one provider. Fails fast on missing
    /// credentials; endpoints are not contacted here.
    pub fn create_transport(
        &self,
        kind: ProviderKind,
        providers: &ProvidersConfig,
    ) -> Result<Arc<dyn ChatTransport>, ProviderError> {
        match kind {
            ProviderKind::Anthropic => {
                let key = require_key(kind, providers.anthropic.api_key.as_deref())?;
                Ok(Arc::new(AnthropicTransport::new(
                    self.http.clone(),
                    key,
                    providers.anthropic.base_url.clone(),
                )))
            }
            ProviderKind::OpenAi => {
                let key = require_key(kind, providers.openai.api_key.as_deref())?;
                Ok(Arc::new(OpenAiTransport::new(
                    self.http.clone(),
                    key,
                    providers.openai.base_url.clone(),
                )))
            }
            ProviderKind::Google => {
                let key = require_key(kind, providers.google.api_key.as_deref())?;
                Ok(Arc::new(GoogleTransport::new(
                    self.http.clone(),
                    key,
                    providers.google.base_url.clone(),
                )))
            }
            ProviderKind::Ollama => Ok(Arc::new(OllamaClient::new(
                self.http.clone(),
                providers.ollama.server_url.clone(),
            ))),
        }
    }

    /// Build an Ollama client from configuration.
    pub fn create_ollama(&self, providers: &ProvidersConfig) -> OllamaClient {
        OllamaClient::new(self.http.clone(), providers.ollama.server_url.clone())
    }

    /// Every model selectable with the given configuration: catalog
    /// models for providers with credentials, plus whatever the local
    /// server reports as installed. An unreachable local server only
    /// drops its entries.
    pub async fn available_models(&self, providers: &ProvidersConfig) -> Vec<ModelChoice> {
        let mut choices = Vec::new();
        for entry in catalog() {
            let configured = match entry.kind {
                ProviderKind::Anthropic => providers.anthropic.api_key.is_some(),
                ProviderKind::OpenAi => providers.openai.api_key.is_some(),
                ProviderKind::Google => providers.google.api_key.is_some(),
                ProviderKind::Ollama => false,
            };
            if !configured {
                continue;
            }
            for descriptor in entry.models {
                choices.push(ModelChoice {
                    provider: entry.kind,
                    id: descriptor.id.to_string(),
                    display_name: descriptor.display_name.to_string(),
                });
            }
        }
        match self.create_ollama(providers).installed_models().await {
            Ok(installed) => {
                for model in installed {
                    choices.push(ModelChoice {
                        provider: ProviderKind::Ollama,
                        display_name: model.name.clone(),
                        id: model.name,
                    });
                }
            }
            Err(err) => {
                warn!("skipping local models, server unreachable (error={err})");
            }
        }
        choices
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn require_key(kind: ProviderKind, key: Option<&str>) -> Result<String, ProviderError> {
    match key {
        Some(key) if !key.trim().is_empty() => Ok(key.to_string()),
        _ => Err(ProviderError::MissingCredentials(kind)),
    }
}
