//! Name → provider routing.

use std::collections::HashMap;
use std::sync::Arc;

use super::ModelProvider;
use crate::error::{Result, TurnstileError};

/// Resolves model names chosen by middleware to provider instances.
///
/// Names are either a registered alias or `"provider:model_id"`; the latter
/// falls back to matching a provider by its `provider_name` and `model_id`.
#[derive(Clone)]
pub struct ModelRouter {
    default_model: String,
    providers: HashMap<String, Arc<dyn ModelProvider>>,
}

impl ModelRouter {
    /// Create a router whose default model is `provider`, registered under
    /// its `model_id`.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        let name = provider.model_id().to_string();
        let mut providers = HashMap::new();
        providers.insert(name.clone(), provider);
        Self {
            default_model: name,
            providers,
        }
    }

    /// Register an additional model under `name`.
    pub fn with_model(mut self, name: impl Into<String>, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn default_provider(&self) -> Result<&Arc<dyn ModelProvider>> {
        self.resolve(&self.default_model)
    }

    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn ModelProvider>> {
        if let Some(provider) = self.providers.get(name) {
            return Ok(provider);
        }
        if let Some((provider_name, model_id)) = name.split_once(':') {
            if let Some(provider) = self.providers.values().find(|p| {
                p.provider_name() == provider_name && p.model_id() == model_id
            }) {
                return Ok(provider);
            }
        }
        Err(TurnstileError::ModelNotFound(name.to_string()))
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRouter")
            .field("default_model", &self.default_model)
            .field("models", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
