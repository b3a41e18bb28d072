//! Provider configuration

use super::{LlmService, LoggingService, OpenAIService};
use std::sync::Arc;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Configuration for the completion provider
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    /// API root of an OpenAI-compatible endpoint
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            model: std::env::var("OPENAI_MODEL").ok(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    /// Build the provider service, wrapped with logging.
    ///
    /// Returns `None` when no usable API key is configured.
    pub fn build_service(&self) -> Option<Arc<dyn LlmService>> {
        let api_key = self.openai_api_key.as_ref().filter(|k| !k.is_empty())?;

        match OpenAIService::new(api_key.clone(), self.model_id(), self.base_url.as_deref()) {
            Ok(service) => Some(Arc::new(LoggingService::new(Arc::new(service)))),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create completion provider");
                None
            }
        }
    }
}
