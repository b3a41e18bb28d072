//! Completion gateway
//!
//! Sends a composed turn sequence to the provider with fixed decoding
//! parameters and returns the raw reply text. One attempt per call.

use super::types::{LlmMessage, LlmRequest, MessageRole};
use super::{LlmError, LlmService};
use crate::session::{Role, Turn};
use std::sync::Arc;

/// Decoding parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            max_tokens: 500,
        }
    }
}

pub struct CompletionGateway {
    service: Option<Arc<dyn LlmService>>,
    model_id: String,
    params: DecodingParams,
}

impl CompletionGateway {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        let model_id = service.model_id().to_string();
        Self {
            service: Some(service),
            model_id,
            params: DecodingParams::default(),
        }
    }

    /// A gateway with no provider behind it; every call fails.
    pub fn unavailable(model_id: impl Into<String>) -> Self {
        Self {
            service: None,
            model_id: model_id.into(),
            params: DecodingParams::default(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn build_request(&self, turns: &[Turn]) -> LlmRequest {
        LlmRequest {
            messages: turns.iter().map(to_message).collect(),
            temperature: Some(self.params.temperature),
            max_tokens: Some(self.params.max_tokens),
        }
    }

    pub async fn complete(&self, turns: &[Turn]) -> Result<String, LlmError> {
        let service = self.service.as_ref().ok_or_else(|| {
            LlmError::auth("No completion provider configured (set OPENAI_API_KEY)")
        })?;

        let response = service.complete(&self.build_request(turns)).await?;
        Ok(response.text)
    }
}

fn to_message(turn: &Turn) -> LlmMessage {
    let role = match turn.role {
        Role::Instruction => MessageRole::System,
        Role::User => MessageRole::User,
        Role::Assistant => MessageRole::Assistant,
    };
    LlmMessage::new(role, turn.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;

    #[test]
    fn test_build_request_maps_roles_and_params() {
        let gateway = CompletionGateway::unavailable("gpt-3.5-turbo");
        let request = gateway.build_request(&[
            Turn::instruction("contract"),
            Turn::user("find cafes"),
            Turn::assistant("ok"),
        ]);

        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(request.messages[0].content, "contract");
        assert_eq!(request.temperature, Some(0.9));
        assert_eq!(request.max_tokens, Some(500));
    }

    #[tokio::test]
    async fn test_unavailable_gateway_fails() {
        let gateway = CompletionGateway::unavailable("gpt-3.5-turbo");
        let err = gateway.complete(&[Turn::user("hi")]).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Auth);
        assert!(err.message.contains("OPENAI_API_KEY"));
    }
}
