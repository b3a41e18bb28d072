//! Turn orchestration
//!
//! One exchange: validate, lock the session, compose, call the provider,
//! commit the user and assistant turns, trim, then extract commands from
//! the raw reply. Nothing is committed unless the provider call succeeds.

#[cfg(test)]
pub mod testing;

use crate::commands::{self, CameraAction, LocationSearch};
use crate::llm::{CompletionGateway, LlmError};
use crate::prompt::{self, MapContext};
use crate::session::{SessionStore, Turn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Message is required")]
    InvalidInput,
    #[error(transparent)]
    Provider(#[from] LlmError),
}

/// What the map front end receives for one exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub display_text: String,
    pub location: Option<LocationSearch>,
    pub camera: Option<CameraAction>,
    pub session_id: String,
}

pub struct TurnOrchestrator {
    sessions: Arc<SessionStore>,
    gateway: CompletionGateway,
    request_timeout: Option<Duration>,
}

impl TurnOrchestrator {
    pub fn new(sessions: Arc<SessionStore>, gateway: CompletionGateway) -> Self {
        Self {
            sessions,
            gateway,
            request_timeout: None,
        }
    }

    /// Bound each provider call; expiry is reported as a provider error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[allow(dead_code)] // Used by tests
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn model_id(&self) -> &str {
        self.gateway.model_id()
    }

    pub async fn handle_message(
        &self,
        session_id: &str,
        user_message: &str,
        map_context: Option<&MapContext>,
    ) -> Result<TurnOutcome, TurnError> {
        let span = tracing::info_span!(
            "exchange",
            session_id = %session_id,
            exchange_id = %uuid::Uuid::new_v4(),
        );
        self.run_exchange(session_id, user_message, map_context)
            .instrument(span)
            .await
    }

    async fn run_exchange(
        &self,
        session_id: &str,
        user_message: &str,
        map_context: Option<&MapContext>,
    ) -> Result<TurnOutcome, TurnError> {
        if user_message.trim().is_empty() {
            tracing::debug!("Rejecting empty message");
            return Err(TurnError::InvalidInput);
        }

        // Held until the exchange is committed; same-key calls queue here.
        let mut session = self.sessions.lock(session_id).await;

        let prompt = prompt::compose(session.turns(), user_message, map_context);
        let raw = self.complete(&prompt.outbound()).await?;

        session.append(prompt.user_turn);
        session.append(Turn::assistant(raw.as_str()));
        let dropped = session.trim();
        let turns = session.len();
        drop(session);

        let extraction = commands::extract(&raw);
        for err in &extraction.errors {
            tracing::warn!(
                tag = %err.tag,
                raw = %err.raw,
                reason = %err.reason,
                "Ignoring malformed command tag"
            );
        }

        tracing::info!(
            turns,
            dropped,
            query = extraction.location.as_ref().and_then(LocationSearch::query),
            camera = ?extraction.camera.as_ref().and_then(CameraAction::action_type),
            camera_value = ?extraction.camera.as_ref().and_then(CameraAction::value),
            "Exchange completed"
        );

        Ok(TurnOutcome {
            display_text: extraction.display_text,
            location: extraction.location,
            camera: extraction.camera,
            session_id: session_id.to_string(),
        })
    }

    async fn complete(&self, turns: &[Turn]) -> Result<String, LlmError> {
        let Some(limit) = self.request_timeout else {
            return self.gateway.complete(turns).await;
        };

        tokio::time::timeout(limit, self.gateway.complete(turns))
            .await
            .map_err(|_| {
                LlmError::network(format!(
                    "Completion timed out after {}ms",
                    limit.as_millis()
                ))
            })?
    }

    /// Forget a session's history. Returns whether it existed.
    pub async fn handle_reset(&self, session_id: &str) -> bool {
        let existed = self.sessions.reset(session_id).await;
        let live_sessions = self.sessions.session_count().await;
        tracing::info!(
            session_id = %session_id,
            existed,
            live_sessions,
            "Session reset"
        );
        existed
    }
}
