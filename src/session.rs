//! In-memory session store
//!
//! Each session is a bounded, role-tagged turn history whose first entry is
//! the instruction turn. History lives for the lifetime of the process.
//!
//! Every session sits behind its own async mutex. Holding a session's guard
//! for a whole exchange serializes concurrent messages on the same key,
//! while different keys only share the brief map lookup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Session key used when the caller does not supply one
pub const DEFAULT_SESSION_ID: &str = "default";

/// Maximum retained turns: the instruction turn plus ten exchanges
pub const MAX_TURNS: usize = 21;

/// Turn role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Instruction,
    User,
    Assistant,
}

/// One role-tagged message in a session's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn instruction(content: impl Into<String>) -> Self {
        Self {
            role: Role::Instruction,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single conversation history
#[derive(Debug, Clone)]
pub struct Session {
    turns: Vec<Turn>,
}

impl Session {
    fn new(instruction: Turn) -> Self {
        Self {
            turns: vec![instruction],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Role the next appended turn must have to keep user/assistant alternation
    pub fn expected_role(&self) -> Role {
        match self.turns.last().map(|t| t.role) {
            Some(Role::User) => Role::Assistant,
            _ => Role::User,
        }
    }

    pub fn append(&mut self, turn: Turn) {
        debug_assert_eq!(
            turn.role,
            self.expected_role(),
            "turn alternation violated at index {}",
            self.turns.len()
        );
        self.turns.push(turn);
    }

    /// Drop the oldest exchange turns until the ceiling is met.
    ///
    /// Index 0 is never removed. Returns the number of turns dropped.
    pub fn trim(&mut self) -> usize {
        if self.turns.len() <= MAX_TURNS {
            return 0;
        }
        let excess = self.turns.len() - MAX_TURNS;
        self.turns.drain(1..=excess);
        excess
    }
}

/// Process-wide map of session key to history
pub struct SessionStore {
    instruction: Turn,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: Turn::instruction(instruction),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn handle(&self, key: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(key) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(session_id = %key, "Creating session");
            Arc::new(Mutex::new(Session::new(self.instruction.clone())))
        });
        Arc::clone(session)
    }

    /// Get-or-create the session and take exclusive access to it.
    ///
    /// Other callers for the same key wait until the guard is dropped.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<Session> {
        self.handle(key).await.lock_owned().await
    }

    /// Snapshot of the session's turns, creating the session if absent
    #[allow(dead_code)] // The orchestrator works through lock(); used by tests
    pub async fn get_or_create(&self, key: &str) -> Vec<Turn> {
        self.lock(key).await.turns().to_vec()
    }

    #[allow(dead_code)] // API completeness
    pub async fn append(&self, key: &str, turn: Turn) {
        self.lock(key).await.append(turn);
    }

    #[allow(dead_code)] // API completeness
    pub async fn trim(&self, key: &str) -> usize {
        self.lock(key).await.trim()
    }

    /// Delete the session. Returns whether it existed.
    pub async fn reset(&self, key: &str) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    /// Turn count without creating the session
    #[allow(dead_code)] // Used by tests
    pub async fn turn_count(&self, key: &str) -> Option<usize> {
        let session = self.sessions.read().await.get(key).map(Arc::clone)?;
        let len = session.lock().await.len();
        Some(len)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
