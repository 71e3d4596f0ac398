//! Per-user login conversation.
//!
//! ```text
//!   start ──▸ AwaitingIdentifier ──(valid id)──▸ AwaitingSecret
//!                 ▲      │ too short                 │ too short: stay
//!                 │      └── stay                    │
//!                 │                                  ▼
//!                 └───── portal rejects ◂──── authenticate ──▸ accepted: session stored, done
//!
//!   cancel from either awaiting state: conversation dropped, store untouched
//! ```
//!
//! The portal is awaited with no lock held. Each conversation carries a
//! generation number so a slow authentication that finishes after a cancel
//! or a fresh `/login` does not rewrite the newer conversation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::portal::Portal;
use crate::session::{SessionError, SessionStore, UserKey};

/// Minimum input lengths, counted in characters after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    pub min_identifier_len: usize,
    pub min_secret_len: usize,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            min_identifier_len: 8,
            min_secret_len: 4,
        }
    }
}

/// Where a user's conversation currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    AwaitingIdentifier,
    AwaitingSecret { identifier: String },
}

/// What the conversation wants said back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginReply {
    /// Ask for the roll number.
    PromptIdentifier,
    /// Roll number too short; ask again.
    IdentifierRejected { min_len: usize },
    /// Roll number accepted; ask for the password.
    PromptSecret { identifier: String },
    /// Password too short; ask again.
    SecretRejected { min_len: usize },
    /// Portal refused the pair; conversation restarts at the roll number.
    AuthenticationFailed,
    /// Session stored; conversation finished.
    LoggedIn,
    /// Conversation dropped on request.
    Cancelled,
    /// Input arrived with no conversation running.
    NoConversation,
}

struct Conversation {
    state: LoginState,
    generation: u64,
}

/// Drives login conversations for every user.
pub struct LoginFlow {
    store: Arc<SessionStore>,
    portal: Arc<dyn Portal>,
    policy: LoginPolicy,
    conversations: Mutex<HashMap<UserKey, Conversation>>,
    next_generation: AtomicU64,
}

impl LoginFlow {
    pub fn new(store: Arc<SessionStore>, portal: Arc<dyn Portal>, policy: LoginPolicy) -> Self {
        Self {
            store,
            portal,
            policy,
            conversations: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Begin (or restart) a conversation for `key`.
    pub fn start(&self, key: &UserKey) -> LoginReply {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.conversations.lock().insert(
            key.clone(),
            Conversation {
                state: LoginState::AwaitingIdentifier,
                generation,
            },
        );
        tracing::debug!(user_key = %key, "Login conversation started");
        LoginReply::PromptIdentifier
    }

    /// Drop the conversation for `key`, if any. Never touches the session store.
    pub fn cancel(&self, key: &UserKey) -> LoginReply {
        if self.conversations.lock().remove(key).is_some() {
            tracing::debug!(user_key = %key, "Login conversation cancelled");
            LoginReply::Cancelled
        } else {
            LoginReply::NoConversation
        }
    }

    pub fn is_active(&self, key: &UserKey) -> bool {
        self.conversations.lock().contains_key(key)
    }

    pub fn state(&self, key: &UserKey) -> Option<LoginState> {
        self.conversations.lock().get(key).map(|c| c.state.clone())
    }

    /// Feed one message into the conversation for `key`.
    ///
    /// Only a failed session write is an error; every other outcome is a
    /// [`LoginReply`].
    pub async fn handle_input(&self, key: &UserKey, text: &str) -> Result<LoginReply, SessionError> {
        let input = text.trim();

        let (identifier, generation) = {
            let mut conversations = self.conversations.lock();
            let Some(conversation) = conversations.get_mut(key) else {
                return Ok(LoginReply::NoConversation);
            };

            let collected = match &conversation.state {
                LoginState::AwaitingIdentifier => None,
                LoginState::AwaitingSecret { identifier } => Some(identifier.clone()),
            };

            match collected {
                None => {
                    if input.is_empty() || input.chars().count() < self.policy.min_identifier_len {
                        return Ok(LoginReply::IdentifierRejected {
                            min_len: self.policy.min_identifier_len,
                        });
                    }
                    conversation.state = LoginState::AwaitingSecret {
                        identifier: input.to_string(),
                    };
                    return Ok(LoginReply::PromptSecret {
                        identifier: input.to_string(),
                    });
                }
                Some(identifier) => {
                    if input.chars().count() < self.policy.min_secret_len {
                        return Ok(LoginReply::SecretRejected {
                            min_len: self.policy.min_secret_len,
                        });
                    }
                    (identifier, conversation.generation)
                }
            }
        };

        let accepted = match self.portal.authenticate(&identifier, input).await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(
                    user_key = %key,
                    portal = self.portal.name(),
                    "Portal authentication call failed: {err:#}"
                );
                false
            }
        };

        if accepted {
            self.store.put(key, &identifier, input)?;

            let mut conversations = self.conversations.lock();
            if conversations.get(key).map(|c| c.generation) == Some(generation) {
                conversations.remove(key);
            }
            tracing::info!(user_key = %key, "Login succeeded");
            return Ok(LoginReply::LoggedIn);
        }

        {
            let mut conversations = self.conversations.lock();
            if let Some(conversation) = conversations.get_mut(key) {
                if conversation.generation == generation {
                    conversation.state = LoginState::AwaitingIdentifier;
                }
            }
        }
        tracing::info!(user_key = %key, "Login rejected by portal");
        Ok(LoginReply::AuthenticationFailed)
    }
}

impl std::fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginFlow")
            .field("policy", &self.policy)
            .field("conversations", &self.conversations.lock().len())
            .finish_non_exhaustive()
    }
}
