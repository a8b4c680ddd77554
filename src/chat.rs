//! Chat session controller.
//!
//! A turn is two-phase: [`ChatController::send_message`] appends the user
//! message optimistically and hands back a [`PendingTurn`]; once the remote
//! call completes, [`ChatController::apply_turn`] appends either the reply
//! or a visible error entry. Only one turn may be outstanding at a time.

use crate::api::ChatBackend;
use crate::error::ApiError;
use crate::models::{ChatMessage, ChatMode, ChatReply};
use crate::session::SessionIdentityStore;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Marks assistant entries that carry a failure instead of a reply.
pub const ERROR_PREFIX: &str = "❌";

/// A chat turn in flight, detached from the controller.
pub struct PendingTurn {
    backend: Arc<dyn ChatBackend>,
    message: String,
    mode: ChatMode,
    session_id: String,
}

impl PendingTurn {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub async fn run(self) -> TurnOutcome {
        let result = self
            .backend
            .send_chat_turn(&self.message, self.mode, &self.session_id)
            .await;
        TurnOutcome {
            session_id: self.session_id,
            result,
        }
    }
}

/// Completion of a [`PendingTurn`].
#[derive(Debug)]
pub struct TurnOutcome {
    pub session_id: String,
    pub result: Result<ChatReply, ApiError>,
}

pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    identity: SessionIdentityStore,
    session_id: Option<String>,
    mode: ChatMode,
    history: Vec<ChatMessage>,
    draft: String,
    busy: bool,
    last_error: Option<String>,
}

impl ChatController {
    /// Build a controller and read (or mint) the durable session id.
    ///
    /// If the id cannot be read the controller still starts, but sends are
    /// ignored until [`reset_session`](Self::reset_session) succeeds.
    pub fn new(backend: Arc<dyn ChatBackend>, identity: SessionIdentityStore) -> Self {
        let session_id = match identity.get_session_id() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "chat session id unavailable; sending is disabled");
                None
            }
        };

        Self {
            backend,
            identity,
            session_id,
            mode: ChatMode::default(),
            history: Vec::new(),
            draft: String::new(),
            busy: false,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Start a turn from the current draft.
    ///
    /// Returns `None` without touching any state when a turn is already
    /// outstanding, the draft is blank, or no session id is available.
    pub fn send_message(&mut self) -> Option<PendingTurn> {
        if self.busy {
            debug!("send ignored: a chat turn is already in flight");
            return None;
        }
        let message = self.draft.trim();
        if message.is_empty() {
            return None;
        }
        let session_id = self.session_id.clone()?;
        let message = message.to_string();

        self.history.push(ChatMessage::user(message.clone()));
        self.draft.clear();
        self.busy = true;
        self.last_error = None;

        debug!(mode = %self.mode, "chat turn started");
        Some(PendingTurn {
            backend: Arc::clone(&self.backend),
            message,
            mode: self.mode,
            session_id,
        })
    }

    /// Reconcile a completed turn with the transcript.
    pub fn apply_turn(&mut self, outcome: TurnOutcome) {
        self.busy = false;

        if self.session_id.as_deref() != Some(outcome.session_id.as_str()) {
            debug!("dropping chat reply for a session that was reset");
            return;
        }

        match outcome.result {
            Ok(reply) => {
                self.history
                    .push(ChatMessage::assistant(reply.response, reply.timestamp));
            }
            Err(e) => {
                let message = e.user_message();
                warn!(error = %e, "chat turn failed");
                self.history.push(ChatMessage::assistant(
                    format!("{ERROR_PREFIX} {message}"),
                    Utc::now(),
                ));
                self.last_error = Some(message);
            }
        }
    }

    /// Send the draft and wait for the reply. Returns `false` if nothing was sent.
    pub async fn send(&mut self) -> bool {
        match self.send_message() {
            Some(pending) => {
                let outcome = pending.run().await;
                self.apply_turn(outcome);
                true
            }
            None => false,
        }
    }

    /// Flip between normal and admin mode. History and session are kept.
    pub fn toggle_mode(&mut self) -> ChatMode {
        self.mode = self.mode.toggled();
        info!(mode = %self.mode, "chat mode changed");
        self.mode
    }

    /// Clear the local transcript only; the server keeps its history for
    /// this session id.
    pub fn clear_messages(&mut self) {
        self.history.clear();
        self.last_error = None;
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Start a logically fresh conversation under a newly minted session id.
    pub fn reset_session(&mut self) -> Result<()> {
        let id = self.identity.reset_session_id()?;
        info!(session_id = %id, "chat session reset");
        self.session_id = Some(id);
        self.history.clear();
        self.last_error = None;
        Ok(())
    }
}
