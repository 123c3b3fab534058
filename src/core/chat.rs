//! Chat engine
//!
//! The ChatEngine runs one exchange per submitted message:
//! 1. Validates the user's message
//! 2. Checks the conversation out of the store
//! 3. Sends persona, history and the new message to the model
//! 4. Relays reply fragments to the caller while accumulating them
//! 5. Records the user and assistant turns, then signals completion
//!
//! The exchange runs on its own task. A caller that goes away stops
//! receiving events but the exchange still finishes and is recorded.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::prompts_builtin;
use crate::conversation::{ConversationStore, Turn};
use crate::providers::{ModelClient, Prompt, ProviderError};

/// Reply recorded when the model finishes without producing any text
pub const EMPTY_REPLY_FALLBACK: &str =
    "I encountered an issue generating a response. Please try again.";

const EVENT_BUFFER: usize = 64;

/// Events delivered to the caller while an exchange runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Next fragment of the assistant's reply
    TextDelta { delta: String },

    /// Reply complete and recorded
    Done,

    /// Model call failed; the stream ends after this event
    Error { message: String },
}

/// Errors from the chat engine
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,
}

/// The core chat engine
pub struct ChatEngine {
    model: Arc<dyn ModelClient>,
    store: ConversationStore,
    system_prompt: String,
}

impl ChatEngine {
    pub fn new(model: Arc<dyn ModelClient>, store: ConversationStore) -> Self {
        Self {
            model,
            store,
            system_prompt: prompts_builtin::TRAVEL_PLANNER.to_string(),
        }
    }

    /// Set a custom system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Start an exchange and return the receiving end of its event stream.
    ///
    /// The last event is always `Done` or `Error`.
    pub fn submit(
        self: &Arc<Self>,
        conversation_id: &str,
        content: &str,
    ) -> Result<mpsc::Receiver<ChatEvent>, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = Arc::clone(self);
        let conversation_id = conversation_id.to_string();
        let content = content.to_string();

        tokio::spawn(async move {
            engine.run_exchange(conversation_id, content, tx).await;
        });

        Ok(rx)
    }

    pub async fn history(&self, conversation_id: &str) -> Vec<Turn> {
        self.store.history(conversation_id).await
    }

    pub async fn clear(&self, conversation_id: &str) -> bool {
        self.store.clear(conversation_id).await
    }

    pub async fn conversation_ids(&self) -> Vec<String> {
        self.store.conversation_ids().await
    }

    async fn run_exchange(&self, conversation_id: String, content: String, tx: mpsc::Sender<ChatEvent>) {
        let exchange = self.store.checkout(&conversation_id).await;

        let prompt = Prompt {
            system_instruction: self.system_prompt.clone(),
            history: exchange.history().await,
            message: content.clone(),
        };
        tracing::info!(
            conversation_id = %conversation_id,
            history = prompt.history.len(),
            "Starting exchange"
        );

        let mut relay = Relay::new(tx);
        let terminal = match self.relay_reply(prompt, &mut relay).await {
            Ok(()) => {
                if relay.reply.is_empty() {
                    tracing::warn!(conversation_id = %conversation_id, "Model returned no text");
                    relay.fragment(EMPTY_REPLY_FALLBACK.to_string()).await;
                }
                ChatEvent::Done
            }
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    fragments = relay.fragments,
                    "Model stream failed: {}",
                    e
                );
                if relay.reply.is_empty() {
                    relay.reply = format!("Error: {}", e);
                }
                ChatEvent::Error {
                    message: e.to_string(),
                }
            }
        };

        tracing::info!(
            conversation_id = %conversation_id,
            fragments = relay.fragments,
            chars = relay.reply.len(),
            "Exchange finished"
        );

        exchange
            .record(Turn::user(content), Turn::assistant(relay.reply.clone()))
            .await;
        relay.send(terminal).await;
    }

    async fn relay_reply(&self, prompt: Prompt, relay: &mut Relay) -> Result<(), ProviderError> {
        let mut fragments = self.model.stream(prompt).await?;
        while let Some(fragment) = fragments.next().await {
            relay.fragment(fragment?).await;
        }
        Ok(())
    }
}

/// Forwards events to the caller and keeps the reply assembled so far
struct Relay {
    tx: mpsc::Sender<ChatEvent>,
    reply: String,
    fragments: usize,
    connected: bool,
}

impl Relay {
    fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            tx,
            reply: String::new(),
            fragments: 0,
            connected: true,
        }
    }

    async fn fragment(&mut self, text: String) {
        self.reply.push_str(&text);
        self.fragments += 1;
        self.send(ChatEvent::TextDelta { delta: text }).await;
    }

    async fn send(&mut self, event: ChatEvent) {
        if self.connected && self.tx.send(event).await.is_err() {
            tracing::debug!("Client disconnected; finishing exchange without it");
            self.connected = false;
        }
    }
}
