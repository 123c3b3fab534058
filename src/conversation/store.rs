//! In-memory conversation storage
//!
//! Holds the turn history of every conversation for the lifetime of the
//! process. Nothing is persisted; a restart starts from an empty store.
//!
//! Each conversation owns an exchange gate. A chat request checks the
//! conversation out for the duration of its exchange, so concurrent requests
//! on the same id run one after the other and each sees the turns recorded
//! by the previous one. Reads and clears never wait on the gate.
//!
//! A clear bumps the conversation's generation. An exchange checked out
//! under an older generation drops its turns instead of recording them, so a
//! cleared conversation stays empty even if a reply was still streaming.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::Turn;

#[derive(Default)]
struct Entry {
    turns: Vec<Turn>,
    gate: Arc<Mutex<()>>,
    generation: u64,
}

/// Process-wide map from conversation id to its ordered turns
#[derive(Clone, Default)]
pub struct ConversationStore {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a conversation and take exclusive use of it for one
    /// exchange. Waits while another exchange on the same id is running.
    pub async fn checkout(&self, conversation_id: &str) -> Exchange {
        let gate = {
            let mut guard = self.inner.write().await;
            guard
                .entry(conversation_id.to_string())
                .or_default()
                .gate
                .clone()
        };

        let permit = gate.lock_owned().await;
        let generation = self
            .inner
            .read()
            .await
            .get(conversation_id)
            .map(|entry| entry.generation)
            .unwrap_or_default();

        Exchange {
            store: self.clone(),
            conversation_id: conversation_id.to_string(),
            generation,
            _permit: permit,
        }
    }

    /// Snapshot of a conversation's turns, empty if the id is unknown
    pub async fn history(&self, conversation_id: &str) -> Vec<Turn> {
        self.inner
            .read()
            .await
            .get(conversation_id)
            .map(|entry| entry.turns.clone())
            .unwrap_or_default()
    }

    /// Remove every turn of a conversation. Returns whether anything was removed.
    pub async fn clear(&self, conversation_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(conversation_id) {
            Some(entry) => {
                let removed = !entry.turns.is_empty();
                entry.turns.clear();
                entry.generation += 1;
                removed
            }
            None => false,
        }
    }

    /// Ids of all conversations holding at least one turn, sorted
    pub async fn conversation_ids(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        let mut ids: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| !entry.turns.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Exclusive hold on one conversation for the length of an exchange
pub struct Exchange {
    store: ConversationStore,
    conversation_id: String,
    generation: u64,
    _permit: OwnedMutexGuard<()>,
}

impl Exchange {
    /// Turns recorded before this exchange
    pub async fn history(&self) -> Vec<Turn> {
        self.store.history(&self.conversation_id).await
    }

    /// Append both turns of the exchange, user first, and release the conversation.
    /// Nothing is appended if the conversation was cleared since checkout.
    pub async fn record(self, user: Turn, assistant: Turn) {
        let mut guard = self.store.inner.write().await;
        let entry = guard.entry(self.conversation_id.clone()).or_default();
        if entry.generation != self.generation {
            tracing::debug!(
                conversation_id = %self.conversation_id,
                "Conversation cleared mid-exchange, dropping its turns"
            );
            return;
        }
        entry.turns.push(user);
        entry.turns.push(assistant);
    }
}
