//! Core chat orchestration
//!
//! This module contains the logic that sits between the HTTP routes, the
//! conversation store and the model provider.

mod chat;

pub use chat::{ChatEngine, ChatError, ChatEvent, EMPTY_REPLY_FALLBACK};
