//! Streaming chat client: conversation state, incremental rendering, and
//! history, driven over a WebSocket or HTTP streaming transport.

#![deny(unsafe_code)]

/// Conversation, renderer, and history building blocks.
pub mod chat;
/// Terminal command parsing.
pub mod command;
pub mod format;
/// Chat session orchestration.
pub mod session;
/// Settings persistence.
pub mod settings;
pub mod terminal;

pub use chat::{ChatSurface, ConversationStore, HistoryIndex, StreamingRenderer};
pub use format::{escape_html, format_message};
pub use session::{ChatSession, SubmitOutcome, SubmitRejection};
pub use settings::{Settings, SettingsError, SettingsStore};
pub use terminal::TerminalSurface;
