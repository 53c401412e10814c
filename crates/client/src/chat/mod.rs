/// Saved-conversation listing shown beside the chat.
pub mod history;
/// Conversation entries and their identifiers.
pub mod message;
pub mod renderer;
pub mod store;
/// The display seam every front-end implements.
pub mod surface;

pub use history::{HistoryEntry, HistoryIndex, TITLE_CHARS, derive_title};
pub use message::{ConversationId, ConversationIdGenerator, Message, Role};
pub use renderer::{RendererRejection, RendererState, StreamingRenderer};
pub use store::ConversationStore;
pub use surface::{
    ChatSurface, ConnectionStatus, EntryHandle, EntryKind, EntryView, RecordedEntry,
    RecordingSurface, THINKING_TEXT,
};
