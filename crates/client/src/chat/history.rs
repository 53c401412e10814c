use chatstream_transport::HistoryItem;

use crate::chat::message::ConversationId;

/// Number of characters of the first message used as a conversation title.
pub const TITLE_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: ConversationId,
    pub title: String,
    pub active: bool,
}

impl HistoryEntry {
    pub fn new(id: ConversationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            active: false,
        }
    }
}

/// Title for a newly saved conversation: its first message, cut to [`TITLE_CHARS`].
pub fn derive_title(first_message: &str) -> String {
    first_message.chars().take(TITLE_CHARS).collect()
}

/// Saved conversations, newest first, with at most one active entry.
#[derive(Debug, Default)]
pub struct HistoryIndex {
    entries: Vec<HistoryEntry>,
}

impl HistoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn active(&self) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.active)
    }

    /// Puts `entry` first and makes it the only active one.
    pub fn upsert_active(&mut self, mut entry: HistoryEntry) {
        self.entries.retain(|existing| existing.id != entry.id);
        self.clear_active();
        entry.active = true;
        self.entries.insert(0, entry);
    }

    /// Returns false, leaving the marks untouched, when `id` is not listed.
    pub fn set_active_by_id(&mut self, id: &ConversationId) -> bool {
        if !self.entries.iter().any(|entry| &entry.id == id) {
            tracing::debug!(conversation_id = %id, "conversation is not in the history list");
            return false;
        }

        for entry in &mut self.entries {
            entry.active = &entry.id == id;
        }
        true
    }

    pub fn clear_active(&mut self) {
        for entry in &mut self.entries {
            entry.active = false;
        }
    }

    /// Replaces the listing with a server list, which arrives oldest first.
    pub fn replace_all(&mut self, items: Vec<HistoryItem>, active: Option<&ConversationId>) {
        self.entries = items
            .into_iter()
            .rev()
            .map(|item| {
                let id = ConversationId::new(item.id);
                let active = active.is_some_and(|active| *active == id);
                HistoryEntry {
                    id,
                    title: item.title,
                    active,
                }
            })
            .collect();
    }
}
