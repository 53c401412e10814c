use crate::chat::history::HistoryEntry;
use crate::chat::message::Role;
use crate::format::format_message;

pub const THINKING_TEXT: &str = "Thinking...";

/// Handle to one entry a surface has displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(u64);

impl EntryHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    User,
    Assistant,
    System,
    /// Transient "waiting for the first chunk" indicator.
    Thinking,
}

impl From<Role> for EntryKind {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::System => Self::System,
        }
    }
}

/// What a surface is asked to show: the raw text and its formatted markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub kind: EntryKind,
    pub text: String,
    pub markup: String,
}

impl EntryView {
    pub fn new(kind: EntryKind, text: impl Into<String>) -> Self {
        let text = text.into();
        let markup = format_message(&text);
        Self { kind, text, markup }
    }

    pub fn thinking() -> Self {
        Self::new(EntryKind::Thinking, THINKING_TEXT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// The visual container a chat session renders into.
///
/// Entries are only ever appended, re-rendered in place, or removed.
pub trait ChatSurface {
    fn push_entry(&mut self, view: EntryView) -> EntryHandle;
    /// Replaces the whole content of an entry.
    fn update_entry(&mut self, handle: EntryHandle, view: EntryView);
    /// Called once when a streamed entry will receive no more updates.
    fn finish_entry(&mut self, _handle: EntryHandle) {}
    fn remove_entry(&mut self, handle: EntryHandle);
    fn clear(&mut self);
    fn show_history(&mut self, entries: &[HistoryEntry]);
    fn set_input_enabled(&mut self, enabled: bool);
    fn set_connection_status(&mut self, status: ConnectionStatus);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEntry {
    pub handle: EntryHandle,
    pub view: EntryView,
    pub finished: bool,
}

/// In-memory surface that keeps the visible state, for headless hosts and tests.
#[derive(Debug)]
pub struct RecordingSurface {
    next_handle: u64,
    entries: Vec<RecordedEntry>,
    history: Vec<HistoryEntry>,
    input_enabled: bool,
    status: ConnectionStatus,
    updates: usize,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self {
            next_handle: 1,
            entries: Vec::new(),
            history: Vec::new(),
            input_enabled: false,
            status: ConnectionStatus::Disconnected,
            updates: 0,
        }
    }
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RecordedEntry] {
        &self.entries
    }

    pub fn entry(&self, handle: EntryHandle) -> Option<&RecordedEntry> {
        self.entries.iter().find(|entry| entry.handle == handle)
    }

    /// `(kind, text)` of every visible entry, in display order.
    pub fn transcript(&self) -> Vec<(EntryKind, String)> {
        self.entries
            .iter()
            .map(|entry| (entry.view.kind, entry.view.text.clone()))
            .collect()
    }

    pub fn count(&self, kind: EntryKind) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.view.kind == kind)
            .count()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Number of in-place re-renders seen so far.
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl ChatSurface for RecordingSurface {
    fn push_entry(&mut self, view: EntryView) -> EntryHandle {
        let handle = EntryHandle::new(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        self.entries.push(RecordedEntry {
            handle,
            view,
            finished: false,
        });
        handle
    }

    fn update_entry(&mut self, handle: EntryHandle, view: EntryView) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.handle == handle) {
            entry.view = view;
            self.updates += 1;
        }
    }

    fn finish_entry(&mut self, handle: EntryHandle) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.handle == handle) {
            entry.finished = true;
        }
    }

    fn remove_entry(&mut self, handle: EntryHandle) {
        self.entries.retain(|entry| entry.handle != handle);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn show_history(&mut self, entries: &[HistoryEntry]) {
        self.history = entries.to_vec();
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    fn set_connection_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_carry_formatted_markup() {
        let view = EntryView::new(EntryKind::Assistant, "a\nb");
        assert_eq!(view.text, "a\nb");
        assert_eq!(view.markup, "a<br>b");
    }

    #[test]
    fn recording_surface_tracks_entries_by_handle() {
        let mut surface = RecordingSurface::new();
        let user = surface.push_entry(EntryView::new(EntryKind::User, "hi"));
        let thinking = surface.push_entry(EntryView::thinking());
        assert_ne!(user, thinking);

        surface.remove_entry(thinking);
        surface.update_entry(user, EntryView::new(EntryKind::User, "hello"));
        surface.finish_entry(user);

        assert_eq!(
            surface.transcript(),
            vec![(EntryKind::User, "hello".to_string())]
        );
        assert!(surface.entry(user).is_some_and(|entry| entry.finished));
        assert_eq!(surface.updates(), 1);

        surface.clear();
        assert!(surface.entries().is_empty());
    }
}
