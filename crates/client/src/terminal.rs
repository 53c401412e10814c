use std::io::Write;

use crate::chat::{ChatSurface, ConnectionStatus, EntryHandle, EntryKind, EntryView, HistoryEntry};

const CLEAR_LINE: &str = "\r\x1b[2K";

/// Line the cursor is currently sitting on, still open for more output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenLine {
    Thinking(EntryHandle),
    Streaming,
}

/// Assistant entry still receiving text, and how much of it is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamingEntry {
    handle: EntryHandle,
    printed: usize,
}

/// Plain-text surface for a terminal. Streamed entries are printed
/// incrementally; the thinking indicator is erased in place.
pub struct TerminalSurface<W: Write> {
    out: W,
    next_handle: u64,
    open_line: Option<OpenLine>,
    streaming: Option<StreamingEntry>,
    input_enabled: bool,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            next_handle: 1,
            open_line: None,
            streaming: None,
            input_enabled: false,
        }
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(error) = result {
            tracing::warn!(error = %error, "failed to write to terminal");
        }
    }

    fn close_open_line(&mut self) {
        match self.open_line.take() {
            Some(OpenLine::Thinking(_)) => self.write(CLEAR_LINE),
            Some(OpenLine::Streaming) => self.write("\n"),
            None => {}
        }
    }

    fn allocate_handle(&mut self) -> EntryHandle {
        let handle = EntryHandle::new(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        handle
    }
}

fn label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::User => "you",
        EntryKind::Assistant => "assistant",
        EntryKind::System => "system",
        EntryKind::Thinking => "assistant",
    }
}

impl<W: Write> ChatSurface for TerminalSurface<W> {
    fn push_entry(&mut self, view: EntryView) -> EntryHandle {
        self.close_open_line();
        let handle = self.allocate_handle();
        let prefix = format!("{}> ", label(view.kind));

        match view.kind {
            EntryKind::Thinking => {
                self.write(&format!("{prefix}{}", view.text));
                self.open_line = Some(OpenLine::Thinking(handle));
            }
            EntryKind::Assistant => {
                self.write(&format!("{prefix}{}", view.text));
                self.open_line = Some(OpenLine::Streaming);
                self.streaming = Some(StreamingEntry {
                    handle,
                    printed: view.text.len(),
                });
            }
            EntryKind::User | EntryKind::System => {
                self.write(&format!("{prefix}{}\n", view.text));
            }
        }
        handle
    }

    fn update_entry(&mut self, handle: EntryHandle, view: EntryView) {
        let Some(StreamingEntry { printed, .. }) =
            self.streaming.filter(|streaming| streaming.handle == handle)
        else {
            tracing::debug!(handle = ?handle, "update for an entry that is no longer streaming");
            return;
        };

        // Streamed text only grows, so the unseen part is a suffix.
        let unseen = view.text.get(printed..).unwrap_or_default();
        if !unseen.is_empty() {
            if self.open_line != Some(OpenLine::Streaming) {
                // Other output interrupted the reply; continue it on a fresh line.
                self.close_open_line();
                self.write(&format!("{}> ", label(view.kind)));
                self.open_line = Some(OpenLine::Streaming);
            }
            self.write(unseen);
        }
        self.streaming = Some(StreamingEntry {
            handle,
            printed: view.text.len(),
        });
    }

    fn finish_entry(&mut self, handle: EntryHandle) {
        if self
            .streaming
            .is_some_and(|streaming| streaming.handle == handle)
        {
            self.streaming = None;
            if self.open_line == Some(OpenLine::Streaming) {
                self.close_open_line();
            }
        }
    }

    fn remove_entry(&mut self, handle: EntryHandle) {
        if self.open_line == Some(OpenLine::Thinking(handle)) {
            self.close_open_line();
        }
        if self
            .streaming
            .is_some_and(|streaming| streaming.handle == handle)
        {
            self.streaming = None;
        }
    }

    fn clear(&mut self) {
        self.close_open_line();
        self.streaming = None;
        self.write("---- new conversation ----\n");
    }

    fn show_history(&mut self, entries: &[HistoryEntry]) {
        self.close_open_line();
        if entries.is_empty() {
            self.write("history: (empty)\n");
            return;
        }

        let mut listing = String::from("history:\n");
        for entry in entries {
            let marker = if entry.active { '*' } else { ' ' };
            listing.push_str(&format!("  {marker} {}  {}\n", entry.id, entry.title));
        }
        self.write(&listing);
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    fn set_connection_status(&mut self, status: ConnectionStatus) {
        let label = match status {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting...",
            ConnectionStatus::Connected => "connected",
        };
        self.close_open_line();
        self.write(&format!("[{label}]\n"));
    }
}
