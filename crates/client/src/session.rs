use chatstream_transport::{
    ChatCommand, ChatTransport, ErrorKind, Generation, HistoryItem, StreamEvent, StreamPayload,
    StreamSessionId, StreamTarget, TransportEvent, TransportKind, WireMessage,
};

use crate::chat::{
    ChatSurface, ConnectionStatus, ConversationId, ConversationIdGenerator, ConversationStore,
    EntryHandle, EntryKind, EntryView, HistoryEntry, HistoryIndex, Message, StreamingRenderer,
    derive_title,
};

/// What happened to one submitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    /// Blank input; nothing was recorded.
    Ignored,
    Rejected(SubmitRejection),
    /// The transport refused the message; a system entry explains why.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    Disconnected,
    ResponsePending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingResponse {
    target: StreamTarget,
    thinking: Option<EntryHandle>,
}

/// One chat window: the active conversation, its streaming renderer, the
/// history listing, and the transport they talk through.
///
/// All state changes go through `&mut self`; transport traffic is applied by
/// feeding [`TransportEvent`]s to [`ChatSession::handle_event`] in arrival order.
pub struct ChatSession<S: ChatSurface> {
    transport: Box<dyn ChatTransport>,
    surface: S,
    store: ConversationStore,
    renderer: StreamingRenderer,
    history: HistoryIndex,
    ids: ConversationIdGenerator,
    generation: Generation,
    next_session_id: StreamSessionId,
    pending: Option<PendingResponse>,
    connected: bool,
}

impl<S: ChatSurface> ChatSession<S> {
    pub fn new(transport: Box<dyn ChatTransport>, mut surface: S) -> Self {
        surface.set_connection_status(ConnectionStatus::Disconnected);
        surface.set_input_enabled(false);

        Self {
            transport,
            surface,
            store: ConversationStore::new(),
            renderer: StreamingRenderer::new(),
            history: HistoryIndex::new(),
            ids: ConversationIdGenerator::new(),
            generation: Generation::new(1),
            next_session_id: StreamSessionId::new(1),
            pending: None,
            connected: false,
        }
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn is_connected(&self) -> bool {
        self.connected && self.transport.is_connected()
    }

    pub fn is_response_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_target(&self) -> Option<StreamTarget> {
        self.pending.map(|pending| pending.target)
    }

    pub fn input_enabled(&self) -> bool {
        self.is_connected() && self.pending.is_none()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryIndex {
        &self.history
    }

    pub fn renderer(&self) -> &StreamingRenderer {
        &self.renderer
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Connects the transport and asks for the history list. Returns false on failure.
    pub async fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }

        self.surface
            .set_connection_status(ConnectionStatus::Connecting);
        let kind = self.transport.kind();

        match self.transport.connect().await {
            Ok(()) => {
                self.connected = true;
                self.surface
                    .set_connection_status(ConnectionStatus::Connected);
                tracing::info!(transport = %kind, "chat session connected");
                self.show_system_message(format!(
                    "Connected over {kind}. You can start chatting."
                ));
                self.sync_input();
                self.refresh_history().await;
                true
            }
            Err(error) => {
                tracing::warn!(
                    transport = %kind,
                    stage = error.stage(),
                    error = %error,
                    "failed to connect chat session"
                );
                self.mark_disconnected();
                self.show_system_message(format!("Could not connect: {error}"));
                self.sync_input();
                false
            }
        }
    }

    pub async fn disconnect(&mut self) {
        if !self.connected && !self.transport.is_connected() {
            return;
        }

        self.transport.disconnect().await;
        tracing::info!(transport = %self.transport.kind(), "chat session disconnected");
        self.handle_connection_lost("Disconnected from the chat server.");
    }

    /// Swaps in a different transport. The old one is disconnected first.
    pub async fn replace_transport(&mut self, transport: Box<dyn ChatTransport>) {
        self.disconnect().await;
        self.transport = transport;
        self.mark_disconnected();
        self.sync_input();
    }

    pub async fn submit(&mut self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        if !self.is_connected() {
            tracing::debug!("submit rejected while disconnected");
            return SubmitOutcome::Rejected(SubmitRejection::Disconnected);
        }

        if self.pending.is_some() {
            // One response at a time; input stays disabled until it ends.
            return SubmitOutcome::Rejected(SubmitRejection::ResponsePending);
        }

        self.store.append_user(text);
        self.surface
            .push_entry(EntryView::new(EntryKind::User, text));

        let target = StreamTarget::new(self.generation, self.next_session_id);
        self.next_session_id = self.next_session_id.next();
        let thinking = self.surface.push_entry(EntryView::thinking());
        self.pending = Some(PendingResponse {
            target,
            thinking: Some(thinking),
        });
        self.sync_input();

        let command = ChatCommand::Chat {
            target,
            message: text.to_string(),
        };
        match self.transport.send(command).await {
            Ok(()) => SubmitOutcome::Sent,
            Err(error) => {
                tracing::warn!(
                    stream_target = ?target,
                    stage = error.stage(),
                    error = %error,
                    "failed to send chat message"
                );
                self.clear_pending();
                if error.kind() == ErrorKind::TransportUnavailable && !self.transport.is_connected()
                {
                    self.mark_disconnected();
                }
                self.show_system_message(format!(
                    "Sorry, the message could not be sent: {error}"
                ));
                self.sync_input();
                SubmitOutcome::Failed
            }
        }
    }

    /// Leaves the current conversation for an empty, unsaved one.
    pub fn start_new_conversation(&mut self) {
        self.generation = self.generation.next();
        self.clear_pending();
        self.renderer.abandon();
        self.store.reset();
        self.surface.clear();
        self.history.clear_active();
        self.surface.show_history(self.history.list());
        self.sync_input();
    }

    pub async fn open_conversation(&mut self, id: &str) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }

        if !self.is_connected() {
            self.show_system_message("Not connected, so the conversation cannot be loaded.");
            return;
        }

        let command = ChatCommand::Load { id: id.to_string() };
        if let Err(error) = self.transport.send(command).await {
            tracing::warn!(
                conversation_id = id,
                stage = error.stage(),
                error = %error,
                "failed to request conversation"
            );
            self.show_system_message(format!("Could not load the conversation: {error}"));
        }
    }

    pub async fn refresh_history(&mut self) {
        if !self.is_connected() {
            tracing::debug!("skipping history refresh while disconnected");
            return;
        }

        if let Err(error) = self.transport.send(ChatCommand::History).await {
            tracing::warn!(
                stage = error.stage(),
                error = %error,
                "failed to request history list"
            );
            self.show_system_message(format!("Could not fetch the history list: {error}"));
        }
    }

    pub fn show_system_message(&mut self, text: impl Into<String>) {
        // The thinking indicator never outlives an error or notice.
        self.remove_thinking();
        self.surface
            .push_entry(EntryView::new(EntryKind::System, text));
    }

    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Stream(StreamEvent { target, payload }) => {
                self.handle_stream_event(target, payload).await;
            }
            TransportEvent::HistoryList(items) => self.apply_history_list(items),
            TransportEvent::ConversationLoaded { id, messages } => {
                self.apply_loaded_conversation(ConversationId::new(id), messages);
            }
            TransportEvent::Saved => {
                tracing::debug!(conversation_id = ?self.store.id(), "conversation saved");
            }
            TransportEvent::ServerError(message) => {
                tracing::warn!(detail = %message, "server reported an error");
                self.show_system_message(format!("Error: {message}"));
            }
            TransportEvent::Disconnected { reason } => {
                if !self.connected {
                    tracing::debug!(reason = ?reason, "ignoring disconnect of an idle transport");
                    return;
                }

                tracing::warn!(reason = ?reason, "chat server connection lost");
                let message = match reason {
                    Some(reason) if !reason.trim().is_empty() => {
                        format!("Connection lost: {}.", reason.trim())
                    }
                    _ => "Connection lost.".to_string(),
                };
                self.handle_connection_lost(&message);
            }
        }
    }

    async fn handle_stream_event(&mut self, target: StreamTarget, payload: StreamPayload) {
        if !self.stream_event_is_current(target) {
            tracing::debug!(
                stream_target = ?target,
                pending = ?self.pending_target(),
                "dropping stale stream event"
            );
            return;
        }

        match payload {
            StreamPayload::Chunk(chunk) => {
                self.remove_thinking();
                if let Err(rejection) = self.renderer.push_chunk(target, &chunk, &mut self.surface)
                {
                    tracing::warn!(rejection = ?rejection, "stream chunk rejected");
                }
            }
            StreamPayload::End => self.finish_response(target).await,
            StreamPayload::Failed { kind, message } => {
                self.fail_response(target, kind, message).await;
            }
        }
    }

    async fn finish_response(&mut self, target: StreamTarget) {
        self.clear_pending();

        match self.renderer.finish(target, &mut self.surface) {
            Ok(content) => {
                self.store.append_assistant(content);
                self.sync_input();
                self.save_conversation().await;
            }
            Err(rejection) => {
                tracing::debug!(rejection = ?rejection, "stream ended without content");
                self.sync_input();
            }
        }
    }

    async fn fail_response(&mut self, target: StreamTarget, kind: ErrorKind, message: String) {
        tracing::warn!(stream_target = ?target, kind = ?kind, detail = %message, "response failed");
        self.clear_pending();

        let partial = self.renderer.interrupt(&mut self.surface);
        let notice = match kind {
            ErrorKind::TransportUnavailable => format!("Connection problem: {message}"),
            ErrorKind::ProtocolError => format!("Error: {message}"),
        };
        self.show_system_message(notice);
        self.sync_input();

        if let Some(partial) = partial.filter(|partial| !partial.is_empty()) {
            self.store.append_assistant(partial);
            self.save_conversation().await;
        }
    }

    /// Persists the conversation, assigning its id and history entry on first save.
    async fn save_conversation(&mut self) {
        if !self.is_connected() {
            tracing::debug!("skipping save while disconnected");
            return;
        }

        let Some(first) = self.store.messages().first() else {
            return;
        };
        let title = derive_title(&first.content);

        let (id, assigned) = self.store.assign_id(&mut self.ids);
        if assigned {
            self.history
                .upsert_active(HistoryEntry::new(id.clone(), title));
            self.surface.show_history(self.history.list());
        }

        let command = ChatCommand::Save {
            id: id.to_string(),
            messages: self.store.to_wire(),
        };
        if let Err(error) = self.transport.send(command).await {
            tracing::warn!(
                conversation_id = %id,
                stage = error.stage(),
                error = %error,
                "failed to save conversation"
            );
            self.show_system_message(format!("Could not save the conversation: {error}"));
        }
    }

    fn apply_history_list(&mut self, items: Vec<HistoryItem>) {
        self.history.replace_all(items, self.store.id());
        self.surface.show_history(self.history.list());
    }

    fn apply_loaded_conversation(&mut self, id: ConversationId, messages: Vec<WireMessage>) {
        self.generation = self.generation.next();
        self.clear_pending();
        self.renderer.abandon();

        let messages: Vec<Message> = messages.into_iter().map(Message::from).collect();
        self.surface.clear();
        for message in &messages {
            self.surface
                .push_entry(EntryView::new(message.role.into(), message.content.clone()));
        }

        if !self.history.set_active_by_id(&id) {
            self.history.clear_active();
        }
        tracing::debug!(conversation_id = %id, messages = messages.len(), "conversation loaded");
        self.store.load(id, messages);
        self.surface.show_history(self.history.list());
        self.sync_input();
    }

    fn handle_connection_lost(&mut self, message: &str) {
        self.mark_disconnected();
        let interrupted = self.pending.is_some();
        self.clear_pending();

        if let Some(partial) = self.renderer.interrupt(&mut self.surface)
            && !partial.is_empty()
        {
            self.store.append_assistant(partial);
        }

        if interrupted {
            self.show_system_message(format!(
                "{message} The response in progress was cut short."
            ));
        } else {
            self.show_system_message(message);
        }
        self.sync_input();
    }

    fn stream_event_is_current(&self, target: StreamTarget) -> bool {
        self.pending
            .is_some_and(|pending| pending.target == target)
    }

    fn remove_thinking(&mut self) {
        if let Some(pending) = self.pending.as_mut()
            && let Some(handle) = pending.thinking.take()
        {
            self.surface.remove_entry(handle);
        }
    }

    fn clear_pending(&mut self) {
        self.remove_thinking();
        self.pending = None;
    }

    fn mark_disconnected(&mut self) {
        self.connected = false;
        self.surface
            .set_connection_status(ConnectionStatus::Disconnected);
    }

    fn sync_input(&mut self) {
        let enabled = self.input_enabled();
        self.surface.set_input_enabled(enabled);
    }
}
