use chatstream_transport::WireMessage;

use crate::chat::message::{ConversationId, ConversationIdGenerator, Message};

/// The active conversation: an append-only message list plus its id once saved.
#[derive(Debug, Default)]
pub struct ConversationStore {
    id: Option<ConversationId>,
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&ConversationId> {
        self.id.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    pub fn reset(&mut self) {
        self.id = None;
        self.messages.clear();
    }

    pub fn load(&mut self, id: ConversationId, messages: Vec<Message>) {
        self.id = Some(id);
        self.messages = messages;
    }

    /// Returns the conversation id, generating one on first use.
    ///
    /// The boolean is true when the id was assigned by this call.
    pub fn assign_id(&mut self, generator: &mut ConversationIdGenerator) -> (ConversationId, bool) {
        if let Some(id) = &self.id {
            return (id.clone(), false);
        }

        let id = generator.next_id();
        self.id = Some(id.clone());
        (id, true)
    }

    pub fn to_wire(&self) -> Vec<WireMessage> {
        self.messages.iter().map(Message::to_wire).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Role;

    #[test]
    fn appends_keep_insertion_order() {
        let mut store = ConversationStore::new();
        assert!(store.is_empty());

        store.append_user("Hello");
        store.append_assistant("Hi there!");
        store.append_user("Again");

        let roles: Vec<Role> = store.messages().iter().map(|message| message.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(store.messages()[1].content, "Hi there!");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn id_is_assigned_once_and_then_kept() {
        let mut store = ConversationStore::new();
        let mut generator = ConversationIdGenerator::new();
        assert_eq!(store.id(), None);

        let (first, assigned) = store.assign_id(&mut generator);
        assert!(assigned);
        let (second, assigned) = store.assign_id(&mut generator);
        assert!(!assigned);
        assert_eq!(first, second);
        assert_eq!(store.id(), Some(&first));
    }

    #[test]
    fn reset_clears_entries_and_id() {
        let mut store = ConversationStore::new();
        store.load(ConversationId::new("7"), vec![Message::user("a")]);
        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.id(), None);
    }

    #[test]
    fn load_replaces_entries_and_sets_id() {
        let mut store = ConversationStore::new();
        store.append_user("stale");
        store.load(
            ConversationId::new("42"),
            vec![Message::user("q"), Message::assistant("a")],
        );
        assert_eq!(store.id().map(ConversationId::as_str), Some("42"));
        assert_eq!(store.to_wire().len(), 2);
        assert_eq!(store.messages()[0], Message::user("q"));
    }
}
