use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chatstream_transport::{WireMessage, WireRole};

/// Opaque identifier of a persisted conversation.
///
/// Locally generated ids are Unix milliseconds; ids coming back from the
/// server are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Issues time-derived conversation ids that never repeat within a process.
///
/// Two saves in the same millisecond get consecutive values instead of
/// colliding.
#[derive(Debug, Default)]
pub struct ConversationIdGenerator {
    last_issued: u64,
}

impl ConversationIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ConversationId {
        self.next_id_at(unix_millis())
    }

    fn next_id_at(&mut self, now_millis: u64) -> ConversationId {
        let issued = now_millis.max(self.last_issued.saturating_add(1));
        self.last_issued = issued;
        ConversationId(issued.to_string())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl From<WireRole> for Role {
    fn from(role: WireRole) -> Self {
        match role {
            WireRole::User => Self::User,
            WireRole::Assistant => Self::Assistant,
            WireRole::System => Self::System,
        }
    }
}

impl From<Role> for WireRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::System => Self::System,
        }
    }
}

/// One committed conversation entry. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage::new(self.role.into(), self.content.clone())
    }
}

impl From<WireMessage> for Message {
    fn from(message: WireMessage) -> Self {
        Self::new(message.role.into(), message.content)
    }
}
