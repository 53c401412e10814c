use serde::{Deserialize, Serialize};

use crate::target::StreamTarget;

/// Speaker role as it appears in persisted conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Assistant,
    System,
}

/// One persisted message, `{"role": ..., "content": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: WireRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One row of the server's saved-conversation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub title: String,
}

/// Outbound command, independent of how a transport frames it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Starts one streamed response; every event it produces carries `target`.
    Chat {
        target: StreamTarget,
        message: String,
    },
    History,
    Load {
        id: String,
    },
    Save {
        id: String,
        messages: Vec<WireMessage>,
    },
}

impl ChatCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::History => "history",
            Self::Load { .. } => "load",
            Self::Save { .. } => "save",
        }
    }
}

/// `{type, payload}` framing used on the WebSocket channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub(crate) enum CommandEnvelope<'a> {
    Chat {
        message: &'a str,
    },
    History,
    Load {
        id: &'a str,
    },
    Save {
        id: &'a str,
        messages: &'a [WireMessage],
    },
}

impl<'a> From<&'a ChatCommand> for CommandEnvelope<'a> {
    fn from(command: &'a ChatCommand) -> Self {
        match command {
            ChatCommand::Chat { message, .. } => Self::Chat { message },
            ChatCommand::History => Self::History,
            ChatCommand::Load { id } => Self::Load { id },
            ChatCommand::Save { id, messages } => Self::Save { id, messages },
        }
    }
}

/// Inbound `{type}`-tagged frames from the WebSocket server.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum InboundEnvelope {
    ChatChunk {
        content: String,
    },
    ChatEnd,
    Error {
        message: String,
    },
    HistoryList {
        #[serde(default)]
        history: Vec<HistoryItem>,
    },
    ChatHistory {
        id: String,
        #[serde(default)]
        messages: Vec<WireMessage>,
    },
    SaveSuccess {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequestBody<'a> {
    pub message: &'a str,
}

/// Body of `POST /api/history`.
#[derive(Debug, Serialize)]
pub(crate) struct SaveRequestBody<'a> {
    pub id: &'a str,
    pub messages: &'a [WireMessage],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Generation, StreamSessionId};

    #[test]
    fn commands_serialize_as_tagged_envelopes() {
        let chat = ChatCommand::Chat {
            target: StreamTarget::new(Generation::new(1), StreamSessionId::new(2)),
            message: "Hello".to_string(),
        };
        let encoded = serde_json::to_value(CommandEnvelope::from(&chat)).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"type": "chat", "payload": {"message": "Hello"}})
        );

        let encoded = serde_json::to_value(CommandEnvelope::from(&ChatCommand::History)).unwrap();
        assert_eq!(encoded, serde_json::json!({"type": "history"}));

        let save = ChatCommand::Save {
            id: "1700000000000".to_string(),
            messages: vec![WireMessage::new(WireRole::User, "hi")],
        };
        let encoded = serde_json::to_value(CommandEnvelope::from(&save)).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({
                "type": "save",
                "payload": {
                    "id": "1700000000000",
                    "messages": [{"role": "user", "content": "hi"}]
                }
            })
        );
    }

    #[test]
    fn inbound_frames_decode_by_tag() {
        let chunk: InboundEnvelope =
            serde_json::from_str(r#"{"type":"chat_chunk","content":"Hi"}"#).unwrap();
        assert_eq!(
            chunk,
            InboundEnvelope::ChatChunk {
                content: "Hi".to_string()
            }
        );

        let end: InboundEnvelope = serde_json::from_str(r#"{"type":"chat_end"}"#).unwrap();
        assert_eq!(end, InboundEnvelope::ChatEnd);

        let saved: InboundEnvelope =
            serde_json::from_str(r#"{"type":"save_success","message":"ok"}"#).unwrap();
        assert_eq!(
            saved,
            InboundEnvelope::SaveSuccess {
                message: Some("ok".to_string())
            }
        );

        let history: InboundEnvelope = serde_json::from_str(
            r#"{"type":"history_list","history":[{"id":"1","title":"first"}]}"#,
        )
        .unwrap();
        assert_eq!(
            history,
            InboundEnvelope::HistoryList {
                history: vec![HistoryItem {
                    id: "1".to_string(),
                    title: "first".to_string()
                }]
            }
        );
    }

    #[test]
    fn unrecognized_tags_fall_through_to_unknown() {
        let frame: InboundEnvelope =
            serde_json::from_str(r#"{"type":"typing","who":"server"}"#).unwrap();
        assert_eq!(frame, InboundEnvelope::Unknown);
    }
}
