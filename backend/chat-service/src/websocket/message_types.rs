use crate::models::{ChatPartner, InboxEntry, Message, MessageView};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound WebSocket events from client to server
///
/// Frames look like `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        receiver_id: Uuid,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        file_url: Option<String>,
        #[serde(default)]
        client_msg_id: Option<String>,
    },

    #[serde(rename = "get_user_history")]
    GetUserHistory {
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        offset: Option<i64>,
    },

    #[serde(rename = "get_conversation", rename_all = "camelCase")]
    GetConversation {
        user_b: Uuid,
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        cursor_id: Option<Uuid>,
    },

    #[serde(rename = "get_partners")]
    GetPartners {
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        offset: Option<i64>,
    },

    #[serde(rename = "delete_message", rename_all = "camelCase")]
    DeleteMessage { message_id: Uuid },

    #[serde(rename = "mark_read", rename_all = "camelCase")]
    MarkRead {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    #[serde(rename = "mark_delivered", rename_all = "camelCase")]
    MarkDelivered { conversation_id: Uuid },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { receiver_id: Uuid, is_typing: bool },
}

impl ClientEvent {
    /// Parse a text frame. A missing `data` member is read as `{}`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let mut frame: serde_json::Value = serde_json::from_str(text)?;
        if let Some(obj) = frame.as_object_mut() {
            obj.entry("data")
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
        }
        serde_json::from_value(frame)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedUser {
    pub id: Uuid,
}

/// Outbound WebSocket events from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connection_success")]
    ConnectionSuccess { message: String, user: ConnectedUser },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "receive_message")]
    ReceiveMessage(Message),

    #[serde(rename = "message_sent", rename_all = "camelCase")]
    MessageSent {
        success: bool,
        message_id: Uuid,
        client_msg_id: Option<String>,
    },

    #[serde(rename = "presence.online", rename_all = "camelCase")]
    PresenceOnline { user_id: Uuid },

    #[serde(rename = "presence.offline", rename_all = "camelCase")]
    PresenceOffline { user_id: Uuid },

    #[serde(rename = "conversation", rename_all = "camelCase")]
    Conversation {
        conversation_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
        messages: Vec<MessageView>,
    },

    #[serde(rename = "user_history")]
    UserHistory { conversations: Vec<InboxEntry> },

    #[serde(rename = "partners_list")]
    PartnersList { partners: Vec<ChatPartner> },

    #[serde(rename = "message_deleted", rename_all = "camelCase")]
    MessageDeleted {
        message_id: Uuid,
        conversation_id: Uuid,
        success: bool,
    },

    #[serde(rename = "receipt_delivered", rename_all = "camelCase")]
    ReceiptDelivered {
        conversation_id: Uuid,
        by_user_id: Uuid,
    },

    #[serde(rename = "receipt_read", rename_all = "camelCase")]
    ReceiptRead {
        conversation_id: Uuid,
        message_id: Uuid,
        by_user_id: Uuid,
    },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { from_user_id: Uuid, is_typing: bool },

    #[serde(rename = "read_ok")]
    ReadOk { ok: bool },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Wire name, used for logging
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ConnectionSuccess { .. } => "connection_success",
            ServerEvent::Error { .. } => "error",
            ServerEvent::ReceiveMessage(_) => "receive_message",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::PresenceOnline { .. } => "presence.online",
            ServerEvent::PresenceOffline { .. } => "presence.offline",
            ServerEvent::Conversation { .. } => "conversation",
            ServerEvent::UserHistory { .. } => "user_history",
            ServerEvent::PartnersList { .. } => "partners_list",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::ReceiptDelivered { .. } => "receipt_delivered",
            ServerEvent::ReceiptRead { .. } => "receipt_read",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::ReadOk { .. } => "read_ok",
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_send_message() {
        let receiver = Uuid::new_v4();
        let frame = json!({
            "event": "sendMessage",
            "data": { "receiverId": receiver, "content": "hi", "clientMsgId": "x1" }
        })
        .to_string();

        assert_eq!(
            ClientEvent::parse(&frame).unwrap(),
            ClientEvent::SendMessage {
                receiver_id: receiver,
                content: Some("hi".into()),
                file_url: None,
                client_msg_id: Some("x1".into()),
            }
        );
    }

    #[test]
    fn test_parse_without_data_member() {
        let parsed = ClientEvent::parse(r#"{"event":"get_partners"}"#).unwrap();
        assert_eq!(
            parsed,
            ClientEvent::GetPartners {
                limit: None,
                offset: None
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_event_and_bad_ids() {
        assert!(ClientEvent::parse(r#"{"event":"join_room","data":{}}"#).is_err());
        assert!(ClientEvent::parse(r#"{"event":"delete_message","data":{"messageId":"nope"}}"#).is_err());
        assert!(ClientEvent::parse("not json").is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let conversation_id = Uuid::new_v4();
        let by = Uuid::new_v4();
        let value = serde_json::to_value(ServerEvent::ReceiptDelivered {
            conversation_id,
            by_user_id: by,
        })
        .unwrap();

        assert_eq!(
            value,
            json!({
                "event": "receipt_delivered",
                "data": { "conversationId": conversation_id, "byUserId": by }
            })
        );

        let presence = serde_json::to_value(ServerEvent::PresenceOffline { user_id: by }).unwrap();
        assert_eq!(presence["event"], "presence.offline");
        assert_eq!(presence["data"]["userId"], json!(by));
    }
}
