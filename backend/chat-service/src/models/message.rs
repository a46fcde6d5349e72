use super::receipt::Receipt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub client_msg_id: Option<String>,
    /// Position within the conversation, starting at 1
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

/// A message together with the receipt state of each participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub receipts: Vec<Receipt>,
}

/// Trimmed, validated send input ready for the store
#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct NewMessage {
    #[validate(length(max = 4000, message = "content must be at most 4000 characters"))]
    pub content: Option<String>,

    #[validate(length(max = 2000, message = "fileUrl must be at most 2000 characters"))]
    pub file_url: Option<String>,

    #[validate(length(min = 1, max = 100, message = "clientMsgId must be 1-100 characters"))]
    pub client_msg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Created(Message),
    /// An earlier send with the same client token
    Replayed(Message),
}

impl SendOutcome {
    pub fn message(&self) -> &Message {
        match self {
            SendOutcome::Created(m) | SendOutcome::Replayed(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            SendOutcome::Created(m) | SendOutcome::Replayed(m) => m,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, SendOutcome::Replayed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// The conversation's last-message pointer was cleared
    pub was_last: bool,
}
