use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-recipient delivery state. Ordering follows the only legal direction
/// of travel: `Sent < Delivered < Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    Sent,
    Delivered,
    Read,
}

impl ReceiptStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            ReceiptStatus::Sent => "SENT",
            ReceiptStatus::Delivered => "DELIVERED",
            ReceiptStatus::Read => "READ",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "SENT" => Some(ReceiptStatus::Sent),
            "DELIVERED" => Some(ReceiptStatus::Delivered),
            "READ" => Some(ReceiptStatus::Read),
            _ => None,
        }
    }

    /// The state after applying `target`, or `None` when it would not move forward
    pub fn advance_to(self, target: ReceiptStatus) -> Option<ReceiptStatus> {
        (target > self).then_some(target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub status: ReceiptStatus,
    pub updated_at: DateTime<Utc>,
}

/// Store-level result of a read transition
#[derive(Debug, Clone, PartialEq)]
pub struct ReadMark {
    pub advanced: u64,
    pub unread_count: i32,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredOutcome {
    pub conversation_id: Uuid,
    pub advanced: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOutcome {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub advanced: u64,
    pub unread_count: i32,
    pub read_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        assert_eq!(
            ReceiptStatus::Sent.advance_to(ReceiptStatus::Delivered),
            Some(ReceiptStatus::Delivered)
        );
        assert_eq!(
            ReceiptStatus::Sent.advance_to(ReceiptStatus::Read),
            Some(ReceiptStatus::Read)
        );
        assert_eq!(ReceiptStatus::Read.advance_to(ReceiptStatus::Delivered), None);
        assert_eq!(ReceiptStatus::Delivered.advance_to(ReceiptStatus::Delivered), None);
    }

    #[test]
    fn test_db_and_wire_representation_agree() {
        for status in [ReceiptStatus::Sent, ReceiptStatus::Delivered, ReceiptStatus::Read] {
            assert_eq!(ReceiptStatus::from_db(status.as_db()), Some(status));
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, status.as_db());
        }
        assert_eq!(ReceiptStatus::from_db("seen"), None);
    }
}
