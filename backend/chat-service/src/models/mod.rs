pub mod conversation;
pub mod message;
pub mod receipt;

pub use conversation::{ordered_pair, ChatPartner, Conversation, InboxEntry, LastMessageSummary, Participant};
pub use message::{DeletedMessage, Message, MessageView, NewMessage, SendOutcome};
pub use receipt::{DeliveredOutcome, ReadMark, ReadOutcome, Receipt, ReceiptStatus};
