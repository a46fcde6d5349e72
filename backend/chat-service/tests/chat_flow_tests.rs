// Real-time flow tests
//
// Drives raw client frames through the event dispatcher with two connected
// users and checks what each connection receives.

use chat_service::{
    services::{ChatServices, LoggingNotifier},
    store::{ChatStore, InMemoryAccountDirectory, InMemoryChatStore},
    websocket::{
        handlers::handle_client_event,
        message_types::{ClientEvent, ServerEvent},
        PresenceRegistry,
    },
};
use crypto_core::TokenVerifier;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryChatStore>,
    services: ChatServices,
    presence: PresenceRegistry,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        let presence = PresenceRegistry::new();
        let services = ChatServices::new(
            store.clone(),
            Arc::new(InMemoryAccountDirectory::open()),
            Arc::new(TokenVerifier::hs256(b"flow")),
            presence.clone(),
            Arc::new(LoggingNotifier),
        );
        Self {
            store,
            services,
            presence,
        }
    }

    async fn frame(&self, user_id: Uuid, frame: Value) -> Vec<ServerEvent> {
        let event = ClientEvent::parse(&frame.to_string()).expect("valid frame");
        handle_client_event(&self.services, &self.presence, user_id, event).await
    }
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

fn names(frames: &[Value]) -> Vec<&str> {
    frames.iter().filter_map(|f| f["event"].as_str()).collect()
}

#[tokio::test]
async fn test_send_then_read_round_trip() {
    let h = Harness::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let (_, mut a_rx) = h.presence.register(a);
    let (_, mut b_rx) = h.presence.register(b);
    assert_eq!(names(&drain(&mut a_rx)), vec!["presence.online"]);

    let replies = h
        .frame(a, json!({ "event": "sendMessage", "data": { "receiverId": b, "content": "hi" } }))
        .await;
    let message_id = match replies.as_slice() {
        [ServerEvent::MessageSent { message_id, .. }] => *message_id,
        other => panic!("unexpected replies: {other:?}"),
    };

    let a_frames = drain(&mut a_rx);
    let b_frames = drain(&mut b_rx);
    assert_eq!(names(&a_frames), vec!["receive_message"]);
    assert_eq!(names(&b_frames), vec!["receive_message"]);
    let conversation_id = b_frames[0]["data"]["conversationId"].clone();

    let participant = h
        .store
        .get_participant(
            serde_json::from_value(conversation_id.clone()).unwrap(),
            b,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(participant.unread_count, 1);

    let replies = h
        .frame(
            b,
            json!({ "event": "mark_read", "data": { "conversationId": conversation_id, "messageId": message_id } }),
        )
        .await;
    assert_eq!(replies, vec![ServerEvent::ReadOk { ok: true }]);

    let a_frames = drain(&mut a_rx);
    assert_eq!(names(&a_frames), vec!["receipt_read"]);
    assert_eq!(a_frames[0]["data"]["messageId"], json!(message_id));
    assert_eq!(a_frames[0]["data"]["byUserId"], json!(b));

    let participant = h
        .store
        .get_participant(serde_json::from_value(conversation_id).unwrap(), b)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(participant.unread_count, 0);
}

#[tokio::test]
async fn test_retry_with_same_token_creates_one_message() {
    let h = Harness::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let (_, mut b_rx) = h.presence.register(b);

    let send = json!({
        "event": "sendMessage",
        "data": { "receiverId": b, "content": "hi", "clientMsgId": "x1" }
    });
    let first = h.frame(a, send.clone()).await;
    let second = h.frame(a, send).await;
    assert_eq!(first, second);

    assert_eq!(names(&drain(&mut b_rx)), vec!["receive_message"]);

    let history = h
        .frame(a, json!({ "event": "get_conversation", "data": { "userB": b } }))
        .await;
    match history.as_slice() {
        [ServerEvent::Conversation { messages, .. }] => assert_eq!(messages.len(), 1),
        other => panic!("unexpected replies: {other:?}"),
    }
}

#[tokio::test]
async fn test_deleting_last_message_clears_pointer_and_notifies_both() {
    let h = Harness::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    h.frame(a, json!({ "event": "sendMessage", "data": { "receiverId": b, "content": "first" } }))
        .await;
    let replies = h
        .frame(a, json!({ "event": "sendMessage", "data": { "receiverId": b, "content": "second" } }))
        .await;
    let ServerEvent::MessageSent { message_id, .. } = replies[0].clone() else {
        panic!("unexpected replies: {replies:?}");
    };

    let (_, mut a_rx) = h.presence.register(a);
    let (_, mut b_rx) = h.presence.register(b);
    drain(&mut a_rx);

    let replies = h
        .frame(b, json!({ "event": "delete_message", "data": { "messageId": message_id } }))
        .await;
    assert_eq!(
        replies,
        vec![ServerEvent::error("Only the sender can delete this message")]
    );

    let replies = h
        .frame(a, json!({ "event": "delete_message", "data": { "messageId": message_id } }))
        .await;
    assert!(replies.is_empty());
    assert_eq!(names(&drain(&mut a_rx)), vec!["message_deleted"]);
    assert_eq!(names(&drain(&mut b_rx)), vec!["message_deleted"]);

    let inbox = h
        .frame(b, json!({ "event": "get_user_history" }))
        .await;
    match inbox.as_slice() {
        [ServerEvent::UserHistory { conversations }] => {
            assert_eq!(conversations.len(), 1);
            assert!(conversations[0].last_message.is_none());
            assert!(conversations[0].last_message_at.is_some());
            // "second" was unread by b; deleting it leaves only "first"
            assert_eq!(conversations[0].unread_count, 1);
        }
        other => panic!("unexpected replies: {other:?}"),
    }
}

#[tokio::test]
async fn test_partners_and_presence_lifecycle() {
    let h = Harness::new();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    for peer in [b, c] {
        h.frame(a, json!({ "event": "sendMessage", "data": { "receiverId": peer, "content": "yo" } }))
            .await;
    }

    let partners = h.frame(a, json!({ "event": "get_partners", "data": {} })).await;
    match partners.as_slice() {
        [ServerEvent::PartnersList { partners }] => {
            let mut ids: Vec<Uuid> = partners.iter().map(|p| p.user_id).collect();
            ids.sort();
            let mut expected = vec![b, c];
            expected.sort();
            assert_eq!(ids, expected);
        }
        other => panic!("unexpected replies: {other:?}"),
    }

    let (_, mut b_rx) = h.presence.register(b);
    let (a_conn, _a_rx) = h.presence.register(a);
    assert_eq!(names(&drain(&mut b_rx)), vec!["presence.online"]);

    h.presence.unregister(a, a_conn);
    let frames = drain(&mut b_rx);
    assert_eq!(names(&frames), vec!["presence.offline"]);
    assert_eq!(frames[0]["data"]["userId"], json!(a));
}

#[tokio::test]
async fn test_concurrent_first_contact_from_both_sides() {
    let h = Arc::new(Harness::new());
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let mut tasks = Vec::new();
    for (from, to) in [(a, b), (b, a), (a, b), (b, a)] {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.frame(from, json!({ "event": "sendMessage", "data": { "receiverId": to, "content": "hey" } }))
                .await
        }));
    }
    for task in tasks {
        let replies = task.await.unwrap();
        assert!(matches!(replies.as_slice(), [ServerEvent::MessageSent { .. }]));
    }

    let inbox = h.services.history.list_conversations(a, None, None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].unread_count, 2);
}
