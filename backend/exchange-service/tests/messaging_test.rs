mod common;

use common::Fixture;
use exchange_service::{
    error::AppError,
    models::{Conversation, MessageTarget},
};
use uuid::Uuid;

#[tokio::test]
async fn test_thread_round_trip() {
    let fx = Fixture::new().await;
    let delivery = &fx.state.delivery;

    let opened = delivery
        .handle_chat_event(
            &fx.alice,
            "Is the ladder still available?",
            MessageTarget::NewThread {
                recipients: vec![fx.bob.id],
            },
        )
        .await
        .unwrap();
    assert!(opened.created_thread);
    let conversation = opened.message.conversation;
    assert!(matches!(conversation, Conversation::Thread(_)));

    let reply = delivery
        .handle_chat_event(
            &fx.bob,
            "Yes, come by tomorrow",
            MessageTarget::Thread(conversation.id()),
        )
        .await
        .unwrap();
    assert!(!reply.created_thread);

    let for_alice = fx
        .state
        .messages
        .list_messages(conversation, fx.alice.id)
        .await
        .unwrap();
    assert_eq!(for_alice.len(), 2);
    assert_eq!(for_alice[0].message, "Is the ladder still available?");
    assert!(for_alice[0].author.is_me);
    assert_eq!(for_alice[1].author.name, "Bob");
    assert!(!for_alice[1].author.is_me);
    assert!(for_alice[0].time_sent <= for_alice[1].time_sent);

    let for_bob = fx
        .state
        .messages
        .list_messages(conversation, fx.bob.id)
        .await
        .unwrap();
    assert!(!for_bob[0].author.is_me);
    assert!(for_bob[1].author.is_me);

    assert!(matches!(
        fx.state.messages.list_messages(conversation, fx.carol.id).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_unknown_conversations_not_found() {
    let fx = Fixture::new().await;
    let delivery = &fx.state.delivery;

    assert!(matches!(
        delivery
            .handle_chat_event(&fx.alice, "hello?", MessageTarget::Thread(Uuid::new_v4()))
            .await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        delivery
            .handle_chat_event(
                &fx.alice,
                "hello?",
                MessageTarget::Transaction(Uuid::new_v4())
            )
            .await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        delivery
            .handle_chat_event(
                &fx.alice,
                "hello?",
                MessageTarget::NewThread {
                    recipients: vec![Uuid::new_v4()]
                }
            )
            .await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        delivery
            .handle_chat_event(
                &fx.alice,
                "talking to myself",
                MessageTarget::NewThread {
                    recipients: vec![fx.alice.id]
                }
            )
            .await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_outsider_cannot_post_to_transaction() {
    let fx = Fixture::new().await;
    let tx = fx.propose().await;

    let result = fx
        .state
        .delivery
        .handle_chat_event(&fx.carol, "let me in", MessageTarget::Transaction(tx.id))
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert!(fx.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_unread_is_a_set_and_acknowledge_is_idempotent() {
    let fx = Fixture::new().await;
    let delivery = &fx.state.delivery;
    let messages = &fx.state.messages;

    let first = delivery
        .handle_chat_event(
            &fx.alice,
            "one",
            MessageTarget::NewThread {
                recipients: vec![fx.bob.id],
            },
        )
        .await
        .unwrap();
    let thread_id = first.message.conversation.id();
    delivery
        .handle_chat_event(&fx.alice, "two", MessageTarget::Thread(thread_id))
        .await
        .unwrap();

    assert_eq!(messages.unread_count(fx.bob.id).await.unwrap(), 1);
    assert_eq!(messages.unread_count(fx.alice.id).await.unwrap(), 0);

    assert_eq!(messages.acknowledge(fx.bob.id, thread_id).await.unwrap(), 0);
    assert_eq!(messages.acknowledge(fx.bob.id, thread_id).await.unwrap(), 0);
    assert!(fx.user(fx.bob.id).await.unread_threads.is_empty());

    // Acknowledging something that was never unread is harmless
    assert_eq!(
        messages.acknowledge(fx.alice.id, Uuid::new_v4()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_group_thread_reaches_everyone() {
    let fx = Fixture::new().await;

    let posted = fx
        .state
        .delivery
        .handle_chat_event(
            &fx.alice,
            "Garden tools swap on Saturday?",
            MessageTarget::NewThread {
                recipients: vec![fx.bob.id, fx.carol.id],
            },
        )
        .await
        .unwrap();

    assert_eq!(posted.participants.len(), 3);
    let thread_id = posted.message.conversation.id();
    for user in [&fx.bob, &fx.carol] {
        assert_eq!(fx.user(user.id).await.unread_threads, vec![thread_id]);
        assert_eq!(fx.notifier.sent_to(user.id).len(), 1);
    }
    assert!(fx.notifier.sent_to(fx.alice.id).is_empty());
}
