mod common;

use chrono::{TimeZone, Utc};
use common::{drain, Fixture};
use exchange_service::{
    error::AppError,
    models::{Conversation, GeoPoint, RequestType, ScheduleUpdate, ScheduledLocation, TransactionStatus},
    services::{NotificationKind, ProposeRequest, TransitionOutcome},
    websocket::WsOutboundEvent,
};
use uuid::Uuid;

fn applied(status: TransactionStatus) -> TransitionOutcome {
    TransitionOutcome::Applied { status }
}

fn not_applicable(status: TransactionStatus) -> TransitionOutcome {
    TransitionOutcome::NotApplicable { status }
}

#[tokio::test]
async fn test_full_exchange_reaches_complete() {
    let fx = Fixture::new().await;
    let service = &fx.state.transactions;
    let tx = fx.propose().await;
    assert_eq!(tx.status, TransactionStatus::Proposed);

    assert_eq!(
        service.accept(tx.id, &fx.bob, None).await.unwrap(),
        applied(TransactionStatus::Accepted)
    );
    assert_eq!(
        service.confirm_exchange(tx.id, &fx.alice).await.unwrap(),
        applied(TransactionStatus::SenderAck)
    );
    assert_eq!(
        service.confirm_exchange(tx.id, &fx.bob).await.unwrap(),
        applied(TransactionStatus::Complete)
    );

    // COMPLETE is terminal; confirming again changes nothing
    assert_eq!(
        service.confirm_exchange(tx.id, &fx.alice).await.unwrap(),
        not_applicable(TransactionStatus::Complete)
    );
    assert_eq!(
        service.get(tx.id, fx.bob.id).await.unwrap().status,
        TransactionStatus::Complete
    );
}

#[tokio::test]
async fn test_recipient_confirming_first() {
    let fx = Fixture::new().await;
    let service = &fx.state.transactions;
    let tx = fx.propose().await;
    service.accept(tx.id, &fx.bob, None).await.unwrap();

    assert_eq!(
        service.confirm_exchange(tx.id, &fx.bob).await.unwrap(),
        applied(TransactionStatus::RecipientAck)
    );
    // Repeating an ack is a no-op
    assert_eq!(
        service.confirm_exchange(tx.id, &fx.bob).await.unwrap(),
        not_applicable(TransactionStatus::RecipientAck)
    );
    assert_eq!(
        service.confirm_exchange(tx.id, &fx.alice).await.unwrap(),
        applied(TransactionStatus::Complete)
    );
}

#[tokio::test]
async fn test_cancel_then_accept_is_no_op() {
    let fx = Fixture::new().await;
    let service = &fx.state.transactions;
    let tx = fx.propose().await;

    assert_eq!(
        service.cancel(tx.id, &fx.alice).await.unwrap(),
        applied(TransactionStatus::Cancelled)
    );
    assert_eq!(
        service.accept(tx.id, &fx.bob, None).await.unwrap(),
        not_applicable(TransactionStatus::Cancelled)
    );
    assert_eq!(
        service.reject(tx.id, &fx.bob).await.unwrap(),
        not_applicable(TransactionStatus::Cancelled)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirms_complete() {
    for _ in 0..25 {
        let fx = Fixture::new().await;
        let tx = fx.propose().await;
        fx.state
            .transactions
            .accept(tx.id, &fx.bob, None)
            .await
            .unwrap();

        let first = {
            let service = fx.state.transactions.clone();
            let alice = fx.alice.clone();
            tokio::spawn(async move { service.confirm_exchange(tx.id, &alice).await })
        };
        let second = {
            let service = fx.state.transactions.clone();
            let bob = fx.bob.clone();
            tokio::spawn(async move { service.confirm_exchange(tx.id, &bob).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let current = fx.state.transactions.get(tx.id, fx.alice.id).await.unwrap();
        assert_eq!(current.status, TransactionStatus::Complete);
    }
}

#[tokio::test]
async fn test_authorization_is_enforced() {
    let fx = Fixture::new().await;
    let service = &fx.state.transactions;
    let tx = fx.propose().await;

    assert!(matches!(
        service.accept(tx.id, &fx.alice, None).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        service.cancel(tx.id, &fx.bob).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        service.accept(tx.id, &fx.carol, None).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        service.confirm_exchange(tx.id, &fx.carol).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        service.get(tx.id, fx.carol.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        service.accept(Uuid::new_v4(), &fx.bob, None).await,
        Err(AppError::NotFound(_))
    ));

    assert_eq!(
        service.get(tx.id, fx.alice.id).await.unwrap().status,
        TransactionStatus::Proposed
    );
}

#[tokio::test]
async fn test_propose_validation() {
    let fx = Fixture::new().await;
    let service = &fx.state.transactions;

    let to_self = ProposeRequest {
        participant: Some(fx.alice.id),
        service_id: Some(Uuid::new_v4()),
        request_type: RequestType::Request,
        message: None,
    };
    assert!(matches!(
        service.propose(&fx.alice, to_self).await,
        Err(AppError::Validation(_))
    ));

    let unknown = ProposeRequest {
        participant: Some(Uuid::new_v4()),
        service_id: Some(Uuid::new_v4()),
        request_type: RequestType::Request,
        message: None,
    };
    assert!(matches!(
        service.propose(&fx.alice, unknown).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_propose_with_message_opens_transaction_chat() {
    let fx = Fixture::new().await;
    let tx = fx
        .state
        .transactions
        .propose(
            &fx.alice,
            ProposeRequest {
                participant: Some(fx.bob.id),
                service_id: Some(Uuid::new_v4()),
                request_type: RequestType::Offer,
                message: Some("Happy to help with your bike".into()),
            },
        )
        .await
        .unwrap();

    let messages = fx
        .state
        .messages
        .list_messages(Conversation::Transaction(tx.id), fx.bob.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "Happy to help with your bike");
    assert!(!messages[0].author.is_me);

    let bob = fx.user(fx.bob.id).await;
    assert_eq!(bob.unread_threads, vec![tx.id]);

    let emails = fx.notifier.sent_to(fx.bob.id);
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].kind, NotificationKind::NewMessage);
    assert!(fx.notifier.sent_to(fx.alice.id).is_empty());
}

#[tokio::test]
async fn test_schedule_notifies_counterpart() {
    let fx = Fixture::new().await;
    let tx = fx.propose().await;
    fx.state
        .transactions
        .accept(tx.id, &fx.bob, None)
        .await
        .unwrap();
    let mut alice_rx = fx.connect(&fx.alice).await;

    let when = Utc.with_ymd_and_hms(2026, 5, 1, 14, 0, 0).unwrap();
    let update = ScheduleUpdate {
        happened_at: Some(when),
        location: Some(ScheduledLocation {
            point: GeoPoint::new(13.4, 52.5).unwrap(),
            place_name: "Markthalle Neun".into(),
        }),
    };
    let updated = fx
        .state
        .transactions
        .schedule(tx.id, &fx.bob, update)
        .await
        .unwrap();

    assert_eq!(updated.status, TransactionStatus::Accepted);
    assert_eq!(updated.happened_at, Some(when));
    assert_eq!(
        updated.location.as_ref().map(|l| l.place_name.as_str()),
        Some("Markthalle Neun")
    );

    let emails = fx.notifier.sent_to(fx.alice.id);
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].kind, NotificationKind::ScheduleUpdated);
    assert_eq!(emails[0].context.sender_name, "Bob");
    assert!(fx.notifier.sent_to(fx.bob.id).is_empty());

    let pushed = drain(&mut alice_rx);
    assert!(pushed.iter().any(|e| matches!(
        e,
        WsOutboundEvent::TransactionUpdated { transaction } if transaction.happened_at == Some(when)
    )));
}

#[tokio::test]
async fn test_board_lists_visible_transactions() {
    let fx = Fixture::new().await;
    let service = &fx.state.transactions;

    let proposed = fx.propose().await;
    let accepted = fx.propose().await;
    service.accept(accepted.id, &fx.bob, None).await.unwrap();
    let rejected = fx.propose().await;
    service.reject(rejected.id, &fx.bob).await.unwrap();

    let board = service.list_for_user(fx.bob.id).await.unwrap();
    assert_eq!(board.proposed.len(), 1);
    assert_eq!(board.proposed[0].transaction.id, proposed.id);
    assert_eq!(board.upcoming.len(), 1);
    assert_eq!(board.upcoming[0].transaction.id, accepted.id);
    assert!(board.complete.is_empty());
    assert_eq!(
        board.upcoming[0].other_party.as_ref().map(|u| u.name.as_str()),
        Some("Alice")
    );

    assert!(service
        .list_for_user(fx.carol.id)
        .await
        .unwrap()
        .proposed
        .is_empty());
}
