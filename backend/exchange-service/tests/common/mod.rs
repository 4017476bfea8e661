#![allow(dead_code)]

use async_trait::async_trait;
use exchange_service::{
    config::{AppConfig, Config, DatabaseConfig, EmailSettings, PolicyConfig},
    error::{AppError, Result},
    models::{RequestType, Transaction, User},
    repository::{InMemoryStore, Repositories, UserRepository},
    services::{NotificationContext, NotificationKind, Notifier, ProposeRequest},
    state::AppState,
    websocket::WsOutboundEvent,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

pub fn test_config(policy: PolicyConfig) -> Config {
    Config {
        app: AppConfig {
            env: "test".into(),
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 1,
        },
        email: EmailSettings::default(),
        policy,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub recipient: Uuid,
    pub kind: NotificationKind,
    pub context: NotificationContext,
}

/// Captures every notification instead of sending mail
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing_for: Option<Uuid>,
}

impl RecordingNotifier {
    pub fn failing_for(user_id: Uuid) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_for: Some(user_id),
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: Uuid) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient == user_id)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &User,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> Result<()> {
        if self.failing_for == Some(recipient.id) {
            return Err(AppError::Notification("smtp unavailable".into()));
        }
        self.sent.lock().unwrap().push(SentNotification {
            recipient: recipient.id,
            kind,
            context: context.clone(),
        });
        Ok(())
    }
}

/// User store whose unread bookkeeping fails for one user
pub struct FlakyUsers {
    inner: Arc<InMemoryStore>,
    broken: Uuid,
}

impl FlakyUsers {
    pub fn new(inner: Arc<InMemoryStore>, broken: Uuid) -> Self {
        Self { inner, broken }
    }
}

#[async_trait]
impl UserRepository for FlakyUsers {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.inner.find_by_id(id).await
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        self.inner.find_many(ids).await
    }

    async fn add_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize> {
        if user_id == self.broken {
            return Err(AppError::Database("connection reset".into()));
        }
        self.inner.add_unread(user_id, conversation_id).await
    }

    async fn remove_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize> {
        self.inner.remove_unread(user_id, conversation_id).await
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
    pub alice: User,
    pub bob: User,
    pub carol: User,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with(RecordingNotifier::default(), PolicyConfig::default(), None).await
    }

    /// `flaky_user` gets a user store whose `add_unread` always fails
    pub async fn with(
        notifier: RecordingNotifier,
        policy: PolicyConfig,
        flaky_user: Option<Uuid>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let alice = User::new("alice@example.com", "Alice");
        let bob = User::new("bob@example.com", "Bob");
        let carol = User::new("carol@example.com", "Carol");
        for user in [&alice, &bob, &carol] {
            store.insert_user(user.clone()).await;
        }
        Self::from_parts(store, notifier, policy, flaky_user, alice, bob, carol)
    }

    pub fn from_parts(
        store: Arc<InMemoryStore>,
        notifier: RecordingNotifier,
        policy: PolicyConfig,
        flaky_user: Option<Uuid>,
        alice: User,
        bob: User,
        carol: User,
    ) -> Self {
        let mut repos = Repositories::in_memory(store.clone());
        if let Some(broken) = flaky_user {
            repos.users = Arc::new(FlakyUsers::new(store.clone(), broken));
        }

        let notifier = Arc::new(notifier);
        let state = AppState::build(test_config(policy), repos, notifier.clone());
        Self {
            store,
            notifier,
            state,
            alice,
            bob,
            carol,
        }
    }

    /// Alice offers a service to Bob
    pub async fn propose(&self) -> Transaction {
        self.state
            .transactions
            .propose(
                &self.alice,
                ProposeRequest {
                    participant: Some(self.bob.id),
                    service_id: Some(Uuid::new_v4()),
                    request_type: RequestType::Offer,
                    message: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn user(&self, id: Uuid) -> User {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }

    /// Live connection for `user`; the greeting events are drained
    pub async fn connect(&self, user: &User) -> mpsc::UnboundedReceiver<WsOutboundEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.state.delivery.connect(user, tx).await;
        drain(&mut rx);
        rx
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<WsOutboundEvent>) -> Vec<WsOutboundEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
