use crate::{
    config::Config,
    repository::Repositories,
    services::{DeliveryCoordinator, MessageService, Notifier, ReviewService, TransactionService},
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub registry: ConnectionRegistry,
    pub delivery: Arc<DeliveryCoordinator>,
    pub transactions: Arc<TransactionService>,
    pub messages: MessageService,
    pub reviews: ReviewService,
}

impl AppState {
    /// Wire every service over one set of repositories and one live registry
    pub fn build(config: Config, repos: Repositories, notifier: Arc<dyn Notifier>) -> Self {
        let registry = ConnectionRegistry::new();
        let messages = MessageService::new(repos.clone());
        let delivery = Arc::new(DeliveryCoordinator::new(
            messages.clone(),
            repos.clone(),
            registry.clone(),
            notifier,
        ));
        let transactions = Arc::new(TransactionService::new(repos.clone(), delivery.clone()));
        let reviews = ReviewService::new(repos.clone(), config.policy.clone());

        Self {
            config: Arc::new(config),
            repos,
            registry,
            delivery,
            transactions,
            messages,
            reviews,
        }
    }
}
