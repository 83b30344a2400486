use std::time::Duration;

use pubsub_api::ServiceError;

use crate::subscriber::SubscriberState;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Service(#[from] ServiceError),

    #[error("publisher is shut down")]
    Shutdown,

    #[error("publisher did not terminate within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriberError {
    #[error("subscriber is {0:?}, operation needs a fresh subscriber")]
    IllegalState(SubscriberState),

    #[error("subscriber still running after {0:?}")]
    Timeout(Duration),

    #[error("subscriber failed: {0}")]
    Failed(ServiceError),
}
