use pubsub_api::{Code, ServiceError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("schema '{0}' not found")]
    SchemaNotFound(String),

    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    #[error("subscription '{0}' not found")]
    SubscriptionNotFound(String),

    #[error("resource '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),

    #[error("message {index} does not match the topic schema: {detail}")]
    InvalidMessage { index: usize, detail: String },

    #[error("{0}")]
    InvalidArgument(String),
}

impl EngineError {
    /// Convert to the wire-level error, picking the status code callers
    /// branch on.
    pub fn into_service_error(self) -> ServiceError {
        let code = match &self {
            EngineError::SchemaNotFound(_)
            | EngineError::TopicNotFound(_)
            | EngineError::SubscriptionNotFound(_) => Code::NotFound,
            EngineError::AlreadyExists(_) => Code::AlreadyExists,
            EngineError::InvalidSchema(_)
            | EngineError::InvalidMessage { .. }
            | EngineError::InvalidArgument(_) => Code::InvalidArgument,
        };
        ServiceError::new(code, self.to_string())
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        e.into_service_error()
    }
}
