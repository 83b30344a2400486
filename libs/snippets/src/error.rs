use std::path::PathBuf;
use std::time::Duration;

use pubsub_api::{Code, Encoding, ServiceError};
use pubsub_client::SubscriberError;

#[derive(Debug, thiserror::Error)]
pub enum SnippetError {
    #[error("schema {origin}: {detail}")]
    SchemaParse { origin: String, detail: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("avro data {}: {detail}", path.display())]
    Decode { path: PathBuf, detail: String },

    #[error("topic {topic} has no usable schema encoding ({encoding})")]
    UnsupportedEncoding { topic: String, encoding: Encoding },

    #[error("service: {0}")]
    Service(ServiceError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("subscriber: {0}")]
    Subscriber(SubscriberError),
}

impl From<ServiceError> for SnippetError {
    fn from(e: ServiceError) -> Self {
        if e.code() == Code::NotFound {
            SnippetError::NotFound(e.message().to_string())
        } else {
            SnippetError::Service(e)
        }
    }
}

impl From<SubscriberError> for SnippetError {
    fn from(e: SubscriberError) -> Self {
        match e {
            SubscriberError::Failed(service) => service.into(),
            SubscriberError::Timeout(after) => SnippetError::Timeout(after),
            other => SnippetError::Subscriber(other),
        }
    }
}

impl SnippetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnippetError::Io {
            path: path.into(),
            source,
        }
    }

    /// Write failure on the sample's console output.
    pub(crate) fn output(source: std::io::Error) -> Self {
        Self::io("<output>", source)
    }
}
