#[derive(Debug, thiserror::Error)]
pub enum SamplesError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Snippet(#[from] pubsub_snippets::SnippetError),

    #[error("{0}")]
    Rest(#[from] pubsub_rest::RestError),

    #[error("service: {0}")]
    Service(#[from] pubsub_api::ServiceError),

    #[error("{failed} of {total} records were not published")]
    IncompletePublish { failed: usize, total: usize },

    #[error("publisher shutdown: {0}")]
    Shutdown(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
