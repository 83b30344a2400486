#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("invalid endpoint '{endpoint}': {detail}")]
    InvalidEndpoint { endpoint: String, detail: String },

    #[error("http client: {0}")]
    Client(String),

    #[error("emulator server: {0}")]
    Serve(#[from] std::io::Error),
}
