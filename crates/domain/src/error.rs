/// Shared error type used across all event-agent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("optimistic concurrency: stream {stream} expected version {expected_version:?}, actual {actual_version:?}")]
    OptimisticConcurrency {
        stream: String,
        expected_version: i64,
        actual_version: Option<i64>,
    },

    #[error("event store transport: {0}")]
    EventStoreTransport(String),

    #[error("model transport: {0}")]
    ModelTransport(String),

    #[error("model response malformed: {0}")]
    ModelResponse(String),

    #[error("provider '{provider}': {message}")]
    Provider { provider: String, message: String },

    #[error("http transport: {0}")]
    Http(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool already registered: {0}")]
    ToolAlreadyRegistered(String),

    #[error("max iterations exceeded: {0}")]
    MaxIterationsExceeded(usize),

    #[error("config: {0}")]
    Config(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
