use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilamentError {
    #[error("Interceptor '{identity}' is already registered")]
    DuplicateRegistration { identity: String },

    #[error("Interceptor '{identity}' failed to construct: {source}")]
    InterceptorConstruct {
        identity: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Interceptor '{identity}' failed to initialize: {source}")]
    InterceptorInit {
        identity: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Trace id '{0}' is not a 32-character hex string")]
    MalformedTraceId(String),

    #[error("Span id '{0}' is not a 16-character hex string")]
    MalformedSpanId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FilamentError>;
