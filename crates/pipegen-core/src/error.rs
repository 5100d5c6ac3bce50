use thiserror::Error;

/// Structured error taxonomy for the PipeGen engine.
///
/// Setup-time variants (`ProjectInvalid`, `GatewayUnavailable`,
/// `StatementError`, `BrokerError`, `RegistryError`) are fatal to a run and
/// propagate to the caller after deferred cleanup. `ProducerError` and
/// `ConsumerDecodeError` are per-record; callers count and log them via
/// [`crate::status::StatusObserver`] rather than propagating them.
#[derive(Debug, Error)]
pub enum PipegenError {
    #[error("project invalid: {0}")]
    ProjectInvalid(String),

    #[error("sql gateway unavailable after {attempts} attempts: {last_status}")]
    GatewayUnavailable { attempts: u32, last_status: String },

    #[error("statement {statement} failed: {message}")]
    StatementError {
        statement: String,
        message: String,
        operation_handle: Option<String>,
    },

    #[error("broker error during {action} on {topic}: {source}")]
    BrokerError {
        action: &'static str,
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("registry error: {0}")]
    RegistryError(String),

    #[error("producer error: {0}")]
    ProducerError(String),

    #[error("consumer decode error: {0}")]
    ConsumerDecodeError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipegenError {
    /// Maps an error to a small, stable process exit code so that tooling
    /// driving this CLI can distinguish failure classes without parsing
    /// log text.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipegenError::ProjectInvalid(_) => 10,
            PipegenError::GatewayUnavailable { .. } => 11,
            PipegenError::StatementError { .. } => 12,
            PipegenError::BrokerError { .. } => 13,
            PipegenError::RegistryError(_) => 14,
            PipegenError::ProducerError(_) => 15,
            PipegenError::ConsumerDecodeError(_) => 16,
            PipegenError::Timeout(_) => 17,
            PipegenError::Cancelled => 18,
            PipegenError::Other(_) => 1,
        }
    }
}
