use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire engine
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Chain(#[from] ChainError),

    #[error("Secret error: {0}")]
    Secret(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// Whether retrying the failed operation can plausibly succeed.
    ///
    /// Only transient chain failures qualify; data-integrity and store
    /// errors are surfaced immediately as terminal outcomes.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Chain(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Ledger-client errors, split along the retryable/terminal boundary
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Provider timeout: {0}")]
    Timeout(String),

    #[error("No UTXOs found in the wallet. Wallet is empty")]
    EmptyWallet,

    #[error("No transaction hash found on request")]
    MissingTransactionHash,

    #[error("UTXO not found for transaction {0}")]
    UtxoNotFound(String),

    #[error("No datum found in UTXO")]
    MissingDatum,

    #[error("Invalid datum: {0}")]
    InvalidDatum(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
}

impl ChainError {
    /// Transient failures are retried by the orchestrator. An empty
    /// wallet is routed through the same path: it is usually a funding
    /// problem, but can also be UTXO propagation delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainError::Provider(_) | ChainError::Timeout(_) | ChainError::EmptyWallet
        )
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ChainError::Timeout(error.to_string())
        } else {
            ChainError::Provider(error.to_string())
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

/// Flatten an error chain into the note attached to a failed request
pub fn error_note(context: &str, error: &AppError) -> String {
    format!("{}: {}", context, error)
}
