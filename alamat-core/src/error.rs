use thiserror::Error;

/// Failures that abort a whole batch
///
/// Row-level provider problems never show up here: they end as NOT_FOUND
/// rows and counter increments.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot reach {provider}: {reason}")]
    Connectivity { provider: String, reason: String },

    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Connectivity and input problems are reported before any row is processed
    pub fn is_preflight(&self) -> bool {
        matches!(self, Error::Connectivity { .. } | Error::InputValidation(_))
    }
}
