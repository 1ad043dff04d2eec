use thiserror::Error;

/// Application-wide error types for sift.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or unparseable configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No schema reference resolved from the request, the crawl source or
    /// the global settings.
    #[error("No response schema configured (set one on the request, the crawl source or SIFT_RESPONSE_MODEL)")]
    SchemaNotConfigured,

    /// A schema path did not match any registered schema.
    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    /// Model output does not match the expected schema.
    #[error("Schema validation error: {0}")]
    SchemaValidationError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP request failed before a status was received.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Server answered a page request with a non-success status.
    #[error("HTTP {status_code} for {url}")]
    HttpStatus { status_code: u16, url: String },

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Completion provider rejected the call.
    #[error("LLM error (HTTP {status_code}): {message}")]
    LlmError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Extraction of a single page failed. `source` is the underlying cause.
    #[error("Extraction failed for {url}: {source}")]
    ExtractionFailed {
        url: String,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// Wrap a per-page failure, keeping the page URL for diagnostics.
    pub fn extraction_failed(url: impl Into<String>, source: AppError) -> Self {
        AppError::ExtractionFailed {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// Returns true for setup-time errors that must abort the crawl before
    /// any page is fetched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::ConfigError(_) | AppError::SchemaNotConfigured | AppError::UnknownSchema(_)
        )
    }

    /// Returns true if this error is transient and worth retrying.
    ///
    /// The core never retries; this only informs the caller's policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::LlmError { retryable, .. } => *retryable,
            AppError::HttpStatus { status_code, .. } => {
                matches!(*status_code, 408 | 429) || *status_code >= 500
            }
            AppError::ExtractionFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
