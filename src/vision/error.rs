//! Errors from the remote vision service.

/// Errors that can occur during Custom Vision calls.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Training key not configured")]
    MissingTrainingKey,

    #[error("Prediction key not configured")]
    MissingPredictionKey,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Message from the service, usually about an invalid or missing key
        message: String,
    },

    #[error("Rate limited: {message}")]
    RateLimit {
        /// Human-readable rate limit message
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("API error ({status}{}): {message}", code_suffix(.code))]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Service error code, e.g. `BadRequestImageFormat`
        code: Option<String>,
        message: String,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(", {}", c)).unwrap_or_default()
}

impl VisionError {
    /// Whether the failure came from credentials rather than the request.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            VisionError::Unauthorized { .. }
                | VisionError::MissingTrainingKey
                | VisionError::MissingPredictionKey
        )
    }
}
