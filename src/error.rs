use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Closed set of failure kinds so each path stays distinguishable in
/// tests and logs, instead of one catch-all 500.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Missing required {0} environment variable!")]
    MissingConfig(&'static str),

    #[error("{0}")]
    InvalidConfig(String),

    #[error("{0}")]
    InvalidRequest(String),

    /// Completion Service fault. Recovered by the webhook handler with the
    /// apology reply; only maps to a response if it escapes anyway.
    #[error("Completion service error: {0}")]
    Completion(String),

    /// The assistant run never left its pending status within the poll
    /// budget. Unlike other completion faults this one is surfaced.
    #[error("Assistant run did not complete within {0} status checks")]
    CompletionTimeout(u32),

    #[error("Messaging relay error: {0}")]
    Relay(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("{self}");

        let (status, body) = match self {
            AppError::MissingConfig(_) | AppError::InvalidConfig(_) | AppError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::CompletionTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "Assistant run timed out".to_string(),
            ),
            AppError::Relay(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error sending message".to_string(),
            ),
            AppError::Completion(_) | AppError::Unexpected(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, body).into_response()
    }
}
