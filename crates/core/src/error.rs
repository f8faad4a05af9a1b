use thiserror::Error;

/// Centralized error types for the application
///
/// All errors in the application are converted to this enum for consistent
/// error handling. Uses `thiserror` for automatic conversion and display
/// formatting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Telegram API errors
    #[cfg(feature = "telegram")]
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Cloudflare API rejected a call; carries the platform's message
    #[error("CF API Error: {0}")]
    Cloudflare(String),

    /// HTTP/transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Trigger endpoint secret mismatch
    #[error("Unauthorized")]
    Unauthorized,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Operator-supplied field failed validation
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// True when the error is the registry layer (pool or SQLite) failing.
    pub fn is_registry(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::DatabasePool(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloudflare_error_keeps_platform_message() {
        let err = AppError::Cloudflare("workers.api.error.script_too_large".to_string());
        assert_eq!(err.to_string(), "CF API Error: workers.api.error.script_too_large");
    }

    #[test]
    fn registry_errors_are_classified() {
        let err = AppError::Database(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.is_registry());
        assert!(!AppError::Unauthorized.is_registry());
    }
}
