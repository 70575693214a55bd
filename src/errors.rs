use axum::http::StatusCode;
use std::fmt;

/// Message shown whenever a request never reached the billing backend.
pub const NO_SERVER_RESPONSE: &str = "No server response. Please check your internet connection.";

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// No API key in the session; data access is disabled.
    MissingCredential(String),
    /// Client-side validation failed before any network dispatch.
    Validation(String),
    /// The request never got a response (connect failure, timeout).
    NoServerResponse(String),
    /// The backend reported 503 on a path that rewrites it.
    ServiceUnavailable(String),
    /// The backend answered with an error status.
    Server {
        /// HTTP status returned by the backend.
        status: u16,
        /// Message taken from the response body, or a resource fallback.
        message: String,
    },
    /// The backend answered 2xx with nothing usable in the body.
    EmptyResponse(String),
    /// The body was present but did not have the expected shape.
    Decode(String),
    /// Internal error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// The text shown to the operator in an alert.
    ///
    /// Unlike `Display`, no category prefix is added, so backend messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            AppError::MissingCredential(msg)
            | AppError::Validation(msg)
            | AppError::NoServerResponse(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::EmptyResponse(msg)
            | AppError::Decode(msg)
            | AppError::InternalError(msg) => msg.clone(),
            AppError::Server { message, .. } => message.clone(),
            AppError::WithContext { source, .. } => source.user_message(),
        }
    }

    /// Maps the error onto the status code the console surface answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoServerResponse(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Server { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::EmptyResponse(_) | AppError::Decode(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }

    /// True for errors raised before any request left the process.
    pub fn is_client_side(&self) -> bool {
        match self {
            AppError::MissingCredential(_) | AppError::Validation(_) => true,
            AppError::WithContext { source, .. } => source.is_client_side(),
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::MissingCredential(msg) => write!(f, "Missing credential: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NoServerResponse(msg) => write!(f, "No response: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Server { status, message } => {
                write!(f, "Backend returned {}: {}", status, message)
            }
            AppError::EmptyResponse(msg) => write!(f, "Empty response: {}", msg),
            AppError::Decode(msg) => write!(f, "Decode error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    /// Converts a `serde_json::Error` into an `AppError`.
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for serde_json::Error to add context
impl<T> ResultExt<T> for Result<T, serde_json::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::Decode(e.to_string())),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::Decode(e.to_string())),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_has_no_prefix() {
        let err = AppError::Server {
            status: 422,
            message: "Client already approved".to_string(),
        };
        assert_eq!(err.user_message(), "Client already approved");
        assert_eq!(err.to_string(), "Backend returned 422: Client already approved");
    }

    #[test]
    fn test_context_keeps_source_message_and_status() {
        let result: Result<(), AppError> =
            Err(AppError::ServiceUnavailable("try later".to_string()));
        let err = result.context("Loading KYB requests").unwrap_err();

        assert_eq!(err.user_message(), "try later");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().starts_with("Loading KYB requests: "));
    }

    #[test]
    fn test_client_side_classification() {
        assert!(AppError::Validation("x".into()).is_client_side());
        assert!(AppError::MissingCredential("x".into()).is_client_side());
        assert!(!AppError::NoServerResponse(NO_SERVER_RESPONSE.into()).is_client_side());
    }

    #[test]
    fn test_unknown_backend_status_maps_to_bad_gateway() {
        let err = AppError::Server {
            status: 1000,
            message: "weird".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
