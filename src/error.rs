use crate::clients::spotinst::SpotinstError;
use thiserror::Error;

/// Error codes AWS services use to signal that a caller is being throttled.
pub const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Parameter or document key that caused the error (e.g., "TagSet[0]", "uri")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected format, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "s3_uri", "tags")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the AWS helpers.
#[derive(Debug, Error)]
pub enum Error {
    /// An AWS service rejected a call. `code` is the service error code
    /// (e.g. `Throttling`, `NoSuchKey`, `InvalidInstanceID.NotFound`).
    #[error("Service error calling {operation}: {code}: {message}")]
    Service {
        operation: String,
        code: String,
        message: String,
    },

    /// A service waiter gave up before the resource reached the wanted state.
    #[error("Waiter {waiter} failed: {message}")]
    Waiter { waiter: String, message: String },

    /// The response did not arrive in time.
    #[error("Read timeout calling {operation}")]
    ReadTimeout { operation: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Waiting stopped early because success is no longer possible,
    /// e.g. the resource entered a `failed` or `terminated` state.
    #[error("Expected timeout: {0}")]
    ExpectedTimeout(String),

    #[error("{0} is not written correctly to S3 bucket")]
    S3Writing(String),

    #[error("Catch all exception: {0}")]
    CatchAll(String),

    #[error("Spotinst error: {0}")]
    Spotinst(#[from] SpotinstError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a service error as reported by an AWS SDK call
    pub fn service(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Service {
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_with_context(msg, ErrorContext::new())
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Service error code, if this error came from a service call.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Service { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// True when the service error code names one of [`THROTTLING_CODES`].
    ///
    /// Matching is by substring, so prefixed codes such as
    /// `Client.RequestLimitExceeded` count as well.
    pub fn is_throttling(&self) -> bool {
        self.code()
            .map(|code| THROTTLING_CODES.iter().any(|t| code.contains(t)))
            .unwrap_or(false)
    }

    /// Waiter failures and read timeouts. These are worth another attempt
    /// regardless of any error code.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Waiter { .. } | Error::ReadTimeout { .. })
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}
