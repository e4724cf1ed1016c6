use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Machine-readable validation codes returned in the `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// A required field is absent or blank.
    MissingField,
    /// The request body is not valid JSON for the endpoint.
    InvalidJson,
    /// Neither a one-time token nor a stored card was supplied.
    MissingSource,
    /// The one-time token is empty, a placeholder, or too short.
    MissingNonce,
    /// The amount is not a positive integer of minor units.
    BadAmount,
    /// The currency is not a three-letter code.
    BadCurrency,
    /// The caller-supplied idempotency key is out of bounds.
    BadIdempotencyKey,
    /// The request body exceeds the configured size limit.
    PayloadTooLarge,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidJson => "INVALID_JSON",
            Self::MissingSource => "MISSING_SOURCE",
            Self::MissingNonce => "MISSING_NONCE",
            Self::BadAmount => "BAD_AMOUNT",
            Self::BadCurrency => "BAD_CURRENCY",
            Self::BadIdempotencyKey => "BAD_IDEMPOTENCY_KEY",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSource | Self::MissingNonce | Self::BadAmount | Self::BadCurrency => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::MissingField | Self::InvalidJson | Self::BadIdempotencyKey => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type shared by every layer of the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Not configured: {0}")]
    Config(String),

    #[error("Validation failed ({code}): {message}")]
    Validation {
        code: ValidationCode,
        message: String,
    },

    #[error("Square API error during '{operation}' [HTTP {status}]")]
    Upstream {
        operation: String,
        status: u16,
        body: Value,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(String),
}

/// Uniform error envelope rendered for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub kind: &'static str,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub error_id: String,
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(code: ValidationCode, msg: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: msg.into(),
        }
    }

    /// Shorthand for a `MISSING_FIELD` validation error naming the field.
    pub fn missing_field(field: &str) -> Self {
        Self::validation(ValidationCode::MissingField, format!("{field} is required"))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The validation code, if this is a validation error.
    pub fn validation_code(&self) -> Option<ValidationCode> {
        match self {
            Self::Validation { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Stable `kind` string used in the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Validation { .. } => "validation_error",
            Self::Upstream { .. } => "upstream_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) | Self::Anyhow(_) => "internal_error",
            #[cfg(feature = "database")]
            Self::Database(_) => "internal_error",
        }
    }

    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation { code, .. } => code.status_code(),
            Self::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "database")]
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> String {
        match self {
            Self::Validation { code, .. } => code.as_str().to_string(),
            // Surface Square's own first error code when it sent one
            Self::Upstream { body, .. } => body
                .get("errors")
                .and_then(|errors| errors.get(0))
                .and_then(|first| first.get("code"))
                .and_then(Value::as_str)
                .unwrap_or("UPSTREAM_ERROR")
                .to_string(),
            Self::Config(_) => "NOT_CONFIGURED".to_string(),
            Self::NotFound(_) => "NOT_FOUND".to_string(),
            Self::Conflict(_) => "CONFLICT".to_string(),
            Self::Forbidden(_) => "FORBIDDEN".to_string(),
            Self::Unauthorized(_) => "UNAUTHORIZED".to_string(),
            Self::Timeout(_) => "REQUEST_TIMEOUT".to_string(),
            Self::Internal(_) | Self::Anyhow(_) => "INTERNAL_ERROR".to_string(),
            #[cfg(feature = "database")]
            Self::Database(_) => "INTERNAL_ERROR".to_string(),
        }
    }

    /// Message safe to return to callers.
    ///
    /// Server-side failures collapse to a generic message; the full error is
    /// only written to the logs.
    fn safe_message(&self) -> String {
        match self {
            Self::Config(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Forbidden(msg)
            | Self::Unauthorized(msg) => msg.clone(),
            Self::Validation { message, .. } => message.clone(),
            Self::Timeout(_) => "Request timed out".to_string(),
            Self::Upstream { operation, .. } => {
                format!("Square rejected the {} request", operation.replace('_', " "))
            }
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            #[cfg(feature = "database")]
            Self::Database(_) => "Internal server error".to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Upstream { body, .. } => body.get("errors").cloned().or_else(|| {
                if body.is_null() {
                    None
                } else {
                    Some(body.clone())
                }
            }),
            _ => None,
        }
    }

    /// Build the envelope for this error without rendering it.
    pub fn to_error_response(&self, error_id: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            status: "FAILED",
            kind: self.kind(),
            code: self.code(),
            message: self.safe_message(),
            details: self.details(),
            error_id: error_id.into(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                kind = self.kind(),
                error = %self,
                "Request failed"
            );
        } else {
            tracing::warn!(
                status = status.as_u16(),
                error_id = %error_id,
                kind = self.kind(),
                error = %self,
                "Request rejected"
            );
        }

        (status, Json(self.to_error_response(error_id))).into_response()
    }
}

/// Result type alias used across the relay
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Internal(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        // Transport failures surface as generic server errors
        if err.is_timeout() {
            RelayError::Internal(format!("Square request timed out: {}", err))
        } else if err.is_connect() {
            RelayError::Internal(format!("Connection error: {}", err))
        } else if err.is_decode() {
            RelayError::Internal(format!("Undecodable Square response: {}", err))
        } else {
            RelayError::Internal(format!("Request error: {}", err))
        }
    }
}

impl From<validator::ValidationErrors> for RelayError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut field_errors: Vec<String> = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.as_ref()))
                    .collect();
                if messages.is_empty() {
                    format!("{}: invalid", field)
                } else {
                    format!("{}: {}", field, messages.join(", "))
                }
            })
            .collect();
        field_errors.sort();

        RelayError::validation(ValidationCode::MissingField, field_errors.join("; "))
    }
}

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for RelayError {
    fn from(err: sea_orm::DbErr) -> Self {
        if let Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return RelayError::Conflict(detail);
        }
        match &err {
            sea_orm::DbErr::RecordNotFound(msg) => RelayError::NotFound(if msg.is_empty() {
                "Record not found".to_string()
            } else {
                msg.clone()
            }),
            sea_orm::DbErr::Conn(inner) => {
                RelayError::Database(format!("Connection error: {}", inner))
            }
            sea_orm::DbErr::Query(inner) => RelayError::Database(format!("Query error: {}", inner)),
            sea_orm::DbErr::Exec(inner) => {
                RelayError::Database(format!("Execution error: {}", inner))
            }
            _ => RelayError::Database(format!("Database error: {}", err)),
        }
    }
}
