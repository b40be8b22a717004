//! Error taxonomy shared by every layer.
//!
//! Fallible operations return [`AppResult`]. Repositories convert driver
//! failures into `DATABASE_*` codes, services add business-rule codes, and only
//! the API layer turns an [`AppError`] into a transport response.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Outcome of every fallible operation below the transport boundary.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Closed set of domain error codes, grouped by subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum ErrorCode {
    OrderNotFound,
    OrderAlreadyCancelled,
    OrderInvalidStatusTransition,
    OrderCannotModify,

    ProductNotFound,
    ProductOutOfStock,
    ProductInsufficientInventory,
    ProductInactive,
    ProductInvalidQuantity,
    ProductInvalidPrice,

    CustomerNotFound,
    CustomerEmailExists,
    CustomerInvalidEmail,

    NotificationSendFailed,
    NotificationGenerationFailed,

    DatabaseConnectionError,
    DatabaseQueryError,
    DatabaseTransactionError,
    DatabaseConstraintViolation,

    ValidationInvalidInput,
    ValidationRequiredField,

    // Reserved: no operation authenticates callers yet.
    AuthUnauthorized,
    AuthForbidden,

    SystemInternalError,
}

impl ErrorCode {
    /// Returns the wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorCode::OrderAlreadyCancelled => "ORDER_ALREADY_CANCELLED",
            ErrorCode::OrderInvalidStatusTransition => "ORDER_INVALID_STATUS_TRANSITION",
            ErrorCode::OrderCannotModify => "ORDER_CANNOT_MODIFY",
            ErrorCode::ProductNotFound => "PRODUCT_NOT_FOUND",
            ErrorCode::ProductOutOfStock => "PRODUCT_OUT_OF_STOCK",
            ErrorCode::ProductInsufficientInventory => "PRODUCT_INSUFFICIENT_INVENTORY",
            ErrorCode::ProductInactive => "PRODUCT_INACTIVE",
            ErrorCode::ProductInvalidQuantity => "PRODUCT_INVALID_QUANTITY",
            ErrorCode::ProductInvalidPrice => "PRODUCT_PRICE_INVALID",
            ErrorCode::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            ErrorCode::CustomerEmailExists => "CUSTOMER_EMAIL_EXISTS",
            ErrorCode::CustomerInvalidEmail => "CUSTOMER_INVALID_EMAIL",
            ErrorCode::NotificationSendFailed => "NOTIFICATION_SEND_FAILED",
            ErrorCode::NotificationGenerationFailed => "NOTIFICATION_GENERATION_FAILED",
            ErrorCode::DatabaseConnectionError => "DATABASE_CONNECTION_ERROR",
            ErrorCode::DatabaseQueryError => "DATABASE_QUERY_ERROR",
            ErrorCode::DatabaseTransactionError => "DATABASE_TRANSACTION_ERROR",
            ErrorCode::DatabaseConstraintViolation => "DATABASE_CONSTRAINT_VIOLATION",
            ErrorCode::ValidationInvalidInput => "VALIDATION_INVALID_INPUT",
            ErrorCode::ValidationRequiredField => "VALIDATION_REQUIRED_FIELD",
            ErrorCode::AuthUnauthorized => "AUTH_UNAUTHORIZED",
            ErrorCode::AuthForbidden => "AUTH_FORBIDDEN",
            ErrorCode::SystemInternalError => "SYSTEM_INTERNAL_ERROR",
        }
    }

    /// Maps the code to the transport status category it surfaces as.
    pub fn status(&self) -> TransportStatus {
        match self {
            ErrorCode::OrderNotFound | ErrorCode::ProductNotFound | ErrorCode::CustomerNotFound => {
                TransportStatus::NotFound
            }
            ErrorCode::OrderAlreadyCancelled
            | ErrorCode::OrderInvalidStatusTransition
            | ErrorCode::OrderCannotModify
            | ErrorCode::ProductOutOfStock
            | ErrorCode::ProductInsufficientInventory
            | ErrorCode::CustomerEmailExists
            | ErrorCode::DatabaseConstraintViolation => TransportStatus::Conflict,
            ErrorCode::ProductInactive
            | ErrorCode::ProductInvalidQuantity
            | ErrorCode::ProductInvalidPrice
            | ErrorCode::CustomerInvalidEmail
            | ErrorCode::ValidationInvalidInput
            | ErrorCode::ValidationRequiredField => TransportStatus::BadRequest,
            ErrorCode::AuthUnauthorized | ErrorCode::AuthForbidden => {
                TransportStatus::Unauthorized
            }
            ErrorCode::NotificationSendFailed
            | ErrorCode::NotificationGenerationFailed
            | ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::DatabaseTransactionError
            | ErrorCode::SystemInternalError => TransportStatus::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorCode> for &'static str {
    fn from(code: ErrorCode) -> Self {
        code.as_str()
    }
}

/// Transport-level status categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    NotFound,
    Conflict,
    BadRequest,
    Unauthorized,
    Internal,
}

/// The layer an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Repository,
    Service,
    Api,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Repository => "repository",
            Layer::Service => "service",
            Layer::Api => "api",
        };
        f.write_str(name)
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured failure: code, human message, originating layer and optional cause.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: ErrorCode,
    message: String,
    layer: Layer,
    #[source]
    source: Option<BoxedSource>,
}

impl AppError {
    /// Creates a new error without an underlying cause.
    pub fn new(code: ErrorCode, message: impl Into<String>, layer: Layer) -> Self {
        Self {
            code,
            message: message.into(),
            layer,
            source: None,
        }
    }

    /// Shorthand for a service-layer error.
    pub fn service(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, Layer::Service)
    }

    /// Shorthand for a repository-layer error.
    pub fn repository(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, Layer::Repository)
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Transport status category for this error.
    pub fn status(&self) -> TransportStatus {
        self.code.status()
    }

    /// Returns true if this error carries the given code.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}
