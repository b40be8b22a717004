//! Repository-layer [`AppError`]s: driver failures and the guards checked
//! under a row lock.

use common::{AppError, AppResult, ErrorCode, OrderId};
use sqlx::error::ErrorKind;

use crate::models::OrderStatus;

/// SQLSTATE `numeric_value_out_of_range`.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Wraps a query failure.
///
/// Constraint violations surface as `DATABASE_CONSTRAINT_VIOLATION`,
/// connectivity problems as `DATABASE_CONNECTION_ERROR`, integer overflow as
/// `VALIDATION_INVALID_INPUT`, anything else as `DATABASE_QUERY_ERROR`.
pub fn db_error(error: sqlx::Error) -> AppError {
    let (code, message) = match &error {
        sqlx::Error::Database(db_err) => match db_err.kind() {
            ErrorKind::UniqueViolation => (
                ErrorCode::DatabaseConstraintViolation,
                format!(
                    "unique constraint {} violated",
                    db_err.constraint().unwrap_or("unknown")
                ),
            ),
            ErrorKind::ForeignKeyViolation => (
                ErrorCode::DatabaseConstraintViolation,
                "referenced record does not exist or is still referenced".to_string(),
            ),
            ErrorKind::NotNullViolation | ErrorKind::CheckViolation => (
                ErrorCode::DatabaseConstraintViolation,
                "record violates a column constraint".to_string(),
            ),
            _ if db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) => (
                ErrorCode::ValidationInvalidInput,
                "value exceeds the storable range".to_string(),
            ),
            _ => (ErrorCode::DatabaseQueryError, "database query failed".to_string()),
        },
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => (
            ErrorCode::DatabaseConnectionError,
            "database connection unavailable".to_string(),
        ),
        _ => (ErrorCode::DatabaseQueryError, "database query failed".to_string()),
    };

    tracing::debug!(%code, error = %error, "database error");
    AppError::repository(code, message).with_source(error)
}

/// Wraps a failure to begin or commit a transaction.
pub fn tx_error(error: sqlx::Error) -> AppError {
    tracing::debug!(error = %error, "transaction error");
    AppError::repository(ErrorCode::DatabaseTransactionError, "database transaction failed")
        .with_source(error)
}

/// An in-memory computation that overflowed, reported like the database's
/// `numeric_value_out_of_range`.
pub(crate) fn out_of_range(what: &str) -> AppError {
    AppError::repository(
        ErrorCode::ValidationInvalidInput,
        format!("{what} exceeds the storable range"),
    )
}

/// Rejects a status write when the order moved on since the caller read it.
pub(crate) fn check_expected_status(
    id: OrderId,
    current: OrderStatus,
    expected: OrderStatus,
) -> AppResult<()> {
    if current != expected {
        return Err(AppError::repository(
            ErrorCode::OrderInvalidStatusTransition,
            format!("order {id} is {current}, expected {expected}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_cancellable(id: OrderId, current: OrderStatus) -> AppResult<()> {
    if current == OrderStatus::Cancelled {
        return Err(AppError::repository(
            ErrorCode::OrderAlreadyCancelled,
            format!("order {id} is already cancelled"),
        ));
    }
    if !current.can_transition_to(OrderStatus::Cancelled) {
        return Err(AppError::repository(
            ErrorCode::OrderInvalidStatusTransition,
            format!("order {id} cannot move from {current} to {}", OrderStatus::Cancelled),
        ));
    }
    Ok(())
}

/// Items may only be appended while the order is pending.
pub(crate) fn check_pending(id: OrderId, current: OrderStatus) -> AppResult<()> {
    if current != OrderStatus::Pending {
        return Err(AppError::repository(
            ErrorCode::OrderCannotModify,
            format!("items can only be added to pending orders, order {id} is {current}"),
        ));
    }
    Ok(())
}
