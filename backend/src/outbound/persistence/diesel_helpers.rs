//! Shared helpers for the Diesel repositories: error mapping, amount
//! conversion between `u64` and `BIGINT`, and SQL functions.

use tracing::debug;

use super::pool::PoolError;

diesel::define_sql_function! {
    /// PostgreSQL `GREATEST` over two `BIGINT` values.
    fn greatest(left: diesel::sql_types::BigInt, right: diesel::sql_types::BigInt) -> diesel::sql_types::BigInt;
}

/// Map a pool error through a repository's connection constructor.
pub(crate) fn map_pool_error<E>(error: PoolError, connection: impl FnOnce(String) -> E) -> E {
    let message = match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    };
    connection(message)
}

/// Map a Diesel error onto a repository's query/connection constructors.
///
/// Lost connections map to `connection` so callers can treat them as
/// transient; everything else is a query failure.
pub(crate) fn map_diesel_error<E>(
    error: diesel::result::Error,
    operation: &str,
    query: impl FnOnce(String) -> E,
    connection: impl FnOnce(String) -> E,
) -> E {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), %operation, "diesel operation failed");
        }
        _ => debug!(%error, %operation, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
        | DieselError::DatabaseError(DatabaseErrorKind::UnableToSendCommand, _)
        | DieselError::BrokenTransactionManager => {
            connection(format!("{operation}: database connection error"))
        }
        DieselError::NotFound => query(format!("{operation}: record not found")),
        DieselError::QueryBuilderError(_) => query(format!("{operation}: database query error")),
        _ => query(format!("{operation}: database error")),
    }
}

/// Convert a domain amount into a `BIGINT` value.
pub(crate) fn to_db_amount(value: u64, field: &str) -> Result<i64, String> {
    i64::try_from(value).map_err(|_| format!("{field} {value} exceeds BIGINT range"))
}

/// Convert a stored `BIGINT` back into a domain amount.
pub(crate) fn from_db_amount(value: i64, field: &str) -> Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("{field} {value} is negative"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, PartialEq, Eq)]
    enum Mapped {
        Query(String),
        Connection(String),
    }

    fn map(error: diesel::result::Error) -> Mapped {
        map_diesel_error(error, "load", Mapped::Query, Mapped::Connection)
    }

    #[rstest]
    fn not_found_is_a_query_error() {
        assert_eq!(
            map(diesel::result::Error::NotFound),
            Mapped::Query("load: record not found".to_owned())
        );
    }

    #[rstest]
    fn broken_transaction_manager_is_a_connection_error() {
        assert!(matches!(
            map(diesel::result::Error::BrokenTransactionManager),
            Mapped::Connection(_)
        ));
    }

    #[rstest]
    fn pool_errors_use_the_connection_constructor() {
        let mapped = map_pool_error(PoolError::checkout("timed out"), Mapped::Connection);
        assert_eq!(mapped, Mapped::Connection("timed out".to_owned()));
    }

    #[rstest]
    #[case(0, Ok(0))]
    #[case(i64::MAX as u64, Ok(i64::MAX))]
    #[case(u64::MAX, Err(()))]
    fn amounts_fit_bigint(#[case] value: u64, #[case] expected: Result<i64, ()>) {
        assert_eq!(to_db_amount(value, "total").map_err(|_| ()), expected);
    }

    #[rstest]
    fn negative_amounts_are_rejected() {
        let error = from_db_amount(-1, "balance").expect_err("negative");
        assert!(error.contains("balance"));
    }
}
