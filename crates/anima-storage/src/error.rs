//! sqlx error → engine error mapping.
//!
//! Connection-level failures are retriable; constraint and parameter
//! violations are fatal to the call.

use anima_core::errors::AnimaError;

/// Map a sqlx error into the engine taxonomy.
pub fn map_sqlx(err: sqlx::Error) -> AnimaError {
    match err {
        sqlx::Error::PoolTimedOut => AnimaError::PoolExhausted {
            waited_ms: anima_core::constants::POOL_ACQUIRE_TIMEOUT_SECS * 1000,
        },
        sqlx::Error::RowNotFound => AnimaError::not_found("row"),
        sqlx::Error::Database(db) => {
            // Constraint violations are caller bugs, not transient faults.
            if db.constraint().is_some() {
                AnimaError::database(format!("constraint violated: {db}"))
            } else {
                AnimaError::database(db.to_string())
            }
        }
        sqlx::Error::Io(e) => AnimaError::database_retryable(format!("connection I/O: {e}")),
        sqlx::Error::Tls(e) => AnimaError::database_retryable(format!("TLS: {e}")),
        sqlx::Error::PoolClosed => AnimaError::database_retryable("pool closed"),
        other => AnimaError::database(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_exhaustion() {
        let mapped = map_sqlx(sqlx::Error::PoolTimedOut);
        assert_eq!(mapped.code(), "POOL_EXHAUSTED");
        assert!(mapped.is_retryable());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert_eq!(map_sqlx(sqlx::Error::RowNotFound).code(), "NOT_FOUND");
    }

    #[test]
    fn io_errors_are_retryable() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(map_sqlx(io).is_retryable());
    }
}
