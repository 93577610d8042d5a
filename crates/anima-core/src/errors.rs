//! Error taxonomy for the engine.
//!
//! One variant per wire error code. Components construct variants through
//! the helper constructors and propagate with `?`; the HTTP layer maps
//! `code()`/`http_status()` into the response envelope.

/// Result alias used across the workspace.
pub type AnimaResult<T> = Result<T, AnimaError>;

/// All errors the engine can surface.
#[derive(Debug, thiserror::Error)]
pub enum AnimaError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("embedding failed: {message}")]
    Embedding { message: String },

    #[error("database error: {message}")]
    Database { message: String, retryable: bool },

    #[error("connection pool exhausted after {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("consolidation failed: {message}")]
    Consolidation { message: String },

    #[error("cluster is empty")]
    EmptyCluster,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AnimaError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// A non-retryable database failure.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            retryable: false,
        }
    }

    /// A transient database failure the caller may retry.
    pub fn database_retryable(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn consolidation(message: impl Into<String>) -> Self {
        Self::Consolidation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wire error code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::PoolExhausted { .. } => "POOL_EXHAUSTED",
            Self::Consolidation { .. } | Self::EmptyCluster => "CONSOLIDATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the transport layer responds with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Embedding { .. } => 502,
            Self::PoolExhausted { .. } => 503,
            Self::Database { .. }
            | Self::Consolidation { .. }
            | Self::EmptyCluster
            | Self::Internal { .. } => 500,
        }
    }

    /// Whether a client may usefully retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::Database { retryable: true, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(AnimaError::validation("x").http_status(), 400);
        assert_eq!(AnimaError::not_found("memory").http_status(), 404);
        assert_eq!(AnimaError::embedding("x").http_status(), 502);
        assert_eq!(AnimaError::PoolExhausted { waited_ms: 5000 }.http_status(), 503);
        assert_eq!(AnimaError::database("x").http_status(), 500);
        assert_eq!(AnimaError::EmptyCluster.code(), "CONSOLIDATION_ERROR");
    }

    #[test]
    fn pool_exhaustion_is_retryable() {
        assert!(AnimaError::PoolExhausted { waited_ms: 1 }.is_retryable());
        assert!(AnimaError::database_retryable("x").is_retryable());
        assert!(!AnimaError::database("x").is_retryable());
        assert!(!AnimaError::validation("x").is_retryable());
    }
}
