//! Engine configuration.
//!
//! Explicit records whose fields enumerate every option, loaded from
//! environment-style keys in a single validation pass at startup.
//! Invalid values fail fast: the binary exits 1 before touching the
//! database.

pub mod defaults;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::errors::{AnimaError, AnimaResult};

/// Database connection and pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    /// Required; there is no default password.
    pub password: String,
    /// Active schema. Queries run against this schema when it is not the
    /// default; a test-isolation hook, production uses the default.
    pub schema: String,
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_DB_HOST.to_string(),
            port: defaults::DEFAULT_DB_PORT,
            name: defaults::DEFAULT_DB_NAME.to_string(),
            user: defaults::DEFAULT_DB_USER.to_string(),
            password: String::new(),
            schema: defaults::DEFAULT_DB_SCHEMA.to_string(),
            max_connections: constants::POOL_MAX_CONNECTIONS,
            idle_timeout_secs: constants::POOL_IDLE_TIMEOUT_SECS,
            acquire_timeout_secs: constants::POOL_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl DbConfig {
    /// Postgres connection URL for the pool.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    /// Whether queries must prepend a non-default search path.
    pub fn uses_custom_schema(&self) -> bool {
        self.schema != defaults::DEFAULT_DB_SCHEMA
    }
}

/// Which embedding provider the gateway talks to first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Local,
    RemotePrimary,
    RemoteSecondary,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::RemotePrimary => "remote-primary",
            Self::RemoteSecondary => "remote-secondary",
        }
    }

    pub fn parse(s: &str) -> AnimaResult<Self> {
        match s {
            "local" => Ok(Self::Local),
            "remote-primary" => Ok(Self::RemotePrimary),
            "remote-secondary" => Ok(Self::RemoteSecondary),
            other => Err(AnimaError::validation(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

/// Embedding gateway and cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    /// Fixed per deployment: 384 or 768. Every vector in the store shares it.
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub fallback_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            dimensions: defaults::DEFAULT_EMBEDDING_DIM,
            endpoint: None,
            fallback_endpoint: None,
            api_key: None,
            cache_capacity: constants::EMBEDDING_CACHE_CAPACITY,
            cache_ttl_secs: constants::EMBEDDING_CACHE_TTL_SECS,
            retry_attempts: constants::EMBED_RETRY_ATTEMPTS,
            backoff_base_ms: constants::EMBED_BACKOFF_BASE_MS,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimaConfig {
    pub db: DbConfig,
    pub embedding: EmbeddingConfig,
    /// Whether the add path consults semantic consolidation.
    pub semantic_consolidation: bool,
    pub port: u16,
    pub log_level: String,
}

impl Default for AnimaConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            embedding: EmbeddingConfig::default(),
            semantic_consolidation: true,
            port: defaults::DEFAULT_PORT,
            log_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AnimaConfig {
    /// Load from the process environment and validate in one pass.
    pub fn from_env() -> AnimaResult<Self> {
        let mut config = Self::default();

        if let Some(v) = read_env("DB_HOST") {
            config.db.host = v;
        }
        if let Some(v) = read_env("DB_PORT") {
            config.db.port = parse_key("DB_PORT", &v)?;
        }
        if let Some(v) = read_env("DB_NAME") {
            config.db.name = v;
        }
        if let Some(v) = read_env("DB_USER") {
            config.db.user = v;
        }
        if let Some(v) = read_env("DB_PASSWORD") {
            config.db.password = v;
        }
        if let Some(v) = read_env("DB_SCHEMA") {
            config.db.schema = v;
        }

        if let Some(v) = read_env("EMBEDDING_PROVIDER") {
            config.embedding.provider = ProviderKind::parse(&v)?;
        }
        if let Some(v) = read_env("EMBEDDING_DIM") {
            config.embedding.dimensions = parse_key("EMBEDDING_DIM", &v)?;
        }
        config.embedding.endpoint = read_env("EMBEDDING_ENDPOINT");
        config.embedding.fallback_endpoint = read_env("EMBEDDING_FALLBACK_ENDPOINT");
        config.embedding.api_key = read_env("EMBEDDING_API_KEY");

        if let Some(v) = read_env("SEMANTIC_CONSOLIDATION") {
            config.semantic_consolidation = match v.as_str() {
                "on" => true,
                "off" => false,
                other => {
                    return Err(AnimaError::validation(format!(
                        "SEMANTIC_CONSOLIDATION must be on or off, got {other}"
                    )))
                }
            };
        }
        if let Some(v) = read_env("PORT") {
            config.port = parse_key("PORT", &v)?;
        }
        if let Some(v) = read_env("LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every field; returns the first violation.
    pub fn validate(&self) -> AnimaResult<()> {
        if self.db.password.is_empty() {
            return Err(AnimaError::validation("DB_PASSWORD is required"));
        }
        if !matches!(self.embedding.dimensions, 384 | 768) {
            return Err(AnimaError::validation(format!(
                "EMBEDDING_DIM must be 384 or 768, got {}",
                self.embedding.dimensions
            )));
        }
        if matches!(
            self.embedding.provider,
            ProviderKind::RemotePrimary | ProviderKind::RemoteSecondary
        ) && self.embedding.endpoint.is_none()
        {
            return Err(AnimaError::validation(
                "EMBEDDING_ENDPOINT is required for remote providers",
            ));
        }
        if !matches!(self.log_level.as_str(), "debug" | "info" | "warn" | "error") {
            return Err(AnimaError::validation(format!(
                "LOG_LEVEL must be one of debug|info|warn|error, got {}",
                self.log_level
            )));
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_key<T: std::str::FromStr>(key: &str, value: &str) -> AnimaResult<T> {
    value
        .parse()
        .map_err(|_| AnimaError::validation(format!("invalid value for {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AnimaConfig {
        let mut c = AnimaConfig::default();
        c.db.password = "secret".to_string();
        c
    }

    #[test]
    fn default_config_requires_password() {
        let c = AnimaConfig::default();
        assert!(c.validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_bad_dimensions() {
        let mut c = valid_config();
        c.embedding.dimensions = 512;
        assert!(c.validate().is_err());
        c.embedding.dimensions = 768;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn remote_provider_needs_endpoint() {
        let mut c = valid_config();
        c.embedding.provider = ProviderKind::RemotePrimary;
        assert!(c.validate().is_err());
        c.embedding.endpoint = Some("http://embed.internal/v1".to_string());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut c = valid_config();
        c.log_level = "verbose".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn provider_kind_parses_known_tags_only() {
        assert_eq!(ProviderKind::parse("local").unwrap(), ProviderKind::Local);
        assert_eq!(
            ProviderKind::parse("remote-primary").unwrap(),
            ProviderKind::RemotePrimary
        );
        assert!(ProviderKind::parse("openai").is_err());
    }

    #[test]
    fn custom_schema_detection() {
        let mut c = valid_config();
        assert!(!c.db.uses_custom_schema());
        c.db.schema = "anima_test_7".to_string();
        assert!(c.db.uses_custom_schema());
    }
}
