//! Default values for configuration fields.

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "anima";
pub const DEFAULT_DB_USER: &str = "anima";
pub const DEFAULT_DB_SCHEMA: &str = "public";

pub const DEFAULT_EMBEDDING_DIM: usize = 384;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_LEVEL: &str = "info";
