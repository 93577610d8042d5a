//! Connection pool wrapper.
//!
//! Wraps `sqlx::PgPool` with the engine's knobs, a waiting-acquirer
//! gauge, and a periodic stats ticker. When the configured schema is not
//! the default, every new connection gets its `search_path` set before
//! first use — the test-isolation hook.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use anima_core::config::DbConfig;
use anima_core::constants::{POOL_STATS_INTERVAL_SECS, POOL_WAITING_WARN_THRESHOLD};
use anima_core::errors::AnimaResult;
use anima_core::models::PoolStats;

use crate::error::map_sqlx;

/// Pool construction knobs, derived from [`DbConfig`].
#[derive(Debug, Clone)]
pub struct StoragePoolOptions {
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    /// Non-default schema to activate on each connection, if any.
    pub schema: Option<String>,
}

impl From<&DbConfig> for StoragePoolOptions {
    fn from(cfg: &DbConfig) -> Self {
        Self {
            max_connections: cfg.max_connections,
            idle_timeout: Duration::from_secs(cfg.idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.acquire_timeout_secs),
            schema: cfg.uses_custom_schema().then(|| cfg.schema.clone()),
        }
    }
}

/// The shared Postgres pool.
#[derive(Clone)]
pub struct StoragePool {
    pool: PgPool,
    waiting: Arc<AtomicUsize>,
}

impl StoragePool {
    /// Connect and build the pool from config.
    pub async fn connect(cfg: &DbConfig) -> AnimaResult<Self> {
        let opts = StoragePoolOptions::from(cfg);
        let connect: PgConnectOptions = cfg
            .url()
            .parse::<PgConnectOptions>()
            .map_err(|e| anima_core::AnimaError::validation(format!("bad DB config: {e}")))?;

        let schema = opts.schema.clone();
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .idle_timeout(opts.idle_timeout)
            .acquire_timeout(opts.acquire_timeout)
            .after_connect(move |conn, _meta| {
                let schema = schema.clone();
                Box::pin(async move {
                    if let Some(schema) = schema {
                        let stmt = format!("SET search_path TO {schema}, public");
                        conn.execute(stmt.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(connect)
            .await
            .map_err(map_sqlx)?;

        Ok(Self {
            pool,
            waiting: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Acquire a connection, tracking waiters for the stats gauge.
    pub async fn acquire(&self) -> AnimaResult<sqlx::pool::PoolConnection<Postgres>> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let result = self.pool.acquire().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result.map_err(map_sqlx)
    }

    /// Begin a transaction for read-modify-write units.
    pub async fn begin(&self) -> AnimaResult<Transaction<'static, Postgres>> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let result = self.pool.begin().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result.map_err(map_sqlx)
    }

    /// The raw inner pool, for executors that manage their own acquire.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Current pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_connections: self.pool.size(),
            idle_connections: self.pool.num_idle() as u32,
            waiting_connections: self.waiting.load(Ordering::SeqCst),
        }
    }

    /// Cheap liveness probe.
    pub async fn ping(&self) -> AnimaResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    /// Spawn the periodic stats ticker. Logs the gauge every tick and
    /// warns when too many acquirers are waiting.
    pub fn spawn_stats_ticker(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(Duration::from_secs(POOL_STATS_INTERVAL_SECS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let stats = this.stats();
                debug!(
                    total = stats.total_connections,
                    idle = stats.idle_connections,
                    waiting = stats.waiting_connections,
                    "pool stats"
                );
                if stats.waiting_connections > POOL_WAITING_WARN_THRESHOLD {
                    warn!(
                        waiting = stats.waiting_connections,
                        "connection pool under pressure"
                    );
                }
            }
        })
    }
}
