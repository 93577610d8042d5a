//! Engine assembly.
//!
//! One explicit value owns the pool, the embedding gateway, and every
//! service; it is constructed once at startup and shared as axum state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use anima_associations::AssociationEngine;
use anima_consolidation::Consolidator;
use anima_core::config::AnimaConfig;
use anima_core::errors::AnimaResult;
use anima_core::models::handshake::Handshake;
use anima_core::models::{BootstrapOptions, BootstrapResult, CacheStats, PoolStats};
use anima_embeddings::EmbeddingGateway;
use anima_memory::jobs::{self, JobWorkers};
use anima_memory::MemoryService;
use anima_reflection::ReflectionRecorder;
use anima_storage::{ensure_schema, StoragePool};
use anima_synthesis::HandshakeSynthesiser;

/// Dependency health as reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub embedding_service: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Runtime counters as reported by `/api/v1/meta/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub cache: CacheMetrics,
    pub database: DatabaseMetrics,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetrics {
    #[serde(flatten)]
    pub stats: PoolStats,
    pub status: &'static str,
}

/// The assembled engine.
pub struct Engine {
    pub config: AnimaConfig,
    pub pool: StoragePool,
    pub gateway: Arc<EmbeddingGateway>,
    pub consolidator: Arc<Consolidator>,
    pub associations: Arc<AssociationEngine>,
    pub memory: Arc<MemoryService>,
    pub synthesiser: Arc<HandshakeSynthesiser>,
    pub reflections: Arc<ReflectionRecorder>,
    workers: JobWorkers,
    stats_ticker: tokio::task::JoinHandle<()>,
}

impl Engine {
    /// Connect, bootstrap the schema, and wire every component.
    pub async fn start(config: AnimaConfig) -> AnimaResult<Self> {
        config.validate()?;

        let pool = StoragePool::connect(&config.db).await?;
        pool.ping().await?;
        ensure_schema(
            &pool,
            config
                .db
                .uses_custom_schema()
                .then_some(config.db.schema.as_str()),
            config.embedding.dimensions,
        )
        .await?;

        let gateway = Arc::new(EmbeddingGateway::new(config.embedding.clone()));
        let consolidator = Arc::new(Consolidator::new(pool.clone()));
        let associations = Arc::new(AssociationEngine::new(pool.clone()));

        let (queue, workers) = jobs::spawn(pool.clone(), consolidator.clone(), associations.clone());

        let memory = Arc::new(MemoryService::new(
            pool.clone(),
            gateway.clone(),
            consolidator.clone(),
            queue,
            config.semantic_consolidation,
        ));
        let synthesiser = Arc::new(HandshakeSynthesiser::new(pool.clone()));
        let reflections = Arc::new(ReflectionRecorder::new(pool.clone(), associations.clone()));

        let stats_ticker = pool.spawn_stats_ticker();

        info!(
            provider = gateway.primary_provider(),
            dimensions = gateway.dimensions(),
            consolidation = config.semantic_consolidation,
            "engine started"
        );

        Ok(Self {
            config,
            pool,
            gateway,
            consolidator,
            associations,
            memory,
            synthesiser,
            reflections,
            workers,
            stats_ticker,
        })
    }

    /// Tier bootstrap with the embedded handshake. Handshake failures
    /// degrade to the minimal preamble — bootstrap always completes.
    pub async fn bootstrap(&self, opts: &BootstrapOptions) -> AnimaResult<BootstrapResult> {
        let slices = self.memory.bootstrap(opts).await?;
        let handshake = self
            .handshake(opts.conversation_id.as_deref(), false)
            .await;

        Ok(BootstrapResult {
            active: slices.active,
            thread: slices.thread,
            stable: slices.stable,
            distribution: slices.distribution,
            conversation_id: slices.conversation_id,
            filtering: slices.filtering,
            handshake,
        })
    }

    /// Generate (or reuse) a handshake, degrading instead of failing.
    pub async fn handshake(&self, conversation_id: Option<&str>, force: bool) -> Handshake {
        match self.synthesiser.generate(conversation_id, force).await {
            Ok(handshake) => handshake,
            Err(e) => {
                error!(error = %e, "handshake generation failed, degrading");
                self.synthesiser.minimal(conversation_id)
            }
        }
    }

    pub async fn health(&self) -> HealthReport {
        let database_ok = self.pool.ping().await.is_ok();
        let embedding_ok = self.gateway.health_check().await;
        HealthReport {
            status: if database_ok && embedding_ok {
                "healthy"
            } else {
                "unhealthy"
            },
            database: if database_ok { "up" } else { "down" },
            embedding_service: if embedding_ok { "up" } else { "down" },
            timestamp: Utc::now(),
        }
    }

    pub fn metrics(&self) -> MetricsReport {
        let cache = self.gateway.cache_stats();
        let pool = self.pool.stats();
        MetricsReport {
            cache: CacheMetrics {
                status: cache.status(),
                stats: cache,
            },
            database: DatabaseMetrics {
                status: pool.status(),
                stats: pool,
            },
            timestamp: Utc::now(),
        }
    }

    /// Daily maintenance: demote idle memories down the tier ladder.
    /// Runs outside the request path; the scheduler lives elsewhere.
    pub async fn run_tier_decay(&self) -> AnimaResult<u64> {
        anima_memory::tiers::run_tier_decay(&self.pool).await
    }

    /// Monthly maintenance: decay φ on idle high-resonance memories.
    pub async fn run_phi_decay(&self) -> AnimaResult<u64> {
        anima_memory::tiers::run_phi_decay(&self.pool).await
    }

    /// Stop background work. Connections drain with the pool.
    pub fn shutdown(&self) {
        self.workers.shutdown();
        self.stats_ticker.abort();
        info!("engine shut down");
    }
}
