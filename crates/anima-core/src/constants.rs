/// Engine version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Resonance (φ) ─────────────────────────────────────────────────────────

/// Upper bound on resonance. φ never exceeds this, no matter how many
/// merges and hits accumulate.
pub const PHI_MAX: f64 = 5.0;

/// φ granted to a memory flagged as a catalyst at creation.
pub const CATALYST_INITIAL_PHI: f64 = 1.0;

/// φ added to each memory returned by a query.
pub const PHI_QUERY_INCREMENT: f64 = 0.1;

/// φ contributed when a catalyst fragment merges into a centroid.
pub const PHI_MERGE_CATALYST: f64 = 1.0;

/// φ contributed when an ordinary fragment merges into a centroid.
pub const PHI_MERGE_STANDARD: f64 = 0.1;

/// Similarity at or above which a merge contributes its full φ increment.
pub const PHI_MERGE_FULL_SCALE_SIMILARITY: f64 = 0.98;

/// Scale applied to the merge increment below the full-scale similarity.
pub const PHI_MERGE_DAMPING: f64 = 0.9;

/// Memories idle this long with φ above the floor decay monthly.
pub const PHI_DECAY_IDLE_DAYS: i64 = 30;

/// Multiplicative φ decay factor.
pub const PHI_DECAY_FACTOR: f64 = 0.95;

/// φ at or below this value is exempt from decay.
pub const PHI_DECAY_FLOOR: f64 = 0.5;

// ── Query ranking ─────────────────────────────────────────────────────────

/// Weight of cosine similarity in the structural ranking score.
pub const SIMILARITY_WEIGHT: f64 = 0.7;

/// Weight of normalised φ in the structural ranking score.
pub const RESONANCE_WEIGHT: f64 = 0.3;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_QUERY_LIMIT: i64 = 20;
pub const MAX_QUERY_LIMIT: i64 = 100;

// ── Tier lifecycle ────────────────────────────────────────────────────────

/// Access count at which an active memory is promoted to thread.
pub const THREAD_PROMOTION_THRESHOLD: i64 = 5;

/// Access count at which a thread memory is promoted to stable.
pub const STABLE_PROMOTION_THRESHOLD: i64 = 20;

/// Active memories idle this long are demoted to thread by the decay job.
pub const TIER_DECAY_ACTIVE_IDLE_DAYS: i64 = 30;

/// Thread memories idle this long are demoted to stable by the decay job.
pub const TIER_DECAY_THREAD_IDLE_DAYS: i64 = 90;

// ── Semantic consolidation ────────────────────────────────────────────────

/// Similarity at or above which two memories are the same attractor.
pub const SEMANTIC_DUPLICATE_THRESHOLD: f64 = 0.95;

/// Similarity at or above which a pair counts as φ-fragmentation.
pub const FRAGMENTATION_THRESHOLD: f64 = 0.92;

pub const FRAGMENTATION_SCAN_LIMIT: i64 = 50;

/// Cluster membership radius (similarity ≥ 1 − radius).
pub const CLUSTER_RADIUS: f64 = 0.15;

/// Minimum φ for cluster membership.
pub const CLUSTER_MIN_PHI: f64 = 2.0;

pub const CLUSTER_LIMIT: i64 = 20;

/// Settle delay before the deferred semantic re-check runs.
pub const RECHECK_SETTLE_DELAY_MS: u64 = 1000;

// ── Associations ──────────────────────────────────────────────────────────

/// Divisor in `strength = ln(1 + count) / 10`.
pub const STRENGTH_DIVISOR: f64 = 10.0;

/// Maximum rows per batched SQL statement. Stays well under the driver's
/// bind-parameter limit.
pub const MAX_BATCH_ROWS: usize = 1000;

// ── Bootstrap ─────────────────────────────────────────────────────────────

pub const DEFAULT_BOOTSTRAP_LIMIT: i64 = 50;

/// Share of the remaining bootstrap limit allocated to the thread tier.
pub const BOOTSTRAP_THREAD_SHARE: f64 = 0.7;

/// Share of the remaining bootstrap limit allocated to the stable tier.
pub const BOOTSTRAP_STABLE_SHARE: f64 = 0.3;

/// Read-only φ multiplier for memories matching the bootstrap conversation.
pub const CONVERSATION_PHI_BOOST: f64 = 2.0;

/// Global memories need at least this φ to appear in a
/// conversation-filtered bootstrap.
pub const GLOBAL_PHI_FLOOR: f64 = 3.0;

// ── Handshake synthesis ───────────────────────────────────────────────────

pub const HANDSHAKE_PER_CONVERSATION_WINDOW_SECS: i64 = 15 * 60;
pub const HANDSHAKE_PER_SESSION_WINDOW_SECS: i64 = 60 * 60;
pub const HANDSHAKE_GLOBAL_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Weight of effective φ in the synthesis ranking score.
pub const SYNTHESIS_PHI_WEIGHT: f64 = 0.7;

/// Weight of scaled recency in the synthesis ranking score.
pub const SYNTHESIS_RECENCY_WEIGHT: f64 = 0.3;

/// Recency is scaled to the φ range before weighting.
pub const SYNTHESIS_RECENCY_SCALE: f64 = 5.0;

/// Linear recency decay horizon.
pub const RECENCY_HORIZON_DAYS: i64 = 30;

/// Recency never falls below this floor.
pub const RECENCY_FLOOR: f64 = 0.1;

/// How many top-weighted memories feed the composer.
pub const HANDSHAKE_SELECTION_LIMIT: i64 = 8;

/// Upper bound on anchors embedded in the handshake text.
pub const HANDSHAKE_MAX_ANCHORS: usize = 4;

/// φ at or above which a memory counts as a high-φ anchor.
pub const HANDSHAKE_ANCHOR_PHI: f64 = 2.0;

/// A new memory with φ at or above this invalidates cached handshakes.
pub const HANDSHAKE_INVALIDATION_PHI: f64 = 4.0;

// ── Embedding gateway & cache ─────────────────────────────────────────────

pub const EMBEDDING_CACHE_CAPACITY: u64 = 10_000;
pub const EMBEDDING_CACHE_TTL_SECS: u64 = 3600;

/// Attempts against a provider before failing over.
pub const EMBED_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential retry backoff.
pub const EMBED_BACKOFF_BASE_MS: u64 = 100;

// ── Storage pool ──────────────────────────────────────────────────────────

pub const POOL_MAX_CONNECTIONS: u32 = 50;
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 30;
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Waiting acquirers above this count trigger a pool warning.
pub const POOL_WAITING_WARN_THRESHOLD: usize = 5;

/// Interval between pool stats log ticks.
pub const POOL_STATS_INTERVAL_SECS: u64 = 60;

// ── Reflection ────────────────────────────────────────────────────────────

/// Waste ratio at or below this feels smooth.
pub const FRICTION_SMOOTH_MAX: f64 = 0.2;

/// Waste ratio at or below this feels sticky; above is rough.
pub const FRICTION_STICKY_MAX: f64 = 0.5;
