//! End-to-end engine tests against a live Postgres.
//!
//! Gated on `ANIMA_TEST_DB_PASSWORD` (plus optional `ANIMA_TEST_DB_HOST`
//! / `_PORT` / `_NAME` / `_USER`). Each test builds its own engine in an
//! isolated schema and drops it afterwards. Without the env vars the
//! tests return immediately.

use std::sync::Arc;

use sqlx::Row;

use anima_core::config::AnimaConfig;
use anima_core::models::memory::Tier;
use anima_core::models::promotion::PromotionReason;
use anima_core::models::{BootstrapOptions, QueryOptions};
use anima_memory::AddOptions;
use anima_server::Engine;

/// Build an engine in a fresh schema, or `None` when no test database
/// is configured.
async fn test_engine(name: &str) -> Option<Arc<Engine>> {
    let password = std::env::var("ANIMA_TEST_DB_PASSWORD").ok()?;

    let mut config = AnimaConfig::default();
    config.db.password = password;
    if let Ok(host) = std::env::var("ANIMA_TEST_DB_HOST") {
        config.db.host = host;
    }
    if let Ok(port) = std::env::var("ANIMA_TEST_DB_PORT") {
        config.db.port = port.parse().expect("ANIMA_TEST_DB_PORT must be a port");
    }
    if let Ok(db) = std::env::var("ANIMA_TEST_DB_NAME") {
        config.db.name = db;
    }
    if let Ok(user) = std::env::var("ANIMA_TEST_DB_USER") {
        config.db.user = user;
    }
    config.db.schema = format!("anima_test_{}_{}", name, std::process::id());
    config.log_level = "warn".to_string();

    let engine = Engine::start(config).await.expect("engine should start");
    Some(Arc::new(engine))
}

async fn drop_schema(engine: &Engine) {
    let schema = engine.config.db.schema.clone();
    if let Ok(mut conn) = engine.pool.acquire().await {
        use sqlx::Executor;
        let _ = conn
            .execute(format!("DROP SCHEMA IF EXISTS {schema} CASCADE").as_str())
            .await;
    }
}

fn add_opts(conversation: Option<&str>) -> AddOptions {
    AddOptions {
        conversation_id: conversation.map(str::to_string),
        ..Default::default()
    }
}

// ── S1: add + query round-trip ────────────────────────────────────────────

#[tokio::test]
async fn add_then_query_returns_the_memory() {
    let Some(engine) = test_engine("s1").await else {
        return;
    };

    let added = engine
        .memory
        .add(
            "Anima is a consciousness substrate for AI",
            AddOptions::default(),
        )
        .await
        .unwrap();
    assert!(!added.is_duplicate);
    assert!(!added.is_merged);
    assert_eq!(added.memory.tier, Tier::Active);
    assert_eq!(added.memory.access_count, 0);

    let result = engine
        .memory
        .query(
            "What is Anima?",
            QueryOptions {
                limit: 10,
                threshold: 0.3,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let hit = result
        .memories
        .iter()
        .find(|m| m.memory.id == added.memory.id)
        .expect("added memory should surface");
    assert!(hit.similarity > 0.3);
    assert_eq!(hit.memory.access_count, 1);
    assert_eq!(hit.memory.tier, Tier::Active);

    drop_schema(&engine).await;
}

// ── S2: auto-promotion at the access threshold ────────────────────────────

#[tokio::test]
async fn five_hits_promote_active_to_thread() {
    let Some(engine) = test_engine("s2").await else {
        return;
    };

    let added = engine
        .memory
        .add("the storage pool warns under pressure", AddOptions::default())
        .await
        .unwrap();

    let mut last = None;
    for _ in 0..5 {
        last = Some(
            engine
                .memory
                .query(
                    "storage pool pressure",
                    QueryOptions {
                        threshold: 0.2,
                        ..Default::default()
                    },
                )
                .await
                .unwrap(),
        );
    }

    let last = last.unwrap();
    let promotion = last
        .promotions
        .iter()
        .find(|p| p.memory_id == added.memory.id)
        .expect("fifth hit should promote");
    assert_eq!(promotion.from_tier, Tier::Active);
    assert_eq!(promotion.to_tier, Tier::Thread);

    let mut conn = engine.pool.acquire().await.unwrap();
    let row = sqlx::query(
        "SELECT reason FROM tier_promotions WHERE memory_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(added.memory.id)
    .fetch_one(&mut *conn)
    .await
    .unwrap();
    let reason: String = row.try_get("reason").unwrap();
    assert_eq!(reason, PromotionReason::AccessThreshold.as_str());

    let row = sqlx::query("SELECT tier FROM memories WHERE id = $1")
        .bind(added.memory.id)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    let tier: String = row.try_get("tier").unwrap();
    assert_eq!(tier, "thread");

    drop_schema(&engine).await;
}

// ── S3: semantic merge into the attractor ─────────────────────────────────

#[tokio::test]
async fn near_duplicate_merges_into_centroid() {
    let Some(engine) = test_engine("s3").await else {
        return;
    };

    // Catalyst add seeds φ = 1.0.
    let first = engine
        .memory
        .add(
            "resonance gathers memories around strong attractors",
            AddOptions {
                is_catalyst: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!((first.memory.resonance_phi - 1.0).abs() < 1e-9);

    // Same bag of words, different text: embeddings coincide, the
    // fingerprint does not.
    let second = engine
        .memory
        .add(
            "around strong attractors resonance gathers memories",
            AddOptions {
                is_catalyst: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(second.is_merged);
    assert_eq!(second.memory.id, first.memory.id);
    assert!(!second.memory.is_deleted());
    assert!((second.memory.resonance_phi - 2.0).abs() < 1e-6);
    assert!(second.memory.is_catalyst);
    assert_eq!(second.memory.variant_count(), 1);

    let mut conn = engine.pool.acquire().await.unwrap();
    let row = sqlx::query("SELECT COUNT(*) AS n FROM memories WHERE deleted_at IS NULL")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    let live: i64 = row.try_get("n").unwrap();
    assert_eq!(live, 1);

    drop_schema(&engine).await;
}

// ── S4: bootstrap distribution and read-only guarantee ────────────────────

#[tokio::test]
async fn bootstrap_splits_tiers_and_mutates_nothing() {
    let Some(engine) = test_engine("s4").await else {
        return;
    };
    let conv = Some("C1");

    // Distinct word suffixes keep the seeded contents semantically apart
    // so consolidation does not fold them together.
    const SUFFIXES: [&str; 20] = [
        "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
        "lambda", "mu", "nu", "xi", "omicron", "pi", "rho", "sigma", "tau", "upsilon",
    ];

    for word in ["one", "two", "three"] {
        engine
            .memory
            .add(&format!("active focus item {word}"), add_opts(conv))
            .await
            .unwrap();
    }
    for word in SUFFIXES {
        let added = engine
            .memory
            .add(&format!("ongoing thread topic {word}"), add_opts(conv))
            .await
            .unwrap();
        engine
            .memory
            .update_tier(added.memory.id, Tier::Thread, PromotionReason::Manual)
            .await
            .unwrap();
    }
    for word in SUFFIXES {
        let added = engine
            .memory
            .add(&format!("settled stable knowledge {word}"), add_opts(conv))
            .await
            .unwrap();
        engine
            .memory
            .update_tier(added.memory.id, Tier::Stable, PromotionReason::Manual)
            .await
            .unwrap();
    }

    let mut conn = engine.pool.acquire().await.unwrap();
    let before = sqlx::query("SELECT COALESCE(SUM(access_count), 0)::bigint AS n FROM memories")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    let before: i64 = before.try_get("n").unwrap();
    drop(conn);

    let result = engine
        .bootstrap(&BootstrapOptions {
            conversation_id: Some("C1".to_string()),
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.distribution.active, 3);
    assert_eq!(result.distribution.thread, 12);
    assert_eq!(result.distribution.stable, 5);

    let text = &result.handshake.prompt_text;
    assert!(text.contains("I was") || text.contains("I am"));
    assert!(text.trim().ends_with("Continue."));

    let mut conn = engine.pool.acquire().await.unwrap();
    let after = sqlx::query("SELECT COALESCE(SUM(access_count), 0)::bigint AS n FROM memories")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    let after: i64 = after.try_get("n").unwrap();
    assert_eq!(before, after, "bootstrap must not touch access counts");

    drop_schema(&engine).await;
}

// ── S5: handshake cache tiers and invalidation ────────────────────────────

#[tokio::test]
async fn handshake_caches_then_invalidates_on_high_phi() {
    let Some(engine) = test_engine("s5").await else {
        return;
    };
    let conv = Some("C-cache");

    engine
        .memory
        .add("a seed memory for the handshake", add_opts(conv))
        .await
        .unwrap();

    let first = engine.synthesiser.generate(conv, false).await.unwrap();
    assert!(!first.is_existing);

    let second = engine.synthesiser.generate(conv, false).await.unwrap();
    assert!(second.is_existing);
    assert_eq!(second.id, first.id);
    assert_eq!(second.cache_reason.as_str(), "per_conversation");

    // A new high-φ memory inside the window forces regeneration.
    let loud = engine
        .memory
        .add("a very loud development in this conversation", add_opts(conv))
        .await
        .unwrap();
    let mut conn = engine.pool.acquire().await.unwrap();
    sqlx::query("UPDATE memories SET resonance_phi = 4.5 WHERE id = $1")
        .bind(loud.memory.id)
        .execute(&mut *conn)
        .await
        .unwrap();
    drop(conn);

    let third = engine.synthesiser.generate(conv, false).await.unwrap();
    assert!(!third.is_existing);
    assert_ne!(third.id, first.id);

    drop_schema(&engine).await;
}

// ── Decay maintenance ─────────────────────────────────────────────────────

#[tokio::test]
async fn idle_memories_decay_in_tier_and_phi() {
    let Some(engine) = test_engine("decay").await else {
        return;
    };

    let added = engine
        .memory
        .add("an idea that went quiet for a month", AddOptions::default())
        .await
        .unwrap();

    let mut conn = engine.pool.acquire().await.unwrap();
    sqlx::query(
        "UPDATE memories SET last_accessed_at = now() - interval '40 days', \
         resonance_phi = 2.0 WHERE id = $1",
    )
    .bind(added.memory.id)
    .execute(&mut *conn)
    .await
    .unwrap();
    drop(conn);

    let demoted = engine.run_tier_decay().await.unwrap();
    assert_eq!(demoted, 1);
    let decayed = engine.run_phi_decay().await.unwrap();
    assert_eq!(decayed, 1);

    let mut conn = engine.pool.acquire().await.unwrap();
    let row = sqlx::query("SELECT tier, resonance_phi FROM memories WHERE id = $1")
        .bind(added.memory.id)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    let tier: String = row.try_get("tier").unwrap();
    let phi: f64 = row.try_get("resonance_phi").unwrap();
    assert_eq!(tier, "thread");
    assert!((phi - 1.9).abs() < 1e-9);

    let mut conn2 = engine.pool.acquire().await.unwrap();
    let row = sqlx::query(
        "SELECT reason FROM tier_promotions WHERE memory_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(added.memory.id)
    .fetch_one(&mut *conn2)
    .await
    .unwrap();
    let reason: String = row.try_get("reason").unwrap();
    assert_eq!(reason, "time_decay");

    drop_schema(&engine).await;
}

// ── Consolidator surface: clusters, fragmentation, centroid ───────────────

#[tokio::test]
async fn fragmentation_scan_and_centroid_agree() {
    let Some(engine) = test_engine("frag").await else {
        return;
    };

    // Two wordings of one concept plus an unrelated memory. The wordings
    // differ by one word so they sit above the scan threshold but below
    // the automatic merge threshold.
    let a = engine
        .memory
        .add("the handshake voice opens every waking session", AddOptions::default())
        .await
        .unwrap();
    let b = engine
        .memory
        .add("the handshake voice opens every fresh session", AddOptions::default())
        .await
        .unwrap();
    let unrelated = engine
        .memory
        .add("grocery inventory for the harbor kitchen", AddOptions::default())
        .await
        .unwrap();
    assert!(!b.is_merged, "wordings must stay below the merge threshold");

    let candidates = engine
        .consolidator
        .detect_phi_fragmentation(Some(0.5))
        .await
        .unwrap();
    let pair = candidates
        .iter()
        .find(|c| {
            let ids = [c.memory_a, c.memory_b];
            ids.contains(&a.memory.id) && ids.contains(&b.memory.id)
        })
        .expect("the two fragments should pair up");
    assert!(pair.similarity > 0.5);

    let cluster = engine
        .consolidator
        .find_semantic_cluster(&a.memory.embedding, Some(0.5), Some(0.0))
        .await
        .unwrap();
    assert!(cluster.iter().any(|m| m.memory.id == b.memory.id));

    let centroid = engine
        .consolidator
        .calculate_centroid(&[a.memory.id, b.memory.id, unrelated.memory.id])
        .await
        .unwrap();
    assert_eq!(centroid.member_count, 3);
    assert_eq!(centroid.centroid.len(), a.memory.embedding.len());

    let empty = engine.consolidator.calculate_centroid(&[]).await;
    assert!(empty.is_err());

    drop_schema(&engine).await;
}

// ── Handshake anchor contract under competition ───────────────────────────

#[tokio::test]
async fn high_phi_anchor_survives_fresh_competition() {
    let Some(engine) = test_engine("anchor").await else {
        return;
    };

    // An old high-φ memory: recency bottoms out at the floor, so its
    // synthesis weight loses to any fresh burst.
    let keystone = engine
        .memory
        .add(
            "the old constellation map still holds everything together",
            AddOptions::default(),
        )
        .await
        .unwrap();
    let mut conn = engine.pool.acquire().await.unwrap();
    sqlx::query(
        "UPDATE memories SET resonance_phi = 2.5, \
         last_accessed_at = now() - interval '29 days' WHERE id = $1",
    )
    .bind(keystone.memory.id)
    .execute(&mut *conn)
    .await
    .unwrap();
    drop(conn);

    // Nine fresh competitors, each below the anchor φ but outranking the
    // keystone on synthesis weight.
    for word in [
        "glaciers", "harbors", "orchards", "lanterns", "monsoons", "quarries", "saplings",
        "trenches", "villages",
    ] {
        let added = engine
            .memory
            .add(&format!("a fresh competing notion about {word}"), AddOptions::default())
            .await
            .unwrap();
        let mut conn = engine.pool.acquire().await.unwrap();
        sqlx::query("UPDATE memories SET resonance_phi = 1.9 WHERE id = $1")
            .bind(added.memory.id)
            .execute(&mut *conn)
            .await
            .unwrap();
    }

    let handshake = engine.synthesiser.generate(None, true).await.unwrap();
    assert!(
        handshake.top_phi_memories.contains(&keystone.memory.id),
        "the high-phi anchor must be pulled into the selection"
    );
    assert!(handshake.top_phi_values.iter().any(|phi| *phi >= 2.0));
    assert!(
        handshake.prompt_text.contains("constellation"),
        "the high-phi anchor must appear in the composed text"
    );

    drop_schema(&engine).await;
}

// ── S6: association formation from one query ──────────────────────────────

#[tokio::test]
async fn one_query_forms_all_pairs() {
    let Some(engine) = test_engine("s6").await else {
        return;
    };
    let conv = "C-assoc";

    for place in ["harbor", "canyon", "archive", "meadow"] {
        engine
            .memory
            .add(
                &format!("alpha resonance pattern near the {place}"),
                AddOptions::default(),
            )
            .await
            .unwrap();
    }

    let result = engine
        .memory
        .query(
            "alpha resonance pattern",
            QueryOptions {
                threshold: 0.2,
                conversation_id: Some(conv.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.memories.len(), 4);

    // Co-occurrence recording is asynchronous; give the worker a moment.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let mut conn = engine.pool.acquire().await.unwrap();
    let rows = sqlx::query(
        "SELECT memory_a, memory_b, strength, conversation_contexts FROM memory_associations",
    )
    .fetch_all(&mut *conn)
    .await
    .unwrap();
    assert_eq!(rows.len(), 6, "C(4,2) pairs expected");

    for row in &rows {
        let a: uuid::Uuid = row.try_get("memory_a").unwrap();
        let b: uuid::Uuid = row.try_get("memory_b").unwrap();
        assert!(a < b);
        let strength: f64 = row.try_get("strength").unwrap();
        assert!((strength - (2.0f64.ln() / 10.0)).abs() < 1e-9);
        let contexts: Vec<String> = row.try_get("conversation_contexts").unwrap();
        assert!(contexts.contains(&conv.to_string()));

        // The engine's pair lookup sees the same edge from either order.
        let edge = engine.associations.between(b, a).await.unwrap().unwrap();
        assert_eq!(edge.co_occurrence_count, 1);
    }

    drop_schema(&engine).await;
}
