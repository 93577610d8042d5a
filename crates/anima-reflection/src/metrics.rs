//! Pure metric derivation and the insight rules.

use anima_core::models::reflection::{
    FrictionFeel, FrictionMetrics, HubSummary, ReflectionMetrics, RetrievalMetrics,
    SessionMetrics,
};

/// Derive the structured metrics block from raw session counters.
pub fn compute_metrics(raw: &SessionMetrics, hubs: Vec<HubSummary>) -> ReflectionMetrics {
    let waste_ratio = if raw.memories_loaded == 0 {
        0.0
    } else {
        (1.0 - raw.memories_accessed as f64 / raw.memories_loaded as f64).clamp(0.0, 1.0)
    };

    let friction = FrictionMetrics {
        load_time_ms: raw.load_time_ms,
        memories_loaded: raw.memories_loaded,
        memories_accessed: raw.memories_accessed,
        waste_ratio,
        feel: FrictionFeel::for_waste_ratio(waste_ratio),
    };

    let queries = raw.queries;
    let retrieval = RetrievalMetrics {
        queries,
        avg_results: ratio(raw.results_returned as f64, queries),
        hit_rate: ratio(raw.queries_with_hits as f64, queries),
        avg_relevance: ratio(raw.relevance_sum, queries),
    };

    ReflectionMetrics {
        friction,
        retrieval,
        hubs,
    }
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// Derive insight and recommendation strings by simple rule.
///
/// Always yields at least one insight; recommendations only when a rule
/// fires.
pub fn derive_insights(metrics: &ReflectionMetrics) -> (Vec<String>, Vec<String>) {
    let mut insights = Vec::new();
    let mut recommendations = Vec::new();

    let friction = &metrics.friction;
    let retrieval = &metrics.retrieval;

    insights.push(format!(
        "Session loaded {} memories and touched {} across {} queries.",
        friction.memories_loaded, friction.memories_accessed, retrieval.queries
    ));

    match friction.feel {
        FrictionFeel::Smooth => {
            insights.push("Context loading felt smooth; most of what surfaced was used.".to_string());
        }
        FrictionFeel::Sticky => {
            insights.push(format!(
                "Waste ratio {:.0}%: a noticeable share of loaded context went unused.",
                friction.waste_ratio * 100.0
            ));
        }
        FrictionFeel::Rough => {
            insights.push(format!(
                "Waste ratio {:.0}%: loading felt rough, most context went unused.",
                friction.waste_ratio * 100.0
            ));
            recommendations
                .push("Lower the bootstrap limit so sessions start leaner.".to_string());
        }
    }

    if retrieval.queries > 0 && retrieval.hit_rate < 0.5 {
        insights.push(format!(
            "Only {:.0}% of queries surfaced any memory.",
            retrieval.hit_rate * 100.0
        ));
        recommendations.push(
            "Lower the similarity threshold or add richer memories for the topics queried."
                .to_string(),
        );
    }

    if friction.load_time_ms > 1000 {
        recommendations.push(format!(
            "Bootstrap took {} ms; check pool pressure and index health.",
            friction.load_time_ms
        ));
    }

    if let Some(top) = metrics.hubs.first() {
        insights.push(format!(
            "The strongest hub holds {} connections (total strength {:.2}).",
            top.connections, top.total_strength
        ));
    }

    (insights, recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(loaded: u64, accessed: u64, queries: u64, hits: u64) -> SessionMetrics {
        SessionMetrics {
            load_time_ms: 120,
            memories_loaded: loaded,
            memories_accessed: accessed,
            queries,
            results_returned: queries * 3,
            queries_with_hits: hits,
            relevance_sum: queries as f64 * 0.8,
        }
    }

    #[test]
    fn waste_ratio_and_feel() {
        let m = compute_metrics(&raw(10, 9, 4, 4), Vec::new());
        assert!((m.friction.waste_ratio - 0.1).abs() < 1e-9);
        assert_eq!(m.friction.feel, FrictionFeel::Smooth);

        let m = compute_metrics(&raw(10, 6, 4, 4), Vec::new());
        assert_eq!(m.friction.feel, FrictionFeel::Sticky);

        let m = compute_metrics(&raw(10, 2, 4, 4), Vec::new());
        assert_eq!(m.friction.feel, FrictionFeel::Rough);
    }

    #[test]
    fn zero_loaded_is_not_waste() {
        let m = compute_metrics(&raw(0, 0, 0, 0), Vec::new());
        assert_eq!(m.friction.waste_ratio, 0.0);
        assert_eq!(m.friction.feel, FrictionFeel::Smooth);
        assert_eq!(m.retrieval.avg_results, 0.0);
        assert_eq!(m.retrieval.hit_rate, 0.0);
    }

    #[test]
    fn always_at_least_one_insight() {
        let m = compute_metrics(&raw(0, 0, 0, 0), Vec::new());
        let (insights, _) = derive_insights(&m);
        assert!(!insights.is_empty());
    }

    #[test]
    fn rough_sessions_get_a_recommendation() {
        let m = compute_metrics(&raw(20, 2, 4, 4), Vec::new());
        let (_, recommendations) = derive_insights(&m);
        assert!(!recommendations.is_empty());
    }

    #[test]
    fn low_hit_rate_is_called_out() {
        let m = compute_metrics(&raw(10, 9, 10, 2), Vec::new());
        let (insights, recommendations) = derive_insights(&m);
        assert!(insights.iter().any(|i| i.contains("queries surfaced")));
        assert!(recommendations
            .iter()
            .any(|r| r.contains("similarity threshold")));
    }
}
