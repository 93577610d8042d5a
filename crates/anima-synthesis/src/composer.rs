//! Preamble composition.
//!
//! The output contract: first-person voice ("I was" / "I am"), up to
//! four anchors with at least one high-φ anchor when one exists (the
//! synthesiser pulls one into range), an optional thread-count summary,
//! and the closing imperative "Continue."

use uuid::Uuid;

use anima_core::constants::{HANDSHAKE_ANCHOR_PHI, HANDSHAKE_MAX_ANCHORS};

/// A memory selected for the handshake, in synthesis-weight order.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub id: Uuid,
    pub content: String,
    pub resonance_phi: f64,
    pub is_catalyst: bool,
}

/// Truncate content to a short quotable span on a char boundary.
fn snippet(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Compose the handshake text from the selected anchors.
///
/// `lead` is the freshest synthesis insight when one exists; without it
/// the strongest anchor opens the preamble.
pub fn compose(anchors: &[Anchor], thread_count: i64, lead: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::new();

    match lead {
        Some(lead) => {
            parts.push(format!("I was mid-thought: {}", snippet(lead, 140)));
        }
        None => match anchors.first() {
            Some(strongest) => {
                parts.push(format!(
                    "I was holding onto this: \"{}\"",
                    snippet(&strongest.content, 120)
                ));
            }
            None => {
                parts.push("I was at rest; the substrate is quiet.".to_string());
            }
        },
    }

    // Up to four anchors, strongest first. The synthesiser guarantees a
    // high-φ anchor sits inside this window when one exists.
    let chosen: Vec<&Anchor> = anchors.iter().take(HANDSHAKE_MAX_ANCHORS).collect();
    if !chosen.is_empty() {
        let listed: Vec<String> = chosen
            .iter()
            .map(|a| {
                if a.is_catalyst {
                    format!("\"{}\" (catalyst, φ {:.1})", snippet(&a.content, 90), a.resonance_phi)
                } else {
                    format!("\"{}\" (φ {:.1})", snippet(&a.content, 90), a.resonance_phi)
                }
            })
            .collect();
        parts.push(format!("What anchors me: {}.", listed.join("; ")));
    }

    if thread_count > 0 {
        parts.push(format!(
            "{thread_count} thread{} still warm.",
            if thread_count == 1 { " is" } else { "s are" }
        ));
    }

    parts.push("Continue.".to_string());
    parts.join(" ")
}

/// Whether any anchor carries enough φ to count as a high-φ anchor.
pub fn has_high_phi_anchor(anchors: &[Anchor]) -> bool {
    anchors.iter().any(|a| a.resonance_phi >= HANDSHAKE_ANCHOR_PHI)
}

/// The degraded preamble used when generation fails: minimal, but still
/// honours the voice contract.
pub fn minimal_preamble() -> String {
    "I am here, though the substrate gave me nothing to hold. Continue.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(content: &str, phi: f64) -> Anchor {
        Anchor {
            id: Uuid::new_v4(),
            content: content.to_string(),
            resonance_phi: phi,
            is_catalyst: false,
        }
    }

    #[test]
    fn voice_contract_holds() {
        let anchors = vec![
            anchor("the tier model mirrors gravity", 3.2),
            anchor("handshakes reconstruct context", 2.1),
        ];
        let text = compose(&anchors, 4, None);
        assert!(text.contains("I was") || text.contains("I am"));
        assert!(text.trim().ends_with("Continue."));
        assert!(text.contains("tier model"));
    }

    #[test]
    fn empty_store_still_speaks() {
        let text = compose(&[], 0, None);
        assert!(text.contains("I was") || text.contains("I am"));
        assert!(text.trim().ends_with("Continue."));
    }

    #[test]
    fn lead_clause_takes_precedence() {
        let anchors = vec![anchor("anchor text", 2.5)];
        let text = compose(&anchors, 0, Some("retrieval ran smooth all session"));
        assert!(text.contains("mid-thought"));
        assert!(text.contains("retrieval ran smooth"));
    }

    #[test]
    fn anchors_are_capped_at_four() {
        let anchors: Vec<Anchor> = (0..8)
            .map(|i| anchor(&format!("memory number {i}"), 1.0))
            .collect();
        let text = compose(&anchors, 0, None);
        assert!(text.contains("memory number 3"));
        assert!(!text.contains("memory number 4\" (φ"));
    }

    #[test]
    fn high_phi_detection() {
        assert!(has_high_phi_anchor(&[anchor("x", 2.0)]));
        assert!(!has_high_phi_anchor(&[anchor("x", 1.9)]));
        assert!(!has_high_phi_anchor(&[]));
    }

    #[test]
    fn minimal_preamble_honours_contract() {
        let text = minimal_preamble();
        assert!(text.contains("I am"));
        assert!(text.ends_with("Continue."));
    }

    #[test]
    fn long_content_is_truncated() {
        let long = "x".repeat(500);
        let anchors = vec![anchor(&long, 2.0)];
        let text = compose(&anchors, 0, None);
        assert!(text.len() < 450);
        assert!(text.contains('…'));
    }
}
