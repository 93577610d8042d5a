//! Options and results for the bootstrap operation.

use serde::{Deserialize, Serialize};

use super::handshake::Handshake;
use super::memory::Memory;
use crate::constants::{
    CONVERSATION_PHI_BOOST, DEFAULT_BOOTSTRAP_LIMIT, GLOBAL_PHI_FLOOR,
};

/// Options for the tier bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapOptions {
    pub conversation_id: Option<String>,
    pub limit: i64,
    pub include_active: bool,
    pub include_thread: bool,
    pub include_stable: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            conversation_id: None,
            limit: DEFAULT_BOOTSTRAP_LIMIT,
            include_active: true,
            include_thread: true,
            include_stable: true,
        }
    }
}

/// Per-tier row counts in a bootstrap response.
#[derive(Debug, Clone, Serialize)]
pub struct TierDistribution {
    pub active: usize,
    pub thread: usize,
    pub stable: usize,
    pub total: usize,
}

/// Echo of the conversation-filtering policy applied to a bootstrap.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapFiltering {
    pub conversation_specific: bool,
    pub boost_factor: f64,
    pub include_global_high_phi: bool,
    pub min_global_phi: f64,
}

impl BootstrapFiltering {
    pub fn for_conversation(conversation_specific: bool) -> Self {
        Self {
            conversation_specific,
            boost_factor: CONVERSATION_PHI_BOOST,
            include_global_high_phi: true,
            min_global_phi: GLOBAL_PHI_FLOOR,
        }
    }
}

/// Result of `bootstrap`: three tier lists, the distribution summary, and
/// the embedded handshake. Strictly read-only on the memory rows.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapResult {
    pub active: Vec<Memory>,
    pub thread: Vec<Memory>,
    pub stable: Vec<Memory>,
    pub distribution: TierDistribution,
    pub conversation_id: Option<String>,
    pub filtering: BootstrapFiltering,
    pub handshake: Handshake,
}
