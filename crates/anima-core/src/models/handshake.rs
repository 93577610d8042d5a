//! Handshake records and synthesis results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a handshake record is scoped to a conversation or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Global,
    Conversation,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Conversation => "conversation",
        }
    }
}

/// Why a handshake was served from (or past) the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheReason {
    PerConversation,
    PerSession,
    GlobalFallback,
    Force,
}

impl CacheReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerConversation => "per_conversation",
            Self::PerSession => "per_session",
            Self::GlobalFallback => "global_fallback",
            Self::Force => "force",
        }
    }

    /// The freshness window this reason implies.
    pub fn window_secs(&self) -> i64 {
        match self {
            Self::PerConversation => crate::constants::HANDSHAKE_PER_CONVERSATION_WINDOW_SECS,
            Self::PerSession => crate::constants::HANDSHAKE_PER_SESSION_WINDOW_SECS,
            Self::GlobalFallback => crate::constants::HANDSHAKE_GLOBAL_WINDOW_SECS,
            Self::Force => 0,
        }
    }
}

/// A persisted handshake (ghost log row). Doubles as the cache backing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRecord {
    pub id: Uuid,
    pub prompt_text: String,
    /// Anchor memory ids, strongest first.
    pub top_phi_memories: Vec<Uuid>,
    /// φ values parallel to `top_phi_memories`.
    pub top_phi_values: Vec<f64>,
    pub conversation_id: Option<String>,
    pub context_type: ContextType,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A synthesised handshake plus forensic metadata about how it was served.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub id: Uuid,
    pub prompt_text: String,
    pub created_at: DateTime<Utc>,
    /// True when an existing record was reused instead of regenerating.
    pub is_existing: bool,
    pub cache_reason: CacheReason,
    /// Freshness window in seconds for the reason that applied.
    pub cache_window: i64,
    /// Age of the served record in milliseconds.
    pub cached_for_ms: i64,
    pub conversation_id: Option<String>,
    pub context_type: ContextType,
    pub top_phi_memories: Vec<Uuid>,
    pub top_phi_values: Vec<f64>,
}

impl Handshake {
    /// A freshly generated handshake from its record.
    pub fn fresh(record: HandshakeRecord, reason: CacheReason) -> Self {
        Self {
            id: record.id,
            prompt_text: record.prompt_text,
            created_at: record.created_at,
            is_existing: false,
            cache_reason: reason,
            cache_window: reason.window_secs(),
            cached_for_ms: 0,
            conversation_id: record.conversation_id,
            context_type: record.context_type,
            top_phi_memories: record.top_phi_memories,
            top_phi_values: record.top_phi_values,
        }
    }

    /// A cache hit on an existing record.
    pub fn existing(record: HandshakeRecord, reason: CacheReason, now: DateTime<Utc>) -> Self {
        let cached_for_ms = (now - record.created_at).num_milliseconds().max(0);
        Self {
            id: record.id,
            prompt_text: record.prompt_text,
            created_at: record.created_at,
            is_existing: true,
            cache_reason: reason,
            cache_window: reason.window_secs(),
            cached_for_ms,
            conversation_id: record.conversation_id,
            context_type: record.context_type,
            top_phi_memories: record.top_phi_memories,
            top_phi_values: record.top_phi_values,
        }
    }
}
