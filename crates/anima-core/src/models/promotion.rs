//! Tier promotion audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::memory::Tier;
use crate::errors::{AnimaError, AnimaResult};

/// Why a memory changed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionReason {
    AccessThreshold,
    Manual,
    TimeDecay,
    ConversationEnd,
}

impl PromotionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessThreshold => "access_threshold",
            Self::Manual => "manual",
            Self::TimeDecay => "time_decay",
            Self::ConversationEnd => "conversation_end",
        }
    }

    pub fn parse(s: &str) -> AnimaResult<Self> {
        match s {
            "access_threshold" => Ok(Self::AccessThreshold),
            "manual" => Ok(Self::Manual),
            "time_decay" => Ok(Self::TimeDecay),
            "conversation_end" => Ok(Self::ConversationEnd),
            other => Err(AnimaError::validation(format!(
                "unknown promotion reason: {other}"
            ))),
        }
    }
}

/// Audit log row for a tier change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPromotion {
    pub id: Uuid,
    pub memory_id: Uuid,
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub reason: PromotionReason,
    pub access_count_at_promotion: i64,
    pub days_since_last_access: i64,
    pub created_at: DateTime<Utc>,
}

/// Light promotion notice returned inline with query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub memory_id: Uuid,
    pub from_tier: Tier,
    pub to_tier: Tier,
}
