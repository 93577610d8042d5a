//! Tiered cache window selection. Smallest applicable window wins.

use anima_core::constants::{
    HANDSHAKE_GLOBAL_WINDOW_SECS, HANDSHAKE_PER_CONVERSATION_WINDOW_SECS,
    HANDSHAKE_PER_SESSION_WINDOW_SECS,
};
use anima_core::models::CacheReason;

/// Which cache reason (and window) covers a record of the given age.
///
/// With a conversation key the 15-minute window applies first, then the
/// 1-hour session window. Without one only the 24-hour global window
/// exists. `None` means the record is too old to reuse.
pub fn choose_reason(age_secs: i64, has_conversation: bool) -> Option<CacheReason> {
    if age_secs < 0 {
        // A clock skew artefact; treat as freshly created.
        return Some(if has_conversation {
            CacheReason::PerConversation
        } else {
            CacheReason::GlobalFallback
        });
    }
    if has_conversation {
        if age_secs < HANDSHAKE_PER_CONVERSATION_WINDOW_SECS {
            Some(CacheReason::PerConversation)
        } else if age_secs < HANDSHAKE_PER_SESSION_WINDOW_SECS {
            Some(CacheReason::PerSession)
        } else {
            None
        }
    } else if age_secs < HANDSHAKE_GLOBAL_WINDOW_SECS {
        Some(CacheReason::GlobalFallback)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_windows_tier_down() {
        assert_eq!(choose_reason(60, true), Some(CacheReason::PerConversation));
        assert_eq!(choose_reason(899, true), Some(CacheReason::PerConversation));
        assert_eq!(choose_reason(900, true), Some(CacheReason::PerSession));
        assert_eq!(choose_reason(3599, true), Some(CacheReason::PerSession));
        assert_eq!(choose_reason(3600, true), None);
    }

    #[test]
    fn global_window_is_a_day() {
        assert_eq!(choose_reason(3600, false), Some(CacheReason::GlobalFallback));
        assert_eq!(choose_reason(86_399, false), Some(CacheReason::GlobalFallback));
        assert_eq!(choose_reason(86_400, false), None);
    }

    #[test]
    fn negative_age_counts_as_fresh() {
        assert_eq!(choose_reason(-5, true), Some(CacheReason::PerConversation));
        assert_eq!(choose_reason(-5, false), Some(CacheReason::GlobalFallback));
    }
}
