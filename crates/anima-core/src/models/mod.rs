//! Shared model types for every subsystem.

pub mod association;
pub mod bootstrap;
pub mod consolidation;
pub mod handshake;
pub mod memory;
pub mod network;
pub mod promotion;
pub mod query;
pub mod reflection;
pub mod stats;

pub use association::Association;
pub use bootstrap::{BootstrapFiltering, BootstrapOptions, BootstrapResult, TierDistribution};
pub use consolidation::{
    CentroidResult, ClusterMember, FragmentClass, FragmentationCandidate, MergeResult,
    SemanticDuplicate,
};
pub use handshake::{CacheReason, ContextType, Handshake, HandshakeRecord};
pub use memory::{Memory, Tier};
pub use network::{AssociationView, HubView, NetworkStats};
pub use promotion::{Promotion, PromotionReason, TierPromotion};
pub use query::{AddResult, QueryOptions, QueryResult, ScoredMemory};
pub use reflection::{
    FrictionFeel, FrictionMetrics, HubSummary, Reflection, ReflectionMetrics, ReflectionType,
    RetrievalMetrics, SessionMetrics,
};
pub use stats::{CacheStats, PoolStats};
