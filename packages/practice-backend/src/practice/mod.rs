//! Adaptive practice-item selection.
//!
//! Everything in this module is synchronous and storage-agnostic: scope
//! indexing, candidate filtering, tiered ranking and session accuracy. The
//! database-facing orchestration lives in `services::practice`.

pub mod config;
pub mod pool;
pub mod progress;
pub mod ranker;
pub mod scope;
pub mod types;

pub use config::{AdaptationConfig, SelectionConfig};
pub use pool::PoolConstraints;
pub use progress::SessionProgress;
pub use ranker::{SelectOptions, Selection, Tier, TierBreakdown};
pub use scope::ScopeIndex;
pub use types::{
    ContentItem, ContentItemId, Difficulty, DifficultyBias, ReviewStatus, TopicId, TopicSelector,
    UserItemSignal,
};
