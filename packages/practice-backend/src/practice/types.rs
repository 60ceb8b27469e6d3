use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ContentItemId = String;
pub type TopicId = String;
pub type SourceUnitId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Unverified,
    Ok,
    Flagged,
}

impl ReviewStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unverified" => Some(Self::Unverified),
            "ok" => Some(Self::Ok),
            "flagged" => Some(Self::Flagged),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Unverified => "unverified",
            ReviewStatus::Ok => "ok",
            ReviewStatus::Flagged => "flagged",
        }
    }

    /// Known-defect marker set by the verification pipeline.
    pub const fn is_defective(self) -> bool {
        matches!(self, ReviewStatus::Flagged)
    }
}

/// Soft preference applied inside each ranking tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBias {
    Easier,
    Harder,
}

impl DifficultyBias {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easier" => Some(Self::Easier),
            "harder" => Some(Self::Harder),
            _ => None,
        }
    }

    pub const fn admits(self, difficulty: Difficulty) -> bool {
        match self {
            DifficultyBias::Easier => matches!(difficulty, Difficulty::Easy | Difficulty::Medium),
            DifficultyBias::Harder => matches!(difficulty, Difficulty::Medium | Difficulty::Hard),
        }
    }
}

/// Selection-relevant view of a practice question. `is_essential` is inherited
/// from the owning source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: ContentItemId,
    pub source_unit_id: SourceUnitId,
    pub difficulty: Difficulty,
    pub is_active: bool,
    pub review_status: ReviewStatus,
    pub is_official: bool,
    pub is_essential: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserItemSignal {
    pub user_id: String,
    pub item_id: ContentItemId,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl UserItemSignal {
    /// Derived on every read; `None` while the item has never been attempted.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_attempts <= 0 {
            return None;
        }
        Some(self.correct_attempts as f64 / self.total_attempts as f64)
    }

    pub fn is_never_seen(&self) -> bool {
        self.total_attempts <= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum TopicSelector {
    One(TopicId),
    Many(Vec<TopicId>),
    /// Every topic of a curriculum track, or every topic when no track is given.
    All {
        #[serde(rename = "trackId")]
        track_id: Option<String>,
    },
}
